//! Pipeline configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration apart from the taxon and the range map path.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clean::CleaningConfig;
use crate::climate::{ClimateResolution, CrsPolicy, PointSampling, Resampling};
use crate::error::{Error, Result};
use crate::metrics::MetricsConfig;
use crate::occurrence::gbif::ServiceConfig;
use crate::occurrence::BasisOfRecord;
use crate::range::DEFAULT_RESOLUTION_DEG;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub taxon: TaxonConfig,
    pub service: ServiceConfig,
    pub cleaning: CleaningConfig,
    pub range: RangeConfig,
    pub metrics: MetricsConfig,
    pub climate: ClimateConfig,
    pub output: OutputConfig,
}

/// Which taxon to fetch. `key` wins over `name` when both are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonConfig {
    pub name: Option<String>,
    pub key: Option<u64>,
    pub max_records: usize,
    pub basis_of_record: Vec<BasisOfRecord>,
    pub country: Option<String>,
}

impl Default for TaxonConfig {
    fn default() -> Self {
        Self {
            name: None,
            key: None,
            max_records: 5000,
            basis_of_record: Vec::new(),
            country: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// GeoJSON range map (`.geojson`, `.json`, optionally `.gz`).
    pub path: PathBuf,
    pub resolution_deg: f64,
    /// Raster cache directory; no caching when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self { path: PathBuf::new(), resolution_deg: DEFAULT_RESOLUTION_DEG, cache_dir: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub cache_dir: PathBuf,
    #[serde(rename = "resolution_arcmin")]
    pub resolution: ClimateResolution,
    /// Bioclim indices, 1..=19.
    pub layers: Vec<u8>,
    pub sampling: PointSampling,
    pub resampling: Resampling,
    pub crs_policy: CrsPolicy,
    /// Allow downloading missing layers.
    pub download: bool,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/worldclim"),
            resolution: ClimateResolution::TenMinutes,
            layers: vec![1, 12],
            sampling: PointSampling::default(),
            resampling: Resampling::default(),
            crs_policy: CrsPolicy::default(),
            download: true,
        }
    }
}

impl ClimateConfig {
    /// Layer codes in request order, e.g. `bio1`.
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|i| format!("bio{i}")).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output") }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values no stage could run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.range.resolution_deg.is_finite() && self.range.resolution_deg > 0.0) {
            return Err(Error::Config(format!(
                "range.resolution_deg must be positive, got {}",
                self.range.resolution_deg
            )));
        }
        if self.taxon.max_records == 0 {
            return Err(Error::Config("taxon.max_records must be at least 1".into()));
        }
        if let Some(bad) = self.climate.layers.iter().find(|&&i| !(1..=19).contains(&i)) {
            return Err(Error::Config(format!("climate.layers: no bioclim variable {bad}")));
        }
        if self.metrics.equal_area_crs.is_geographic() {
            return Err(Error::Config(format!(
                "metrics.equal_area_crs must be projected, got {}",
                self.metrics.equal_area_crs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::outliers::OutlierMethod;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.cleaning.max_uncertainty_m, 10_000.0);
        assert_eq!(cfg.cleaning.min_year, 1970);
        assert_eq!(cfg.metrics.equal_area_crs.name(), "EPSG:3035");
        assert_eq!(cfg.climate.layer_names(), vec!["bio1", "bio12"]);
    }

    #[test]
    fn full_file_parses() {
        let text = r#"
            [taxon]
            name = "Lynx lynx"
            max_records = 2000
            basis_of_record = ["HUMAN_OBSERVATION", "PRESERVED_SPECIMEN"]
            country = "DE"

            [cleaning]
            max_uncertainty_m = 5000
            min_year = 1990
            [cleaning.outliers]
            method = "mad"

            [range]
            path = "data/lynx_range.geojson"
            resolution_deg = 0.5

            [metrics]
            equal_area_crs = "EPSG:6933"

            [climate]
            cache_dir = "/tmp/wc"
            resolution_arcmin = 5
            layers = [1, 5, 6, 12]
            sampling = "bilinear"
            resampling = "average"
            crs_policy = "reject"
            download = false

            [output]
            dir = "out/lynx"
        "#;
        let cfg = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.taxon.name.as_deref(), Some("Lynx lynx"));
        assert_eq!(cfg.taxon.basis_of_record.len(), 2);
        assert_eq!(cfg.cleaning.min_year, 1990);
        assert_eq!(cfg.cleaning.outliers.method, OutlierMethod::Mad);
        assert_eq!(cfg.cleaning.outliers.min_records, 7);
        assert_eq!(cfg.range.resolution_deg, 0.5);
        assert_eq!(cfg.metrics.equal_area_crs.name(), "EPSG:6933");
        assert_eq!(cfg.climate.resolution, ClimateResolution::FiveMinutes);
        assert_eq!(cfg.climate.sampling, PointSampling::Bilinear);
        assert_eq!(cfg.climate.resampling, Resampling::Average);
        assert_eq!(cfg.climate.crs_policy, CrsPolicy::Reject);
        assert!(!cfg.climate.download);
        assert_eq!(cfg.output.dir, PathBuf::from("out/lynx"));
        // Unset sections keep their defaults.
        assert_eq!(cfg.service, ServiceConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let parse = PipelineConfig::from_toml_str;
        assert!(matches!(parse("[range]\nresolution_deg = 0"), Err(Error::Config(_))));
        assert!(matches!(parse("[climate]\nlayers = [20]"), Err(Error::Config(_))));
        assert!(matches!(parse("[climate]\nresolution_arcmin = 30"), Err(Error::Toml(_))));
        assert!(matches!(
            PipelineConfig::from_toml_str("[metrics]\nequal_area_crs = \"EPSG:4326\""),
            Err(Error::Config(_))
        ));
    }
}
