//! Pipeline orchestrator: runs every stage in order.
//!
//! Pipeline order:
//!   1. Fetch (name resolution + occurrence search)
//!   2. Clean
//!   3. Rasterize range
//!   4. Range metrics
//!   5. Climate join (points and raster)

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::clean::{clean, CleaningReport};
use crate::climate::{load_bioclim, point_join, raster_join, ClimateCache, JoinedRaster, PointJoin};
use crate::config::{PipelineConfig, TaxonConfig};
use crate::coords::LatLon;
use crate::error::{Error, Result};
use crate::metrics::{compute_metrics, AreaComparison, RangeMetrics};
use crate::occurrence::names::{resolve_taxon_key, NameResolver};
use crate::occurrence::{fetch_occurrences, OccurrenceQuery, OccurrenceSource};
use crate::range::{load_range, rasterize, RangeRaster, RasterCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Clean,
    Rasterize,
    Metrics,
    Join,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Clean => "clean",
            Stage::Rasterize => "rasterize",
            Stage::Metrics => "metrics",
            Stage::Join => "join",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure, naming the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: Error,
}

trait InStage<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> InStage<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub millis: u64,
}

/// Everything the pipeline produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub taxon_key: u64,
    pub cleaning: CleaningReport,
    pub raster: RangeRaster,
    pub metrics: RangeMetrics,
    pub joined: PointJoin,
    /// One per climate layer, in layer order.
    pub joined_rasters: Vec<JoinedRaster>,
    pub timings: Vec<StageTiming>,
}

/// Per-layer raster join summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub layer: String,
    pub unit: String,
    pub valued_cells: usize,
    pub mean: Option<f64>,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub taxon_key: u64,
    pub fetched: usize,
    pub kept: usize,
    pub dropped: usize,
    /// Failing-record count per cleaning check.
    pub failures: BTreeMap<String, usize>,
    pub raster_cols: usize,
    pub raster_rows: usize,
    pub resolution: f64,
    pub area: AreaComparison,
    pub centroid: LatLon,
    pub joined_records: usize,
    pub complete_records: usize,
    pub layers: Vec<LayerSummary>,
    pub timings: Vec<StageTiming>,
}

impl PipelineOutput {
    pub fn summary(&self) -> RunSummary {
        let spec = self.raster.spec();
        RunSummary {
            taxon_key: self.taxon_key,
            fetched: self.cleaning.input_count,
            kept: self.cleaning.kept.len(),
            dropped: self.cleaning.dropped.len(),
            failures: self
                .cleaning
                .failures
                .iter()
                .map(|(c, n)| (c.as_str().to_string(), *n))
                .collect(),
            raster_cols: spec.cols,
            raster_rows: spec.rows,
            resolution: spec.resolution,
            area: self.metrics.area,
            centroid: self.metrics.centroid.location,
            joined_records: self.joined.records.len(),
            complete_records: self.joined.complete_count(),
            layers: self
                .joined_rasters
                .iter()
                .map(|j| LayerSummary {
                    layer: j.layer.clone(),
                    unit: j.encoding.unit.clone(),
                    valued_cells: j.valued_cells(),
                    mean: j.mean_physical(),
                })
                .collect(),
            timings: self.timings.clone(),
        }
    }

    /// Write every artifact into `dir` and return the paths written.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        let mut create = |name: String| -> Result<BufWriter<fs::File>> {
            let path = dir.join(name);
            let file = fs::File::create(&path)?;
            written.push(path);
            Ok(BufWriter::new(file))
        };

        self.cleaning.write_kept_csv(create("occurrences_clean.csv".into())?)?;
        self.cleaning.write_dropped_csv(create("occurrences_dropped.csv".into())?)?;
        self.joined.write_csv(create("occurrences_joined.csv".into())?)?;
        serde_json::to_writer(create("range_raster.json".into())?, &self.raster)?;
        for j in &self.joined_rasters {
            serde_json::to_writer(create(format!("joined_{}.json", j.layer))?, j)?;
        }
        serde_json::to_writer_pretty(create("summary.json".into())?, &self.summary())?;

        info!(dir = %dir.display(), files = written.len(), "outputs written");
        Ok(written)
    }
}

fn taxon_key(cfg: &TaxonConfig, resolver: &dyn NameResolver) -> Result<u64> {
    match (cfg.key, cfg.name.as_deref()) {
        (Some(key), _) => Ok(key),
        (None, Some(name)) => resolve_taxon_key(resolver, name),
        (None, None) => Err(Error::Config("taxon.name or taxon.key is required".into())),
    }
}

fn finish(stage: Stage, started: Instant, timings: &mut Vec<StageTiming>) {
    let millis = started.elapsed().as_millis() as u64;
    info!(%stage, elapsed_ms = millis, "stage finished");
    timings.push(StageTiming { stage, millis });
}

/// Run the full pipeline against `service` (name matching and occurrence
/// search).
pub fn run<S>(
    config: &PipelineConfig,
    service: &S,
) -> std::result::Result<PipelineOutput, StageError>
where
    S: NameResolver + OccurrenceSource,
{
    config.validate().in_stage(Stage::Fetch)?;
    let mut timings = Vec::new();

    // ── 1. Fetch ────────────────────────────────────────────────────────────
    let t = Instant::now();
    let key = taxon_key(&config.taxon, service).in_stage(Stage::Fetch)?;
    let query = OccurrenceQuery {
        taxon_key: key,
        max_records: config.taxon.max_records,
        basis_of_record: config.taxon.basis_of_record.clone(),
        country: config.taxon.country.clone(),
    };
    let occurrences = fetch_occurrences(service, &query).in_stage(Stage::Fetch)?;
    finish(Stage::Fetch, t, &mut timings);

    // ── 2. Clean ────────────────────────────────────────────────────────────
    let t = Instant::now();
    let cleaning = clean(&occurrences, &config.cleaning).in_stage(Stage::Clean)?;
    finish(Stage::Clean, t, &mut timings);

    // ── 3. Rasterize ────────────────────────────────────────────────────────
    let t = Instant::now();
    let polygon = load_range(&config.range.path).in_stage(Stage::Rasterize)?;
    let resolution = config.range.resolution_deg;
    let raster = match &config.range.cache_dir {
        Some(dir) => RasterCache::new(dir).get_or_rasterize(&polygon, resolution),
        None => rasterize(&polygon, resolution),
    }
    .in_stage(Stage::Rasterize)?;
    finish(Stage::Rasterize, t, &mut timings);

    // ── 4. Metrics ──────────────────────────────────────────────────────────
    let t = Instant::now();
    let metrics = compute_metrics(&polygon, &raster, &config.metrics).in_stage(Stage::Metrics)?;
    finish(Stage::Metrics, t, &mut timings);

    // ── 5. Climate join ─────────────────────────────────────────────────────
    let t = Instant::now();
    let c = &config.climate;
    let grid = load_bioclim(&ClimateCache::new(&c.cache_dir), c.resolution, &c.layers, c.download)
        .in_stage(Stage::Join)?;
    let joined = point_join(&cleaning.kept, &grid, &c.layer_names(), c.sampling, c.crs_policy)
        .in_stage(Stage::Join)?;
    let joined_rasters = grid
        .layers()
        .iter()
        .map(|l| raster_join(&raster, &grid, &l.name, c.resampling))
        .collect::<Result<Vec<_>>>()
        .in_stage(Stage::Join)?;
    finish(Stage::Join, t, &mut timings);

    Ok(PipelineOutput {
        taxon_key: key,
        cleaning,
        raster,
        metrics,
        joined,
        joined_rasters,
        timings,
    })
}
