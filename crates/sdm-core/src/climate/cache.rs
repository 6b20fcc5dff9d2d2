//! Local WorldClim 2.1 bioclim cache.
//!
//! Layout: `<root>/wc2.1_<res>/wc2.1_<res>_bio_<n>.tif` with `<res>` one of
//! `10m`, `5m`, `2.5m`. A missing layer triggers one download of the
//! resolution's bio zip into a temporary file; its layers are extracted in
//! place and the archive is removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const WORLDCLIM_BASE_URL: &str = "https://geodata.ucdavis.edu/climate/worldclim/2_1/base";

/// Bioclim resolutions published by WorldClim 2.1 (arc-minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum ClimateResolution {
    TenMinutes,
    FiveMinutes,
    TwoAndHalfMinutes,
}

impl ClimateResolution {
    pub fn from_arcmin(arcmin: f64) -> Result<Self> {
        match arcmin {
            a if a == 10.0 => Ok(Self::TenMinutes),
            a if a == 5.0 => Ok(Self::FiveMinutes),
            a if a == 2.5 => Ok(Self::TwoAndHalfMinutes),
            _ => Err(Error::Config(format!(
                "unsupported climate resolution {arcmin} arc-minutes (use 10, 5 or 2.5)"
            ))),
        }
    }

    pub fn arcmin(self) -> f64 {
        match self {
            Self::TenMinutes => 10.0,
            Self::FiveMinutes => 5.0,
            Self::TwoAndHalfMinutes => 2.5,
        }
    }

    pub fn degrees(self) -> f64 {
        self.arcmin() / 60.0
    }

    /// WorldClim file-name token, e.g. `10m`.
    pub fn label(self) -> &'static str {
        match self {
            Self::TenMinutes => "10m",
            Self::FiveMinutes => "5m",
            Self::TwoAndHalfMinutes => "2.5m",
        }
    }
}

impl TryFrom<f64> for ClimateResolution {
    type Error = Error;

    fn try_from(v: f64) -> Result<Self> {
        Self::from_arcmin(v)
    }
}

impl From<ClimateResolution> for f64 {
    fn from(r: ClimateResolution) -> f64 {
        r.arcmin()
    }
}

pub struct ClimateCache {
    root: PathBuf,
    base_url: String,
}

impl ClimateCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), base_url: WORLDCLIM_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn dir(&self, res: ClimateResolution) -> PathBuf {
        self.root.join(format!("wc2.1_{}", res.label()))
    }

    pub fn layer_path(&self, res: ClimateResolution, index: u8) -> PathBuf {
        self.dir(res).join(format!("wc2.1_{}_bio_{}.tif", res.label(), index))
    }

    pub fn archive_url(&self, res: ClimateResolution) -> String {
        format!("{}/wc2.1_{}_bio.zip", self.base_url.trim_end_matches('/'), res.label())
    }

    /// Indices among `layers` whose file is not in the cache.
    pub fn missing(&self, res: ClimateResolution, layers: &[u8]) -> Vec<u8> {
        layers.iter().copied().filter(|&i| !self.layer_path(res, i).is_file()).collect()
    }

    /// Paths of `layers`, downloading the archive once if any are missing
    /// and `download` is allowed.
    pub fn ensure(
        &self,
        res: ClimateResolution,
        layers: &[u8],
        download: bool,
    ) -> Result<Vec<PathBuf>> {
        let missing = self.missing(res, layers);
        if !missing.is_empty() {
            if !download {
                return Err(Error::Config(format!(
                    "bioclim layers {missing:?} at {} are not cached in {} and downloading is disabled",
                    res.label(),
                    self.dir(res).display()
                )));
            }
            self.download(res)?;
            let still = self.missing(res, layers);
            if !still.is_empty() {
                return Err(Error::UnsupportedRaster(format!(
                    "archive {} did not contain bioclim layers {still:?}",
                    self.archive_url(res)
                )));
            }
        } else {
            debug!(dir = %self.dir(res).display(), layers = layers.len(), "bioclim cache hit");
        }
        Ok(layers.iter().map(|&i| self.layer_path(res, i)).collect())
    }

    fn download(&self, res: ClimateResolution) -> Result<()> {
        let dir = self.dir(res);
        fs::create_dir_all(&dir)?;
        let url = self.archive_url(res);
        info!(%url, "downloading bioclim archive");

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sdm-prep/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(3600))
            .build()?;
        let mut resp = client.get(&url).send()?;
        if !resp.status().is_success() {
            return Err(Error::Service { status: resp.status().as_u16(), url });
        }
        // Removed on drop, so a failed download or extraction leaves no zip behind.
        let mut archive = NamedTempFile::new_in(&dir)?;
        let bytes = resp.copy_to(archive.as_file_mut())?;
        debug!(bytes, path = %archive.path().display(), "archive saved");

        let n = extract_tifs(archive.path(), &dir)?;
        archive.close()?;
        info!(files = n, dir = %dir.display(), "bioclim archive extracted");
        Ok(())
    }
}

/// Extract every `.tif` entry of `zip_path` into `dir` (flattened).
///
/// Each entry is written to a temporary file and renamed into place once it
/// has been read completely, so an interrupted extraction never leaves a
/// truncated layer under its cached name.
pub fn extract_tifs(zip_path: &Path, dir: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(fs::File::open(zip_path)?)?;
    let mut n = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.enclosed_name().and_then(|p| p.file_name()).map(|f| f.to_owned());
        let Some(name) = name else {
            continue;
        };
        if !name.to_string_lossy().to_ascii_lowercase().ends_with(".tif") {
            continue;
        }
        let mut tmp = NamedTempFile::new_in(dir)?;
        io::copy(&mut entry, tmp.as_file_mut())?;
        tmp.persist(dir.join(&name)).map_err(|e| e.error)?;
        n += 1;
    }
    Ok(n)
}
