use thiserror::Error;

use crate::occurrence::names::TaxonCandidate;

/// Errors raised by the pipeline stages.
///
/// Variants are grouped the way failures are handled: fetch errors surface to
/// the caller without retry, geometric and alignment errors are reported
/// instead of being coerced into a result.
#[derive(Debug, Error)]
pub enum Error {
    // ── Fetch ────────────────────────────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned HTTP {status} for {url}")]
    Service { status: u16, url: String },

    #[error("taxon not found: {0:?}")]
    TaxonNotFound(String),

    #[error("name {name:?} is ambiguous ({} candidate taxa), review required", candidates.len())]
    AmbiguousName {
        name: String,
        candidates: Vec<TaxonCandidate>,
    },

    // ── Geometry ─────────────────────────────────────────────────────────────
    #[error("CRS mismatch: {left} vs {right}")]
    CrsMismatch { left: String, right: String },

    #[error("range polygon has no parts")]
    EmptyPolygon,

    #[error("invalid geometry in feature {feature}: {reason}")]
    InvalidGeometry { feature: usize, reason: String },

    #[error("invalid range polygon part {part}: {reason}")]
    InvalidPart { part: usize, reason: String },

    #[error("resolution {resolution} over extent {extent} yields a zero-cell raster")]
    ZeroCellRaster { resolution: f64, extent: String },

    #[error("projection error: {0}")]
    Projection(String),

    // ── Resampling / alignment ───────────────────────────────────────────────
    #[error("grids cannot be aligned: {0}")]
    Alignment(String),

    // ── Data sources ─────────────────────────────────────────────────────────
    #[error("unsupported raster: {0}")]
    UnsupportedRaster(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;
