//! Range metrics: polygon vs raster area and the equal-area centroid.

pub mod area;
pub mod centroid;
pub mod union;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::projection::Crs;
use crate::range::{RangePolygon, RangeRaster};

pub use area::{compare_areas, polygon_area_km2, raster_area_km2, AreaComparison};
pub use centroid::{naive_centroid, range_centroid, RangeCentroid};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Projected equal-area CRS used for the centroid.
    pub equal_area_crs: Crs,
    /// Maximum edge length in degrees before projection.
    pub densify_step_deg: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            equal_area_crs: Crs::epsg(3035).unwrap_or_default(),
            densify_step_deg: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeMetrics {
    pub area: AreaComparison,
    pub centroid: RangeCentroid,
}

/// Metrics stage: area comparison plus equal-area centroid.
pub fn compute_metrics(
    polygon: &RangePolygon,
    raster: &RangeRaster,
    cfg: &MetricsConfig,
) -> Result<RangeMetrics> {
    let area = compare_areas(polygon, raster)?;
    let centroid = range_centroid(polygon, &cfg.equal_area_crs, cfg.densify_step_deg)?;
    info!(
        polygon_km2 = area.polygon_km2,
        raster_km2 = area.raster_km2,
        rel_diff = area.relative_difference,
        centroid_lat = centroid.location.lat,
        centroid_lon = centroid.location.lon,
        "range metrics"
    );
    Ok(RangeMetrics { area, centroid })
}
