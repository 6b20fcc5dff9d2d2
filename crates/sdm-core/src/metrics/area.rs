//! Polygon and raster range areas.
//!
//! Geographic polygons are measured on the authalic sphere with the
//! Chamberlain–Duquette formula, which is the shoelace formula in
//! (λ, sin φ) space. It is exact for edges along meridians and parallels, so a
//! grid cell measured as a polygon equals [`lat_lon_cell_area_m2`]. Projected
//! polygons use the planar shoelace area in CRS units².
//!
//! Under the positive-overlap policy every cell touching the range counts in
//! full, so the raster area is at least the polygon area. For ranges spanning
//! several degrees at ≤ 10 arc-minute resolution the excess stays below 5 %.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::range::polygon::{signed_area, Part, RangePolygon};
use crate::range::RangeRaster;
use crate::sphere::{lat_lon_cell_area_m2, AUTHALIC_RADIUS_M};

/// Spherical area (m²) of a ring given in lon/lat degrees.
pub fn spherical_ring_area_m2(ring: &[(f64, f64)]) -> f64 {
    let mapped: Vec<(f64, f64)> =
        ring.iter().map(|&(lon, lat)| (lon.to_radians(), lat.to_radians().sin())).collect();
    signed_area(&mapped).abs() * AUTHALIC_RADIUS_M * AUTHALIC_RADIUS_M
}

fn spherical_part_area_m2(part: &Part) -> f64 {
    let holes: f64 = part.holes.iter().map(|h| spherical_ring_area_m2(h)).sum();
    spherical_ring_area_m2(&part.exterior) - holes
}

/// Area of the polygon in km², summed over parts.
pub fn polygon_area_km2(polygon: &RangePolygon) -> f64 {
    let m2: f64 = if polygon.crs().is_geographic() {
        polygon.parts().iter().map(spherical_part_area_m2).sum()
    } else {
        polygon.parts().iter().map(Part::planar_area).sum()
    };
    m2 / 1e6
}

/// Total true area of the in-range cells in km².
pub fn raster_area_km2(raster: &RangeRaster) -> f64 {
    let spec = raster.spec();
    let m2: f64 = if raster.crs.is_geographic() {
        raster
            .in_range_cells()
            .map(|(r, c)| {
                let b = spec.cell_bounds(r, c);
                lat_lon_cell_area_m2(b.min_y, b.max_y, b.min_x, b.max_x)
            })
            .sum()
    } else {
        raster.cells_in_range() as f64 * spec.resolution * spec.resolution
    };
    m2 / 1e6
}

/// Polygon area next to the area of its rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaComparison {
    pub polygon_km2: f64,
    pub raster_km2: f64,
    pub cells_in_range: usize,
    /// (raster − polygon) / polygon
    pub relative_difference: f64,
}

pub fn compare_areas(polygon: &RangePolygon, raster: &RangeRaster) -> Result<AreaComparison> {
    polygon.crs().ensure_same(&raster.crs)?;
    let polygon_km2 = polygon_area_km2(polygon);
    let raster_km2 = raster_area_km2(raster);
    let relative_difference =
        if polygon_km2 > 0.0 { (raster_km2 - polygon_km2) / polygon_km2 } else { f64::NAN };
    Ok(AreaComparison {
        polygon_km2,
        raster_km2,
        cells_in_range: raster.cells_in_range(),
        relative_difference,
    })
}
