//! Boolean range rasters.
//!
//! A cell is in range when its overlap with any polygon part has positive
//! area; touching along an edge or at a corner does not count. Cells crossed
//! by a ring edge are decided by clipping; every other cell lies wholly inside
//! or outside a part and is decided by its centre.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clip::overlap_area;
use super::polygon::{Part, RangePolygon};
use crate::coords::BoundingBox;
use crate::error::Result;
use crate::grid::{Grid, GridSpec};
use crate::projection::Crs;

/// Overlap below this fraction of a cell is treated as touching.
const MIN_OVERLAP_FRACTION: f64 = 1e-9;

/// Default resolution: 10 arc-minutes.
pub const DEFAULT_RESOLUTION_DEG: f64 = 1.0 / 6.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRaster {
    pub crs: Crs,
    pub grid: Grid<bool>,
}

impl RangeRaster {
    pub fn spec(&self) -> &GridSpec {
        &self.grid.spec
    }

    pub fn is_in_range(&self, row: usize, col: usize) -> bool {
        self.grid.get(row, col)
    }

    pub fn cells_in_range(&self) -> usize {
        self.grid.data.iter().filter(|v| **v).count()
    }

    /// `(row, col)` of every in-range cell, row-major from the south-west.
    pub fn in_range_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.grid.spec.cols;
        self.grid
            .data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(move |(i, _)| (i / cols, i % cols))
    }
}

fn rasterize_part(part: &Part, spec: &GridSpec, cells: &mut Grid<bool>) {
    let Some(((r0, r1), (c0, c1))) = spec.cells_overlapping(&part.bbox()) else {
        return;
    };
    let width = c1 - c0 + 1;
    let height = r1 - r0 + 1;

    // Cells whose closed bounds meet some edge's bounding box.
    let mut crossed = vec![false; width * height];
    for ((x0, y0), (x1, y1)) in part.edges() {
        let eb = BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1));
        if let Some(((er0, er1), (ec0, ec1))) = spec.cells_overlapping(&eb) {
            for r in er0.max(r0)..=er1.min(r1) {
                for c in ec0.max(c0)..=ec1.min(c1) {
                    crossed[(r - r0) * width + (c - c0)] = true;
                }
            }
        }
    }

    let min_area = spec.resolution * spec.resolution * MIN_OVERLAP_FRACTION;
    for r in r0..=r1 {
        for c in c0..=c1 {
            if cells.get(r, c) {
                continue;
            }
            let hit = if crossed[(r - r0) * width + (c - c0)] {
                overlap_area(part, &spec.cell_bounds(r, c)) > min_area
            } else {
                let (x, y) = spec.cell_center(r, c);
                part.contains(x, y)
            };
            if hit {
                cells.set(r, c, true);
            }
        }
    }
}

/// Rasterize `polygon` on the grid aligned to `resolution` (CRS units) that
/// covers its extent. Identical inputs give bit-identical rasters.
pub fn rasterize(polygon: &RangePolygon, resolution: f64) -> Result<RangeRaster> {
    let spec = GridSpec::aligned(&polygon.bbox(), resolution)?;
    let mut grid = Grid::new(spec, false);
    for part in polygon.parts() {
        rasterize_part(part, &spec, &mut grid);
    }
    let raster = RangeRaster { crs: polygon.crs().clone(), grid };
    debug!(
        cols = spec.cols,
        rows = spec.rows,
        resolution,
        in_range = raster.cells_in_range(),
        "range rasterized"
    );
    Ok(raster)
}
