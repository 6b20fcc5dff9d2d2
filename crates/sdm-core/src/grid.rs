//! Regular grids shared by range rasters and climate layers.
//!
//! Cells are square. Row 0 is the southernmost row (S→N storage), column 0 the
//! westernmost. Coordinate math uses f64; stored values are generic.

use serde::{Deserialize, Serialize};

use crate::coords::BoundingBox;
use crate::error::{Error, Result};

/// Fractional index distance treated as an exact grid line.
const SNAP_EPS: f64 = 1e-9;

/// Largest grid `aligned` will build (a global 30 arc-second grid is ~9.3e8).
pub const MAX_CELLS: usize = 1 << 31;

/// Geometry of a regular grid: lower-left origin, square cell size, shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub min_x: f64,
    pub min_y: f64,
    pub resolution: f64,
    pub cols: usize,
    pub rows: usize,
}

/// Round `v` to the nearest integer if it is within `SNAP_EPS` of it.
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPS {
        r
    } else {
        v
    }
}

impl GridSpec {
    /// Smallest grid covering `extent` whose cell edges fall on integer
    /// multiples of `resolution` from the CRS origin.
    ///
    /// Identical `(extent, resolution)` inputs always yield an identical spec.
    pub fn aligned(extent: &BoundingBox, resolution: f64) -> Result<Self> {
        if !resolution.is_finite() || resolution <= 0.0 || extent.is_empty() {
            return Err(Error::ZeroCellRaster { resolution, extent: extent.to_string() });
        }
        let c0 = snap(extent.min_x / resolution).floor();
        let c1 = snap(extent.max_x / resolution).ceil();
        let r0 = snap(extent.min_y / resolution).floor();
        let r1 = snap(extent.max_y / resolution).ceil();
        let cols = (c1 - c0).max(0.0) as usize;
        let rows = (r1 - r0).max(0.0) as usize;
        if cols == 0 || rows == 0 {
            return Err(Error::ZeroCellRaster { resolution, extent: extent.to_string() });
        }
        if cols.checked_mul(rows).map_or(true, |n| n > MAX_CELLS) {
            return Err(Error::Config(format!(
                "resolution {resolution} over extent {extent} needs {cols} x {rows} cells \
                 (limit {MAX_CELLS})"
            )));
        }
        Ok(Self { min_x: c0 * resolution, min_y: r0 * resolution, resolution, cols, rows })
    }

    pub fn max_x(&self) -> f64 {
        self.min_x + self.cols as f64 * self.resolution
    }

    pub fn max_y(&self) -> f64 {
        self.min_y + self.rows as f64 * self.resolution
    }

    pub fn extent(&self) -> BoundingBox {
        BoundingBox::new(self.min_x, self.min_y, self.max_x(), self.max_y())
    }

    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Centre of cell (row, col).
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_x + (col as f64 + 0.5) * self.resolution,
            self.min_y + (row as f64 + 0.5) * self.resolution,
        )
    }

    pub fn cell_bounds(&self, row: usize, col: usize) -> BoundingBox {
        let x0 = self.min_x + col as f64 * self.resolution;
        let y0 = self.min_y + row as f64 * self.resolution;
        BoundingBox::new(x0, y0, x0 + self.resolution, y0 + self.resolution)
    }

    /// Cell containing (x, y). Points on the outer max edges belong to the
    /// last row/column; points outside the extent return `None`.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.extent().contains(x, y) {
            return None;
        }
        let fc = ((x - self.min_x) / self.resolution).floor() as usize;
        let fr = ((y - self.min_y) / self.resolution).floor() as usize;
        Some((fr.min(self.rows - 1), fc.min(self.cols - 1)))
    }

    /// Inclusive (row, col) index ranges of the cells overlapping `bbox`,
    /// clamped to the grid. `None` when the box misses the grid entirely.
    pub fn cells_overlapping(
        &self,
        bbox: &BoundingBox,
    ) -> Option<((usize, usize), (usize, usize))> {
        if !self.extent().intersects(bbox) {
            return None;
        }
        let to_idx = |v: f64, origin: f64, n: usize| -> usize {
            let f = ((v - origin) / self.resolution).floor();
            f.clamp(0.0, (n - 1) as f64) as usize
        };
        let c0 = to_idx(bbox.min_x, self.min_x, self.cols);
        let c1 = to_idx(bbox.max_x, self.min_x, self.cols);
        let r0 = to_idx(bbox.min_y, self.min_y, self.rows);
        let r1 = to_idx(bbox.max_y, self.min_y, self.rows);
        Some(((r0, r1), (c0, c1)))
    }
}

/// A grid of values, row-major, row 0 = south.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    pub spec: GridSpec,
    pub data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Create a new grid filled with the given value.
    pub fn new(spec: GridSpec, fill: T) -> Self {
        Self { data: vec![fill; spec.cell_count()], spec }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[self.spec.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: T) {
        let i = self.spec.index(row, col);
        self.data[i] = val;
    }
}

impl Grid<f32> {
    /// Value of the cell containing (x, y). NaN cells and points outside the
    /// extent return `None`.
    pub fn sample_nearest(&self, x: f64, y: f64) -> Option<f32> {
        let (r, c) = self.spec.cell_at(x, y)?;
        let v = self.get(r, c);
        v.is_finite().then_some(v)
    }

    /// Bilinear interpolation between the four nearest cell centres.
    ///
    /// Weights of NaN neighbours are dropped and the rest renormalised; at an
    /// exact cell centre the result is that cell's value. Points outside the
    /// extent return `None`.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f32> {
        if !self.spec.extent().contains(x, y) {
            return None;
        }
        let s = &self.spec;
        let fx = ((x - s.min_x) / s.resolution - 0.5).clamp(0.0, (s.cols - 1) as f64);
        let fy = ((y - s.min_y) / s.resolution - 0.5).clamp(0.0, (s.rows - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(s.cols - 1);
        let y1 = (y0 + 1).min(s.rows - 1);

        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let taps = [
            (self.get(y0, x0), (1.0 - tx) * (1.0 - ty)),
            (self.get(y0, x1), tx * (1.0 - ty)),
            (self.get(y1, x0), (1.0 - tx) * ty),
            (self.get(y1, x1), tx * ty),
        ];

        let (mut sum, mut weight) = (0.0f64, 0.0f64);
        for (v, w) in taps {
            if v.is_finite() && w > 0.0 {
                sum += v as f64 * w;
                weight += w;
            }
        }
        if weight <= 0.0 {
            return None;
        }
        Some((sum / weight) as f32)
    }
}
