//! Gridded climate layers and the climate join stage.
//!
//! Pipeline:
//!   cache (download once per resolution) → GeoTIFF decode → ClimateGrid →
//!   point join (occurrences) and raster join (range raster).

pub mod bioclim;
pub mod cache;
pub mod geotiff;
pub mod join;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::grid::{Grid, GridSpec};
use crate::projection::Crs;

pub use bioclim::{BioclimVar, ValueEncoding, BIOCLIM};
pub use cache::{ClimateCache, ClimateResolution};
pub use join::{
    point_join, raster_join, resample, CrsPolicy, JoinedRaster, JoinedRecord, PointJoin,
    PointSampling, Resampling,
};

/// One climate variable on the shared grid. No-data cells hold NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateLayer {
    pub name: String,
    pub encoding: ValueEncoding,
    /// Sentinel the source file used for missing values, if any.
    pub nodata: Option<f64>,
    pub grid: Grid<f32>,
}

impl ClimateLayer {
    pub fn new(name: impl Into<String>, encoding: ValueEncoding, grid: Grid<f32>) -> Self {
        Self { name: name.into(), encoding, nodata: None, grid }
    }
}

/// A stack of layers sharing one grid and CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateGrid {
    pub spec: GridSpec,
    pub crs: Crs,
    layers: Vec<ClimateLayer>,
}

impl ClimateGrid {
    pub fn new(spec: GridSpec, crs: Crs) -> Self {
        Self { spec, crs, layers: Vec::new() }
    }

    /// Add a layer; its grid must match this grid's spec.
    pub fn add_layer(&mut self, layer: ClimateLayer) -> Result<()> {
        if layer.grid.spec != self.spec {
            return Err(Error::Alignment(format!(
                "layer {} has grid {:?}, expected {:?}",
                layer.name, layer.grid.spec, self.spec
            )));
        }
        if self.layer(&layer.name).is_some() {
            return Err(Error::Config(format!("duplicate climate layer {}", layer.name)));
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn layers(&self) -> &[ClimateLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&ClimateLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }
}

/// Load bioclim `layers` (indices 1..=19) at `res` through `cache`.
pub fn load_bioclim(
    cache: &ClimateCache,
    res: ClimateResolution,
    layers: &[u8],
    download: bool,
) -> Result<ClimateGrid> {
    let vars: Vec<&BioclimVar> = layers
        .iter()
        .map(|&i| {
            bioclim::by_index(i).ok_or_else(|| Error::Config(format!("no bioclim variable {i}")))
        })
        .collect::<Result<_>>()?;
    let paths = cache.ensure(res, layers, download)?;

    let mut grid: Option<ClimateGrid> = None;
    for (var, path) in vars.iter().zip(&paths) {
        let band = geotiff::read_geotiff(path)?;
        let g = grid.get_or_insert_with(|| ClimateGrid::new(band.grid.spec, band.crs.clone()));
        if band.crs != g.crs {
            return Err(Error::CrsMismatch { left: g.crs.to_string(), right: band.crs.to_string() });
        }
        g.add_layer(ClimateLayer {
            name: var.code(),
            encoding: var.encoding(band.integer),
            nodata: band.nodata,
            grid: band.grid,
        })?;
    }
    let grid = grid.ok_or_else(|| Error::Config("no climate layers requested".into()))?;
    info!(
        layers = grid.layers().len(),
        cols = grid.spec.cols,
        rows = grid.spec.rows,
        resolution = grid.spec.resolution,
        "climate grid loaded"
    );
    Ok(grid)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::climate::geotiff::tests::write_f32_tiff;

    /// 4 × 4 one-degree grid at (10..14, 45..49) with value = 10·row + col.
    pub(crate) fn small_grid() -> ClimateGrid {
        let spec = GridSpec { min_x: 10.0, min_y: 45.0, resolution: 1.0, cols: 4, rows: 4 };
        let mut g = Grid::new(spec, 0.0f32);
        for r in 0..4 {
            for c in 0..4 {
                g.set(r, c, (10 * r + c) as f32);
            }
        }
        let mut cg = ClimateGrid::new(spec, Crs::wgs84());
        let encoding = bioclim::by_index(1).unwrap().encoding(true);
        cg.add_layer(ClimateLayer::new("bio1", encoding, g)).unwrap();
        cg
    }

    #[test]
    fn mismatched_layer_is_rejected() {
        let mut cg = small_grid();
        let other = GridSpec { min_x: 0.0, min_y: 0.0, resolution: 1.0, cols: 4, rows: 4 };
        let degc = ValueEncoding::new(0.1, "degC");
        let err = cg.add_layer(ClimateLayer::new("bio2", degc.clone(), Grid::new(other, 0.0)));
        assert!(matches!(err, Err(Error::Alignment(_))));
        let dup = cg.add_layer(ClimateLayer::new("bio1", degc, Grid::new(cg.spec, 0.0)));
        assert!(matches!(dup, Err(Error::Config(_))));
    }

    #[test]
    fn loads_cached_bioclim_layers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ClimateCache::new(dir.path());
        let res = ClimateResolution::TenMinutes;
        std::fs::create_dir_all(cache.dir(res)).unwrap();
        let step = 1.0 / 6.0;
        let bio1 = [1.5, 2.5, 3.5, 4.5];
        let bio12 = [800.0, 810.0, 820.0, -3.4e38];
        write_f32_tiff(&cache.layer_path(res, 1), 2, &bio1, 10.0, 48.0, step, None);
        write_f32_tiff(&cache.layer_path(res, 12), 2, &bio12, 10.0, 48.0, step, Some("-3.4e+38"));

        let grid = load_bioclim(&cache, res, &[1, 12], false).unwrap();
        assert_eq!(grid.layer_names(), vec!["bio1", "bio12"]);
        let bio1 = grid.layer("bio1").unwrap();
        assert_eq!(bio1.encoding.scale, 1.0);
        assert_eq!(bio1.grid.get(0, 0), 3.5);
        assert!(grid.layer("bio12").unwrap().grid.get(0, 1).is_nan());
    }
}
