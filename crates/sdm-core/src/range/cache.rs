//! On-disk cache of range rasters keyed by polygon content and resolution.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::polygon::RangePolygon;
use super::rasterize::{rasterize, RangeRaster};
use crate::error::Result;

/// blake3 over the CRS name, the resolution and every ring's coordinates in
/// little-endian order. Equal polygons give equal keys on every platform.
pub fn cache_key(polygon: &RangePolygon, resolution: f64) -> String {
    let mut h = blake3::Hasher::new();
    h.update(polygon.crs().name().as_bytes());
    h.update(&[0]);
    h.update(&resolution.to_le_bytes());
    h.update(&(polygon.parts().len() as u64).to_le_bytes());
    for part in polygon.parts() {
        h.update(&(part.holes.len() as u64).to_le_bytes());
        for ring in part.rings() {
            h.update(&(ring.len() as u64).to_le_bytes());
            for &(x, y) in ring {
                h.update(&x.to_le_bytes());
                h.update(&y.to_le_bytes());
            }
        }
    }
    h.finalize().to_hex().to_string()
}

pub struct RasterCache {
    dir: PathBuf,
}

impl RasterCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, polygon: &RangePolygon, resolution: f64) -> PathBuf {
        self.dir.join(format!("range_{}.json", cache_key(polygon, resolution)))
    }

    /// Cached raster for `(polygon, resolution)`, rasterizing and storing it
    /// on a miss. An unreadable cache entry is rebuilt.
    pub fn get_or_rasterize(&self, polygon: &RangePolygon, resolution: f64) -> Result<RangeRaster> {
        let path = self.path_for(polygon, resolution);
        if path.exists() {
            match fs::read_to_string(&path).map(|t| serde_json::from_str::<RangeRaster>(&t)) {
                Ok(Ok(raster)) => {
                    debug!(path = %path.display(), "range raster cache hit");
                    return Ok(raster);
                }
                Ok(Err(e)) => warn!(
                    path = %path.display(),
                    error = %e,
                    "corrupt raster cache entry, rebuilding"
                ),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "unreadable raster cache entry, rebuilding"
                ),
            }
        }

        let raster = rasterize(polygon, resolution)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, serde_json::to_string(&raster)?)?;
        info!(path = %path.display(), "range raster cached");
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Crs;
    use crate::range::polygon::tests::rect;
    use crate::range::polygon::Part;

    fn square(x0: f64) -> RangePolygon {
        let part = Part::new(rect(x0, 45.0, x0 + 2.0, 47.0), vec![]);
        RangePolygon::new(Crs::wgs84(), vec![part]).unwrap()
    }

    #[test]
    fn key_depends_on_content_and_resolution() {
        let k = cache_key(&square(10.0), 0.5);
        assert_eq!(k, cache_key(&square(10.0), 0.5));
        assert_ne!(k, cache_key(&square(10.0), 0.25));
        assert_ne!(k, cache_key(&square(10.5), 0.5));
        assert_eq!(k.len(), 64);
    }

    #[test]
    fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RasterCache::new(dir.path().join("rasters"));
        let poly = square(10.0);

        let first = cache.get_or_rasterize(&poly, 0.5).unwrap();
        assert!(cache.path_for(&poly, 0.5).exists());
        let second = cache.get_or_rasterize(&poly, 0.5).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.cells_in_range(), 16);
    }

    #[test]
    fn corrupt_entry_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RasterCache::new(dir.path());
        let poly = square(10.0);
        fs::write(cache.path_for(&poly, 0.5), "{not json").unwrap();
        assert_eq!(cache.get_or_rasterize(&poly, 0.5).unwrap().cells_in_range(), 16);
    }
}
