//! Expert range maps: loading, rasterization and raster caching.

pub mod cache;
pub mod clip;
pub mod geojson;
pub mod polygon;
pub mod rasterize;

pub use cache::RasterCache;
pub use geojson::{load_range, parse_geojson};
pub use polygon::{Part, RangePolygon, Ring};
pub use rasterize::{rasterize, RangeRaster, DEFAULT_RESOLUTION_DEG};
