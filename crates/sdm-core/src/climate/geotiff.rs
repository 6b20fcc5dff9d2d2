//! Single-band GeoTIFF reader.
//!
//! Georeferencing comes from ModelPixelScale + ModelTiepoint (pixel-is-area),
//! the CRS from the GeoKey directory (required), and no-data from GDAL_NODATA.
//! TIFF rows run north→south; rows are reversed on load so row 0 is the southernmost.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{Error, Result};
use crate::grid::{Grid, GridSpec};
use crate::projection::Crs;

const GT_MODEL_TYPE: u16 = 1024;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// Relative tolerance for square pixels.
const SQUARE_TOL: f64 = 1e-9;

/// One decoded raster band.
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub crs: Crs,
    /// Values with no-data replaced by NaN, row 0 = south.
    pub grid: Grid<f32>,
    pub nodata: Option<f64>,
    /// True when the pixels were stored as integers.
    pub integer: bool,
}

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const EPSG_WGS84: u32 = 4326;

/// EPSG code declared by a GeoKeyDirectory (header of four u16 then key
/// entries). A geographic model without a GeographicType key is WGS84; any
/// user-defined, missing or contradictory CRS is an error message.
fn epsg_from_geokeys(keys: &[u16]) -> std::result::Result<u32, String> {
    let count = *keys.get(3).ok_or("truncated GeoKeyDirectory")? as usize;
    let entries = keys.get(4..4 + 4 * count).ok_or("truncated GeoKeyDirectory")?;
    let mut model_type = None;
    let mut geographic = None;
    let mut projected = None;
    for entry in entries.chunks_exact(4) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match id {
            GT_MODEL_TYPE => model_type = Some(value),
            GEOGRAPHIC_TYPE => geographic = Some(value),
            PROJECTED_CS_TYPE => projected = Some(value),
            _ => {}
        }
    }
    let code = |v: u16, what: &str| {
        if v == USER_DEFINED {
            Err(format!("user-defined {what} CRS is not supported"))
        } else {
            Ok(u32::from(v))
        }
    };
    match (model_type, geographic, projected) {
        (Some(MODEL_GEOGRAPHIC), _, Some(_)) => {
            Err("geographic model with a projected CRS key".into())
        }
        (Some(MODEL_GEOGRAPHIC), None, None) => Ok(EPSG_WGS84),
        (Some(MODEL_GEOGRAPHIC), Some(g), None) => code(g, "geographic"),
        (Some(MODEL_PROJECTED), _, Some(p)) => code(p, "projected"),
        (Some(MODEL_PROJECTED), _, None) => {
            Err("projected model without a ProjectedCSType key".into())
        }
        (Some(other), _, _) => Err(format!("unsupported GTModelType {other}")),
        (None, _, Some(p)) => code(p, "projected"),
        (None, Some(g), None) => code(g, "geographic"),
        (None, None, None) => Err("GeoKeyDirectory declares no CRS".into()),
    }
}

fn to_f32_with_nodata<T: Copy + Into<f64>>(values: Vec<T>, nodata: Option<f64>) -> Vec<f32> {
    values
        .into_iter()
        .map(|v| {
            let f: f64 = v.into();
            // GDAL_NODATA is decimal text; float32 samples only match it at f32 precision.
            if nodata.is_some_and(|nd| f == nd || f as f32 == nd as f32) || !f.is_finite() {
                f32::NAN
            } else {
                f as f32
            }
        })
        .collect()
}

/// Read band 1 of a GeoTIFF file.
pub fn read_geotiff(path: &Path) -> Result<RasterBand> {
    let file = fs::File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (width, height) = decoder.dimensions()?;
    let (cols, rows) = (width as usize, height as usize);

    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).map_err(|_| {
        Error::UnsupportedRaster(format!("{}: no ModelPixelScale tag", path.display()))
    })?;
    let tie = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).map_err(|_| {
        Error::UnsupportedRaster(format!("{}: no ModelTiepoint tag", path.display()))
    })?;
    let unsupported = |what: &str| Error::UnsupportedRaster(format!("{}: {what}", path.display()));
    if scale.len() < 2 || tie.len() < 6 {
        return Err(unsupported("malformed georeferencing tags"));
    }
    let (sx, sy) = (scale[0], scale[1]);
    if !(sx > 0.0 && sy > 0.0) || ((sx - sy) / sx).abs() > SQUARE_TOL {
        return Err(Error::UnsupportedRaster(format!(
            "{}: cells must be square, got {sx} x {sy}",
            path.display()
        )));
    }
    // Tie point (i, j) ↔ (x, y): upper-left corner of pixel (i, j).
    let min_x = tie[3] - tie[0] * sx;
    let max_y = tie[4] + tie[1] * sy;
    let min_y = max_y - rows as f64 * sy;

    let keys = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .map_err(|_| unsupported("no GeoKeyDirectory tag"))?;
    let code = epsg_from_geokeys(&keys).map_err(|reason| unsupported(reason.as_str()))?;
    let crs = Crs::epsg(code)?;
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

    let (raw, integer) = match decoder.read_image()? {
        DecodingResult::U8(v) => (to_f32_with_nodata(v, nodata), true),
        DecodingResult::U16(v) => (to_f32_with_nodata(v, nodata), true),
        DecodingResult::U32(v) => (to_f32_with_nodata(v, nodata), true),
        DecodingResult::I8(v) => (to_f32_with_nodata(v, nodata), true),
        DecodingResult::I16(v) => (to_f32_with_nodata(v, nodata), true),
        DecodingResult::I32(v) => (to_f32_with_nodata(v, nodata), true),
        DecodingResult::F32(v) => (to_f32_with_nodata(v, nodata), false),
        DecodingResult::F64(v) => (to_f32_with_nodata(v, nodata), false),
        _ => return Err(unsupported("unsupported sample type")),
    };
    if raw.len() != cols * rows {
        return Err(Error::UnsupportedRaster(format!(
            "{}: expected {} single-band samples, got {}",
            path.display(),
            cols * rows,
            raw.len()
        )));
    }

    // TIFF row 0 is north; grid row 0 is south.
    let mut data = Vec::with_capacity(raw.len());
    for tiff_row in (0..rows).rev() {
        data.extend_from_slice(&raw[tiff_row * cols..(tiff_row + 1) * cols]);
    }

    let spec = GridSpec { min_x, min_y, resolution: sx, cols, rows };
    debug!(
        path = %path.display(),
        cols,
        rows,
        resolution = sx,
        crs = %crs,
        ?nodata,
        integer,
        "GeoTIFF read"
    );
    Ok(RasterBand { crs, grid: Grid { spec, data }, nodata, integer })
}
