//! GeoJSON range-map loader.
//!
//! Accepts a `FeatureCollection`, a single `Feature`, or a bare `Polygon` /
//! `MultiPolygon` geometry. Files ending in `.gz` are decompressed on the fly.
//! The CRS comes from the legacy `crs` member when present, else EPSG:4326.

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;
use tracing::{info, warn};

use super::polygon::{normalize_ring, Part, RangePolygon, Ring};
use crate::error::{Error, Result};
use crate::projection::Crs;

type Position = Vec<f64>;

#[derive(Deserialize)]
struct CrsMember {
    properties: CrsProperties,
}

#[derive(Deserialize)]
struct CrsProperties {
    name: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Document {
    FeatureCollection {
        features: Vec<Feature>,
        crs: Option<CrsMember>,
    },
    Feature {
        geometry: Option<Geometry>,
        crs: Option<CrsMember>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
        crs: Option<CrsMember>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
        crs: Option<CrsMember>,
    },
}

fn ring_from(feature: usize, coords: &[Position]) -> Result<Ring> {
    let mut pts = Vec::with_capacity(coords.len());
    for p in coords {
        if p.len() < 2 {
            let reason = format!("position with {} values", p.len());
            return Err(Error::InvalidGeometry { feature, reason });
        }
        pts.push((p[0], p[1]));
    }
    normalize_ring(&pts).map_err(|reason| Error::InvalidGeometry { feature, reason })
}

fn part_from(feature: usize, rings: &[Vec<Position>]) -> Result<Part> {
    let (exterior, holes) = rings
        .split_first()
        .ok_or_else(|| Error::InvalidGeometry { feature, reason: "polygon without rings".into() })?;
    let exterior = ring_from(feature, exterior)?;
    let holes = holes.iter().map(|h| ring_from(feature, h)).collect::<Result<Vec<_>>>()?;
    Ok(Part::new(exterior, holes))
}

fn collect_parts(feature: usize, geometry: Geometry, parts: &mut Vec<Part>) -> Result<()> {
    match geometry {
        Geometry::Polygon { coordinates } => parts.push(part_from(feature, &coordinates)?),
        Geometry::MultiPolygon { coordinates } => {
            for poly in &coordinates {
                parts.push(part_from(feature, poly)?);
            }
        }
        Geometry::Unsupported => {
            let reason = "geometry is not a Polygon or MultiPolygon".into();
            return Err(Error::InvalidGeometry { feature, reason });
        }
    }
    Ok(())
}

fn crs_of(member: Option<CrsMember>) -> Result<Crs> {
    match member {
        Some(m) => Crs::parse(&m.properties.name),
        None => Ok(Crs::wgs84()),
    }
}

/// Parse a GeoJSON document into a range polygon.
pub fn parse_geojson(text: &str) -> Result<RangePolygon> {
    let doc: Document = serde_json::from_str(text)?;
    let mut parts = Vec::new();
    let crs = match doc {
        Document::FeatureCollection { features, crs } => {
            for (i, f) in features.into_iter().enumerate() {
                match f.geometry {
                    Some(g) => collect_parts(i, g, &mut parts)?,
                    None => warn!(feature = i, "feature without geometry skipped"),
                }
            }
            crs_of(crs)?
        }
        Document::Feature { geometry, crs } => {
            if let Some(g) = geometry {
                collect_parts(0, g, &mut parts)?;
            }
            crs_of(crs)?
        }
        Document::Polygon { coordinates, crs } => {
            collect_parts(0, Geometry::Polygon { coordinates }, &mut parts)?;
            crs_of(crs)?
        }
        Document::MultiPolygon { coordinates, crs } => {
            collect_parts(0, Geometry::MultiPolygon { coordinates }, &mut parts)?;
            crs_of(crs)?
        }
    };
    RangePolygon::new(crs, parts)
}

/// Load a range map from `path` (`.geojson`, `.json`, optionally `.gz`).
pub fn load_range(path: &Path) -> Result<RangePolygon> {
    let file = fs::File::open(path)?;
    let mut text = String::new();
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz")) {
        GzDecoder::new(file).read_to_string(&mut text)?;
    } else {
        let mut file = file;
        file.read_to_string(&mut text)?;
    }
    let poly = parse_geojson(&text)?;
    info!(
        path = %path.display(),
        crs = %poly.crs(),
        parts = poly.parts().len(),
        vertices = poly.vertex_count(),
        "range polygon loaded"
    );
    Ok(poly)
}
