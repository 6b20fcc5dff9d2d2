//! Coordinate reference systems and point reprojection.
//!
//! Projection mathematics is delegated to `proj4rs` (pure Rust). This module
//! only names CRSs, decides whether two inputs share one, and converts
//! between degrees and the radians `proj4rs` expects for geographic systems.

use std::fmt;

use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// PROJ definitions for the EPSG codes the pipeline knows by number.
fn epsg_definition(code: u32) -> Option<&'static str> {
    match code {
        4326 => Some("+proj=longlat +datum=WGS84 +no_defs"),
        4258 => Some("+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs"),
        // ETRS89-extended / LAEA Europe
        3035 => Some(
            "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 \
             +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        ),
        3857 => Some(
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 \
             +units=m +nadgrids=@null +no_defs",
        ),
        // WGS 84 / NSIDC EASE-Grid 2.0 Global
        6933 => Some("+proj=cea +lat_ts=30 +lon_0=0 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs"),
        // World Mollweide
        54009 => Some("+proj=moll +lon_0=0 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs"),
        _ => None,
    }
}

/// A coordinate reference system, identified by a normalised name and backed
/// by a PROJ definition string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    name: String,
    definition: String,
}

impl Crs {
    /// Geographic WGS84 longitude/latitude.
    pub fn wgs84() -> Self {
        Self::epsg(4326).unwrap_or_else(|_| Self {
            name: "EPSG:4326".into(),
            definition: "+proj=longlat +datum=WGS84 +no_defs".into(),
        })
    }

    pub fn epsg(code: u32) -> Result<Self> {
        let definition = epsg_definition(code).ok_or_else(|| {
            Error::Projection(format!("EPSG:{code} is not supported; use a PROJ string"))
        })?;
        Ok(Self { name: format!("EPSG:{code}"), definition: definition.to_string() })
    }

    /// Parse `EPSG:<code>`, an OGC URN, `CRS84`, or a raw `+proj=` string.
    pub fn parse(s: &str) -> Result<Self> {
        let t = s.trim();
        if t.starts_with("+proj=") {
            let definition = t.split_whitespace().collect::<Vec<_>>().join(" ");
            return Ok(Self { name: definition.clone(), definition });
        }
        let upper = t.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Self::epsg(4326);
        }
        let code_str = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
            .or_else(|| upper.rsplit(':').next())
            .unwrap_or(&upper);
        let code: u32 = code_str
            .parse()
            .map_err(|_| Error::Projection(format!("unrecognised CRS {s:?}")))?;
        Self::epsg(code)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// True for longitude/latitude systems (coordinates in degrees).
    pub fn is_geographic(&self) -> bool {
        self.definition.contains("+proj=longlat") || self.definition.contains("+proj=latlong")
    }

    /// Fail with [`Error::CrsMismatch`] unless both inputs share one CRS.
    pub fn ensure_same(&self, other: &Crs) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::CrsMismatch { left: self.name.clone(), right: other.name.clone() })
        }
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Crs {}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TryFrom<String> for Crs {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Crs::parse(&s)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> String {
        crs.name
    }
}

/// Reusable point transformer between two CRSs.
pub struct Transformer {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
    identity: bool,
}

impl Transformer {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self> {
        let source = Proj::from_proj_string(from.definition())
            .map_err(|e| Error::Projection(format!("invalid source CRS {from}: {e:?}")))?;
        let target = Proj::from_proj_string(to.definition())
            .map_err(|e| Error::Projection(format!("invalid target CRS {to}: {e:?}")))?;
        Ok(Self {
            source,
            target,
            source_geographic: from.is_geographic(),
            target_geographic: to.is_geographic(),
            identity: from == to,
        })
    }

    /// Transform one point. Geographic coordinates are (lon, lat) in degrees.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.identity {
            return Ok((x, y));
        }
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point)
            .map_err(|e| Error::Projection(format!("transform of ({x}, {y}) failed: {e:?}")))?;
        let out = if self.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if out.0.is_finite() && out.1.is_finite() {
            Ok(out)
        } else {
            Err(Error::Projection(format!("({x}, {y}) has no finite image")))
        }
    }
}
