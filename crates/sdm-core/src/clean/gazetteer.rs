//! Reference points used by the proximity checks.
//!
//! CSV columns: `kind,name,iso3,longitude,latitude` where `kind` is one of
//! `capital`, `centroid` or `institution`.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::LatLon;
use crate::error::{Error, Result};

/// Bundled reference set: national capitals, country centroids and major
/// natural history collections worldwide.
const DEFAULT_GAZETTEER: &str = include_str!("../../data/gazetteer.csv");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    Capital,
    Centroid,
    Institution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub kind: PlaceKind,
    pub name: String,
    pub iso3: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Place {
    pub fn location(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gazetteer {
    places: Vec<Place>,
}

impl Gazetteer {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut places = Vec::new();
        for (i, row) in rdr.deserialize::<Place>().enumerate() {
            let place = row?;
            if !place.location().is_finite()
                || place.latitude.abs() > 90.0
                || place.longitude.abs() > 180.0
            {
                return Err(Error::Config(format!(
                    "gazetteer row {}: {:?} has an invalid location",
                    i + 1,
                    place.name
                )));
            }
            places.push(place);
        }
        Ok(Self { places })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let g = Self::from_reader(file)?;
        debug!(path = %path.display(), places = g.places.len(), "gazetteer loaded");
        Ok(g)
    }

    /// The gazetteer shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_reader(DEFAULT_GAZETTEER.as_bytes())
    }

    /// `path` when given, otherwise the bundled set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_path(p),
            None => Self::bundled(),
        }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn places(&self, kind: PlaceKind) -> impl Iterator<Item = &Place> + '_ {
        self.places.iter().filter(move |p| p.kind == kind)
    }

    pub fn locations(&self, kind: PlaceKind) -> Vec<LatLon> {
        self.places(kind).map(Place::location).collect()
    }
}
