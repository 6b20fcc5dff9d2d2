//! Occurrence records and the fetch stage.
//!
//! The fetcher turns raw service rows into an [`OccurrenceSet`]. Rows without a
//! usable location are dropped here, before any later stage sees them.

pub mod gbif;
pub mod names;

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coords::LatLon;
use crate::error::Result;

/// GBIF basis-of-record vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BasisOfRecord {
    PreservedSpecimen,
    FossilSpecimen,
    LivingSpecimen,
    HumanObservation,
    MachineObservation,
    MaterialSample,
    MaterialCitation,
    Observation,
    Occurrence,
    #[serde(other)]
    Unknown,
}

impl BasisOfRecord {
    pub fn as_str(self) -> &'static str {
        match self {
            BasisOfRecord::PreservedSpecimen => "PRESERVED_SPECIMEN",
            BasisOfRecord::FossilSpecimen => "FOSSIL_SPECIMEN",
            BasisOfRecord::LivingSpecimen => "LIVING_SPECIMEN",
            BasisOfRecord::HumanObservation => "HUMAN_OBSERVATION",
            BasisOfRecord::MachineObservation => "MACHINE_OBSERVATION",
            BasisOfRecord::MaterialSample => "MATERIAL_SAMPLE",
            BasisOfRecord::MaterialCitation => "MATERIAL_CITATION",
            BasisOfRecord::Observation => "OBSERVATION",
            BasisOfRecord::Occurrence => "OCCURRENCE",
            BasisOfRecord::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for BasisOfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row as returned by the occurrence service. Coordinates may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOccurrence {
    pub key: u64,
    pub taxon_key: Option<u64>,
    pub decimal_latitude: Option<f64>,
    pub decimal_longitude: Option<f64>,
    pub coordinate_uncertainty_in_meters: Option<f64>,
    pub year: Option<i32>,
    pub basis_of_record: Option<BasisOfRecord>,
    pub country_code: Option<String>,
    /// Every other service field, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One located occurrence of a taxon (EPSG:4326).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Service-assigned record identity.
    pub key: u64,
    pub taxon_key: u64,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius in metres within which the true location lies.
    pub coordinate_uncertainty_m: Option<f64>,
    pub year: Option<i32>,
    pub basis_of_record: BasisOfRecord,
    pub country_code: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Occurrence {
    pub fn location(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }

    /// Convert a raw row; `None` when the location is missing or not a valid
    /// geographic coordinate.
    pub fn from_raw(raw: RawOccurrence, fallback_taxon: u64) -> Option<Self> {
        let lat = raw.decimal_latitude?;
        let lon = raw.decimal_longitude?;
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return None;
        }
        Some(Self {
            key: raw.key,
            taxon_key: raw.taxon_key.unwrap_or(fallback_taxon),
            latitude: lat,
            longitude: lon,
            coordinate_uncertainty_m: raw.coordinate_uncertainty_in_meters,
            year: raw.year,
            basis_of_record: raw.basis_of_record.unwrap_or(BasisOfRecord::Unknown),
            country_code: raw.country_code,
            extra: raw.extra,
        })
    }
}

/// Ordered occurrences of one taxon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceSet {
    pub taxon_key: u64,
    pub records: Vec<Occurrence>,
}

impl OccurrenceSet {
    pub fn new(taxon_key: u64, records: Vec<Occurrence>) -> Self {
        Self { taxon_key, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Occurrence> {
        self.records.iter()
    }

    /// Write the core columns as CSV (pass-through fields are omitted).
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        write_occurrence_csv(writer, self.records.iter())
    }
}

/// Flat CSV row for an occurrence.
#[derive(Serialize)]
struct OccurrenceRow<'a> {
    key: u64,
    taxon_key: u64,
    latitude: f64,
    longitude: f64,
    coordinate_uncertainty_m: Option<f64>,
    year: Option<i32>,
    basis_of_record: &'static str,
    country_code: Option<&'a str>,
}

impl<'a> From<&'a Occurrence> for OccurrenceRow<'a> {
    fn from(o: &'a Occurrence) -> Self {
        Self {
            key: o.key,
            taxon_key: o.taxon_key,
            latitude: o.latitude,
            longitude: o.longitude,
            coordinate_uncertainty_m: o.coordinate_uncertainty_m,
            year: o.year,
            basis_of_record: o.basis_of_record.as_str(),
            country_code: o.country_code.as_deref(),
        }
    }
}

pub(crate) fn write_occurrence_csv<'a, W: Write>(
    writer: W,
    records: impl Iterator<Item = &'a Occurrence>,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for o in records {
        wtr.serialize(OccurrenceRow::from(o))?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Fetch stage ──────────────────────────────────────────────────────────────

/// Parameters of one occurrence search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceQuery {
    pub taxon_key: u64,
    pub max_records: usize,
    /// Restrict to these basis-of-record categories (empty = all).
    #[serde(default)]
    pub basis_of_record: Vec<BasisOfRecord>,
    /// ISO 3166-1 alpha-2 country filter.
    #[serde(default)]
    pub country: Option<String>,
}

/// A service that returns raw occurrence rows for a query.
pub trait OccurrenceSource {
    /// Return at most `query.max_records` rows.
    fn search(&self, query: &OccurrenceQuery) -> Result<Vec<RawOccurrence>>;
}

/// Fetch stage: query the source, cap the count, drop unlocated rows.
pub fn fetch_occurrences(
    source: &dyn OccurrenceSource,
    query: &OccurrenceQuery,
) -> Result<OccurrenceSet> {
    let raw = source.search(query)?;
    let n_raw = raw.len();
    let records: Vec<Occurrence> = raw
        .into_iter()
        .take(query.max_records)
        .filter_map(|r| Occurrence::from_raw(r, query.taxon_key))
        .collect();
    let unlocated = n_raw.min(query.max_records) - records.len();
    if unlocated > 0 {
        debug!(unlocated, "dropped rows without a valid location");
    }
    info!(taxon_key = query.taxon_key, fetched = records.len(), "occurrences fetched");
    Ok(OccurrenceSet::new(query.taxon_key, records))
}
