//! Occurrence cleaning stage.
//!
//! Pipeline (every check sees every record; nothing short-circuits):
//!   precision → recency → zero / equal coordinates → capital, centroid,
//!   institution and GBIF-headquarters proximity → spatial outlier.
//!
//! The outlier statistic is computed over the records that passed precision
//! and recency. Output order matches input order and coordinates are never
//! modified.

pub mod gazetteer;
pub mod outliers;
pub mod proximity;
pub mod record_filters;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coords::LatLon;
use crate::error::Result;
use crate::occurrence::{write_occurrence_csv, Occurrence, OccurrenceSet};

use gazetteer::{Gazetteer, PlaceKind};
use outliers::{flag_outliers, OutlierConfig};
use proximity::{flag_within, GBIF_HEADQUARTERS, GBIF_HEADQUARTERS_RADIUS_M};
use record_filters::{is_equal_coordinate, is_zero_coordinate, passes_precision, passes_recency};

/// One cleaning predicate. A dropped record lists every check it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Precision,
    Recency,
    Zero,
    Equal,
    Capital,
    Centroid,
    Institution,
    GbifHeadquarters,
    Outlier,
}

impl Check {
    pub fn as_str(self) -> &'static str {
        match self {
            Check::Precision => "precision",
            Check::Recency => "recency",
            Check::Zero => "zero",
            Check::Equal => "equal",
            Check::Capital => "capital",
            Check::Centroid => "centroid",
            Check::Institution => "institution",
            Check::GbifHeadquarters => "gbif_headquarters",
            Check::Outlier => "outlier",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cleaning parameters. Radii ≤ 0 disable the corresponding check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Records with uncertainty ≥ this are dropped; absent uncertainty passes.
    pub max_uncertainty_m: f64,
    /// Records must be strictly after this year.
    pub min_year: i32,
    pub capital_radius_m: f64,
    pub centroid_radius_m: f64,
    pub institution_radius_m: f64,
    pub outliers: OutlierConfig,
    pub zero: bool,
    pub equal: bool,
    pub gbif_headquarters: bool,
    /// Reference CSV; the bundled gazetteer when absent.
    pub gazetteer: Option<PathBuf>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            max_uncertainty_m: 10_000.0,
            min_year: 1970,
            capital_radius_m: 5_000.0,
            centroid_radius_m: 1_000.0,
            institution_radius_m: 100.0,
            outliers: OutlierConfig::default(),
            zero: true,
            equal: true,
            gbif_headquarters: true,
            gazetteer: None,
        }
    }
}

/// A record removed by the cleaner, with every check it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRecord {
    pub occurrence: Occurrence,
    pub reasons: Vec<Check>,
}

/// Result of the cleaning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_count: usize,
    pub kept: OccurrenceSet,
    pub dropped: Vec<DroppedRecord>,
    /// Number of records failing each check (a record can count several times).
    pub failures: BTreeMap<Check, usize>,
}

impl CleaningReport {
    pub fn failures_for(&self, check: Check) -> usize {
        self.failures.get(&check).copied().unwrap_or(0)
    }

    pub fn write_kept_csv<W: Write>(&self, writer: W) -> Result<()> {
        write_occurrence_csv(writer, self.kept.iter())
    }

    /// Dropped records with a `reasons` column (`;`-separated check names).
    pub fn write_dropped_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for d in &self.dropped {
            wtr.serialize(DroppedRow::from(d))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct DroppedRow<'a> {
    key: u64,
    latitude: f64,
    longitude: f64,
    coordinate_uncertainty_m: Option<f64>,
    year: Option<i32>,
    basis_of_record: &'static str,
    country_code: Option<&'a str>,
    reasons: String,
}

impl<'a> From<&'a DroppedRecord> for DroppedRow<'a> {
    fn from(d: &'a DroppedRecord) -> Self {
        let o = &d.occurrence;
        Self {
            key: o.key,
            latitude: o.latitude,
            longitude: o.longitude,
            coordinate_uncertainty_m: o.coordinate_uncertainty_m,
            year: o.year,
            basis_of_record: o.basis_of_record.as_str(),
            country_code: o.country_code.as_deref(),
            reasons: d.reasons.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(";"),
        }
    }
}

/// Run the cleaning stage, loading the gazetteer named in `cfg`.
pub fn clean(set: &OccurrenceSet, cfg: &CleaningConfig) -> Result<CleaningReport> {
    let gazetteer = Gazetteer::load(cfg.gazetteer.as_deref())?;
    Ok(clean_with(set, cfg, &gazetteer))
}

/// Run the cleaning stage against an already loaded gazetteer.
pub fn clean_with(
    set: &OccurrenceSet,
    cfg: &CleaningConfig,
    gazetteer: &Gazetteer,
) -> CleaningReport {
    let n = set.len();
    let points: Vec<LatLon> = set.iter().map(Occurrence::location).collect();
    let mut reasons: Vec<Vec<Check>> = vec![Vec::new(); n];

    let mut mark = |check: Check, flags: &[bool]| {
        for (r, _) in reasons.iter_mut().zip(flags).filter(|(_, f)| **f) {
            r.push(check);
        }
    };

    let precision: Vec<bool> =
        set.iter().map(|o| !passes_precision(o, cfg.max_uncertainty_m)).collect();
    let recency: Vec<bool> = set.iter().map(|o| !passes_recency(o, cfg.min_year)).collect();
    mark(Check::Precision, &precision);
    mark(Check::Recency, &recency);

    if cfg.zero {
        mark(Check::Zero, &set.iter().map(is_zero_coordinate).collect::<Vec<_>>());
    }
    if cfg.equal {
        mark(Check::Equal, &set.iter().map(is_equal_coordinate).collect::<Vec<_>>());
    }

    mark(
        Check::Capital,
        &flag_within(&points, &gazetteer.locations(PlaceKind::Capital), cfg.capital_radius_m),
    );
    mark(
        Check::Centroid,
        &flag_within(&points, &gazetteer.locations(PlaceKind::Centroid), cfg.centroid_radius_m),
    );
    let institutions = gazetteer.locations(PlaceKind::Institution);
    mark(Check::Institution, &flag_within(&points, &institutions, cfg.institution_radius_m));
    if cfg.gbif_headquarters {
        mark(
            Check::GbifHeadquarters,
            &flag_within(&points, &[GBIF_HEADQUARTERS], GBIF_HEADQUARTERS_RADIUS_M),
        );
    }

    // Outliers over the precise, recent subset, mapped back to input indices.
    let eligible: Vec<usize> = (0..n).filter(|&i| !precision[i] && !recency[i]).collect();
    let eligible_points: Vec<LatLon> = eligible.iter().map(|&i| points[i]).collect();
    let mut outlier = vec![false; n];
    for (&i, f) in eligible.iter().zip(flag_outliers(&eligible_points, &cfg.outliers)) {
        outlier[i] = f;
    }
    mark(Check::Outlier, &outlier);

    let mut failures: BTreeMap<Check, usize> = BTreeMap::new();
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (o, r) in set.iter().zip(reasons) {
        if r.is_empty() {
            kept.push(o.clone());
        } else {
            for c in &r {
                *failures.entry(*c).or_default() += 1;
            }
            dropped.push(DroppedRecord { occurrence: o.clone(), reasons: r });
        }
    }

    for (check, count) in &failures {
        debug!(check = %check, count, "records failing check");
    }
    info!(input = n, kept = kept.len(), dropped = dropped.len(), "occurrences cleaned");

    CleaningReport {
        input_count: n,
        kept: OccurrenceSet::new(set.taxon_key, kept),
        dropped,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::tests::raw;

    fn occ(key: u64, lat: f64, lon: f64) -> Occurrence {
        Occurrence::from_raw(raw(key, Some(lat), Some(lon)), 0).unwrap()
    }

    fn mixed_set() -> OccurrenceSet {
        let mut records = vec![
            occ(1, 47.0, 10.0),
            occ(2, 47.5, 11.0),
            occ(3, 48.0, 10.5),
            occ(4, 48.5, 12.0),
            occ(5, 47.2, 12.5),
            occ(6, 48.8, 10.2),
            occ(7, 47.8, 11.7),
            occ(8, 48.3, 11.2),
        ];
        let mut old = occ(9, 47.6, 10.8);
        old.year = Some(1950);
        let mut vague = occ(10, 48.1, 11.9);
        vague.coordinate_uncertainty_m = Some(50_000.0);
        records.push(old);
        records.push(vague);
        OccurrenceSet::new(5219404, records)
    }

    fn reasons_for(report: &CleaningReport, key: u64) -> Vec<Check> {
        report
            .dropped
            .iter()
            .find(|d| d.occurrence.key == key)
            .map(|d| d.reasons.clone())
            .unwrap_or_default()
    }

    #[test]
    fn drops_old_and_imprecise_records() {
        let report = clean(&mixed_set(), &CleaningConfig::default()).unwrap();
        let kept: Vec<u64> = report.kept.iter().map(|o| o.key).collect();
        assert_eq!(kept, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(reasons_for(&report, 9), vec![Check::Recency]);
        assert_eq!(reasons_for(&report, 10), vec![Check::Precision]);
        assert_eq!(report.failures_for(Check::Recency), 1);
        assert_eq!(report.failures_for(Check::Outlier), 0);
    }

    #[test]
    fn kept_records_satisfy_every_predicate() {
        let mut set = mixed_set();
        set.records.push(occ(11, 52.5201, 13.4049)); // Berlin
        set.records.push(occ(12, 0.0, 0.0));
        set.records.push(occ(13, 50.0, 50.0));
        set.records.push(occ(14, 55.7022, 12.5602)); // GBIF secretariat
        let cfg = CleaningConfig::default();
        let gaz = Gazetteer::bundled().unwrap();
        let report = clean_with(&set, &cfg, &gaz);

        assert_kept_pass_every_check(&set, &report, &cfg, &gaz);
        assert!(reasons_for(&report, 11).contains(&Check::Capital));
        assert!(reasons_for(&report, 12).contains(&Check::Zero));
        assert!(reasons_for(&report, 13).contains(&Check::Equal));
        assert!(reasons_for(&report, 14).contains(&Check::GbifHeadquarters));
        assert_eq!(report.kept.len() + report.dropped.len(), report.input_count);
    }

    fn assert_kept_pass_every_check(
        set: &OccurrenceSet,
        report: &CleaningReport,
        cfg: &CleaningConfig,
        gaz: &Gazetteer,
    ) {
        let capitals = gaz.locations(PlaceKind::Capital);
        let centroids = gaz.locations(PlaceKind::Centroid);
        let institutions = gaz.locations(PlaceKind::Institution);
        let eligible: Vec<&Occurrence> = set
            .iter()
            .filter(|o| {
                passes_precision(o, cfg.max_uncertainty_m) && passes_recency(o, cfg.min_year)
            })
            .collect();
        let points: Vec<LatLon> = eligible.iter().map(|o| o.location()).collect();
        let outlier = flag_outliers(&points, &cfg.outliers);

        for o in report.kept.iter() {
            let p = o.location();
            assert!(passes_precision(o, cfg.max_uncertainty_m));
            assert!(passes_recency(o, cfg.min_year));
            assert!(!proximity::within(p, &capitals, cfg.capital_radius_m), "key {}", o.key);
            assert!(!proximity::within(p, &centroids, cfg.centroid_radius_m), "key {}", o.key);
            assert!(
                !proximity::within(p, &institutions, cfg.institution_radius_m),
                "key {}",
                o.key
            );
            let i = eligible.iter().position(|e| e.key == o.key).unwrap();
            assert!(!outlier[i], "key {}", o.key);
        }
    }

    #[test]
    fn centroid_institution_and_outlier_records_are_dropped() {
        let mut set = mixed_set();
        set.records.push(occ(11, 51.1600, 10.4503)); // centroid of Germany
        set.records.push(occ(12, 48.1651, 11.4561)); // Zoologische Staatssammlung
        set.records.push(occ(13, 40.0, -4.0)); // central Spain
        let cfg = CleaningConfig::default();
        let gaz = Gazetteer::bundled().unwrap();
        let report = clean_with(&set, &cfg, &gaz);

        assert_kept_pass_every_check(&set, &report, &cfg, &gaz);
        assert_eq!(reasons_for(&report, 11), vec![Check::Centroid]);
        assert_eq!(reasons_for(&report, 12), vec![Check::Institution]);
        assert_eq!(reasons_for(&report, 13), vec![Check::Outlier]);
        let kept: Vec<u64> = report.kept.iter().map(|o| o.key).collect();
        assert_eq!(kept, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn capitals_outside_europe_are_flagged() {
        let set = OccurrenceSet::new(
            1,
            vec![
                occ(1, 38.9072, -77.0369), // Washington
                occ(2, -35.2809, 149.1300), // Canberra
                occ(3, 39.9042, 116.4074), // Beijing
                occ(4, -15.7942, -47.8825), // Brasilia
                occ(5, -1.2921, 36.8219),  // Nairobi
            ],
        );
        let report = clean(&set, &CleaningConfig::default()).unwrap();
        assert!(report.kept.is_empty());
        assert_eq!(report.failures_for(Check::Capital), 5);
    }

    #[test]
    fn every_failing_check_is_reported() {
        let mut o = occ(1, 48.8566, 2.3522); // Paris
        o.year = None;
        o.coordinate_uncertainty_m = Some(20_000.0);
        let set = OccurrenceSet::new(1, vec![o]);
        let report = clean(&set, &CleaningConfig::default()).unwrap();
        assert_eq!(
            report.dropped[0].reasons,
            vec![Check::Precision, Check::Recency, Check::Capital]
        );
    }

    #[test]
    fn zero_radius_disables_proximity_checks() {
        let set = OccurrenceSet::new(1, vec![occ(1, 52.52, 13.405)]);
        let cfg = CleaningConfig { capital_radius_m: 0.0, ..Default::default() };
        let report = clean(&set, &cfg).unwrap();
        assert_eq!(report.kept.len(), 1);
    }

    #[test]
    fn coordinates_are_unchanged_and_order_preserved() {
        let set = mixed_set();
        let report = clean(&set, &CleaningConfig::default()).unwrap();
        for (k, o) in report.kept.iter().zip(set.iter()) {
            assert_eq!(k, o);
        }
    }

    #[test]
    fn dropped_csv_lists_reasons() {
        let report = clean(&mixed_set(), &CleaningConfig::default()).unwrap();
        let mut buf = Vec::new();
        report.write_dropped_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("key,latitude,longitude,"));
        assert!(text.lines().any(|l| l.starts_with("9,") && l.ends_with(",recency")));
    }

    #[test]
    fn config_parses_from_toml_with_defaults() {
        let cfg: CleaningConfig = toml::from_str(
            r#"
            min_year = 1990
            [outliers]
            method = "mad"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.min_year, 1990);
        assert_eq!(cfg.max_uncertainty_m, 10_000.0);
        assert_eq!(cfg.outliers.method, outliers::OutlierMethod::Mad);
        assert_eq!(cfg.outliers.multiplier, 5.0);
    }
}
