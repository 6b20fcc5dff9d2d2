//! Spatial outlier detection over a whole occurrence set.
//!
//! Each record is summarised by its great-circle distances (km) to every other
//! record at a different location. Identical coordinates (distance 0) are
//! ignored so that clusters of duplicates do not pull the statistic to zero.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::LatLon;
use crate::sphere::haversine_km;

/// MAD → standard deviation under normality.
const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    /// Mean distance outside `[Q1 - k·IQR, Q3 + k·IQR]`.
    Quantile,
    /// Mean distance outside `median ± k·MAD`.
    Mad,
    /// Nearest other record farther than `tdi_km`.
    Distance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub enabled: bool,
    pub method: OutlierMethod,
    /// `k` for the quantile and MAD methods.
    pub multiplier: f64,
    /// Threshold for the distance method.
    pub tdi_km: f64,
    /// Below this many records the test is not run.
    pub min_records: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: OutlierMethod::Quantile,
            multiplier: 5.0,
            tdi_km: 1000.0,
            min_records: 7,
        }
    }
}

/// Quantile of sorted data by linear interpolation between order statistics
/// (Hyndman–Fan type 7). `sorted` must be non-empty.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

/// Per-record (mean, min) distance in km to all other records at a different
/// location. `NaN` when a record has no such neighbour.
fn distance_summary(points: &[LatLon]) -> Vec<(f64, f64)> {
    points
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let (mut sum, mut n, mut min) = (0.0f64, 0usize, f64::INFINITY);
            for (j, &b) in points.iter().enumerate() {
                if i == j {
                    continue;
                }
                let d = haversine_km(a, b);
                if d > 0.0 {
                    sum += d;
                    n += 1;
                    min = min.min(d);
                }
            }
            if n == 0 {
                (f64::NAN, f64::NAN)
            } else {
                (sum / n as f64, min)
            }
        })
        .collect()
}

/// Flag spatial outliers. The result has one entry per input point; all
/// `false` when the check is disabled or there are too few points.
pub fn flag_outliers(points: &[LatLon], cfg: &OutlierConfig) -> Vec<bool> {
    let mut flags = vec![false; points.len()];
    if !cfg.enabled {
        return flags;
    }
    if points.len() < cfg.min_records.max(2) {
        debug!(
            n = points.len(),
            min_records = cfg.min_records,
            "too few records for the outlier test"
        );
        return flags;
    }

    let summary = distance_summary(points);
    let means: Vec<f64> = summary.iter().map(|s| s.0).collect();
    let k = cfg.multiplier;

    match cfg.method {
        OutlierMethod::Quantile => {
            let sorted = sorted_finite(&means);
            if sorted.is_empty() {
                return flags;
            }
            let q1 = quantile_sorted(&sorted, 0.25);
            let q3 = quantile_sorted(&sorted, 0.75);
            let iqr = q3 - q1;
            let (lo, hi) = (q1 - k * iqr, q3 + k * iqr);
            debug!(q1, q3, lo, hi, "outlier quantile bounds (km)");
            for (f, &m) in flags.iter_mut().zip(&means) {
                *f = m.is_finite() && (m < lo || m > hi);
            }
        }
        OutlierMethod::Mad => {
            let sorted = sorted_finite(&means);
            if sorted.is_empty() {
                return flags;
            }
            let med = quantile_sorted(&sorted, 0.5);
            let abs_dev: Vec<f64> = sorted.iter().map(|m| (m - med).abs()).collect();
            let deviations = sorted_finite(&abs_dev);
            let mad = MAD_SCALE * quantile_sorted(&deviations, 0.5);
            debug!(median = med, mad, "outlier MAD bounds (km)");
            for (f, &m) in flags.iter_mut().zip(&means) {
                *f = m.is_finite() && (m - med).abs() > k * mad;
            }
        }
        OutlierMethod::Distance => {
            for (f, s) in flags.iter_mut().zip(&summary) {
                *f = s.1.is_finite() && s.1 > cfg.tdi_km;
            }
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cluster() -> Vec<LatLon> {
        [
            (47.0, 10.0),
            (47.5, 11.0),
            (48.0, 10.5),
            (48.5, 12.0),
            (47.2, 12.5),
            (48.8, 10.2),
            (47.8, 11.7),
            (48.3, 11.2),
        ]
        .iter()
        .map(|&(lat, lon)| LatLon::new(lat, lon))
        .collect()
    }

    fn with_far_point() -> Vec<LatLon> {
        let mut pts = cluster();
        pts.push(LatLon::new(64.0, -19.0));
        pts
    }

    #[test]
    fn type7_quantiles() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile_sorted(&v, 0.25), 1.75);
        assert_relative_eq!(quantile_sorted(&v, 0.5), 2.5);
        assert_relative_eq!(quantile_sorted(&v, 0.75), 3.25);
        assert_relative_eq!(quantile_sorted(&[7.0], 0.9), 7.0);
    }

    #[test]
    fn compact_cluster_has_no_outliers() {
        for method in [OutlierMethod::Quantile, OutlierMethod::Mad, OutlierMethod::Distance] {
            let cfg = OutlierConfig { method, ..Default::default() };
            assert!(flag_outliers(&cluster(), &cfg).iter().all(|f| !f), "{method:?}");
        }
    }

    #[test]
    fn distant_point_is_flagged_by_every_method() {
        for method in [OutlierMethod::Quantile, OutlierMethod::Mad, OutlierMethod::Distance] {
            let cfg = OutlierConfig { method, ..Default::default() };
            let flags = flag_outliers(&with_far_point(), &cfg);
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{method:?}");
            assert!(flags[8], "{method:?}");
        }
    }

    #[test]
    fn skipped_below_min_records_or_when_disabled() {
        let pts: Vec<LatLon> = with_far_point().into_iter().skip(3).collect();
        assert_eq!(pts.len(), 6);
        assert!(flag_outliers(&pts, &OutlierConfig::default()).iter().all(|f| !f));

        let cfg = OutlierConfig { enabled: false, ..Default::default() };
        assert!(flag_outliers(&with_far_point(), &cfg).iter().all(|f| !f));
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut pts = cluster();
        pts.push(pts[0]);
        pts.push(pts[0]);
        assert!(flag_outliers(&pts, &OutlierConfig::default()).iter().all(|f| !f));

        let same = vec![LatLon::new(50.0, 10.0); 10];
        assert!(flag_outliers(&same, &OutlierConfig::default()).iter().all(|f| !f));
    }
}
