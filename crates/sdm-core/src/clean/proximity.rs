//! Distance-to-reference checks (capitals, centroids, institutions).

use crate::coords::LatLon;
use crate::sphere::haversine_m;

/// GBIF secretariat, Universitetsparken 15, Copenhagen.
pub const GBIF_HEADQUARTERS: LatLon = LatLon { lat: 55.7022, lon: 12.5602 };

/// Fixed radius around [`GBIF_HEADQUARTERS`].
pub const GBIF_HEADQUARTERS_RADIUS_M: f64 = 1_000.0;

/// True if `p` lies within `radius_m` (inclusive) of any reference point.
/// A non-positive radius disables the check.
pub fn within(p: LatLon, references: &[LatLon], radius_m: f64) -> bool {
    if radius_m <= 0.0 {
        return false;
    }
    // One degree of latitude is at least 110 km; skip obviously distant points.
    let lat_window = radius_m / 110_000.0 + 1e-6;
    references
        .iter()
        .filter(|r| (r.lat - p.lat).abs() <= lat_window)
        .any(|r| haversine_m(p, *r) <= radius_m)
}

/// Per-point flags for [`within`].
pub fn flag_within(points: &[LatLon], references: &[LatLon], radius_m: f64) -> Vec<bool> {
    points.iter().map(|&p| within(p, references, radius_m)).collect()
}
