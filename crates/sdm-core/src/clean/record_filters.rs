//! Per-record predicates that look at one occurrence in isolation.

use crate::occurrence::Occurrence;

/// Degrees around (0, 0) treated as a null-island placeholder.
pub const NULL_ISLAND_RADIUS_DEG: f64 = 0.5;

/// Uncertainty absent, or strictly below `max_uncertainty_m`.
pub fn passes_precision(o: &Occurrence, max_uncertainty_m: f64) -> bool {
    match o.coordinate_uncertainty_m {
        None => true,
        Some(u) => u < max_uncertainty_m,
    }
}

/// Year present and strictly after `min_year`.
pub fn passes_recency(o: &Occurrence, min_year: i32) -> bool {
    o.year.is_some_and(|y| y > min_year)
}

/// Exact zero coordinates, or a point near the null island.
pub fn is_zero_coordinate(o: &Occurrence) -> bool {
    (o.latitude == 0.0 && o.longitude == 0.0)
        || (o.latitude.abs() < NULL_ISLAND_RADIUS_DEG && o.longitude.abs() < NULL_ISLAND_RADIUS_DEG)
}

/// Latitude copied into the longitude field (or the other way round).
pub fn is_equal_coordinate(o: &Occurrence) -> bool {
    o.latitude == o.longitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::tests::raw;

    fn occ(lat: f64, lon: f64) -> Occurrence {
        Occurrence::from_raw(raw(1, Some(lat), Some(lon)), 0).unwrap()
    }

    #[test]
    fn precision_boundary_is_exclusive() {
        let mut o = occ(48.0, 11.0);
        assert!(passes_precision(&o, 10_000.0));
        o.coordinate_uncertainty_m = Some(9_999.0);
        assert!(passes_precision(&o, 10_000.0));
        o.coordinate_uncertainty_m = Some(10_000.0);
        assert!(!passes_precision(&o, 10_000.0));
    }

    #[test]
    fn recency_requires_a_year_after_the_cutoff() {
        let mut o = occ(48.0, 11.0);
        o.year = Some(1971);
        assert!(passes_recency(&o, 1970));
        o.year = Some(1970);
        assert!(!passes_recency(&o, 1970));
        o.year = None;
        assert!(!passes_recency(&o, 1970));
    }

    #[test]
    fn zero_and_equal() {
        assert!(is_zero_coordinate(&occ(0.0, 0.0)));
        assert!(is_zero_coordinate(&occ(0.2, -0.3)));
        assert!(!is_zero_coordinate(&occ(0.0, 12.0)));
        assert!(is_equal_coordinate(&occ(45.0, 45.0)));
        assert!(!is_equal_coordinate(&occ(45.0, 45.1)));
    }
}
