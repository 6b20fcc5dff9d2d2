//! Range centroid computed in an equal-area projection.
//!
//! Steps: densify geographic ring edges, project every part into the
//! equal-area CRS, take the union of the parts, compute its area centroid,
//! and transform that point back to EPSG:4326.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::union::union_moments;
use crate::coords::LatLon;
use crate::error::{Error, Result};
use crate::projection::{Crs, Transformer};
use crate::range::polygon::{RangePolygon, Ring};

/// Insert points so that no edge spans more than `step` in x or y.
pub fn densify_ring(ring: &[(f64, f64)], step: f64) -> Ring {
    let n = ring.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        out.push((x0, y0));
        if step > 0.0 {
            let span = (x1 - x0).abs().max((y1 - y0).abs());
            let pieces = (span / step).ceil() as usize;
            for k in 1..pieces {
                let t = k as f64 / pieces as f64;
                out.push((x0 + t * (x1 - x0), y0 + t * (y1 - y0)));
            }
        }
    }
    out
}

/// Equal-area centroid and the union area it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeCentroid {
    pub location: LatLon,
    /// Centroid in the equal-area CRS.
    pub projected: (f64, f64),
    pub union_area_km2: f64,
}

/// Centroid of the union of all parts, computed in `equal_area_crs`.
pub fn range_centroid(
    polygon: &RangePolygon,
    equal_area_crs: &Crs,
    densify_step_deg: f64,
) -> Result<RangeCentroid> {
    if equal_area_crs.is_geographic() {
        return Err(Error::Projection(format!(
            "{equal_area_crs} is geographic; centroids need a projected equal-area CRS"
        )));
    }
    let geographic = polygon.crs().is_geographic();
    let to_ea = Transformer::new(polygon.crs(), equal_area_crs)?;

    let mut parts: Vec<Vec<Ring>> = Vec::with_capacity(polygon.parts().len());
    for part in polygon.parts() {
        let mut rings = Vec::new();
        for ring in part.rings() {
            let dense =
                if geographic { densify_ring(ring, densify_step_deg) } else { ring.clone() };
            let projected: Ring =
                dense.iter().map(|&(x, y)| to_ea.transform(x, y)).collect::<Result<_>>()?;
            rings.push(projected);
        }
        parts.push(rings);
    }

    let moments = union_moments(&parts);
    let (cx, cy) = moments.centroid().ok_or(Error::EmptyPolygon)?;
    let back = Transformer::new(equal_area_crs, &Crs::wgs84())?;
    let (lon, lat) = back.transform(cx, cy)?;
    debug!(lat, lon, area_km2 = moments.area / 1e6, crs = %equal_area_crs, "range centroid");
    Ok(RangeCentroid {
        location: LatLon::new(lat, lon),
        projected: (cx, cy),
        union_area_km2: moments.area / 1e6,
    })
}

/// Area centroid computed directly on the polygon's own coordinates.
///
/// For geographic input this is a degree-space centroid, biased towards the
/// poles; it is kept for diagnostics and comparison only.
pub fn naive_centroid(polygon: &RangePolygon) -> Option<LatLon> {
    let parts: Vec<Vec<Ring>> =
        polygon.parts().iter().map(|p| p.rings().cloned().collect()).collect();
    union_moments(&parts).centroid().map(|(x, y)| LatLon::new(y, x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::polygon::tests::rect;
    use crate::range::polygon::Part;

    fn laea() -> Crs {
        Crs::epsg(3035).unwrap()
    }

    fn boxed(crs: Crs, x0: f64, y0: f64, x1: f64, y1: f64) -> RangePolygon {
        RangePolygon::new(crs, vec![Part::new(rect(x0, y0, x1, y1), vec![])]).unwrap()
    }

    #[test]
    fn densify_inserts_evenly() {
        let d = densify_ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.3)], 0.25);
        // 4 pieces on the first edge, 2 on the second, 4 on the closing edge.
        assert_eq!(d.len(), 4 + 2 + 4);
        assert_eq!(d[1], (0.25, 0.0));
        assert_eq!(densify_ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)], 0.0).len(), 3);
    }

    #[test]
    fn tall_range_centroid_lies_south_of_naive() {
        let p = boxed(Crs::wgs84(), 0.0, 35.0, 20.0, 70.0);
        let c = range_centroid(&p, &laea(), 0.25).unwrap();
        let naive = naive_centroid(&p).unwrap();

        let bb = p.bbox();
        assert!(bb.contains(c.location.lon, c.location.lat), "{c:?}");
        assert!((naive.lat - 52.5).abs() < 1e-9);
        assert!(naive.lat - c.location.lat > 1.0, "centroid {c:?} vs naive {naive:?}");
        assert!((c.location.lon - 10.0).abs() < 0.5, "{c:?}");
    }

    #[test]
    fn overlapping_parts_are_unioned() {
        let single = boxed(Crs::wgs84(), 5.0, 45.0, 15.0, 55.0);
        let split = RangePolygon::new(
            Crs::wgs84(),
            vec![
                Part::new(rect(5.0, 45.0, 12.0, 55.0), vec![]),
                Part::new(rect(8.0, 45.0, 15.0, 55.0), vec![]),
            ],
        )
        .unwrap();
        let a = range_centroid(&single, &laea(), 0.25).unwrap();
        let b = range_centroid(&split, &laea(), 0.25).unwrap();
        assert!((a.location.lat - b.location.lat).abs() < 1e-6);
        assert!((a.location.lon - b.location.lon).abs() < 1e-6);
        assert!((a.union_area_km2 - b.union_area_km2).abs() / a.union_area_km2 < 1e-6);
    }

    #[test]
    fn geographic_target_is_rejected() {
        let p = boxed(Crs::wgs84(), 0.0, 0.0, 1.0, 1.0);
        assert!(matches!(range_centroid(&p, &Crs::wgs84(), 0.25), Err(Error::Projection(_))));
    }

    #[test]
    fn projected_input_in_target_crs_is_used_directly() {
        let p = boxed(laea(), 4.2e6, 3.1e6, 4.4e6, 3.3e6);
        let c = range_centroid(&p, &laea(), 0.25).unwrap();
        assert!((c.projected.0 - 4.3e6).abs() < 1e-3 && (c.projected.1 - 3.2e6).abs() < 1e-3);
        assert!((c.union_area_km2 - 40_000.0).abs() < 1e-6);
    }
}
