//! Range polygon model: parts made of one exterior ring plus holes.
//!
//! Rings are stored open (the closing vertex is not repeated) as `(x, y)`
//! pairs in the polygon's CRS, x = longitude for geographic systems.

use serde::{Deserialize, Serialize};

use crate::coords::BoundingBox;
use crate::error::{Error, Result};
use crate::projection::Crs;

pub type Ring = Vec<(f64, f64)>;

/// Drop the closing vertex and consecutive duplicates; reject rings that are
/// not finite or have fewer than three distinct vertices.
pub fn normalize_ring(coords: &[(f64, f64)]) -> std::result::Result<Ring, String> {
    let mut ring: Ring = Vec::with_capacity(coords.len());
    for &(x, y) in coords {
        if !x.is_finite() || !y.is_finite() {
            return Err(format!("non-finite coordinate ({x}, {y})"));
        }
        if ring.last() != Some(&(x, y)) {
            ring.push((x, y));
        }
    }
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return Err(format!("ring has {} distinct vertices, need at least 3", ring.len()));
    }
    Ok(ring)
}

/// Shoelace signed area (positive for counter-clockwise rings).
pub fn signed_area(ring: &[(f64, f64)]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let (ox, oy) = ring[0];
    let mut acc = 0.0;
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        acc += (x0 - ox) * (y1 - oy) - (x1 - ox) * (y0 - oy);
    }
    acc * 0.5
}

/// Even–odd crossing test. Points exactly on an edge may land either side.
pub fn point_in_ring(x: f64, y: f64, ring: &[(f64, f64)]) -> bool {
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) {
            let x_cross = xi + (y - yi) / (yj - yi) * (xj - xi);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// One polygon part: an exterior ring with zero or more holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub exterior: Ring,
    #[serde(default)]
    pub holes: Vec<Ring>,
}

impl Part {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    pub fn rings(&self) -> impl Iterator<Item = &Ring> + '_ {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    pub fn bbox(&self) -> BoundingBox {
        let mut bb = BoundingBox::empty();
        for &(x, y) in &self.exterior {
            bb.include(x, y);
        }
        bb
    }

    /// Inside the exterior and outside every hole.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        point_in_ring(x, y, &self.exterior) && !self.holes.iter().any(|h| point_in_ring(x, y, h))
    }

    /// Planar area in CRS units² (exterior minus holes).
    pub fn planar_area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| signed_area(h).abs()).sum();
        signed_area(&self.exterior).abs() - holes
    }

    /// Every edge of every ring as `((x0, y0), (x1, y1))`.
    pub fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        self.rings().flat_map(|r| {
            let n = r.len();
            (0..n).map(move |i| (r[i], r[(i + 1) % n]))
        })
    }
}

/// A species range: CRS plus one or more parts. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangePolygon {
    crs: Crs,
    parts: Vec<Part>,
}

impl RangePolygon {
    pub fn new(crs: Crs, parts: Vec<Part>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::EmptyPolygon);
        }
        for (i, p) in parts.iter().enumerate() {
            for r in p.rings() {
                if r.len() < 3 || r.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
                    return Err(Error::InvalidPart { part: i, reason: "degenerate ring".into() });
                }
            }
        }
        Ok(Self { crs, parts })
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn bbox(&self) -> BoundingBox {
        self.parts.iter().fold(BoundingBox::empty(), |bb, p| bb.union(&p.bbox()))
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.parts.iter().any(|p| p.contains(x, y))
    }

    pub fn vertex_count(&self) -> usize {
        self.parts.iter().flat_map(Part::rings).map(Vec::len).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    #[test]
    fn normalize_strips_closure_and_duplicates() {
        let closed = [(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)];
        let r = normalize_ring(&closed).unwrap();
        assert_eq!(r, vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        assert!(normalize_ring(&[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]).is_err());
        assert!(normalize_ring(&[(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0)]).is_err());
    }

    #[test]
    fn area_and_orientation() {
        let ccw = rect(0.0, 0.0, 2.0, 3.0);
        assert_eq!(signed_area(&ccw), 6.0);
        let cw: Ring = ccw.iter().rev().copied().collect();
        assert_eq!(signed_area(&cw), -6.0);
    }

    #[test]
    fn degenerate_part_is_reported_by_index() {
        let good = Part::new(rect(0.0, 0.0, 1.0, 1.0), vec![]);
        let bad = Part::new(vec![(2.0, 2.0), (3.0, 2.0)], vec![]);
        match RangePolygon::new(Crs::wgs84(), vec![good, bad]) {
            Err(Error::InvalidPart { part, .. }) => assert_eq!(part, 1),
            other => panic!("expected InvalidPart, got {other:?}"),
        }
        assert!(matches!(RangePolygon::new(Crs::wgs84(), vec![]), Err(Error::EmptyPolygon)));
    }

    #[test]
    fn hole_is_excluded() {
        let part = Part::new(rect(0.0, 0.0, 4.0, 4.0), vec![rect(1.0, 1.0, 3.0, 3.0)]);
        assert!(part.contains(0.5, 0.5));
        assert!(!part.contains(2.0, 2.0));
        assert!(!part.contains(5.0, 2.0));
        assert_eq!(part.planar_area(), 12.0);
        assert_eq!(part.edges().count(), 8);
    }

    #[test]
    fn empty_polygon_is_rejected() {
        assert!(matches!(RangePolygon::new(Crs::wgs84(), vec![]), Err(Error::EmptyPolygon)));
    }

    #[test]
    fn bbox_spans_all_parts() {
        let poly = RangePolygon::new(
            Crs::wgs84(),
            vec![
                Part::new(rect(0.0, 0.0, 1.0, 1.0), vec![]),
                Part::new(rect(5.0, -2.0, 6.0, 0.5), vec![]),
            ],
        )
        .unwrap();
        assert_eq!(poly.bbox(), BoundingBox::new(0.0, -2.0, 6.0, 1.0));
        assert!(poly.contains(5.5, -1.0));
        assert_eq!(poly.vertex_count(), 8);
    }
}
