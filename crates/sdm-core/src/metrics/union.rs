//! Area and centroid of the union of polygon parts by slab decomposition.
//!
//! The plane is cut into horizontal slabs at every vertex y and at every y
//! where edges of two different parts cross. Inside a slab no edges cross, so
//! sorting the spanning edges by x at mid-height and tracking per-part
//! even–odd parity yields the covered intervals as exact trapezoids.

use crate::range::polygon::Ring;

/// Area and first moments of a planar region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    pub area: f64,
    /// ∫∫ x dA
    pub mx: f64,
    /// ∫∫ y dA
    pub my: f64,
}

impl Moments {
    /// Area centroid, `None` for a region without area.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        (self.area > 0.0).then(|| (self.mx / self.area, self.my / self.area))
    }
}

struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    part: usize,
}

impl Edge {
    fn x_at(&self, y: f64) -> f64 {
        self.x0 + (y - self.y0) / (self.y1 - self.y0) * (self.x1 - self.x0)
    }

    fn y_range(&self) -> (f64, f64) {
        (self.y0.min(self.y1), self.y0.max(self.y1))
    }
}

/// y of the proper crossing of two segments, if any.
fn crossing_y(a: &Edge, b: &Edge) -> Option<f64> {
    let (dax, day) = (a.x1 - a.x0, a.y1 - a.y0);
    let (dbx, dby) = (b.x1 - b.x0, b.y1 - b.y0);
    let denom = dax * dby - day * dbx;
    if denom == 0.0 {
        return None;
    }
    let (ex, ey) = (b.x0 - a.x0, b.y0 - a.y0);
    let t = (ex * dby - ey * dbx) / denom;
    let u = (ex * day - ey * dax) / denom;
    ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then(|| a.y0 + t * day)
}

/// Moments of the trapezoid with horizontal sides at `ya` (from `la` to `ra`)
/// and `yb` (from `lb` to `rb`).
fn trapezoid(ya: f64, yb: f64, la: f64, ra: f64, lb: f64, rb: f64) -> Moments {
    let pts = [(la, ya), (ra, ya), (rb, yb), (lb, yb)];
    let (mut a2, mut sx, mut sy) = (0.0, 0.0, 0.0);
    for i in 0..4 {
        let (x0, y0) = pts[i];
        let (x1, y1) = pts[(i + 1) % 4];
        let cross = x0 * y1 - x1 * y0;
        a2 += cross;
        sx += (x0 + x1) * cross;
        sy += (y0 + y1) * cross;
    }
    Moments { area: a2 / 2.0, mx: sx / 6.0, my: sy / 6.0 }
}

/// Moments of the union of `parts`; each part is a list of rings (exterior
/// first, then holes). Ring orientation does not matter.
pub fn union_moments(parts: &[Vec<Ring>]) -> Moments {
    // Shift to a local origin to keep products small.
    let Some(&(ox, oy)) = parts.iter().flatten().flatten().next() else {
        return Moments::default();
    };

    let mut edges = Vec::new();
    let mut ys = Vec::new();
    for (p, rings) in parts.iter().enumerate() {
        for ring in rings {
            let n = ring.len();
            for i in 0..n {
                let (x0, y0) = (ring[i].0 - ox, ring[i].1 - oy);
                let (x1, y1) = (ring[(i + 1) % n].0 - ox, ring[(i + 1) % n].1 - oy);
                ys.push(y0);
                if y0 != y1 {
                    edges.push(Edge { x0, y0, x1, y1, part: p });
                }
            }
        }
    }

    if parts.len() > 1 {
        for (i, a) in edges.iter().enumerate() {
            let (a_lo, a_hi) = a.y_range();
            for b in &edges[i + 1..] {
                if a.part == b.part {
                    continue;
                }
                let (b_lo, b_hi) = b.y_range();
                if a_hi < b_lo || b_hi < a_lo {
                    continue;
                }
                if let Some(y) = crossing_y(a, b) {
                    ys.push(y);
                }
            }
        }
    }

    ys.sort_by(f64::total_cmp);
    ys.dedup();

    let mut total = Moments::default();
    let mut inside = vec![false; parts.len()];
    let mut active: Vec<(f64, &Edge)> = Vec::new();
    for w in ys.windows(2) {
        let (ya, yb) = (w[0], w[1]);
        if yb <= ya {
            continue;
        }
        let ym = 0.5 * (ya + yb);
        active.clear();
        active.extend(edges.iter().filter(|e| {
            let (lo, hi) = e.y_range();
            lo <= ya && hi >= yb
        }).map(|e| (e.x_at(ym), e)));
        active.sort_by(|a, b| a.0.total_cmp(&b.0));

        inside.iter_mut().for_each(|v| *v = false);
        let mut depth = 0usize;
        let mut left: Option<&Edge> = None;
        for &(_, e) in &active {
            let was_in = depth > 0;
            inside[e.part] = !inside[e.part];
            if inside[e.part] {
                depth += 1;
            } else {
                depth -= 1;
            }
            match (was_in, depth > 0) {
                (false, true) => left = Some(e),
                (true, false) => {
                    if let Some(l) = left.take() {
                        let t = trapezoid(ya, yb, l.x_at(ya), e.x_at(ya), l.x_at(yb), e.x_at(yb));
                        total.area += t.area;
                        total.mx += t.mx;
                        total.my += t.my;
                    }
                }
                _ => {}
            }
        }
    }

    Moments { area: total.area, mx: total.mx + ox * total.area, my: total.my + oy * total.area }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::polygon::tests::rect;
    use approx::assert_relative_eq;

    #[test]
    fn single_square() {
        let m = union_moments(&[vec![rect(2.0, 3.0, 4.0, 7.0)]]);
        assert_relative_eq!(m.area, 8.0, epsilon = 1e-12);
        let (cx, cy) = m.centroid().unwrap();
        assert_relative_eq!(cx, 3.0, epsilon = 1e-12);
        assert_relative_eq!(cy, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn overlapping_parts_count_once() {
        let m = union_moments(&[vec![rect(0.0, 0.0, 2.0, 2.0)], vec![rect(1.0, 1.0, 3.0, 3.0)]]);
        assert_relative_eq!(m.area, 7.0, epsilon = 1e-12);
        let (cx, cy) = m.centroid().unwrap();
        assert_relative_eq!(cx, 1.5, epsilon = 1e-12);
        assert_relative_eq!(cy, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn crossing_diagonals_and_orientation() {
        // Two triangles sharing their hypotenuse tile the square.
        let a: Ring = vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)];
        let b: Ring = vec![(4.0, 4.0), (4.0, 0.0), (0.0, 4.0)];
        let m = union_moments(&[vec![a.clone()], vec![b]]);
        assert_relative_eq!(m.area, 16.0, epsilon = 1e-9);

        let c: Ring = vec![(1.0, -1.0), (3.0, 3.0), (-1.0, 1.0)];
        let cw: Ring = a.iter().rev().copied().collect();
        let m = union_moments(&[vec![cw], vec![c]]);
        // Triangle A (area 8) ∪ C (area 6) minus their overlap.
        assert!(m.area > 8.0 && m.area < 14.0, "area {}", m.area);
    }

    #[test]
    fn hole_and_disjoint_parts() {
        let donut = vec![rect(0.0, 0.0, 4.0, 4.0), rect(1.0, 1.0, 3.0, 3.0)];
        let m = union_moments(&[donut]);
        assert_relative_eq!(m.area, 12.0, epsilon = 1e-12);

        let m = union_moments(&[vec![rect(0.0, 0.0, 1.0, 1.0)], vec![rect(9.0, 0.0, 10.0, 1.0)]]);
        assert_relative_eq!(m.area, 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.centroid().unwrap().0, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_input() {
        assert_eq!(union_moments(&[]).centroid(), None);
    }
}
