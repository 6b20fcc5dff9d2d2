//! Sutherland–Hodgman clipping of rings against an axis-aligned rectangle.
//!
//! The clip window is convex, so the clipped ring of a non-convex subject may
//! contain zero-width slivers along the window edges but its area is exact.

use super::polygon::{signed_area, Part, Ring};
use crate::coords::BoundingBox;

#[derive(Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Edge {
    fn inside(self, (x, y): (f64, f64)) -> bool {
        match self {
            Edge::Left(v) => x >= v,
            Edge::Right(v) => x <= v,
            Edge::Bottom(v) => y >= v,
            Edge::Top(v) => y <= v,
        }
    }

    fn intersect(self, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> (f64, f64) {
        match self {
            Edge::Left(v) | Edge::Right(v) => {
                let t = (v - x0) / (x1 - x0);
                (v, y0 + t * (y1 - y0))
            }
            Edge::Bottom(v) | Edge::Top(v) => {
                let t = (v - y0) / (y1 - y0);
                (x0 + t * (x1 - x0), v)
            }
        }
    }
}

fn clip_against(ring: &[(f64, f64)], edge: Edge) -> Ring {
    let mut out = Vec::with_capacity(ring.len() + 4);
    let n = ring.len();
    if n == 0 {
        return out;
    }
    let mut prev = ring[n - 1];
    let mut prev_in = edge.inside(prev);
    for &cur in ring {
        let cur_in = edge.inside(cur);
        if cur_in {
            if !prev_in {
                out.push(edge.intersect(prev, cur));
            }
            out.push(cur);
        } else if prev_in {
            out.push(edge.intersect(prev, cur));
        }
        prev = cur;
        prev_in = cur_in;
    }
    out
}

/// Portion of `ring` inside `rect`.
pub fn clip_ring(ring: &[(f64, f64)], rect: &BoundingBox) -> Ring {
    let mut out: Ring = ring.to_vec();
    for edge in [
        Edge::Left(rect.min_x),
        Edge::Right(rect.max_x),
        Edge::Bottom(rect.min_y),
        Edge::Top(rect.max_y),
    ] {
        out = clip_against(&out, edge);
        if out.len() < 3 {
            return Vec::new();
        }
    }
    out
}

/// Planar area of `part ∩ rect` (exterior overlap minus hole overlaps).
pub fn overlap_area(part: &Part, rect: &BoundingBox) -> f64 {
    let outer = signed_area(&clip_ring(&part.exterior, rect)).abs();
    if outer <= 0.0 {
        return 0.0;
    }
    let holes: f64 = part.holes.iter().map(|h| signed_area(&clip_ring(h, rect)).abs()).sum();
    (outer - holes).max(0.0)
}
