use std::f64::consts::FRAC_1_SQRT_2;

use itertools::Itertools;

use crate::geom::circle::Circle;
use crate::geom::convex::convex_hull;
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::rect::Rt;
use crate::geom::segment::Seg;
use crate::geom::shape::Shape;
use crate::geom::pt;
use crate::item::Item;

// Safety margin folded into virtual-via sizes and hull comparisons.
pub const HULL_MARGIN: i64 = 10;

// Chord-vs-arc error allowance folded into arc hulls.
pub const ARC_ACCURACY: i64 = 5000;

fn chamfer_for(half_width: i64) -> i64 {
    (2.0 * half_width as f64 * (1.0 - FRAC_1_SQRT_2)).round() as i64
}

// Octagon around the box [p0 .. p0 + size] grown by |clearance|, corners
// cut by |chamfer|. CCW, closed.
pub fn octagonal_hull(p0: Pt, size: Pt, clearance: i64, chamfer: i64) -> Polyline {
    let (x0, y0) = (p0.x, p0.y);
    let (x1, y1) = (p0.x + size.x, p0.y + size.y);
    let w = clearance;
    let ch = chamfer;
    Polyline::new_closed(&[
        pt(x0 - w + ch, y0 - w),
        pt(x1 + w - ch, y0 - w),
        pt(x1 + w, y0 - w + ch),
        pt(x1 + w, y1 + w - ch),
        pt(x1 + w - ch, y1 + w),
        pt(x0 - w + ch, y1 + w),
        pt(x0 - w, y1 + w - ch),
        pt(x0 - w, y0 - w + ch),
    ])
}

// Minimal octagon containing the circle grown by |clearance|: the diagonal
// faces are tangent to the grown circle.
pub fn circle_hull(c: &Circle, clearance: i64) -> Polyline {
    let d = c.r() * 2;
    let chamfer = ((2 * clearance + d) as f64 * (1.0 - FRAC_1_SQRT_2)).round() as i64;
    octagonal_hull(c.p() - pt(c.r(), c.r()), pt(d, d), clearance, chamfer)
}

// Octagonal hull of a rounded segment (stadium). The capsule is the
// Minkowski sum of the segment with the minimal octagon of its radius.
pub fn segment_hull(s: &Seg, width: i64, clearance: i64) -> Polyline {
    let hw = width / 2 + clearance;
    if s.is_zero_len() {
        return circle_hull(&Circle::new(s.st(), width / 2), clearance);
    }
    let t = (hw as f64 * (2.0f64.sqrt() - 1.0)).round() as i64;
    let len = s.len();
    let ux = s.dir().x as f64 / len;
    let uy = s.dir().y as f64 / len;
    // left normal keeps the ring CCW
    let (nx, ny) = (-uy, ux);
    let at = |base: Pt, lx: i64, ly: i64| -> Pt {
        pt(
            (base.x as f64 + lx as f64 * ux + ly as f64 * nx).round() as i64,
            (base.y as f64 + lx as f64 * uy + ly as f64 * ny).round() as i64,
        )
    };
    let (a, b) = (s.st(), s.en());
    Polyline::new_closed(&[
        at(b, hw, -t),
        at(b, hw, t),
        at(b, t, hw),
        at(a, -t, hw),
        at(a, -hw, t),
        at(a, -hw, -t),
        at(a, -t, -hw),
        at(b, t, -hw),
    ])
}

// Rectangular pad hull: grown rect with corner chamfers tangent to the
// clearance radius at the corners.
pub fn rect_hull(r: &Rt, clearance: i64) -> Polyline {
    octagonal_hull(pt(r.l(), r.b()), pt(r.w(), r.h()), clearance, chamfer_for(clearance))
}

// Offset hull of a convex polygon: Minkowski sum with the clearance
// octagon, reduced to its convex hull.
pub fn convex_poly_hull(pts: &[Pt], clearance: i64) -> Polyline {
    let hw = clearance;
    let t = (hw as f64 * (2.0f64.sqrt() - 1.0)).round() as i64;
    let offsets = [
        pt(hw, -t),
        pt(hw, t),
        pt(t, hw),
        pt(-t, hw),
        pt(-hw, t),
        pt(-hw, -t),
        pt(-t, -hw),
        pt(t, -hw),
    ];
    let cloud: Vec<_> =
        pts.iter().cartesian_product(offsets.iter()).map(|(&p, &o)| p + o).collect();
    Polyline::new_closed(&convex_hull(&cloud))
}

pub fn shape_hull(shape: &Shape, clearance: i64) -> Polyline {
    match shape {
        Shape::Rect(r) => rect_hull(r, clearance),
        Shape::Circle(c) => circle_hull(c, clearance),
        Shape::Segment(s) => segment_hull(&s.seg, s.width, clearance),
        Shape::Polygon(p) => convex_poly_hull(p, clearance),
        Shape::Compound(shapes) => {
            // Union of the per-child hulls, simplified to the convex hull.
            let mut cloud = Vec::new();
            for s in shapes {
                cloud.extend_from_slice(shape_hull(s, clearance).pts());
            }
            Polyline::new_closed(&convex_hull(&cloud))
        }
    }
}

// Hull for an item at distance clearance + walk_width/2, used both for
// collision refinement and walkaround geometry.
pub fn item_hull(item: &Item, clearance: i64, walk_width: i64, layer: i32) -> Polyline {
    let cl = clearance + walk_width / 2;
    match item {
        Item::Segment(s) => segment_hull(&s.seg, s.width, cl),
        Item::Arc(a) => {
            // Fixed-accuracy band around the arc, approximated by the
            // convex hull of its chord-and-midpoint capsule hulls.
            let cl = cl + ARC_ACCURACY;
            let mut cloud = Vec::new();
            for s in [Seg::new(a.p0, a.mid), Seg::new(a.mid, a.p1)] {
                cloud.extend_from_slice(segment_hull(&s, a.width, cl).pts());
            }
            Polyline::new_closed(&convex_hull(&cloud))
        }
        Item::Via(v) => circle_hull(&Circle::new(v.pos, v.diameter(layer) / 2), cl),
        Item::Solid(s) => shape_hull(&s.shape, cl),
        Item::Hole(h) => circle_hull(&Circle::new(h.center, h.radius), cl),
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::geom::{circ, rt, seg};

    fn is_ccw(l: &Polyline) -> bool {
        let mut area = 0i128;
        let n = l.pt_count();
        for i in 0..n {
            let a = l.pt(i);
            let b = l.pt((i + 1) % n);
            area += a.cross(b);
        }
        area > 0
    }

    #[test]
    fn test_circle_hull_contains_circle() {
        let c = circ(pt(0, 0), 300);
        let hull = circle_hull(&c, 200);
        assert!(is_ccw(&hull));
        // Sample the grown circle boundary; every sample stays in the hull.
        let mut rng = SmallRng::seed_from_u64(0);
        for _ in 0..100 {
            let ang: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let r = 499.0; // one unit inside the grown radius, rounding slack
            let p = pt((r * ang.cos()) as i64, (r * ang.sin()) as i64);
            assert!(hull.point_inside(p), "{p} not inside hull");
        }
    }

    #[test]
    fn test_segment_hull_contains_capsule() {
        let s = seg(pt(0, 0), pt(2000, 1000));
        let hull = segment_hull(&s, 200, 250);
        assert!(is_ccw(&hull));
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            let t: f64 = rng.gen_range(0.0..1.0);
            let on = pt((2000.0 * t) as i64, (1000.0 * t) as i64);
            assert!(hull.point_inside(on));
        }
    }

    #[test]
    fn test_rect_hull() {
        let hull = rect_hull(&rt(0, 0, 1500, 1000), 250);
        assert!(is_ccw(&hull));
        assert_eq!(hull.pt_count(), 8);
        assert!(hull.point_inside(pt(750, 500)));
        assert!(hull.point_inside(pt(-200, 500)));
        assert!(!hull.point_inside(pt(-300, 500)));
    }
}
