use crate::geom::circle::Circle;
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::segment::{seg_intersects_seg, seg_seg_dist2, Seg};
use crate::geom::shape::Shape;
use crate::geom::{pt, seg};

// Convex polygon (possibly degenerate: point or segment) swept by a circle
// of radius |r|. Every item outline reduces to one or more of these, which
// collapses the pairwise distance matrix to a single function.
#[derive(Debug, Clone)]
pub(crate) struct Rounded {
    pub pts: Vec<Pt>,
    pub r: i64,
}

fn poly_edges(pts: &[Pt]) -> Vec<Seg> {
    match pts.len() {
        0 | 1 => Vec::new(),
        2 => vec![seg(pts[0], pts[1])],
        n => (0..n).map(|i| seg(pts[i], pts[(i + 1) % n])).collect(),
    }
}

fn poly_contains(pts: &[Pt], p: Pt) -> bool {
    if pts.len() < 3 {
        return false;
    }
    Polyline::new_closed(pts).point_inside(p)
}

fn core_dist(a: &Rounded, b: &Rounded) -> f64 {
    let ea = poly_edges(&a.pts);
    let eb = poly_edges(&b.pts);

    if poly_contains(&a.pts, b.pts[0]) || poly_contains(&b.pts, a.pts[0]) {
        return 0.0;
    }

    match (ea.is_empty(), eb.is_empty()) {
        (true, true) => a.pts[0].dist(b.pts[0]),
        (true, false) => {
            let p = a.pts[0];
            (eb.iter().map(|s| s.dist2_to_pt(p)).min().unwrap_or(i128::MAX) as f64).sqrt()
        }
        (false, true) => {
            let p = b.pts[0];
            (ea.iter().map(|s| s.dist2_to_pt(p)).min().unwrap_or(i128::MAX) as f64).sqrt()
        }
        (false, false) => {
            let mut best = i128::MAX;
            for sa in &ea {
                for sb in &eb {
                    if seg_intersects_seg(sa, sb) {
                        return 0.0;
                    }
                    best = best.min(seg_seg_dist2(sa, sb));
                }
            }
            (best as f64).sqrt()
        }
    }
}

pub(crate) fn rounded_dist(a: &Rounded, b: &Rounded) -> f64 {
    (core_dist(a, b) - a.r as f64 - b.r as f64).max(0.0)
}

// Minimum translation applied to a circle (via body) of radius |radius| at
// |center| so that it clears |shape| by |clearance|. None when already
// clear.
pub fn circle_shape_mtv(center: Pt, radius: i64, shape: &Shape, clearance: i64) -> Option<Pt> {
    let needed = radius + clearance;
    let mut best: Option<(f64, Pt)> = None; // (penetration, direction)

    for r in shape.rounded() {
        let edges = poly_edges(&r.pts);
        let inside = poly_contains(&r.pts, center);
        let (q, d) = if edges.is_empty() {
            (r.pts[0], center.dist(r.pts[0]))
        } else {
            let mut q = r.pts[0];
            let mut d2 = i128::MAX;
            for s in &edges {
                let c = s.project(center);
                let cd = c.dist2(center);
                if cd < d2 {
                    d2 = cd;
                    q = c;
                }
            }
            (q, (d2 as f64).sqrt())
        };

        let (pen, dir) = if inside {
            // Centre swallowed by the solid: escape through the nearest
            // boundary point.
            (d + (needed + r.r) as f64, q - center)
        } else {
            let pen = (needed + r.r) as f64 - d;
            (pen, center - q)
        };

        if pen > 0.0 {
            let dir = if dir.is_zero() { pt(1, 0) } else { dir };
            if best.as_ref().map_or(true, |(bp, _)| pen > *bp) {
                best = Some((pen, dir));
            }
        }
    }

    best.map(|(pen, dir)| dir.resized(pen.ceil() as i64 + 1))
}

// MTV of a circle against an open chain of given width.
pub fn circle_polyline_mtv(
    center: Pt,
    radius: i64,
    chain: &Polyline,
    width: i64,
    clearance: i64,
) -> Option<Pt> {
    if chain.pt_count() == 0 {
        return None;
    }
    if chain.pt_count() == 1 {
        let s = Shape::Circle(Circle::new(chain.first_pt(), width / 2));
        return circle_shape_mtv(center, radius, &s, clearance);
    }
    let needed = (radius + width / 2 + clearance) as f64;
    let q = chain.nearest_pt(center);
    let d = q.dist(center);
    if d >= needed {
        return None;
    }
    let dir = if q == center {
        // Centre exactly on the chain; push along a segment normal.
        let s = chain
            .segs()
            .find(|s| s.contains(center))
            .unwrap_or_else(|| chain.seg(0));
        s.dir().perp()
    } else {
        center - q
    };
    Some(dir.resized((needed - d).ceil() as i64 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::pll;

    #[test]
    fn test_circle_polyline_mtv() {
        let chain = pll(&[pt(-1000, 0), pt(1000, 0)]);
        // via r 300 at (0, 100), chain width 200, clearance 200:
        // needed = 300 + 100 + 200 = 600, current dist 100 -> push by ~501.
        let mtv = circle_polyline_mtv(pt(0, 100), 300, &chain, 200, 200).unwrap();
        assert!(mtv.y >= 500);
        assert_eq!(mtv.x, 0);
        // far away: no force.
        assert!(circle_polyline_mtv(pt(0, 700), 300, &chain, 200, 200).is_none());
    }

    #[test]
    fn test_circle_shape_mtv_inside() {
        let s = Shape::Rect(crate::geom::rt(-500, -500, 500, 500));
        let mtv = circle_shape_mtv(pt(0, 400), 100, &s, 50).unwrap();
        // pushed out of the rect, towards the near (top) edge
        assert!(mtv.y > 100);
    }

    #[test]
    fn test_rounded_dist_containment() {
        let a = Rounded { pts: vec![pt(0, 0), pt(100, 0), pt(100, 100), pt(0, 100)], r: 0 };
        let b = Rounded { pts: vec![pt(50, 50)], r: 10 };
        assert_eq!(rounded_dist(&a, &b), 0.0);
    }
}
