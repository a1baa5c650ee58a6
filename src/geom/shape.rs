use serde::{Deserialize, Serialize};

use crate::geom::circle::Circle;
use crate::geom::dist::{rounded_dist, Rounded};
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::rect::{rt_cloud_bounds, Rt};
use crate::geom::segment::Seg;
use crate::geom::seg;

// A rounded track segment: the stadium swept by a circle of diameter
// |width| along |seg|.
#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct SegShape {
    pub seg: Seg,
    pub width: i64,
}

// Physical outline of an item on one layer. Polygons are convex and stored
// in CCW order; anything concave reaches the router as a Compound of convex
// parts.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Shape {
    Rect(Rt),
    Circle(Circle),
    Segment(SegShape),
    Polygon(Vec<Pt>),
    Compound(Vec<Shape>),
}

impl Shape {
    pub fn bounds(&self) -> Rt {
        match self {
            Shape::Rect(r) => *r,
            Shape::Circle(c) => c.bounds(),
            Shape::Segment(s) => s.seg.bounds().inflated(s.width / 2),
            Shape::Polygon(p) => rt_cloud_bounds(p.iter().map(|v| v.bounds())),
            Shape::Compound(shapes) => rt_cloud_bounds(shapes.iter().map(Shape::bounds)),
        }
    }

    pub fn center(&self) -> Pt {
        self.bounds().center()
    }

    pub fn translated(&self, d: Pt) -> Shape {
        match self {
            Shape::Rect(r) => Shape::Rect(*r + d),
            Shape::Circle(c) => Shape::Circle(Circle::new(c.p() + d, c.r())),
            Shape::Segment(s) => {
                Shape::Segment(SegShape { seg: seg(s.seg.st() + d, s.seg.en() + d), width: s.width })
            }
            Shape::Polygon(p) => Shape::Polygon(p.iter().map(|&v| v + d).collect()),
            Shape::Compound(shapes) => {
                Shape::Compound(shapes.iter().map(|s| s.translated(d)).collect())
            }
        }
    }

    pub(crate) fn rounded(&self) -> Vec<Rounded> {
        match self {
            Shape::Rect(r) => vec![Rounded { pts: r.pts().to_vec(), r: 0 }],
            Shape::Circle(c) => vec![Rounded { pts: vec![c.p()], r: c.r() }],
            Shape::Segment(s) => {
                vec![Rounded { pts: vec![s.seg.st(), s.seg.en()], r: s.width / 2 }]
            }
            Shape::Polygon(p) => vec![Rounded { pts: p.clone(), r: 0 }],
            Shape::Compound(shapes) => shapes.iter().flat_map(Shape::rounded).collect(),
        }
    }

    // Minimum distance between outlines; 0 on intersection or containment.
    pub fn dist(&self, o: &Shape) -> f64 {
        let mut best = f64::MAX;
        for a in self.rounded() {
            for b in o.rounded() {
                best = best.min(rounded_dist(&a, &b));
                if best == 0.0 {
                    return 0.0;
                }
            }
        }
        best
    }

    pub fn collides(&self, o: &Shape, clearance: i64) -> bool {
        if !self.bounds().inflated(clearance).intersects(&o.bounds()) {
            return false;
        }
        self.dist(o) < clearance as f64
    }

    pub fn contains_pt(&self, p: Pt) -> bool {
        match self {
            Shape::Rect(r) => r.contains(p),
            Shape::Circle(c) => c.contains_pt(p),
            Shape::Segment(s) => {
                s.seg.dist2_to_pt(p) <= (s.width as i128 / 2) * (s.width as i128 / 2)
            }
            Shape::Polygon(pts) => Polyline::new_closed(pts).point_inside(p),
            Shape::Compound(shapes) => shapes.iter().any(|s| s.contains_pt(p)),
        }
    }

    // Outline as a closed polyline; circles degrade to their bounds (hull
    // construction never goes through here for circles).
    pub fn outline(&self) -> Polyline {
        match self {
            Shape::Rect(r) => Polyline::new_closed(&r.pts()),
            Shape::Circle(c) => Polyline::new_closed(&c.bounds().pts()),
            Shape::Segment(s) => {
                Polyline::new_closed(&s.seg.bounds().inflated(s.width / 2).pts())
            }
            Shape::Polygon(p) => Polyline::new_closed(p),
            Shape::Compound(shapes) => shapes[0].outline(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geom::{circ, pt, rt};

    #[test]
    fn test_dist_circle_circle() {
        let a = Shape::Circle(circ(pt(0, 0), 100));
        let b = Shape::Circle(circ(pt(300, 0), 100));
        assert_relative_eq!(a.dist(&b), 100.0);
        assert!(a.collides(&b, 150));
        assert!(!a.collides(&b, 100));
    }

    #[test]
    fn test_dist_rect_segment() {
        let a = Shape::Rect(rt(0, 0, 100, 100));
        let b = Shape::Segment(SegShape { seg: seg(pt(200, 0), pt(200, 100)), width: 50 });
        assert_relative_eq!(a.dist(&b), 75.0);
    }

    #[test]
    fn test_contains() {
        let a = Shape::Segment(SegShape { seg: seg(pt(0, 0), pt(100, 0)), width: 40 });
        assert!(a.contains_pt(pt(50, 10)));
        assert!(!a.contains_pt(pt(50, 30)));
    }
}
