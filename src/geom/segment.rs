use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::geom::point::Pt;
use crate::geom::rect::Rt;
use crate::geom::{pt, seg};

#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone, Display, Serialize, Deserialize)]
#[display(fmt = "[{} -> {}]", st, en)]
pub struct Seg {
    st: Pt,
    en: Pt,
}

impl Seg {
    pub const fn new(st: Pt, en: Pt) -> Self {
        Self { st, en }
    }

    pub fn st(&self) -> Pt {
        self.st
    }

    pub fn en(&self) -> Pt {
        self.en
    }

    pub fn dir(&self) -> Pt {
        self.en - self.st
    }

    pub fn len(&self) -> f64 {
        self.st.dist(self.en)
    }

    pub fn len2(&self) -> i128 {
        self.st.dist2(self.en)
    }

    pub fn is_zero_len(&self) -> bool {
        self.st == self.en
    }

    pub fn reversed(&self) -> Seg {
        seg(self.en, self.st)
    }

    pub fn bounds(&self) -> Rt {
        Rt::enclosing(self.st, self.en)
    }

    // Sign of the cross product (st->en) x (st->p): >0 left, <0 right.
    pub fn side_of(&self, p: Pt) -> i32 {
        let c = self.dir().cross(p - self.st);
        if c > 0 {
            1
        } else if c < 0 {
            -1
        } else {
            0
        }
    }

    pub fn contains(&self, p: Pt) -> bool {
        self.side_of(p) == 0
            && p.x >= self.st.x.min(self.en.x)
            && p.x <= self.st.x.max(self.en.x)
            && p.y >= self.st.y.min(self.en.y)
            && p.y <= self.st.y.max(self.en.y)
    }

    // Nearest point on the segment to |p|.
    pub fn project(&self, p: Pt) -> Pt {
        let d = self.dir();
        let l2 = d.mag2();
        if l2 == 0 {
            return self.st;
        }
        let t = (p - self.st).dot(d) as f64 / l2 as f64;
        let t = t.clamp(0.0, 1.0);
        pt(
            (self.st.x as f64 + d.x as f64 * t).round() as i64,
            (self.st.y as f64 + d.y as f64 * t).round() as i64,
        )
    }

    pub fn dist2_to_pt(&self, p: Pt) -> i128 {
        // The rounded projection can be off by half a unit; exact enough for
        // clearance tests at nanometre resolution.
        self.project(p).dist2(p)
    }

    pub fn dist_to_pt(&self, p: Pt) -> f64 {
        (self.dist2_to_pt(p) as f64).sqrt()
    }
}

pub fn seg_intersects_seg(a: &Seg, b: &Seg) -> bool {
    let d1 = a.side_of(b.st());
    let d2 = a.side_of(b.en());
    let d3 = b.side_of(a.st());
    let d4 = b.side_of(a.en());

    if d1 != d2 && d3 != d4 && d1 != 0 && d2 != 0 && d3 != 0 && d4 != 0 {
        return true;
    }

    (d1 == 0 && b.st() != a.st() && a.contains(b.st()))
        || (d2 == 0 && a.contains(b.en()))
        || (d3 == 0 && b.contains(a.st()))
        || (d4 == 0 && b.contains(a.en()))
        || (d1 == 0 && d2 == 0 && (a.contains(b.st()) || a.contains(b.en()) || b.contains(a.st())))
        || b.st() == a.st()
        || b.st() == a.en()
        || b.en() == a.st()
        || b.en() == a.en()
}

// Intersection of the two segments, if any. Collinear overlaps report an
// endpoint of the overlap.
pub fn seg_seg_intersection(a: &Seg, b: &Seg) -> Option<Pt> {
    let r = a.dir();
    let s = b.dir();
    let denom = r.cross(s);
    let qp = b.st() - a.st();

    if denom == 0 {
        if qp.cross(r) != 0 {
            return None; // parallel, non-collinear
        }
        for p in [b.st(), b.en()] {
            if a.contains(p) {
                return Some(p);
            }
        }
        for p in [a.st(), a.en()] {
            if b.contains(p) {
                return Some(p);
            }
        }
        return None;
    }

    let t_num = qp.cross(s);
    let u_num = qp.cross(r);
    let denf = denom as f64;
    let t = t_num as f64 / denf;
    let u = u_num as f64 / denf;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return None;
    }
    Some(pt(
        (a.st().x as f64 + r.x as f64 * t).round() as i64,
        (a.st().y as f64 + r.y as f64 * t).round() as i64,
    ))
}

// Intersection of the infinite lines through the two segments.
pub fn line_line_intersection(a: &Seg, b: &Seg) -> Option<Pt> {
    let r = a.dir();
    let s = b.dir();
    let denom = r.cross(s);
    if denom == 0 {
        return None;
    }
    let t = (b.st() - a.st()).cross(s) as f64 / denom as f64;
    Some(pt(
        (a.st().x as f64 + r.x as f64 * t).round() as i64,
        (a.st().y as f64 + r.y as f64 * t).round() as i64,
    ))
}

pub fn seg_seg_dist2(a: &Seg, b: &Seg) -> i128 {
    if seg_intersects_seg(a, b) {
        return 0;
    }
    let mut best = a.dist2_to_pt(b.st());
    best = best.min(a.dist2_to_pt(b.en()));
    best = best.min(b.dist2_to_pt(a.st()));
    best.min(b.dist2_to_pt(a.en()))
}

pub fn is_collinear(a: Pt, b: Pt, c: Pt) -> bool {
    (b - a).cross(c - a) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = seg(pt(0, 0), pt(10, 10));
        let b = seg(pt(0, 10), pt(10, 0));
        assert!(seg_intersects_seg(&a, &b));
        assert_eq!(seg_seg_intersection(&a, &b), Some(pt(5, 5)));

        let c = seg(pt(20, 0), pt(30, 0));
        assert!(!seg_intersects_seg(&a, &c));
        assert_eq!(seg_seg_intersection(&a, &c), None);
    }

    #[test]
    fn test_shared_endpoint() {
        let a = seg(pt(0, 0), pt(10, 0));
        let b = seg(pt(10, 0), pt(10, 10));
        assert!(seg_intersects_seg(&a, &b));
    }

    #[test]
    fn test_project_dist() {
        let a = seg(pt(0, 0), pt(10, 0));
        assert_eq!(a.project(pt(5, 7)), pt(5, 0));
        assert_eq!(a.dist2_to_pt(pt(5, 7)), 49);
        assert_eq!(a.project(pt(-3, 4)), pt(0, 0));
    }

    #[test]
    fn test_seg_seg_dist2() {
        let a = seg(pt(0, 0), pt(10, 0));
        let b = seg(pt(0, 5), pt(10, 5));
        assert_eq!(seg_seg_dist2(&a, &b), 25);
        let c = seg(pt(5, -5), pt(5, 5));
        assert_eq!(seg_seg_dist2(&a, &c), 0);
    }
}
