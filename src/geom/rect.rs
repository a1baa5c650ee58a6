use auto_ops::impl_op_ex;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::geom::point::Pt;
use crate::geom::{pt, rt};

// Axis-aligned bounding rectangle, stored as (l, b, r, t) with y up.
// An empty rect is the identity for united().
#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone, Display, Serialize, Deserialize)]
#[display(fmt = "[{}, {} -> {}, {}]", l, b, r, t)]
pub struct Rt {
    l: i64,
    b: i64,
    r: i64,
    t: i64,
    empty: bool,
}

impl Rt {
    pub const fn new(l: i64, b: i64, r: i64, t: i64) -> Self {
        Self { l, b, r, t, empty: false }
    }

    pub const fn empty() -> Self {
        Self { l: 0, b: 0, r: 0, t: 0, empty: true }
    }

    pub fn enclosing(a: Pt, b: Pt) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn l(&self) -> i64 {
        self.l
    }

    pub fn b(&self) -> i64 {
        self.b
    }

    pub fn r(&self) -> i64 {
        self.r
    }

    pub fn t(&self) -> i64 {
        self.t
    }

    pub fn w(&self) -> i64 {
        self.r - self.l
    }

    pub fn h(&self) -> i64 {
        self.t - self.b
    }

    pub fn center(&self) -> Pt {
        pt((self.l + self.r) / 2, (self.b + self.t) / 2)
    }

    pub fn pts(&self) -> [Pt; 4] {
        [pt(self.l, self.b), pt(self.r, self.b), pt(self.r, self.t), pt(self.l, self.t)]
    }

    pub fn united(&self, o: &Rt) -> Rt {
        if self.empty {
            *o
        } else if o.empty {
            *self
        } else {
            rt(self.l.min(o.l), self.b.min(o.b), self.r.max(o.r), self.t.max(o.t))
        }
    }

    pub fn inflated(&self, d: i64) -> Rt {
        if self.empty {
            *self
        } else {
            rt(self.l - d, self.b - d, self.r + d, self.t + d)
        }
    }

    pub fn contains(&self, p: Pt) -> bool {
        !self.empty && p.x >= self.l && p.x <= self.r && p.y >= self.b && p.y <= self.t
    }

    pub fn contains_rt(&self, o: &Rt) -> bool {
        !self.empty && !o.empty && o.l >= self.l && o.r <= self.r && o.b >= self.b && o.t <= self.t
    }

    pub fn intersects(&self, o: &Rt) -> bool {
        !self.empty && !o.empty && self.l <= o.r && o.l <= self.r && self.b <= o.t && o.b <= self.t
    }

    pub fn dist2(&self, o: &Rt) -> i128 {
        if self.intersects(o) {
            return 0;
        }
        let dx = (self.l - o.r).max(o.l - self.r).max(0) as i128;
        let dy = (self.b - o.t).max(o.b - self.t).max(0) as i128;
        dx * dx + dy * dy
    }

    pub fn bl_quadrant(&self) -> Rt {
        let c = self.center();
        rt(self.l, self.b, c.x, c.y)
    }

    pub fn br_quadrant(&self) -> Rt {
        let c = self.center();
        rt(c.x, self.b, self.r, c.y)
    }

    pub fn tl_quadrant(&self) -> Rt {
        let c = self.center();
        rt(self.l, c.y, c.x, self.t)
    }

    pub fn tr_quadrant(&self) -> Rt {
        let c = self.center();
        rt(c.x, c.y, self.r, self.t)
    }
}

impl_op_ex!(+ |a: &Rt, b: &Pt| -> Rt {
    if a.is_empty() { *a } else { Rt::new(a.l() + b.x, a.b() + b.y, a.r() + b.x, a.t() + b.y) }
});

// Bounds of a cloud of rects.
pub fn rt_cloud_bounds(iter: impl Iterator<Item = Rt>) -> Rt {
    let mut bounds = Rt::empty();
    for r in iter {
        bounds = bounds.united(&r);
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_united() {
        let a = rt(0, 0, 10, 10);
        let b = rt(5, 5, 20, 20);
        assert_eq!(a.united(&b), rt(0, 0, 20, 20));
        assert_eq!(Rt::empty().united(&a), a);
        assert_eq!(a.united(&Rt::empty()), a);
    }

    #[test]
    fn test_quadrants() {
        let r = rt(0, 0, 10, 10);
        assert_eq!(r.bl_quadrant(), rt(0, 0, 5, 5));
        assert_eq!(r.tr_quadrant(), rt(5, 5, 10, 10));
    }

    #[test]
    fn test_dist2() {
        assert_eq!(rt(0, 0, 10, 10).dist2(&rt(5, 5, 20, 20)), 0);
        assert_eq!(rt(0, 0, 10, 10).dist2(&rt(13, 14, 20, 20)), 9 + 16);
    }
}
