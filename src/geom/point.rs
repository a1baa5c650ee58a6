use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::geom::pt;
use crate::geom::rect::Rt;

// Board coordinates are signed integers in nanometres. All stored geometry
// is exact; f64 shows up only in transient norms and scale factors.
#[derive(
    Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Display, Serialize, Deserialize,
)]
#[display(fmt = "({}, {})", x, y)]
pub struct Pt {
    pub x: i64,
    pub y: i64,
}

impl Pt {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    pub fn cross(&self, p: Pt) -> i128 {
        self.x as i128 * p.y as i128 - self.y as i128 * p.x as i128
    }

    pub fn dot(&self, p: Pt) -> i128 {
        self.x as i128 * p.x as i128 + self.y as i128 * p.y as i128
    }

    pub fn mag2(&self) -> i128 {
        self.dot(*self)
    }

    pub fn mag(&self) -> f64 {
        (self.mag2() as f64).sqrt()
    }

    pub fn dist(&self, b: Pt) -> f64 {
        (b - *self).mag()
    }

    pub fn dist2(&self, b: Pt) -> i128 {
        (b - *self).mag2()
    }

    // Left-hand normal. Not normalised; callers scale with |resized|.
    pub fn perp(&self) -> Pt {
        pt(-self.y, self.x)
    }

    // Scales the vector to the given length, rounding to the nearest unit.
    pub fn resized(&self, len: i64) -> Pt {
        let mag = self.mag();
        if mag == 0.0 {
            return Pt::zero();
        }
        let f = len as f64 / mag;
        pt((self.x as f64 * f).round() as i64, (self.y as f64 * f).round() as i64)
    }

    pub fn clamp(&self, r: &Rt) -> Pt {
        pt(self.x.clamp(r.l(), r.r()), self.y.clamp(r.b(), r.t()))
    }

    pub fn bounds(&self) -> Rt {
        Rt::new(self.x, self.y, self.x, self.y)
    }
}

impl_op_ex!(-|a: &Pt| -> Pt { pt(-a.x, -a.y) });

impl_op_ex!(+ |a: &Pt, b: &Pt| -> Pt { pt(a.x + b.x, a.y + b.y) });
impl_op_ex!(+= |a: &mut Pt, b: &Pt| { a.x += b.x; a.y += b.y; });
impl_op_ex!(-|a: &Pt, b: &Pt| -> Pt { pt(a.x - b.x, a.y - b.y) });
impl_op_ex!(-= |a: &mut Pt, b: &Pt| { a.x -= b.x; a.y -= b.y; });

impl_op_ex_commutative!(*|a: &Pt, b: &i64| -> Pt { pt(a.x * b, a.y * b) });
impl_op_ex!(/|a: &Pt, b: &i64| -> Pt { pt(a.x / b, a.y / b) });

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_mag_dist() {
        assert_relative_eq!(pt(3, 4).mag(), 5.0);
        assert_relative_eq!(pt(0, 0).dist(pt(30, 40)), 50.0);
        assert_eq!(pt(3, 4).mag2(), 25);
    }

    #[test]
    fn test_ops() {
        assert_eq!(pt(1, 2) + pt(3, 4), pt(4, 6));
        assert_eq!(pt(3, 4) - pt(1, 2), pt(2, 2));
        assert_eq!(pt(1, 2) * 3, pt(3, 6));
        assert_eq!(pt(2, -3).perp(), pt(3, 2));
    }

    #[test]
    fn test_resized() {
        assert_eq!(pt(10, 0).resized(5), pt(5, 0));
        assert_eq!(pt(3, 4).resized(10), pt(6, 8));
        assert_eq!(Pt::zero().resized(100), Pt::zero());
    }

    #[test]
    fn test_cross_dot() {
        assert_eq!(pt(1, 0).cross(pt(0, 1)), 1);
        assert_eq!(pt(0, 1).cross(pt(1, 0)), -1);
        assert_eq!(pt(3, 4).dot(pt(3, 4)), 25);
    }
}
