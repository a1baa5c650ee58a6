use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use strum::Display as EnumDisplay;

use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::segment::Seg;
use crate::geom::{pt, pll};

// The eight routing directions plus undefined, counted clockwise from north.
#[derive(Debug, EnumSetType, EnumDisplay, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum Dir45 {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
    Undefined,
}

#[derive(Debug, EnumSetType, EnumDisplay, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum AngleKind {
    Straight,
    Obtuse,
    Right,
    Acute,
    HalfFull,
    Undefined,
}

pub type AngleSet = EnumSet<AngleKind>;

#[derive(
    Debug, Default, PartialEq, Eq, Copy, Clone, EnumDisplay, Serialize, Deserialize, Hash,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CornerMode {
    #[default]
    Mitered45,
    Rounded45,
    Mitered90,
    Rounded90,
}

impl CornerMode {
    pub fn is_90(&self) -> bool {
        matches!(self, CornerMode::Mitered90 | CornerMode::Rounded90)
    }

    pub fn is_diagonal(&self) -> bool {
        !self.is_90()
    }
}

impl Dir45 {
    // Nearest of the eight directions to the given vector; zero vectors are
    // undefined.
    pub fn from_vec(v: Pt) -> Dir45 {
        if v.is_zero() {
            return Dir45::Undefined;
        }
        let ang = (v.x as f64).atan2(v.y as f64).to_degrees(); // clockwise from north
        let sector = ((ang / 45.0).round() as i64).rem_euclid(8);
        Dir45::from_index(sector)
    }

    pub fn from_seg(s: &Seg) -> Dir45 {
        Dir45::from_vec(s.dir())
    }

    fn from_index(i: i64) -> Dir45 {
        match i.rem_euclid(8) {
            0 => Dir45::N,
            1 => Dir45::Ne,
            2 => Dir45::E,
            3 => Dir45::Se,
            4 => Dir45::S,
            5 => Dir45::Sw,
            6 => Dir45::W,
            _ => Dir45::Nw,
        }
    }

    fn index(&self) -> Option<i64> {
        match self {
            Dir45::N => Some(0),
            Dir45::Ne => Some(1),
            Dir45::E => Some(2),
            Dir45::Se => Some(3),
            Dir45::S => Some(4),
            Dir45::Sw => Some(5),
            Dir45::W => Some(6),
            Dir45::Nw => Some(7),
            Dir45::Undefined => None,
        }
    }

    pub fn is_diagonal(&self) -> bool {
        matches!(self, Dir45::Ne | Dir45::Se | Dir45::Sw | Dir45::Nw)
    }

    pub fn opposite(&self) -> Dir45 {
        match self.index() {
            Some(i) => Dir45::from_index(i + 4),
            None => Dir45::Undefined,
        }
    }

    // Classifies the corner formed by a segment in direction |self| followed
    // by one in direction |next|.
    pub fn angle(&self, next: Dir45) -> AngleKind {
        let (Some(a), Some(b)) = (self.index(), next.index()) else {
            return AngleKind::Undefined;
        };
        match (b - a).rem_euclid(8) {
            0 => AngleKind::Straight,
            1 | 7 => AngleKind::Obtuse,
            2 | 6 => AngleKind::Right,
            3 | 5 => AngleKind::Acute,
            _ => AngleKind::HalfFull,
        }
    }

    pub fn is_obtuse(&self, next: Dir45) -> bool {
        self.angle(next) == AngleKind::Obtuse
    }
}

// Builds the two-segment initial trace between |p0| and |p1|.
// In 45-degree modes the path is one diagonal and one axis-aligned segment;
// |diagonal_first| picks which leg leaves |p0|. In 90-degree modes it is an
// L shape and |diagonal_first| picks the vertical-first variant.
pub fn build_initial_trace(p0: Pt, p1: Pt, diagonal_first: bool, mode: CornerMode) -> Polyline {
    if p0 == p1 {
        return pll(&[p0]);
    }

    let d = p1 - p0;

    if mode.is_90() {
        let mid = if diagonal_first { pt(p0.x, p1.y) } else { pt(p1.x, p0.y) };
        if mid == p0 || mid == p1 {
            return pll(&[p0, p1]);
        }
        return pll(&[p0, mid, p1]);
    }

    let w = d.x.abs();
    let h = d.y.abs();
    let sx = d.x.signum();
    let sy = d.y.signum();

    // Already straight or exactly diagonal.
    if w == h || w == 0 || h == 0 {
        return pll(&[p0, p1]);
    }

    let dlen = w.min(h);
    let diag = pt(sx * dlen, sy * dlen);
    let mid = if diagonal_first { p0 + diag } else { p1 - diag };
    pll(&[p0, mid, p1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::seg;

    #[test]
    fn test_from_vec() {
        assert_eq!(Dir45::from_vec(pt(0, 10)), Dir45::N);
        assert_eq!(Dir45::from_vec(pt(10, 10)), Dir45::Ne);
        assert_eq!(Dir45::from_vec(pt(10, 0)), Dir45::E);
        assert_eq!(Dir45::from_vec(pt(0, -10)), Dir45::S);
        assert_eq!(Dir45::from_vec(pt(-10, 10)), Dir45::Nw);
        assert_eq!(Dir45::from_vec(Pt::zero()), Dir45::Undefined);
    }

    #[test]
    fn test_angle() {
        assert_eq!(Dir45::N.angle(Dir45::N), AngleKind::Straight);
        assert_eq!(Dir45::N.angle(Dir45::Ne), AngleKind::Obtuse);
        assert_eq!(Dir45::N.angle(Dir45::E), AngleKind::Right);
        assert_eq!(Dir45::N.angle(Dir45::Se), AngleKind::Acute);
        assert_eq!(Dir45::N.angle(Dir45::S), AngleKind::HalfFull);
        assert_eq!(Dir45::N.angle(Dir45::Undefined), AngleKind::Undefined);
    }

    #[test]
    fn test_initial_trace_45() {
        let l = build_initial_trace(pt(0, 0), pt(10, 4), true, CornerMode::Mitered45);
        assert_eq!(l.pts(), &[pt(0, 0), pt(4, 4), pt(10, 4)]);
        let l = build_initial_trace(pt(0, 0), pt(10, 4), false, CornerMode::Mitered45);
        assert_eq!(l.pts(), &[pt(0, 0), pt(6, 0), pt(10, 4)]);
        let l = build_initial_trace(pt(0, 0), pt(5, 5), true, CornerMode::Mitered45);
        assert_eq!(l.pts(), &[pt(0, 0), pt(5, 5)]);
    }

    #[test]
    fn test_initial_trace_90() {
        let l = build_initial_trace(pt(0, 0), pt(10, 4), false, CornerMode::Mitered90);
        assert_eq!(l.pts(), &[pt(0, 0), pt(10, 0), pt(10, 4)]);
        let l = build_initial_trace(pt(0, 0), pt(10, 4), true, CornerMode::Mitered90);
        assert_eq!(l.pts(), &[pt(0, 0), pt(0, 4), pt(10, 4)]);
    }

    #[test]
    fn test_direction_of_seg() {
        assert_eq!(Dir45::from_seg(&seg(pt(0, 0), pt(100, 100))), Dir45::Ne);
        assert_eq!(Dir45::Ne.opposite(), Dir45::Sw);
    }
}
