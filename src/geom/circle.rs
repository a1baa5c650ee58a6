use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::geom::point::Pt;
use crate::geom::rect::Rt;
use crate::geom::rt;

#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone, Display, Serialize, Deserialize)]
#[display(fmt = "circle({}, r {})", p, r)]
pub struct Circle {
    p: Pt,
    r: i64,
}

impl Circle {
    pub const fn new(p: Pt, r: i64) -> Self {
        Self { p, r }
    }

    pub fn p(&self) -> Pt {
        self.p
    }

    pub fn r(&self) -> i64 {
        self.r
    }

    pub fn bounds(&self) -> Rt {
        rt(self.p.x - self.r, self.p.y - self.r, self.p.x + self.r, self.p.y + self.r)
    }

    pub fn contains_pt(&self, p: Pt) -> bool {
        self.p.dist2(p) <= (self.r as i128) * (self.r as i128)
    }
}
