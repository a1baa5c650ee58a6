use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geom::point::Pt;
use crate::geom::rect::{rt_cloud_bounds, Rt};
use crate::geom::segment::{seg_intersects_seg, seg_seg_intersection, Seg};
use crate::geom::{pll, seg};

pub const ARC_NONE: i32 = -1;

// Chord representation of a circular arc carried inside a polyline. Arc
// geometry is kept for reconstruction; path operations treat the chord.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct ArcSpec {
    pub p0: Pt,
    pub mid: Pt,
    pub p1: Pt,
    pub cw: bool,
}

// An open or closed chain of integer points. The router's equivalent of a
// track centreline; hulls are closed chains in CCW order.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Polyline {
    pts: Vec<Pt>,
    tags: Vec<i32>, // per-point arc index into |arcs|, ARC_NONE otherwise
    arcs: Vec<ArcSpec>,
    closed: bool,
}

#[derive(Debug, Copy, Clone)]
pub struct Isect {
    pub p: Pt,
    pub index_our: usize,   // segment index in self
    pub index_their: usize, // segment index in other
}

impl fmt::Display for Polyline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pll[")?;
        for (i, p) in self.pts.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "]")
    }
}

impl Polyline {
    pub fn new(pts: &[Pt]) -> Self {
        Self { pts: pts.to_vec(), tags: vec![ARC_NONE; pts.len()], arcs: Vec::new(), closed: false }
    }

    pub fn new_closed(pts: &[Pt]) -> Self {
        let mut l = Self::new(pts);
        l.closed = true;
        l
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
    }

    pub fn pts(&self) -> &[Pt] {
        &self.pts
    }

    pub fn pt(&self, i: usize) -> Pt {
        self.pts[i]
    }

    pub fn first_pt(&self) -> Pt {
        self.pts[0]
    }

    pub fn last_pt(&self) -> Pt {
        debug_assert!(!self.pts.is_empty(), "last point of an empty chain");
        self.pts.last().copied().unwrap_or_else(Pt::zero)
    }

    pub fn pt_count(&self) -> usize {
        self.pts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pts.is_empty()
    }

    pub fn seg_count(&self) -> usize {
        match self.pts.len() {
            0 | 1 => 0,
            n if self.closed => n,
            n => n - 1,
        }
    }

    pub fn seg(&self, i: usize) -> Seg {
        let n = self.pts.len();
        seg(self.pts[i], self.pts[(i + 1) % n])
    }

    pub fn segs(&self) -> impl Iterator<Item = Seg> + '_ {
        (0..self.seg_count()).map(move |i| self.seg(i))
    }

    pub fn arcs(&self) -> &[ArcSpec] {
        &self.arcs
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn arc_tag(&self, i: usize) -> i32 {
        self.tags[i]
    }

    // True iff segment |i| is the chord of an arc.
    pub fn is_arc_seg(&self, i: usize) -> bool {
        i + 1 < self.tags.len() && self.tags[i] != ARC_NONE && self.tags[i] == self.tags[i + 1]
    }

    pub fn is_pt_on_arc(&self, i: usize) -> bool {
        self.tags.get(i).is_some_and(|&t| t != ARC_NONE)
    }

    pub fn clear(&mut self) {
        self.pts.clear();
        self.tags.clear();
        self.arcs.clear();
    }

    pub fn append(&mut self, p: Pt) {
        if self.pts.last() == Some(&p) {
            return;
        }
        self.pts.push(p);
        self.tags.push(ARC_NONE);
    }

    // Appends a point even if it duplicates the last one (used for the
    // degenerate feedback line in the placer).
    pub fn append_dup(&mut self, p: Pt) {
        self.pts.push(p);
        self.tags.push(ARC_NONE);
    }

    pub fn append_arc(&mut self, a: ArcSpec) {
        let tag = self.arcs.len() as i32;
        self.arcs.push(a);
        if self.pts.last() != Some(&a.p0) {
            self.pts.push(a.p0);
            self.tags.push(tag);
        } else if let Some(t) = self.tags.last_mut() {
            *t = tag;
        }
        self.pts.push(a.p1);
        self.tags.push(tag);
    }

    pub fn append_polyline(&mut self, o: &Polyline) {
        for (i, &p) in o.pts.iter().enumerate() {
            if o.tags[i] != ARC_NONE {
                let arc = o.arcs[o.tags[i] as usize];
                if o.tags.get(i + 1) == Some(&o.tags[i]) {
                    self.append_arc(arc);
                }
                // second endpoint of the arc was appended with it
                continue;
            }
            self.append(p);
        }
    }

    pub fn insert(&mut self, i: usize, p: Pt) {
        self.pts.insert(i, p);
        self.tags.insert(i, ARC_NONE);
    }

    pub fn remove(&mut self, i: usize) {
        self.pts.remove(i);
        self.tags.remove(i);
    }

    // Removes the trailing shape (the last segment, or the whole last arc).
    pub fn remove_last_shape(&mut self) {
        let Some(&t) = self.tags.last() else { return };
        self.pts.pop();
        self.tags.pop();
        if t != ARC_NONE {
            while self.tags.last() == Some(&t) {
                self.pts.pop();
                self.tags.pop();
            }
        }
    }

    pub fn reversed(&self) -> Polyline {
        let mut l = self.clone();
        l.pts.reverse();
        l.tags.reverse();
        for a in l.arcs.iter_mut() {
            std::mem::swap(&mut a.p0, &mut a.p1);
            a.cw = !a.cw;
        }
        l
    }

    pub fn bounds(&self) -> Rt {
        rt_cloud_bounds(self.pts.iter().map(|p| p.bounds()))
    }

    pub fn len(&self) -> i64 {
        self.segs().map(|s| s.len().round() as i64).sum()
    }

    // Length along the chain from the first point to |p| lying on segment
    // |idx|.
    pub fn path_length_to(&self, p: Pt, idx: usize) -> i64 {
        let mut total = 0;
        for i in 0..idx.min(self.seg_count()) {
            total += self.seg(i).len().round() as i64;
        }
        if idx < self.seg_count() {
            total += self.seg(idx).st().dist(p).round() as i64;
        }
        total
    }

    pub fn find(&self, p: Pt) -> Option<usize> {
        self.pts.iter().position(|&q| q == p)
    }

    pub fn point_on_edge(&self, p: Pt) -> bool {
        self.segs().any(|s| s.contains(p))
    }

    // Ensures |p| is a vertex if it lies on the chain; returns its index.
    pub fn split_at(&mut self, p: Pt) -> Option<usize> {
        if let Some(i) = self.find(p) {
            return Some(i);
        }
        for i in 0..self.seg_count() {
            if self.seg(i).contains(p) {
                self.insert(i + 1, p);
                return Some(i + 1);
            }
        }
        None
    }

    // Sub-chain from vertex |a| to vertex |b| inclusive; b = -1 means the
    // last vertex.
    pub fn slice(&self, a: usize, b: isize) -> Polyline {
        let b = if b < 0 { (self.pts.len() as isize + b) as usize } else { b as usize };
        let mut l = Polyline::default();
        for i in a..=b.min(self.pts.len() - 1) {
            if self.tags[i] != ARC_NONE {
                let t = self.tags[i];
                if self.tags.get(i + 1) == Some(&t) && i < b {
                    l.append_arc(self.arcs[t as usize]);
                    continue;
                }
            }
            l.append(self.pts[i]);
        }
        l
    }

    // Replaces vertices [a..=b] with |repl|'s points.
    pub fn replace_range(&mut self, a: usize, b: usize, repl: &Polyline) {
        let mut out = self.slice(0, a as isize);
        out.remove(out.pt_count() - 1);
        for &p in repl.pts() {
            out.append(p);
        }
        if b + 1 < self.pts.len() {
            let tail = self.slice(b + 1, -1);
            for &p in tail.pts() {
                out.append(p);
            }
        }
        *self = out;
    }

    // Removes duplicate consecutive points and merges collinear runs.
    // Arc-tagged vertices are never removed.
    pub fn simplify(&mut self) {
        // duplicates
        let mut i = 0;
        while i + 1 < self.pts.len() {
            if self.pts[i] == self.pts[i + 1] && self.tags[i + 1] == ARC_NONE {
                self.remove(i + 1);
            } else {
                i += 1;
            }
        }
        // collinear interior vertices
        let mut i = 1;
        while i + 1 < self.pts.len() {
            let (a, b, c) = (self.pts[i - 1], self.pts[i], self.pts[i + 1]);
            if self.tags[i] == ARC_NONE && (b - a).cross(c - a) == 0 && (b - a).dot(c - b) >= 0 {
                self.remove(i);
            } else {
                i += 1;
            }
        }
    }

    pub fn simplified(&self) -> Polyline {
        let mut l = self.clone();
        l.simplify();
        l
    }

    pub fn self_intersecting(&self) -> bool {
        let n = self.seg_count();
        for i in 0..n {
            for j in i + 2..n {
                if self.closed && i == 0 && j == n - 1 {
                    continue;
                }
                if seg_intersects_seg(&self.seg(i), &self.seg(j)) {
                    return true;
                }
            }
        }
        false
    }

    pub fn intersect(&self, other: &Polyline) -> Vec<Isect> {
        let mut out = Vec::new();
        for i in 0..self.seg_count() {
            for j in 0..other.seg_count() {
                if let Some(p) = seg_seg_intersection(&self.seg(i), &other.seg(j)) {
                    out.push(Isect { p, index_our: i, index_their: j });
                }
            }
        }
        out
    }

    // Point-in-polygon with boundary counting as inside. Crossing parity on
    // a closed chain.
    pub fn point_inside(&self, p: Pt) -> bool {
        if !self.closed || self.pts.len() < 3 {
            return false;
        }
        if self.point_on_edge(p) {
            return true;
        }
        let mut inside = false;
        let n = self.pts.len();
        let mut a = self.pts[n - 1];
        for &b in self.pts.iter() {
            if (a.y > p.y) != (b.y > p.y) {
                let d = (b - a).cross(p - a);
                if d == 0 {
                    return true;
                }
                if (d > 0) == (b.y > a.y) {
                    inside = !inside;
                }
            }
            a = b;
        }
        inside
    }

    pub fn point_strictly_inside(&self, p: Pt) -> bool {
        self.point_inside(p) && !self.point_on_edge(p)
    }

    pub fn nearest_pt(&self, p: Pt) -> Pt {
        let mut best = self.pts[0];
        let mut best_d = i128::MAX;
        for s in self.segs() {
            let q = s.project(p);
            let d = q.dist2(p);
            if d < best_d {
                best_d = d;
                best = q;
            }
        }
        best
    }

    pub fn dist2_to_pt(&self, p: Pt) -> i128 {
        if self.point_inside(p) {
            return 0;
        }
        self.segs().map(|s| s.dist2_to_pt(p)).min().unwrap_or(i128::MAX)
    }

    pub fn compare_geometry(&self, other: &Polyline) -> bool {
        self.simplified().pts == other.simplified().pts
    }

    // Reroutes this open chain around the closed |hull| on the requested
    // side. Returns None when an endpoint is strictly inside the hull or the
    // chain is degenerate.
    pub fn walkaround(&self, hull: &Polyline, clockwise: bool) -> Option<Polyline> {
        if self.pts.len() < 2 || hull.pts.len() < 3 {
            return None;
        }
        if hull.point_strictly_inside(self.first_pt()) || hull.point_strictly_inside(self.last_pt())
        {
            return None;
        }

        // All crossings of the path with the hull boundary, ordered along
        // the path.
        #[derive(Debug, Copy, Clone)]
        struct Ev {
            p: Pt,
            path_seg: usize,
            path_t: i64,  // distance from path segment start
            hull_edge: usize,
            hull_t: i64,  // distance from hull edge start
        }

        let mut events: Vec<Ev> = Vec::new();
        for i in 0..self.seg_count() {
            let ps = self.seg(i);
            for j in 0..hull.seg_count() {
                if let Some(p) = seg_seg_intersection(&ps, &hull.seg(j)) {
                    events.push(Ev {
                        p,
                        path_seg: i,
                        path_t: ps.st().dist(p).round() as i64,
                        hull_edge: j,
                        hull_t: hull.seg(j).st().dist(p).round() as i64,
                    });
                }
            }
        }

        if events.is_empty() {
            return Some(self.clone());
        }

        events.sort_by_key(|e| (e.path_seg, e.path_t));
        events.dedup_by_key(|e| e.p);

        // Path portion between two crossings (or from/to an endpoint).
        let portion = |a: Option<&Ev>, b: Option<&Ev>| -> Vec<Pt> {
            let mut out = Vec::new();
            let (start_v, start_p) = match a {
                Some(e) => (e.path_seg + 1, e.p),
                None => (1, self.first_pt()),
            };
            let (end_v, end_p) = match b {
                Some(e) => (e.path_seg, e.p),
                None => (self.pts.len() - 1, self.last_pt()),
            };
            out.push(start_p);
            for v in start_v..=end_v {
                out.push(self.pts[v]);
            }
            out.push(end_p);
            out.dedup();
            out
        };

        let mid_by_len = |pts: &[Pt]| -> Pt {
            let total: f64 = pts.windows(2).map(|w| w[0].dist(w[1])).sum();
            let mut acc = 0.0;
            for w in pts.windows(2) {
                let l = w[0].dist(w[1]);
                if acc + l >= total / 2.0 {
                    let t = if l == 0.0 { 0.0 } else { (total / 2.0 - acc) / l };
                    return crate::geom::pt(
                        (w[0].x as f64 + (w[1].x - w[0].x) as f64 * t).round() as i64,
                        (w[0].y as f64 + (w[1].y - w[0].y) as f64 * t).round() as i64,
                    );
                }
                acc += l;
            }
            pts[pts.len() / 2]
        };

        // Hull boundary from event |a| to event |b| on the requested side.
        let nh = hull.pts.len();
        let hull_walk = |a: &Ev, b: &Ev| -> Vec<Pt> {
            let mut out = Vec::new();
            if a.hull_edge == b.hull_edge {
                let fwd = a.hull_t <= b.hull_t;
                if fwd != clockwise {
                    out.push(b.p);
                    return out;
                }
            }
            if !clockwise {
                // follow stored (CCW) order
                let mut v = (a.hull_edge + 1) % nh;
                loop {
                    out.push(hull.pts[v]);
                    if v == b.hull_edge {
                        break;
                    }
                    v = (v + 1) % nh;
                    if out.len() > nh + 1 {
                        break;
                    }
                }
            } else {
                let mut v = a.hull_edge;
                loop {
                    out.push(hull.pts[v]);
                    if v == (b.hull_edge + 1) % nh {
                        break;
                    }
                    v = (v + nh - 1) % nh;
                    if out.len() > nh + 1 {
                        break;
                    }
                }
            }
            out.push(b.p);
            out
        };

        let mut out: Vec<Pt> = portion(None, Some(&events[0]));
        for k in 0..events.len() - 1 {
            let part = portion(Some(&events[k]), Some(&events[k + 1]));
            let inside = hull.point_strictly_inside(mid_by_len(&part));
            if inside {
                out.extend(hull_walk(&events[k], &events[k + 1]));
            } else {
                out.extend(part.into_iter().skip(1));
            }
        }
        out.extend(portion(Some(&events[events.len() - 1]), None).into_iter().skip(1));
        out.dedup();

        let mut res = pll(&out);
        res.simplify();
        if res.pt_count() < 2 {
            return None;
        }
        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::pt;

    #[test]
    fn test_simplify() {
        let mut l = pll(&[pt(0, 0), pt(5, 0), pt(10, 0), pt(10, 10), pt(10, 10)]);
        l.simplify();
        assert_eq!(l.pts(), &[pt(0, 0), pt(10, 0), pt(10, 10)]);
    }

    #[test]
    fn test_simplify_keeps_doubling_back() {
        let mut l = pll(&[pt(0, 0), pt(10, 0), pt(5, 0)]);
        l.simplify();
        assert_eq!(l.pt_count(), 3);
    }

    #[test]
    fn test_length() {
        let l = pll(&[pt(0, 0), pt(10, 0), pt(10, 10)]);
        assert_eq!(l.len(), 20);
        assert_eq!(l.path_length_to(pt(10, 5), 1), 15);
    }

    #[test]
    fn test_point_inside() {
        let sq = Polyline::new_closed(&[pt(0, 0), pt(10, 0), pt(10, 10), pt(0, 10)]);
        assert!(sq.point_inside(pt(5, 5)));
        assert!(sq.point_inside(pt(0, 5))); // boundary
        assert!(!sq.point_inside(pt(15, 5)));
        assert!(sq.point_strictly_inside(pt(5, 5)));
        assert!(!sq.point_strictly_inside(pt(0, 5)));
    }

    #[test]
    fn test_self_intersecting() {
        let l = pll(&[pt(0, 0), pt(10, 0), pt(10, 10), pt(5, -5)]);
        assert!(l.self_intersecting());
        let l = pll(&[pt(0, 0), pt(10, 0), pt(10, 10)]);
        assert!(!l.self_intersecting());
    }

    #[test]
    fn test_replace_range() {
        let mut l = pll(&[pt(0, 0), pt(10, 0), pt(20, 0), pt(30, 0)]);
        l.replace_range(1, 2, &pll(&[pt(10, 0), pt(15, 5), pt(20, 0)]));
        assert_eq!(l.pts(), &[pt(0, 0), pt(10, 0), pt(15, 5), pt(20, 0), pt(30, 0)]);
    }

    #[test]
    fn test_walkaround_square() {
        // Horizontal line through a square hull: both sides must route
        // around, keeping the endpoints.
        let path = pll(&[pt(-20, 0), pt(20, 0)]);
        let hull = Polyline::new_closed(&[pt(-5, -5), pt(5, -5), pt(5, 5), pt(-5, 5)]);

        let ccw = path.walkaround(&hull, false).unwrap();
        assert_eq!(ccw.first_pt(), pt(-20, 0));
        assert_eq!(ccw.last_pt(), pt(20, 0));
        assert!(ccw.pts().iter().all(|&p| !hull.point_strictly_inside(p)));

        let cw = path.walkaround(&hull, true).unwrap();
        assert_eq!(cw.first_pt(), pt(-20, 0));
        assert_eq!(cw.last_pt(), pt(20, 0));
        // the two sides detour on opposite sides of the hull
        let ccw_above = ccw.pts().iter().any(|p| p.y > 0);
        let cw_above = cw.pts().iter().any(|p| p.y > 0);
        assert_ne!(ccw_above, cw_above);
    }

    #[test]
    fn test_walkaround_no_hit() {
        let path = pll(&[pt(-20, 20), pt(20, 20)]);
        let hull = Polyline::new_closed(&[pt(-5, -5), pt(5, -5), pt(5, 5), pt(-5, 5)]);
        assert_eq!(path.walkaround(&hull, false).unwrap(), path);
    }

    #[test]
    fn test_walkaround_endpoint_inside() {
        let path = pll(&[pt(0, 0), pt(20, 0)]);
        let hull = Polyline::new_closed(&[pt(-5, -5), pt(5, -5), pt(5, 5), pt(-5, 5)]);
        assert!(path.walkaround(&hull, false).is_none());
    }

    #[test]
    fn test_arc_append() {
        let mut l = pll(&[pt(0, 0), pt(10, 0)]);
        l.append_arc(ArcSpec { p0: pt(10, 0), mid: pt(15, 5), p1: pt(20, 0), cw: true });
        assert_eq!(l.pt_count(), 3);
        assert!(l.is_arc_seg(1));
        assert!(!l.is_arc_seg(0));
        let r = l.reversed();
        assert!(r.is_arc_seg(0));
    }
}
