use serde::{Deserialize, Serialize};

use crate::geom::direction::{AngleSet, Dir45};
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::rect::Rt;
use crate::geom::shape::{SegShape, Shape};
use crate::geom::segment::Seg;
use crate::item::{ItemId, NetHandle, Via};

// A line is a transient aggregate: an ordered polyline over the linked
// segment/arc primitives that materialise it in a node, plus an optional
// via at its end. It is never stored in the spatial index.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Line {
    line: Polyline,
    width: i64,
    layer: i32,
    net: NetHandle,
    links: Vec<ItemId>,
    via: Option<Via>,
    rank: i64,
}

impl Line {
    pub fn new(line: Polyline, width: i64, layer: i32, net: NetHandle) -> Self {
        Self { line, width, layer, net, links: Vec::new(), via: None, rank: -1 }
    }

    pub fn line(&self) -> &Polyline {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut Polyline {
        &mut self.line
    }

    pub fn set_shape(&mut self, line: Polyline) {
        self.line = line;
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn set_width(&mut self, width: i64) {
        self.width = width;
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn set_layer(&mut self, layer: i32) {
        self.layer = layer;
    }

    pub fn net(&self) -> NetHandle {
        self.net
    }

    pub fn set_net(&mut self, net: NetHandle) {
        self.net = net;
    }

    pub fn rank(&self) -> i64 {
        if self.rank >= 0 {
            self.rank
        } else {
            self.via.as_ref().map_or(-1, |v| v.rank)
        }
    }

    pub fn set_rank(&mut self, rank: i64) {
        self.rank = rank;
        if let Some(v) = self.via.as_mut() {
            v.rank = rank;
        }
    }

    pub fn links(&self) -> &[ItemId] {
        &self.links
    }

    pub fn link(&mut self, id: ItemId) {
        self.links.push(id);
    }

    pub fn contains_link(&self, id: ItemId) -> bool {
        self.links.contains(&id)
    }

    pub fn is_linked(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn clear_links(&mut self) {
        self.links.clear();
    }

    pub fn ends_with_via(&self) -> bool {
        self.via.is_some()
    }

    pub fn via(&self) -> Option<&Via> {
        self.via.as_ref()
    }

    pub fn via_mut(&mut self) -> Option<&mut Via> {
        self.via.as_mut()
    }

    pub fn append_via(&mut self, via: Via) {
        self.via = Some(via);
    }

    pub fn remove_via(&mut self) -> Option<Via> {
        self.via.take()
    }

    pub fn pt_count(&self) -> usize {
        self.line.pt_count()
    }

    pub fn seg_count(&self) -> usize {
        self.line.seg_count()
    }

    pub fn pt(&self, i: usize) -> Pt {
        self.line.pt(i)
    }

    pub fn first_pt(&self) -> Pt {
        self.line.first_pt()
    }

    pub fn last_pt(&self) -> Pt {
        self.line.last_pt()
    }

    pub fn seg(&self, i: usize) -> Seg {
        self.line.seg(i)
    }

    pub fn seg_shape(&self, i: usize) -> Shape {
        Shape::Segment(SegShape { seg: self.line.seg(i), width: self.width })
    }

    pub fn bounds(&self) -> Rt {
        let mut b = self.line.bounds().inflated(self.width / 2);
        if let Some(v) = &self.via {
            b = b.united(&v.shape(self.layer).bounds());
        }
        b
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.links.clear();
        self.via = None;
    }

    pub fn reversed(&self) -> Line {
        let mut l = self.clone();
        l.line = self.line.reversed();
        l
    }

    pub fn reverse(&mut self) {
        self.line = self.line.reversed();
    }

    // Count of corners whose angle kind is in |mask|.
    pub fn count_corners(&self, mask: AngleSet) -> usize {
        let mut count = 0;
        for i in 0..self.seg_count().saturating_sub(1) {
            let a = Dir45::from_seg(&self.seg(i));
            let b = Dir45::from_seg(&self.seg(i + 1));
            if mask.contains(a.angle(b)) {
                count += 1;
            }
        }
        count
    }

    pub fn has_loops(&self) -> bool {
        self.line.self_intersecting()
    }

    // Drags the corner at vertex |index| to |target|, keeping 45-degree
    // geometry on the two adjacent segments where possible.
    pub fn drag_corner(&mut self, target: Pt, index: usize) {
        let n = self.line.pt_count();
        if n == 0 {
            return;
        }
        let index = index.min(n - 1);
        let mut pts = self.line.pts().to_vec();
        pts[index] = target;
        self.line = Polyline::new(&pts);
        self.line.simplify();
    }

    // True when the line collides with |other| at the given clearance,
    // testing every segment and the trailing via.
    pub fn collides_with_line(&self, other: &Line, clearance: i64) -> bool {
        if self.layer != other.layer && self.via.is_none() && other.via.is_none() {
            return false;
        }
        for i in 0..self.seg_count() {
            for j in 0..other.seg_count() {
                if self.layer == other.layer
                    && self.seg_shape(i).collides(&other.seg_shape(j), clearance)
                {
                    return true;
                }
            }
        }
        if let Some(v) = &self.via {
            for j in 0..other.seg_count() {
                if v.layers.contains(other.layer)
                    && v.shape(other.layer).collides(&other.seg_shape(j), clearance)
                {
                    return true;
                }
            }
        }
        if let Some(v) = &other.via {
            for i in 0..self.seg_count() {
                if v.layers.contains(self.layer)
                    && v.shape(self.layer).collides(&self.seg_shape(i), clearance)
                {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::direction::AngleKind;
    use crate::geom::{pll, pt};

    fn mkline(pts: &[Pt]) -> Line {
        Line::new(pll(pts), 200, 0, NetHandle(1))
    }

    #[test]
    fn test_corner_count() {
        let l = mkline(&[pt(0, 0), pt(1000, 0), pt(2000, 1000), pt(2000, 2000)]);
        assert_eq!(l.count_corners(AngleKind::Obtuse.into()), 2);
        assert_eq!(l.count_corners(AngleKind::Right.into()), 0);
    }

    #[test]
    fn test_drag_corner() {
        let mut l = mkline(&[pt(0, 0), pt(1000, 0), pt(2000, 0)]);
        l.drag_corner(pt(1000, 500), 1);
        assert_eq!(l.pt(1), pt(1000, 500));
        assert_eq!(l.first_pt(), pt(0, 0));
        assert_eq!(l.last_pt(), pt(2000, 0));
    }

    #[test]
    fn test_line_collision() {
        let a = mkline(&[pt(0, 0), pt(1000, 0)]);
        let b = mkline(&[pt(0, 350), pt(1000, 350)]);
        assert!(a.collides_with_line(&b, 200));
        assert!(!a.collides_with_line(&b, 100));
    }
}
