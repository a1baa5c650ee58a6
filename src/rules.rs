use std::collections::HashMap;

use crate::geom::polyline::Polyline;
use crate::hull::item_hull;
use crate::item::{Item, ItemId, NetHandle};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ConstraintKind {
    Clearance,
    HoleClearance,
    DiffPairGap,
    MaxUncoupled,
    Width,
}

// Host-provided rule source. Clearances may be net-class and layer aware;
// the router only ever asks pairwise.
pub trait RuleResolver {
    fn clearance(&self, a: &Item, b: &Item, use_epsilon: bool) -> i64;

    // Small constant used to break tie cases in collision checks.
    fn clearance_epsilon(&self) -> i64 {
        10
    }

    fn query_constraint(
        &self,
        _kind: ConstraintKind,
        _a: &Item,
        _b: Option<&Item>,
        _layer: i32,
    ) -> Option<i64> {
        None
    }

    // Resolves the P/N partner nets of a differential-pair item.
    fn dp_net_pair(&self, _item: &Item) -> Option<(NetHandle, NetHandle)> {
        None
    }

    fn net_name(&self, net: NetHandle) -> String {
        format!("net-{}", net.0)
    }
}

// Per-(item, clearance, width, layer) hull cache. References are not stable
// across episodes; callers clone the chain they need.
#[derive(Debug, Default)]
pub struct HullCache {
    cache: HashMap<(ItemId, i64, i64, i32), Polyline>,
}

impl HullCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hull(&mut self, item: &Item, clearance: i64, walk_width: i64, layer: i32) -> Polyline {
        let key = (item.id(), clearance, walk_width, layer);
        if item.id().is_valid() {
            if let Some(h) = self.cache.get(&key) {
                return h.clone();
            }
        }
        let h = item_hull(item, clearance, walk_width, layer);
        if item.id().is_valid() {
            self.cache.insert(key, h.clone());
        }
        h
    }

    pub fn clear_for_items(&mut self, ids: &[ItemId]) {
        self.cache.retain(|(id, _, _, _), _| !ids.contains(id));
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// Uniform-clearance resolver for tests and standalone use.
#[derive(Debug, Copy, Clone)]
pub struct UniformResolver {
    pub clearance: i64,
    pub hole_clearance: i64,
    pub epsilon: i64,
}

impl Default for UniformResolver {
    fn default() -> Self {
        Self { clearance: 200, hole_clearance: 250, epsilon: 10 }
    }
}

impl UniformResolver {
    pub fn new(clearance: i64) -> Self {
        Self { clearance, ..Self::default() }
    }
}

impl RuleResolver for UniformResolver {
    fn clearance(&self, a: &Item, b: &Item, use_epsilon: bool) -> i64 {
        let base = if matches!(a, Item::Hole(_)) || matches!(b, Item::Hole(_)) {
            self.hole_clearance
        } else {
            self.clearance
        };
        if use_epsilon {
            base - self.epsilon
        } else {
            base
        }
    }

    fn clearance_epsilon(&self) -> i64 {
        self.epsilon
    }

    fn query_constraint(
        &self,
        kind: ConstraintKind,
        _a: &Item,
        _b: Option<&Item>,
        _layer: i32,
    ) -> Option<i64> {
        match kind {
            ConstraintKind::Clearance => Some(self.clearance),
            ConstraintKind::HoleClearance => Some(self.hole_clearance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pt, seg};
    use crate::item::{ItemId, ParentHandle, SegmentItem};

    fn seg_item(id: u64) -> Item {
        Item::Segment(SegmentItem {
            id: ItemId(id),
            net: NetHandle(1),
            layer: 0,
            seg: seg(pt(0, 0), pt(1000, 0)),
            width: 200,
            parent: ParentHandle::default(),
            rank: -1,
            marker: 0,
            locked: false,
        })
    }

    #[test]
    fn test_hull_cache() {
        let mut cache = HullCache::new();
        let item = seg_item(7);
        let h1 = cache.hull(&item, 200, 0, 0);
        let h2 = cache.hull(&item, 200, 0, 0);
        assert_eq!(h1, h2);
        assert_eq!(cache.len(), 1);
        cache.clear_for_items(&[ItemId(7)]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_uniform_resolver() {
        let r = UniformResolver::new(300);
        let (a, b) = (seg_item(1), seg_item(2));
        assert_eq!(r.clearance(&a, &b, false), 300);
        assert_eq!(r.clearance(&a, &b, true), 290);
    }
}
