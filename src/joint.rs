use serde::{Deserialize, Serialize};

use crate::geom::point::Pt;
use crate::item::{ItemId, LayerSet, NetHandle};

// Joints hash on (position, net); the layer range disambiguates overlapping
// entries at the same tag.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct JointTag {
    pub pos: Pt,
    pub net: NetHandle,
}

// Equivalence class of item endpoints sharing position and net. Links are
// ids, never references; the owning node resolves them.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Joint {
    tag: JointTag,
    layers: LayerSet,
    links: Vec<ItemId>,
    locked: bool,
}

impl Joint {
    pub fn new(pos: Pt, layers: LayerSet, net: NetHandle) -> Self {
        Self { tag: JointTag { pos, net }, layers, links: Vec::new(), locked: false }
    }

    pub fn pos(&self) -> Pt {
        self.tag.pos
    }

    pub fn net(&self) -> NetHandle {
        self.tag.net
    }

    pub fn tag(&self) -> JointTag {
        self.tag
    }

    pub fn layers(&self) -> LayerSet {
        self.layers
    }

    pub fn links(&self) -> &[ItemId] {
        &self.links
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn link(&mut self, id: ItemId) {
        if !self.links.contains(&id) {
            self.links.push(id);
        }
    }

    pub fn unlink(&mut self, id: ItemId) {
        self.links.retain(|&l| l != id);
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.links.contains(&id)
    }

    pub fn merge(&mut self, other: &Joint) {
        debug_assert_eq!(self.tag, other.tag);
        self.layers = self.layers.merged(&other.layers);
        self.locked |= other.locked;
        for &l in other.links.iter() {
            self.link(l);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::pt;

    #[test]
    fn test_merge() {
        let mut a = Joint::new(pt(0, 0), LayerSet::one(0), NetHandle(1));
        a.link(ItemId(1));
        let mut b = Joint::new(pt(0, 0), LayerSet::one(3), NetHandle(1));
        b.link(ItemId(2));
        b.set_locked(true);
        a.merge(&b);
        assert_eq!(a.layers(), LayerSet::new(0, 3));
        assert_eq!(a.link_count(), 2);
        assert!(a.is_locked());
    }

    #[test]
    fn test_link_unlink() {
        let mut j = Joint::new(pt(0, 0), LayerSet::one(0), NetHandle(1));
        j.link(ItemId(1));
        j.link(ItemId(1));
        assert_eq!(j.link_count(), 1);
        j.unlink(ItemId(1));
        assert!(j.is_empty());
    }
}
