use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::geom::rect::{rt_cloud_bounds, Rt};
use crate::item::{ItemId, NetHandle};

type NodeIdx = usize;
type EntryIdx = usize;

// How many tests to do before splitting a node.
const TEST_THRESHOLD: usize = 4;
const MAX_DEPTH: usize = 7;
const NO_NODE: NodeIdx = 0;

#[derive(Debug, Copy, Clone)]
struct Entry {
    id: ItemId,
    bounds: Rt,
    net: NetHandle,
}

#[derive(Debug, Copy, Clone)]
struct IntersectData {
    entry_idx: EntryIdx,
    tests: usize, // how many times we had to test this entry directly
}

#[derive(Debug, Default, Clone)]
struct Node {
    intersect: Vec<IntersectData>,
    bl: NodeIdx,
    br: NodeIdx,
    tr: NodeIdx,
    tl: NodeIdx,
}

// Quadtree over item bounding boxes. Returns candidate colliders for a
// query rect; callers do the exact shape tests.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    entries: Vec<Option<Entry>>,
    free: Vec<EntryIdx>,
    by_id: HashMap<ItemId, EntryIdx>,
    by_net: HashMap<NetHandle, HashSet<ItemId>>,
    nodes: Vec<Node>,
    bounds: Rt,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
            by_net: HashMap::new(),
            nodes: vec![Node::default(), Node::default()],
            bounds: Rt::empty(),
        }
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.by_id.len()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn bounds(&self) -> Rt {
        self.bounds
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn items_for_net(&self, net: NetHandle) -> impl Iterator<Item = ItemId> + '_ {
        self.by_net.get(&net).into_iter().flatten().copied()
    }

    pub fn add(&mut self, id: ItemId, bounds: Rt, net: NetHandle) {
        if self.by_id.contains_key(&id) {
            return;
        }
        let united = self.bounds.united(&bounds);
        // If this entry expands the bounds, rebuild the tree.
        if united != self.bounds {
            let mut all: Vec<Entry> = self.entries.iter().flatten().copied().collect();
            all.push(Entry { id, bounds, net });
            self.rebuild(all, united);
            return;
        }
        let entry = Entry { id, bounds, net };
        let entry_idx = if let Some(idx) = self.free.pop() {
            self.entries[idx] = Some(entry);
            idx
        } else {
            self.entries.push(Some(entry));
            self.entries.len() - 1
        };
        self.by_id.insert(id, entry_idx);
        self.by_net.entry(net).or_default().insert(id);
        self.nodes[1].intersect.push(IntersectData { entry_idx, tests: 0 });
    }

    pub fn remove(&mut self, id: ItemId) {
        let Some(entry_idx) = self.by_id.remove(&id) else {
            return;
        };
        if let Some(e) = self.entries[entry_idx].take() {
            if let Some(set) = self.by_net.get_mut(&e.net) {
                set.remove(&id);
            }
        }
        for node in self.nodes.iter_mut() {
            node.intersect.retain(|v| v.entry_idx != entry_idx);
        }
        self.free.push(entry_idx);
    }

    fn rebuild(&mut self, all: Vec<Entry>, bounds: Rt) {
        self.entries.clear();
        self.free.clear();
        self.by_id.clear();
        self.by_net.clear();
        self.nodes = vec![Node::default(), Node::default()];
        self.bounds = bounds;
        for (i, e) in all.into_iter().enumerate() {
            self.by_id.insert(e.id, i);
            self.by_net.entry(e.net).or_default().insert(e.id);
            self.entries.push(Some(e));
            self.nodes[1].intersect.push(IntersectData { entry_idx: i, tests: 0 });
        }
    }

    // Visits every entry whose bounds intersect |r|. The visitor returns
    // false to stop the search early; query() reports whether it ran to
    // completion.
    pub fn query(&mut self, r: &Rt, visit: &mut dyn FnMut(ItemId) -> bool) -> bool {
        self.query_node(r, 1, self.bounds, 0, visit)
    }

    fn query_node(
        &mut self,
        r: &Rt,
        idx: NodeIdx,
        node_rt: Rt,
        depth: usize,
        visit: &mut dyn FnMut(ItemId) -> bool,
    ) -> bool {
        if !node_rt.intersects(r) && !node_rt.is_empty() {
            return true;
        }

        // Traverse children first; direct tests only for what remains here.
        let Node { bl, br, tr, tl, .. } = self.nodes[idx];
        let children: SmallVec<[(NodeIdx, Rt); 4]> = [
            (bl, node_rt.bl_quadrant()),
            (br, node_rt.br_quadrant()),
            (tr, node_rt.tr_quadrant()),
            (tl, node_rt.tl_quadrant()),
        ]
        .into_iter()
        .filter(|(c, _)| *c != NO_NODE)
        .collect();

        for (child, child_rt) in children {
            if !self.query_node(r, child, child_rt, depth + 1, visit) {
                return false;
            }
        }

        let mut i = 0;
        while i < self.nodes[idx].intersect.len() {
            let inter = &mut self.nodes[idx].intersect[i];
            inter.tests += 1;
            let entry = self.entries[inter.entry_idx].as_ref();
            if let Some(e) = entry {
                if e.bounds.intersects(r) && !visit(e.id) {
                    return false;
                }
            }
            i += 1;
        }
        self.maybe_push_down(idx, node_rt, depth);
        true
    }

    // Move heavily-tested entries to child nodes.
    fn maybe_push_down(&mut self, idx: NodeIdx, node_rt: Rt, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let mut push_down = Vec::new();
        self.nodes[idx].intersect.retain(|v| {
            if v.tests >= TEST_THRESHOLD {
                push_down.push(*v);
                false
            } else {
                true
            }
        });
        if push_down.is_empty() {
            return;
        }
        self.ensure_children(idx);
        for inter in push_down {
            let Some(entry) = self.entries[inter.entry_idx] else { continue };
            let Node { bl, br, tr, tl, .. } = self.nodes[idx];
            for (quad_rt, quad_idx) in [
                (node_rt.bl_quadrant(), bl),
                (node_rt.br_quadrant(), br),
                (node_rt.tr_quadrant(), tr),
                (node_rt.tl_quadrant(), tl),
            ] {
                if entry.bounds.intersects(&quad_rt) {
                    self.nodes[quad_idx]
                        .intersect
                        .push(IntersectData { entry_idx: inter.entry_idx, tests: 0 });
                }
            }
        }
    }

    fn ensure_children(&mut self, idx: NodeIdx) {
        if self.nodes[idx].bl == NO_NODE {
            self.nodes[idx].bl = self.nodes.len();
            self.nodes.push(Node::default());
            self.nodes[idx].br = self.nodes.len();
            self.nodes.push(Node::default());
            self.nodes[idx].tr = self.nodes.len();
            self.nodes.push(Node::default());
            self.nodes[idx].tl = self.nodes.len();
            self.nodes.push(Node::default());
        }
    }

    // Collects all candidates for |r| in deterministic (id) order. Entries
    // may land in several quadrants so duplicates are filtered.
    pub fn query_ids(&mut self, r: &Rt) -> Vec<ItemId> {
        let mut out = Vec::new();
        self.query(r, &mut |id| {
            out.push(id);
            true
        });
        out.sort_unstable();
        out.dedup();
        out
    }
}

pub fn bounds_of(iter: impl Iterator<Item = Rt>) -> Rt {
    rt_cloud_bounds(iter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::rt;

    #[test]
    fn test_add_query() {
        let mut idx = SpatialIndex::new();
        idx.add(ItemId(1), rt(0, 0, 100, 100), NetHandle(1));
        idx.add(ItemId(2), rt(200, 200, 300, 300), NetHandle(2));

        assert_eq!(idx.query_ids(&rt(50, 50, 60, 60)), vec![ItemId(1)]);
        assert_eq!(idx.query_ids(&rt(150, 150, 400, 400)), vec![ItemId(2)]);
        assert_eq!(idx.query_ids(&rt(0, 0, 300, 300)).len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut idx = SpatialIndex::new();
        idx.add(ItemId(1), rt(0, 0, 100, 100), NetHandle(1));
        idx.remove(ItemId(1));
        assert!(idx.query_ids(&rt(0, 0, 100, 100)).is_empty());
        assert_eq!(idx.size(), 0);
    }

    #[test]
    fn test_push_down_keeps_results() {
        let mut idx = SpatialIndex::new();
        for i in 0..20 {
            idx.add(ItemId(i + 1), rt(i as i64 * 10, 0, i as i64 * 10 + 5, 5), NetHandle(1));
        }
        // Query repeatedly to trigger push-down, results must be stable.
        for _ in 0..10 {
            assert_eq!(idx.query_ids(&rt(0, 0, 200, 10)).len(), 20);
        }
        assert_eq!(idx.items_for_net(NetHandle(1)).count(), 20);
    }
}
