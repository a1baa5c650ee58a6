use std::collections::{BTreeSet, HashMap, HashSet};

use log::trace;

use crate::geom::direction::CornerMode;
use crate::geom::point::Pt;
use crate::geom::polyline::{ArcSpec, Polyline};
use crate::geom::rect::Rt;
use crate::geom::shape::Shape;
use crate::hull::HULL_MARGIN;
use crate::index::SpatialIndex;
use crate::item::{
    Hole, Item, ItemId, KindMask, LayerSet, NetHandle, SegmentItem, Via, ViaHandle,
};
use crate::joint::{Joint, JointTag};
use crate::line::Line;
use crate::rules::{HullCache, RuleResolver};

pub type NodeId = usize;

pub const ROOT: NodeId = 0;

// Default search inflation; clearance can never exceed this.
const MAX_CLEARANCE: i64 = 800_000;

// Result of a collision search. |ip_first| / |dist_first| are only
// meaningful for nearest_obstacle() queries.
#[derive(Debug, Copy, Clone)]
pub struct Obstacle {
    pub item: ItemId,
    pub ip_first: Pt,
    pub dist_first: i64,
    pub max_fanout_width: i64,
}

impl Obstacle {
    fn plain(item: ItemId) -> Self {
        Self { item, ip_first: Pt::zero(), dist_first: i64::MAX, max_fanout_width: 0 }
    }
}

#[derive(Clone, Copy)]
pub struct CollisionOpts<'a> {
    pub kind_mask: KindMask,
    pub limit: Option<usize>,
    pub use_epsilon: bool,
    pub different_nets_only: bool,
    pub corner_mode: CornerMode,
    pub clearance_override: Option<i64>,
    pub filter: Option<&'a dyn Fn(&Item) -> bool>,
}

impl Default for CollisionOpts<'_> {
    fn default() -> Self {
        Self {
            kind_mask: KindMask::all(),
            limit: None,
            use_epsilon: true,
            different_nets_only: true,
            corner_mode: CornerMode::Mitered45,
            clearance_override: None,
            filter: None,
        }
    }
}

impl<'a> CollisionOpts<'a> {
    pub fn of_kinds(kind_mask: KindMask) -> Self {
        Self { kind_mask, ..Self::default() }
    }

    pub fn first_only() -> Self {
        Self { limit: Some(1), ..Self::default() }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AssembleOpts {
    pub stop_at_locked_joints: bool,
    pub follow_locked_segments: bool,
    pub allow_width_mismatch: bool,
}

impl Default for AssembleOpts {
    fn default() -> Self {
        Self {
            stop_at_locked_joints: false,
            follow_locked_segments: false,
            allow_width_mismatch: true,
        }
    }
}

#[derive(Debug)]
struct ItemEntry {
    owner: Option<NodeId>,
    item: Item,
}

#[derive(Debug, Default)]
struct NodeData {
    parent: Option<NodeId>,
    children: BTreeSet<NodeId>,
    depth: u32,
    index: SpatialIndex,
    joints: HashMap<JointTag, Vec<Joint>>,
    overrides: HashSet<ItemId>,
    garbage: HashSet<ItemId>, // root only
    edge_exclusions: Vec<Shape>,
}

// The branched world: a root node plus a tree of tentative branches, all
// stored in one arena so commit is logical reparenting, never a move of
// backing storage. The root lives in its own slot and is never destroyed,
// which lets every node lookup degrade to it instead of panicking.
pub struct World {
    root_data: NodeData,
    branches: Vec<Option<NodeData>>, // NodeId n >= 1 lives at branches[n - 1]
    free_nodes: Vec<NodeId>,
    items: HashMap<ItemId, ItemEntry>,
    next_uid: u64,
    resolver: Box<dyn RuleResolver>,
    pub hulls: HullCache,
}

impl World {
    pub fn new(resolver: Box<dyn RuleResolver>) -> Self {
        Self {
            root_data: NodeData::default(),
            branches: Vec::new(),
            free_nodes: Vec::new(),
            items: HashMap::new(),
            next_uid: 1,
            resolver,
            hulls: HullCache::new(),
        }
    }

    fn node(&self, n: NodeId) -> &NodeData {
        if n == ROOT {
            return &self.root_data;
        }
        debug_assert!(self.is_alive(n), "dead node");
        match self.branches.get(n - 1).and_then(Option::as_ref) {
            Some(d) => d,
            None => &self.root_data,
        }
    }

    fn node_mut(&mut self, n: NodeId) -> &mut NodeData {
        if n == ROOT {
            return &mut self.root_data;
        }
        debug_assert!(self.is_alive(n), "dead node");
        if self.branches.get(n - 1).map_or(true, Option::is_none) {
            return &mut self.root_data;
        }
        match self.branches[n - 1].as_mut() {
            Some(d) => d,
            None => &mut self.root_data,
        }
    }

    pub fn is_alive(&self, n: NodeId) -> bool {
        n == ROOT || self.branches.get(n.wrapping_sub(1)).is_some_and(Option::is_some)
    }

    pub fn is_root(&self, n: NodeId) -> bool {
        n == ROOT
    }

    pub fn depth(&self, n: NodeId) -> u32 {
        self.node(n).depth
    }

    pub fn parent(&self, n: NodeId) -> Option<NodeId> {
        self.node(n).parent
    }

    pub fn children(&self, n: NodeId) -> Vec<NodeId> {
        self.node(n).children.iter().copied().collect()
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id).map(|e| &e.item)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id).map(|e| &mut e.item)
    }

    pub fn owner_of(&self, id: ItemId) -> Option<NodeId> {
        self.items.get(&id).and_then(|e| e.owner)
    }

    pub fn resolver(&self) -> &dyn RuleResolver {
        self.resolver.as_ref()
    }

    pub fn clearance(&self, a: &Item, b: &Item, use_epsilon: bool) -> i64 {
        if a.is_virtual() || b.is_virtual() {
            return 0;
        }
        self.resolver.clearance(a, b, use_epsilon)
    }

    pub fn hull_of(&mut self, id: ItemId, clearance: i64, walk_width: i64, layer: i32) -> Polyline {
        let Some(entry) = self.items.get(&id) else {
            debug_assert!(false, "hull of dead item");
            return Polyline::default();
        };
        self.hulls.hull(&entry.item, clearance, walk_width, layer)
    }

    pub fn joint_count(&self, n: NodeId) -> usize {
        self.node(n).joints.values().map(Vec::len).sum()
    }

    pub fn items_owned_by(&self, n: NodeId) -> Vec<ItemId> {
        let mut out: Vec<ItemId> = self.node(n).index.ids().collect();
        out.sort_unstable();
        out
    }

    // ------------------------------------------------------------------
    // branching

    pub fn branch(&mut self, n: NodeId) -> NodeId {
        let depth = self.node(n).depth + 1;
        let mut data = NodeData { parent: Some(n), depth, ..NodeData::default() };

        // Immediate offspring of the root share everything through the root
        // lookup path; deeper branches deep-copy joints, overrides and the
        // index of their parent.
        if !self.is_root(n) {
            let parent = self.node(n);
            data.index = parent.index.clone();
            data.joints = parent.joints.clone();
            data.overrides = parent.overrides.clone();
        }

        let id = if let Some(id) = self.free_nodes.pop() {
            self.branches[id - 1] = Some(data);
            id
        } else {
            self.branches.push(Some(data));
            self.branches.len()
        };
        self.node_mut(n).children.insert(id);
        trace!("branch {n} -> {id} depth {depth}");
        id
    }

    // ------------------------------------------------------------------
    // add / remove

    fn alloc_uid(&mut self) -> ItemId {
        let id = ItemId(self.next_uid);
        self.next_uid += 1;
        id
    }

    // Inserts an item into the branch. Zero-length segments are silently
    // rejected; duplicate segments/arcs are refused unless allowed.
    pub fn add(&mut self, n: NodeId, mut item: Item, allow_redundant: bool) -> Option<ItemId> {
        match &item {
            Item::Segment(s) => {
                if s.seg.is_zero_len() {
                    trace!("attempting to add a segment with same end coordinates, ignoring");
                    return None;
                }
                if !allow_redundant
                    && self
                        .find_redundant_segment(n, s.seg.st(), s.seg.en(), s.layer, s.net)
                        .is_some()
                {
                    return None;
                }
            }
            Item::Arc(a) => {
                if !allow_redundant
                    && self.find_redundant_arc(n, a.p0, a.p1, a.layer, a.net).is_some()
                {
                    return None;
                }
            }
            _ => {}
        }

        if !item.id().is_valid() {
            let id = self.alloc_uid();
            item.set_id(id);
        }
        let id = item.id();

        // A drilled via owns a hole, indexed separately so tracks collide
        // against it on every layer.
        if let Item::Via(v) = &mut item {
            if v.drill > 0 && v.hole.is_none() && !v.is_virtual {
                let hole_id = ItemId(self.next_uid);
                self.next_uid += 1;
                v.hole = Some(hole_id);
                let hole = Item::Hole(Hole {
                    id: hole_id,
                    net: v.net,
                    layers: v.layers,
                    center: v.pos,
                    radius: v.drill / 2,
                    owner_item: Some(id),
                    rank: -1,
                    marker: 0,
                });
                self.index_item(n, hole);
            }
        }

        // Joint linkage.
        match &item {
            Item::Segment(s) => {
                let layers = LayerSet::one(s.layer);
                self.link_joint(n, s.seg.st(), layers, s.net, id);
                self.link_joint(n, s.seg.en(), layers, s.net, id);
            }
            Item::Arc(a) => {
                let layers = LayerSet::one(a.layer);
                self.link_joint(n, a.p0, layers, a.net, id);
                self.link_joint(n, a.p1, layers, a.net, id);
            }
            Item::Via(v) => {
                self.link_joint(n, v.pos, v.layers, v.net, id);
            }
            Item::Solid(s) => {
                if s.routable {
                    self.link_joint(n, s.pos, s.layers, s.net, id);
                }
            }
            Item::Hole(_) => {}
        }

        self.index_item(n, item);
        Some(id)
    }

    fn index_item(&mut self, n: NodeId, item: Item) {
        let id = item.id();
        let bounds = item.bounds();
        let net = item.net();
        self.node_mut(n).index.add(id, bounds, net);
        self.items.insert(id, ItemEntry { owner: Some(n), item });
    }

    // Creates primitives for every shape of the line's polyline and links
    // them. The trailing via, if any, is added separately by callers.
    pub fn add_line(&mut self, n: NodeId, line: &mut Line, allow_redundant: bool) {
        debug_assert!(!line.is_linked());
        let pl = line.line().clone();
        let (net, layer, width) = (line.net(), line.layer(), line.width());

        let rank = line.rank();
        for i in 0..pl.seg_count() {
            if pl.is_arc_seg(i) {
                let spec = pl.arcs()[pl.arc_tag(i) as usize];
                let arc = Item::Arc(crate::item::ArcItem {
                    id: ItemId::INVALID,
                    net,
                    layer,
                    p0: spec.p0,
                    mid: spec.mid,
                    p1: spec.p1,
                    cw: spec.cw,
                    width,
                    parent: Default::default(),
                    rank,
                    marker: 0,
                    locked: false,
                });
                if let Some(id) = self.add(n, arc, allow_redundant) {
                    line.link(id);
                } else if let Some(id) = self.find_redundant_arc(n, spec.p0, spec.p1, layer, net) {
                    if !line.contains_link(id) {
                        line.link(id);
                    }
                }
                continue;
            }
            let s = pl.seg(i);
            if s.is_zero_len() {
                continue;
            }
            let item = Item::Segment(SegmentItem {
                id: ItemId::INVALID,
                net,
                layer,
                seg: s,
                width,
                parent: Default::default(),
                rank,
                marker: 0,
                locked: false,
            });
            if let Some(id) = self.add(n, item, allow_redundant) {
                line.link(id);
            } else if let Some(id) = self.find_redundant_segment(n, s.st(), s.en(), layer, net) {
                // another line could be referencing this segment too
                if !line.contains_link(id) {
                    line.link(id);
                }
            }
        }
    }

    pub fn remove(&mut self, n: NodeId, id: ItemId) {
        let Some(item) = self.item(id).cloned() else { return };

        // Joint unlinkage first, while the item is still visible.
        match &item {
            Item::Segment(s) => {
                let layers = LayerSet::one(s.layer);
                self.unlink_joint(n, s.seg.st(), layers, s.net, id);
                self.unlink_joint(n, s.seg.en(), layers, s.net, id);
            }
            Item::Arc(a) => {
                let layers = LayerSet::one(a.layer);
                self.unlink_joint(n, a.p0, layers, a.net, id);
                self.unlink_joint(n, a.p1, layers, a.net, id);
            }
            Item::Via(v) => {
                self.rebuild_joint(n, v.pos, v.net, id);
            }
            Item::Solid(s) => {
                if s.routable {
                    self.rebuild_joint(n, s.pos, s.net, id);
                }
            }
            Item::Hole(_) => {}
        }

        self.do_remove(n, id);
        if let Some(hole) = item.hole() {
            self.do_remove(n, hole);
        }
    }

    fn do_remove(&mut self, n: NodeId, id: ItemId) {
        let owner = self.owner_of(id);

        // Removing a root-owned item from a branch only shadows it.
        if owner == Some(ROOT) && !self.is_root(n) {
            self.node_mut(n).overrides.insert(id);
            if let Some(hole) = self.item(id).and_then(Item::hole) {
                self.node_mut(n).overrides.insert(hole);
            }
            return;
        }

        self.node_mut(n).index.remove(id);

        if owner == Some(n) {
            if let Some(e) = self.items.get_mut(&id) {
                e.owner = None;
            }
            self.node_mut(ROOT).garbage.insert(id);
        }
    }

    pub fn remove_line(&mut self, n: NodeId, line: &mut Line) {
        for id in line.links().to_vec() {
            self.remove(n, id);
        }
        line.clear_links();
    }

    pub fn replace_line(&mut self, n: NodeId, old: &mut Line, new: &mut Line, allow_redundant: bool) {
        self.remove_line(n, old);
        self.add_line(n, new, allow_redundant);
    }

    pub fn replace_item(&mut self, n: NodeId, old: ItemId, new: Item) -> Option<ItemId> {
        self.remove(n, old);
        self.add(n, new, false)
    }

    // ------------------------------------------------------------------
    // commit / destroy

    // Merges a descendant branch into this node: overridden items vanish,
    // added items are reparented, then all tentative children die.
    pub fn commit(&mut self, n: NodeId, child: NodeId) {
        if self.is_root(child) {
            return;
        }

        let overrides: Vec<ItemId> = {
            let mut v: Vec<ItemId> = self.node(child).overrides.iter().copied().collect();
            v.sort_unstable();
            v
        };
        for id in overrides {
            if self.item(id).is_some() {
                self.remove(n, id);
            }
        }

        let added = self.items_owned_by(child);
        for id in added {
            let Some(entry) = self.items.get_mut(&id) else { continue };
            entry.item.set_rank(-1);
            entry.item.set_marker(0);
            let item = entry.item.clone();
            // reparent rather than re-create: the uid must survive commit
            self.node_mut(child).index.remove(id);
            self.add_reparented(n, item);
        }

        self.kill_children(n);
        self.release_garbage();
    }

    fn add_reparented(&mut self, n: NodeId, item: Item) {
        // Like add() but never reallocates the uid or the hole.
        let id = item.id();
        match &item {
            Item::Segment(s) => {
                let layers = LayerSet::one(s.layer);
                self.link_joint(n, s.seg.st(), layers, s.net, id);
                self.link_joint(n, s.seg.en(), layers, s.net, id);
            }
            Item::Arc(a) => {
                let layers = LayerSet::one(a.layer);
                self.link_joint(n, a.p0, layers, a.net, id);
                self.link_joint(n, a.p1, layers, a.net, id);
            }
            Item::Via(v) => self.link_joint(n, v.pos, v.layers, v.net, id),
            Item::Solid(s) => {
                if s.routable {
                    self.link_joint(n, s.pos, s.layers, s.net, id);
                }
            }
            Item::Hole(_) => {}
        }
        self.index_item(n, item);
    }

    pub fn kill_children(&mut self, n: NodeId) {
        for child in self.children(n) {
            self.destroy_node(child);
        }
    }

    // Discards one tentative branch (and its descendants) without
    // committing. The root is indestructible.
    pub fn destroy_branch(&mut self, n: NodeId) {
        debug_assert!(!self.is_root(n));
        if !self.is_root(n) && self.is_alive(n) {
            self.destroy_node(n);
        }
    }

    fn destroy_node(&mut self, n: NodeId) {
        if n == ROOT {
            debug_assert!(false, "attempting to destroy the root");
            return;
        }
        for child in self.children(n) {
            self.destroy_node(child);
        }

        let Some(data) = self.branches.get_mut(n - 1).and_then(Option::take) else {
            debug_assert!(false, "double destroy");
            return;
        };
        if let Some(parent) = data.parent {
            if self.is_alive(parent) {
                self.node_mut(parent).children.remove(&n);
            }
        }

        // Free items still owned by this node.
        let mut dead: Vec<ItemId> = Vec::new();
        for id in data.index.ids() {
            if self.items.get(&id).is_some_and(|e| e.owner == Some(n)) {
                dead.push(id);
            }
        }
        dead.sort_unstable();
        for id in &dead {
            self.items.remove(id);
        }
        if !dead.is_empty() {
            self.hulls.clear_for_items(&dead);
        }

        self.free_nodes.push(n);
        trace!("destroy node {n} ({} items freed)", dead.len());
    }

    fn release_garbage(&mut self) {
        let garbage: Vec<ItemId> = {
            let mut v: Vec<ItemId> =
                self.node(ROOT).garbage.iter().copied().collect();
            v.sort_unstable();
            v
        };
        let mut dead = Vec::new();
        for id in garbage {
            if self.items.get(&id).is_some_and(|e| e.owner.is_none()) {
                self.items.remove(&id);
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            self.hulls.clear_for_items(&dead);
        }
        self.node_mut(ROOT).garbage.clear();
    }

    // Items overridden / added in this branch relative to its parent chain.
    pub fn updated_items(&self, n: NodeId) -> (Vec<ItemId>, Vec<ItemId>) {
        if self.is_root(n) {
            return (Vec::new(), Vec::new());
        }
        let mut removed: Vec<ItemId> = self.node(n).overrides.iter().copied().collect();
        removed.sort_unstable();
        let added = self.items_owned_by(n);
        (removed, added)
    }

    pub fn overrides(&self, n: NodeId, id: ItemId) -> bool {
        self.node(n).overrides.contains(&id)
    }

    pub fn clear_ranks(&mut self, n: NodeId) {
        for id in self.items_owned_by(n) {
            if let Some(e) = self.items.get_mut(&id) {
                e.item.set_rank(-1);
                e.item.set_marker(0);
            }
        }
    }

    pub fn remove_by_marker(&mut self, n: NodeId, marker: u32) {
        let mut doomed = Vec::new();
        for id in self.items_owned_by(n) {
            if self.item(id).is_some_and(|i| i.marker() & marker != 0) {
                doomed.push(id);
            }
        }
        for id in doomed {
            self.remove(n, id);
        }
    }

    // ------------------------------------------------------------------
    // edge exclusions

    pub fn add_edge_exclusion(&mut self, n: NodeId, shape: Shape) {
        self.node_mut(n).edge_exclusions.push(shape);
    }

    pub fn query_edge_exclusions(&self, n: NodeId, p: Pt) -> bool {
        self.node(n).edge_exclusions.iter().any(|s| s.contains_pt(p))
            || self
                .parent(n)
                .map_or(false, |parent| self.query_edge_exclusions(parent, p))
    }

    // ------------------------------------------------------------------
    // collision search

    fn candidate_ids(&mut self, n: NodeId, search: &Rt) -> Vec<ItemId> {
        let mut ids = self.node_mut(n).index.query_ids(search);
        if !self.is_root(n) {
            let root_ids = self.node_mut(ROOT).index.query_ids(search);
            let node = self.node(n);
            ids.extend(root_ids.into_iter().filter(|id| !node.overrides.contains(id)));
        }
        ids
    }

    pub fn query_colliding(
        &mut self,
        n: NodeId,
        probe: &Item,
        opts: &CollisionOpts<'_>,
        out: &mut Vec<Obstacle>,
    ) -> usize {
        // Virtual items cannot collide.
        if probe.is_virtual() {
            return 0;
        }
        let before = out.len();
        let search = probe.bounds().inflated(MAX_CLEARANCE);
        for id in self.candidate_ids(n, &search) {
            if id == probe.id() && id.is_valid() {
                continue;
            }
            let Some(item) = self.item(id) else { continue };
            if !item.of_kind(opts.kind_mask) {
                continue;
            }
            if opts.different_nets_only
                && item.net() == probe.net()
                && item.net() != NetHandle::ORPHAN
            {
                continue;
            }
            if let Some(f) = opts.filter {
                if !f(item) {
                    continue;
                }
            }
            let cl = opts
                .clearance_override
                .unwrap_or_else(|| self.clearance(probe, item, opts.use_epsilon));
            let Some(item) = self.item(id) else { continue };
            if probe.collides(item, cl) {
                out.push(Obstacle::plain(id));
                if let Some(limit) = opts.limit {
                    if out.len() - before >= limit {
                        break;
                    }
                }
            }
        }
        out.len() - before
    }

    pub fn check_colliding(
        &mut self,
        n: NodeId,
        probe: &Item,
        opts: &CollisionOpts<'_>,
    ) -> Option<Obstacle> {
        let mut obs = Vec::new();
        let opts = CollisionOpts { limit: Some(1), ..*opts };
        self.query_colliding(n, probe, &opts, &mut obs);
        obs.into_iter().next()
    }

    // Line probes test each segment plus the trailing via.
    pub fn check_colliding_line(
        &mut self,
        n: NodeId,
        line: &Line,
        opts: &CollisionOpts<'_>,
    ) -> Option<Obstacle> {
        for i in 0..line.seg_count() {
            let probe = self.line_seg_probe(line, i);
            if let Some(obs) = self.check_colliding(n, &probe, opts) {
                return Some(obs);
            }
        }
        if let Some(v) = line.via() {
            if let Some(obs) = self.check_colliding(n, &Item::Via(v.clone()), opts) {
                return Some(obs);
            }
        }
        None
    }

    fn line_seg_probe(&self, line: &Line, i: usize) -> Item {
        Item::Segment(SegmentItem {
            id: ItemId::INVALID,
            net: line.net(),
            layer: line.layer(),
            seg: line.seg(i),
            width: line.width(),
            parent: Default::default(),
            rank: line.rank(),
            marker: 0,
            locked: false,
        })
    }

    // The obstacle hit earliest along the line, by hull intersection. Falls
    // back to the first collision when the line starts inside a hull.
    pub fn nearest_obstacle(
        &mut self,
        n: NodeId,
        line: &Line,
        opts: &CollisionOpts<'_>,
    ) -> Option<Obstacle> {
        let mut obstacles: Vec<Obstacle> = Vec::new();
        for i in 0..line.seg_count() {
            let probe = self.line_seg_probe(line, i);
            self.query_colliding(n, &probe, opts, &mut obstacles);
        }
        if let Some(v) = line.via() {
            self.query_colliding(n, &Item::Via(v.clone()), opts, &mut obstacles);
        }
        if obstacles.is_empty() {
            return None;
        }
        obstacles.sort_by_key(|o| o.item);
        obstacles.dedup_by_key(|o| o.item);

        let simplify_hull = opts.corner_mode.is_90();
        let mut nearest: Option<Obstacle> = None;

        for obs in &obstacles {
            let Some(item) = self.item(obs.item).cloned() else { continue };
            let line_probe = if line.seg_count() > 0 {
                self.line_seg_probe(line, 0)
            } else if let Some(v) = line.via() {
                Item::Via(v.clone())
            } else {
                continue;
            };
            let clearance =
                self.clearance(&item, &line_probe, opts.use_epsilon) + line.width() / 2;
            let mut hull = self.hulls.hull(&item, clearance, 0, line.layer());
            if simplify_hull {
                hull = Polyline::new_closed(&hull.bounds().pts());
            }

            for isect in line.line().intersect(&hull) {
                let dist = line.line().path_length_to(isect.p, isect.index_our);
                if nearest.as_ref().map_or(true, |b| dist < b.dist_first) {
                    nearest = Some(Obstacle {
                        item: obs.item,
                        ip_first: isect.p,
                        dist_first: dist,
                        max_fanout_width: 0,
                    });
                }
            }

            if let Some(v) = line.via() {
                let via_probe = Item::Via(v.clone());
                let via_cl = self.clearance(&item, &via_probe, opts.use_epsilon)
                    + v.diameter(line.layer()) / 2;
                let mut vhull = self.hulls.hull(&item, via_cl, 0, line.layer());
                if simplify_hull {
                    vhull = Polyline::new_closed(&vhull.bounds().pts());
                }
                for isect in line.line().intersect(&vhull) {
                    let dist = line.line().path_length_to(isect.p, isect.index_our);
                    if nearest.as_ref().map_or(true, |b| dist < b.dist_first) {
                        nearest = Some(Obstacle {
                            item: obs.item,
                            ip_first: isect.p,
                            dist_first: dist,
                            max_fanout_width: 0,
                        });
                    }
                }
            }
        }

        Some(nearest.unwrap_or(obstacles[0]))
    }

    // ------------------------------------------------------------------
    // joints

    fn copy_root_joints(&mut self, n: NodeId, tag: JointTag) {
        if self.is_root(n) || self.node(n).joints.contains_key(&tag) {
            return;
        }
        if let Some(list) = self.node(ROOT).joints.get(&tag).cloned() {
            self.node_mut(n).joints.insert(tag, list);
        }
    }

    fn touch_joint(
        &mut self,
        n: NodeId,
        pos: Pt,
        layers: LayerSet,
        net: NetHandle,
    ) -> &mut Joint {
        let tag = JointTag { pos, net };
        self.copy_root_joints(n, tag);

        let mut joint = Joint::new(pos, layers, net);
        let list = self.node_mut(n).joints.entry(tag).or_default();

        // merge all overlapping entries into the new joint
        let mut merged = true;
        while merged {
            merged = false;
            for i in 0..list.len() {
                if joint.layers().overlaps(&list[i].layers()) {
                    let other = list.remove(i);
                    joint.merge(&other);
                    merged = true;
                    break;
                }
            }
        }
        list.push(joint);
        let last = list.len() - 1;
        &mut list[last]
    }

    fn link_joint(&mut self, n: NodeId, pos: Pt, layers: LayerSet, net: NetHandle, id: ItemId) {
        self.touch_joint(n, pos, layers, net).link(id);
    }

    fn unlink_joint(&mut self, n: NodeId, pos: Pt, layers: LayerSet, net: NetHandle, id: ItemId) {
        self.touch_joint(n, pos, layers, net).unlink(id);
    }

    // Splitting a multi-layer joint: remove every joint overlapping the
    // dead item and re-link the remaining members, so the layer range
    // shrinks back to the union of what is left.
    fn rebuild_joint(&mut self, n: NodeId, pos: Pt, net: NetHandle, dead: ItemId) {
        let tag = JointTag { pos, net };
        self.copy_root_joints(n, tag);

        let Some(item) = self.item(dead).cloned() else { return };
        let layers = item.layers();

        let mut links: Vec<ItemId> = Vec::new();
        let is_root = self.is_root(n);
        if let Some(list) = self.node_mut(n).joints.get_mut(&tag) {
            let mut i = 0;
            while i < list.len() {
                if list[i].layers().overlaps(&layers) {
                    let j = list.remove(i);
                    links.extend(j.links().iter().copied());
                } else {
                    i += 1;
                }
            }
            // Shadow the root's joint when we erased everything locally.
            if list.is_empty() && !is_root {
                list.push(Joint::new(pos, LayerSet::empty(), net));
            }
        }

        links.sort_unstable();
        links.dedup();
        for link in links {
            if link == dead {
                continue;
            }
            let Some(li) = self.item(link) else { continue };
            let ll = li.layers();
            let ln = li.net();
            self.link_joint(n, pos, ll, ln, link);
        }
    }

    pub fn find_joint(&self, n: NodeId, pos: Pt, layer: i32, net: NetHandle) -> Option<&Joint> {
        let tag = JointTag { pos, net };
        let local = self.node(n).joints.get(&tag);
        let list = match local {
            Some(l) => l,
            None if !self.is_root(n) => self.node(ROOT).joints.get(&tag)?,
            None => return None,
        };
        list.iter().find(|j| j.layers().overlaps(&LayerSet::one(layer)))
    }

    pub fn find_joint_for(&self, n: NodeId, pos: Pt, item: &Item) -> Option<&Joint> {
        self.find_joint(n, pos, item.layers().start(), item.net())
    }

    pub fn lock_joint(&mut self, n: NodeId, pos: Pt, layers: LayerSet, net: NetHandle, lock: bool) {
        self.touch_joint(n, pos, layers, net).set_locked(lock);
    }

    // All joints within |bounds| on overlapping layers with links of the
    // requested kinds, local branch then non-shadowed root.
    pub fn query_joints(
        &self,
        n: NodeId,
        bounds: &Rt,
        layers: LayerSet,
        kind_mask: KindMask,
    ) -> Vec<Joint> {
        let mut out = Vec::new();
        let matches = |w: &World, j: &Joint| -> bool {
            j.layers().overlaps(&layers)
                && bounds.contains(j.pos())
                && j.links()
                    .iter()
                    .any(|id| w.item(*id).is_some_and(|i| i.of_kind(kind_mask)))
        };
        for list in self.node(n).joints.values() {
            for j in list {
                if matches(self, j) {
                    out.push(j.clone());
                }
            }
        }
        if !self.is_root(n) {
            for (tag, list) in self.node(ROOT).joints.iter() {
                if self.node(n).joints.contains_key(tag) {
                    continue;
                }
                for j in list {
                    if matches(self, j) {
                        out.push(j.clone());
                    }
                }
            }
        }
        out.sort_by_key(|j| (j.pos(), j.net()));
        out
    }

    // Resolves the router item created from a given host object.
    pub fn find_item_by_parent(
        &self,
        n: NodeId,
        parent: crate::item::ParentHandle,
        net: NetHandle,
    ) -> Option<ItemId> {
        let node = self.node(n);
        let mut candidates: Vec<ItemId> = node.index.items_for_net(net).collect();
        if !self.is_root(n) {
            candidates.extend(
                self.node(ROOT)
                    .index
                    .items_for_net(net)
                    .filter(|id| !node.overrides.contains(id)),
            );
        }
        candidates.sort_unstable();
        candidates.into_iter().find(|&id| {
            self.item(id).is_some_and(|i| match i {
                Item::Segment(s) => s.parent == parent,
                Item::Arc(a) => a.parent == parent,
                Item::Via(v) => v.parent == parent,
                Item::Solid(s) => s.parent == parent,
                Item::Hole(_) => false,
            })
        })
    }

    pub fn find_via_by_handle(&self, n: NodeId, handle: &ViaHandle) -> Option<ItemId> {
        let joint = self.find_joint(n, handle.pos, handle.layers.start(), handle.net)?;
        for &id in joint.links() {
            if let Some(Item::Via(_)) = self.item(id) {
                return Some(id);
            }
        }
        None
    }

    pub fn joint_via(&self, joint: &Joint) -> Option<ItemId> {
        joint
            .links()
            .iter()
            .copied()
            .find(|&id| matches!(self.item(id), Some(Item::Via(_))))
    }

    // ------------------------------------------------------------------
    // redundancy

    pub fn find_redundant_segment(
        &self,
        n: NodeId,
        a: Pt,
        b: Pt,
        layer: i32,
        net: NetHandle,
    ) -> Option<ItemId> {
        let joint = self.find_joint(n, a, layer, net)?;
        for &id in joint.links() {
            if let Some(Item::Segment(s)) = self.item(id) {
                if s.layer == layer
                    && ((s.seg.st() == a && s.seg.en() == b)
                        || (s.seg.st() == b && s.seg.en() == a))
                {
                    return Some(id);
                }
            }
        }
        None
    }

    pub fn find_redundant_arc(
        &self,
        n: NodeId,
        a: Pt,
        b: Pt,
        layer: i32,
        net: NetHandle,
    ) -> Option<ItemId> {
        let joint = self.find_joint(n, a, layer, net)?;
        for &id in joint.links() {
            if let Some(Item::Arc(arc)) = self.item(id) {
                if arc.layer == layer
                    && ((arc.p0 == a && arc.p1 == b) || (arc.p0 == b && arc.p1 == a))
                {
                    return Some(id);
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // line assembly

    // The next link over a trivial (corner) joint, or None at fanouts,
    // vias, pads and dead ends.
    fn next_segment(
        &self,
        joint: &Joint,
        current: ItemId,
        follow_locked: bool,
    ) -> Option<ItemId> {
        let links = joint.links();
        if links.len() != 2 {
            return None;
        }
        for &id in links {
            if id == current {
                continue;
            }
            let item = self.item(id)?;
            match item {
                Item::Segment(_) | Item::Arc(_) => {
                    if item.is_locked() && !follow_locked {
                        return None;
                    }
                    return Some(id);
                }
                _ => return None,
            }
        }
        None
    }

    fn other_anchor(&self, id: ItemId, p: Pt) -> Pt {
        let Some(item) = self.item(id) else {
            debug_assert!(false, "anchor of dead item");
            return p;
        };
        let anchors = item.anchors();
        if anchors[0] == p {
            anchors[1.min(anchors.len() - 1)]
        } else {
            anchors[0]
        }
    }

    // Reconstructs the full line containing |seed| by walking corner
    // joints in both directions. Returns the line and the vertex index of
    // the seed's start, if requested.
    pub fn assemble_line(
        &self,
        n: NodeId,
        seed: ItemId,
        mut origin_index: Option<&mut usize>,
        opts: AssembleOpts,
    ) -> Line {
        let Some(seed_item) = self.item(seed).cloned() else {
            debug_assert!(false, "assemble from dead item");
            return Line::default();
        };
        let (width, layer, net) = (
            seed_item.width(),
            seed_item.layers().start(),
            seed_item.net(),
        );

        // Walks outward from |from_pt|, returning the links in walk order.
        let walk = |start_pt: Pt, guard: Pt| -> (Vec<ItemId>, bool) {
            let mut out = Vec::new();
            let mut current = seed;
            let mut p = start_pt;
            let mut guard_hit = false;
            loop {
                let Some(joint) = self.find_joint(n, p, layer, net) else { break };
                if opts.stop_at_locked_joints && joint.is_locked() {
                    break;
                }
                let Some(next) =
                    self.next_segment(joint, current, opts.follow_locked_segments)
                else {
                    break;
                };
                if !opts.allow_width_mismatch
                    && self.item(next).is_some_and(|i| i.width() != width)
                {
                    break;
                }
                if next == seed || out.contains(&next) {
                    guard_hit = true;
                    break;
                }
                out.push(next);
                current = next;
                p = self.other_anchor(next, p);
                if p == guard {
                    guard_hit = true;
                    break;
                }
            }
            (out, guard_hit)
        };

        let a0 = seed_item.anchor(0);
        let a1 = seed_item.anchor(1.min(seed_item.anchors().len() - 1));

        let (back, back_loop) = walk(a0, a1);
        let (fwd, _) = if back_loop { (Vec::new(), false) } else { walk(a1, a0) };

        let mut ordered: Vec<ItemId> = back.into_iter().rev().collect();
        let seed_pos = ordered.len();
        ordered.push(seed);
        ordered.extend(fwd);

        // Determine the starting anchor of the first item.
        let mut start = a0;
        if ordered.len() > 1 {
            if let (Some(fi), Some(si)) = (self.item(ordered[0]), self.item(ordered[1])) {
                let fa = fi.anchors();
                let sa = si.anchors();
                start = if sa.contains(&fa[0]) { fa[1.min(fa.len() - 1)] } else { fa[0] };
            }
        }

        let mut line = Line::new(Polyline::default(), width, layer, net);
        for (i, &id) in ordered.iter().enumerate() {
            let Some(item) = self.item(id) else { continue };
            if i == seed_pos {
                if let Some(idx) = origin_index.as_deref_mut() {
                    *idx = line.line().pt_count().saturating_sub(
                        usize::from(line.line().pt_count() > 0),
                    );
                }
            }
            match item {
                Item::Arc(a) => {
                    let spec = if a.p0 == start {
                        ArcSpec { p0: a.p0, mid: a.mid, p1: a.p1, cw: a.cw }
                    } else {
                        ArcSpec { p0: a.p1, mid: a.mid, p1: a.p0, cw: !a.cw }
                    };
                    line.line_mut().append_arc(spec);
                    start = spec.p1;
                }
                Item::Segment(s) => {
                    let (st, en) = if s.seg.st() == start {
                        (s.seg.st(), s.seg.en())
                    } else {
                        (s.seg.en(), s.seg.st())
                    };
                    line.line_mut().append(st);
                    line.line_mut().append(en);
                    start = en;
                }
                _ => {}
            }
            line.link(id);
        }

        debug_assert!(line.seg_count() != 0, "assembled line should never be empty");
        line.set_rank(self.item(seed).map_or(-1, Item::rank));
        line
    }

    pub fn find_line_ends(&self, n: NodeId, line: &Line) -> (Option<Joint>, Option<Joint>) {
        let probe = self.line_probe_layers(line);
        let a = self
            .find_joint(n, line.first_pt(), probe, line.net())
            .cloned();
        let b = self.find_joint(n, line.last_pt(), probe, line.net()).cloned();
        (a, b)
    }

    fn line_probe_layers(&self, line: &Line) -> i32 {
        line.layer()
    }

    pub fn find_lines_between_joints(&self, n: NodeId, a: &Joint, b: &Joint) -> Vec<Line> {
        let mut out = Vec::new();
        for &id in a.links() {
            let Some(item) = self.item(id) else { continue };
            if !matches!(item, Item::Segment(_) | Item::Arc(_)) {
                continue;
            }
            let line = self.assemble_line(n, id, None, AssembleOpts::default());
            if !line.line().pts().contains(&b.pos()) {
                continue;
            }
            let (Some(i0), Some(i1)) = (line.line().find(a.pos()), line.line().find(b.pos()))
            else {
                continue;
            };
            let (i0, i1) = (i0.min(i1), i0.max(i1));
            let mut clipped = line.clone();
            clipped.set_shape(line.line().slice(i0, i1 as isize));
            out.push(clipped);
        }
        out
    }

    pub fn all_items_in_net(&self, n: NodeId, net: NetHandle, kind_mask: KindMask) -> Vec<ItemId> {
        let mut out: Vec<ItemId> = Vec::new();
        let node = self.node(n);
        out.extend(node.index.items_for_net(net).filter(|&id| {
            self.item(id).is_some_and(|i| i.of_kind(kind_mask) && i.is_routable())
        }));
        if !self.is_root(n) {
            out.extend(self.node(ROOT).index.items_for_net(net).filter(|&id| {
                !node.overrides.contains(&id)
                    && self.item(id).is_some_and(|i| i.of_kind(kind_mask) && i.is_routable())
            }));
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    // ------------------------------------------------------------------
    // virtual vias

    // Pins multi-line joints, width-change points and locked segments with
    // synthetic vias so the shove engine treats them as rigid pivots.
    pub fn fixup_virtual_vias(&mut self, n: NodeId) {
        let mut vvias: Vec<Via> = Vec::new();

        for joint in self.query_joints(n, &self.visible_bounds(n), LayerSet::new(0, 63), KindMask::all())
        {
            if joint.layers().is_multilayer() {
                continue;
            }
            let mut n_seg = 0;
            let mut n_solid = 0;
            let mut n_vias = 0;
            let mut prev_w = -1i64;
            let mut max_w = -1i64;
            let mut width_change = false;
            let mut locked_seg: Option<ItemId> = None;

            for &id in joint.links() {
                match self.item(id) {
                    Some(Item::Via(_)) => n_vias += 1,
                    Some(Item::Solid(_)) => n_solid += 1,
                    Some(Item::Segment(s)) => {
                        n_seg += 1;
                        if prev_w >= 0 && s.width != prev_w {
                            width_change = true;
                        }
                        max_w = max_w.max(s.width);
                        prev_w = s.width;
                        if s.locked {
                            locked_seg = Some(id);
                        }
                    }
                    _ => {}
                }
            }

            let is_locked = joint.is_locked() || locked_seg.is_some();

            if (width_change || n_seg >= 3 || is_locked) && n_solid == 0 && n_vias == 0 {
                vvias.push(Via::new_virtual(
                    joint.pos(),
                    joint.layers().start(),
                    max_w + 2 * HULL_MARGIN,
                    joint.net(),
                ));
            }

            // Pin the far end of a locked segment so both its joints stay
            // put.
            if is_locked {
                if let Some(seg_id) = locked_seg {
                    if let Some(Item::Segment(s)) = self.item(seg_id) {
                        let far =
                            if s.seg.st() == joint.pos() { s.seg.en() } else { s.seg.st() };
                        vvias.push(Via::new_virtual(
                            far,
                            joint.layers().start(),
                            max_w + 2 * HULL_MARGIN,
                            joint.net(),
                        ));
                    }
                }
            }
        }

        for v in vvias {
            self.add(n, Item::Via(v), true);
        }
    }

    fn visible_bounds(&self, n: NodeId) -> Rt {
        let mut b = self.node(n).index.bounds();
        if !self.is_root(n) {
            b = b.united(&self.node(ROOT).index.bounds());
        }
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pt, seg};
    use crate::item::ParentHandle;
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(200)))
    }

    fn seg_item(a: Pt, b: Pt, width: i64, net: u64) -> Item {
        Item::Segment(SegmentItem {
            id: ItemId::INVALID,
            net: NetHandle(net),
            layer: 0,
            seg: seg(a, b),
            width,
            parent: ParentHandle::default(),
            rank: -1,
            marker: 0,
            locked: false,
        })
    }

    #[test]
    fn test_add_remove_roundtrip() {
        let mut w = world();
        let id = w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap();
        assert_eq!(w.owner_of(id), Some(ROOT));
        assert!(w.find_joint(ROOT, pt(0, 0), 0, NetHandle(1)).is_some());
        w.remove(ROOT, id);
        assert!(w
            .find_joint(ROOT, pt(0, 0), 0, NetHandle(1))
            .map_or(true, |j| j.is_empty()));
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut w = world();
        assert!(w.add(ROOT, seg_item(pt(5, 5), pt(5, 5), 200, 1), false).is_none());
    }

    #[test]
    fn test_redundant_segment_refused() {
        let mut w = world();
        assert!(w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).is_some());
        assert!(w.add(ROOT, seg_item(pt(1000, 0), pt(0, 0), 200, 1), false).is_none());
        assert!(w.add(ROOT, seg_item(pt(1000, 0), pt(0, 0), 200, 1), true).is_some());
    }

    #[test]
    fn test_branch_override_visibility() {
        let mut w = world();
        let id = w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap();
        let b = w.branch(ROOT);

        // removing a root item from a branch shadows it there only
        w.remove(b, id);
        assert!(w.overrides(b, id));
        assert_eq!(w.owner_of(id), Some(ROOT));

        // collision probe on net 2 sees nothing in the branch...
        let probe = seg_item(pt(0, 100), pt(1000, 100), 200, 2);
        assert!(w.check_colliding(b, &probe, &CollisionOpts::default()).is_none());
        // ...but still collides in the root
        assert!(w.check_colliding(ROOT, &probe, &CollisionOpts::default()).is_some());
    }

    #[test]
    fn test_commit_preserves_visible_set() {
        let mut w = world();
        let root_seg = w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap();
        let b = w.branch(ROOT);
        w.remove(b, root_seg);
        let added = w.add(b, seg_item(pt(0, 500), pt(1000, 500), 200, 1), false).unwrap();

        w.commit(ROOT, b);
        assert!(w.item(root_seg).is_none() || w.owner_of(root_seg).is_none());
        assert_eq!(w.owner_of(added), Some(ROOT));
        assert!(!w.is_alive(b));
    }

    #[test]
    fn test_branch_commit_is_noop() {
        let mut w = world();
        let id = w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap();
        let before = w.items_owned_by(ROOT);

        let b = w.branch(ROOT);
        w.commit(ROOT, b);

        assert_eq!(w.items_owned_by(ROOT), before);
        assert_eq!(w.owner_of(id), Some(ROOT));
        let probe = seg_item(pt(0, 100), pt(1000, 100), 200, 2);
        assert!(w.check_colliding(ROOT, &probe, &CollisionOpts::default()).is_some());
    }

    #[test]
    fn test_kill_children() {
        let mut w = world();
        let b = w.branch(ROOT);
        let c = w.branch(b);
        let id = w.add(c, seg_item(pt(0, 0), pt(500, 0), 100, 1), false).unwrap();
        w.kill_children(ROOT);
        assert!(!w.is_alive(b));
        assert!(!w.is_alive(c));
        assert!(w.item(id).is_none());
        assert!(w.children(ROOT).is_empty());
    }

    #[test]
    fn test_assemble_line() {
        let mut w = world();
        let s1 = w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap();
        let _s2 = w.add(ROOT, seg_item(pt(1000, 0), pt(2000, 1000), 200, 1), false).unwrap();
        let _s3 = w.add(ROOT, seg_item(pt(2000, 1000), pt(3000, 1000), 200, 1), false).unwrap();

        let line = w.assemble_line(ROOT, s1, None, AssembleOpts::default());
        assert_eq!(line.pt_count(), 4);
        assert_eq!(line.first_pt(), pt(0, 0));
        assert_eq!(line.last_pt(), pt(3000, 1000));
        assert_eq!(line.link_count(), 3);
    }

    #[test]
    fn test_assemble_line_idempotent() {
        let mut w = world();
        let mut ids = Vec::new();
        ids.push(w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap());
        ids.push(w.add(ROOT, seg_item(pt(1000, 0), pt(2000, 0), 200, 1), false).unwrap());
        ids.push(w.add(ROOT, seg_item(pt(2000, 0), pt(2000, 1000), 200, 1), false).unwrap());

        let reference = w.assemble_line(ROOT, ids[0], None, AssembleOpts::default());
        for &id in &ids {
            let line = w.assemble_line(ROOT, id, None, AssembleOpts::default());
            let same = line.line().pts() == reference.line().pts()
                || line.reversed().line().pts() == reference.line().pts();
            assert!(same, "assembly from {id:?} differs");
        }
    }

    #[test]
    fn test_assemble_stops_at_fanout() {
        let mut w = world();
        let s1 = w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false).unwrap();
        let _s2 = w.add(ROOT, seg_item(pt(1000, 0), pt(2000, 0), 200, 1), false).unwrap();
        let _s3 = w.add(ROOT, seg_item(pt(1000, 0), pt(1000, 1000), 200, 1), false).unwrap();

        let line = w.assemble_line(ROOT, s1, None, AssembleOpts::default());
        assert_eq!(line.pt_count(), 2);
        assert_eq!(line.last_pt(), pt(1000, 0));
    }

    #[test]
    fn test_fixup_virtual_vias() {
        let mut w = world();
        // three-way joint with a width change
        w.add(ROOT, seg_item(pt(0, 0), pt(1000, 0), 200, 1), false);
        w.add(ROOT, seg_item(pt(1000, 0), pt(2000, 0), 200, 1), false);
        w.add(ROOT, seg_item(pt(1000, 0), pt(1000, 1000), 400, 1), false);

        w.fixup_virtual_vias(ROOT);

        let joint = w.find_joint(ROOT, pt(1000, 0), 0, NetHandle(1)).unwrap();
        let via = w.joint_via(joint).expect("vvia missing");
        let Some(Item::Via(v)) = w.item(via) else { panic!() };
        assert!(v.is_virtual);
        assert!(v.diameter(0) >= 400 + 2 * HULL_MARGIN);

        // exactly one vvia at this joint
        let count = joint
            .links()
            .iter()
            .filter(|&&id| matches!(w.item(id), Some(Item::Via(_))))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_via_hole_collides() {
        let mut w = world();
        let via = Via::new(pt(0, 0), LayerSet::new(0, 31), 600, 300, NetHandle(1));
        w.add(ROOT, Item::Via(via), false).unwrap();
        // track on another layer still collides with the hole
        let probe = Item::Segment(SegmentItem {
            id: ItemId::INVALID,
            net: NetHandle(2),
            layer: 5,
            seg: seg(pt(-1000, 200), pt(1000, 200)),
            width: 200,
            parent: ParentHandle::default(),
            rank: -1,
            marker: 0,
            locked: false,
        });
        let obs = w.check_colliding(ROOT, &probe, &CollisionOpts::default());
        assert!(obs.is_some());
    }

    #[test]
    fn test_nearest_obstacle_orders_along_line() {
        let mut w = world();
        let near = w.add(ROOT, seg_item(pt(2000, -500), pt(2000, 500), 200, 2), false).unwrap();
        let far = w.add(ROOT, seg_item(pt(6000, -500), pt(6000, 500), 200, 3), false).unwrap();

        let line = Line::new(
            crate::geom::pll(&[pt(0, 0), pt(8000, 0)]),
            200,
            0,
            NetHandle(1),
        );
        let obs = w.nearest_obstacle(ROOT, &line, &CollisionOpts::default()).unwrap();
        assert_eq!(obs.item, near);
        assert_ne!(obs.item, far);
        assert!(obs.dist_first < 2000);
    }
}
