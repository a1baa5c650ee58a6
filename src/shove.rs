use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::geom::dist::{circle_polyline_mtv, circle_shape_mtv};
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::rect::Rt;
use crate::hull::item_hull;
use crate::item::{Item, ItemId, Kind, KindMask, SegmentItem, Via, ViaHandle};
use crate::line::Line;
use crate::node::{CollisionOpts, NodeId, Obstacle, World};
use crate::optimizer::{Effort, EffortSet, Optimizer};
use crate::settings::{OptimizerEffort, RoutingSettings};
use crate::topo::Topology;
use crate::walkaround::{WalkPolicy, WalkStatus, Walkaround};

// Per-head / per-root-line shove policies.
pub const SHP_DEFAULT: u32 = 0;
pub const SHP_SHOVE: u32 = 0x1;
pub const SHP_WALK_FORWARD: u32 = 0x2;
pub const SHP_WALK_BACK: u32 = 0x4;
pub const SHP_IGNORE: u32 = 0x8;
pub const SHP_DONT_OPTIMIZE: u32 = 0x10;
pub const SHP_DONT_LOCK_ENDPOINTS: u32 = 0x20;

const HEAD_RANK: i64 = 100_000;
const JUMP_OVER_RANK_STEP: i64 = 10_000;
const ENDPOINT_ON_HULL_THRESHOLD: i64 = 1000;
const HULL_FAILURE_EXPANSION: i64 = 1000;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ShoveStatus {
    Ok,
    Incomplete,
    TryWalk,
}

// The pre-shove shape of a physical line (or via), keyed by the uids of
// its links. The optimizer treats the root line as a "do not deform
// beyond this" reference.
#[derive(Debug, Default)]
pub struct RootLineEntry {
    pub root_line: Option<Line>,
    pub new_line: Option<Line>,
    pub old_via: Option<ViaHandle>,
    pub new_via: Option<ViaHandle>,
    pub policy: u32,
    pub is_head: bool,
}

type RootEntryRef = Rc<RefCell<RootLineEntry>>;

// Snapshot of a committed shove state; popped as the cursor backs off.
#[derive(Debug)]
struct SpringbackTag {
    node: NodeId,
    affected_area: Option<Rt>,
    dragged_vias: Vec<Option<ViaHandle>>,
    locked: bool,
    seq: u32,
}

#[derive(Debug, Default)]
struct HeadLineEntry {
    orig_head: Option<Line>,
    the_via: Option<ViaHandle>,
    prev_via: Option<ViaHandle>,
    via_new_pos: Option<Pt>,
    new_head: Option<Line>,
    policy: u32,
    geometry_modified: bool,
}

// The recursive push engine. Strictly iterative: pending lines live on an
// explicit rank-ordered stack, tentative worlds on a springback stack.
pub struct Shove {
    root: NodeId,
    current_node: NodeId,
    settings: RoutingSettings,
    node_stack: Vec<SpringbackTag>,
    line_stack: Vec<Line>,
    optimizer_queue: Vec<Line>,
    root_line_history: HashMap<u64, RootEntryRef>,
    affected_area: Option<Rt>,
    head_lines: Vec<HeadLineEntry>,
    iter: u32,
    default_policy: u32,
    opt_disable_mask: EffortSet,
    springback_do_not_touch: Option<NodeId>,
    heads_modified: bool,
}

impl Shove {
    pub fn new(root: NodeId, settings: RoutingSettings) -> Self {
        Self {
            root,
            current_node: root,
            settings,
            node_stack: Vec::new(),
            line_stack: Vec::new(),
            optimizer_queue: Vec::new(),
            root_line_history: HashMap::new(),
            affected_area: None,
            head_lines: Vec::new(),
            iter: 0,
            default_policy: SHP_SHOVE,
            opt_disable_mask: EffortSet::empty(),
            springback_do_not_touch: None,
            heads_modified: false,
        }
    }

    pub fn current_node(&self) -> NodeId {
        self.current_node
    }

    pub fn set_default_policy(&mut self, policy: u32) {
        self.default_policy = policy;
    }

    pub fn disable_post_shove_optimizations(&mut self, mask: EffortSet) {
        self.opt_disable_mask = mask;
    }

    pub fn set_springback_do_not_touch_node(&mut self, node: Option<NodeId>) {
        self.springback_do_not_touch = node;
    }

    pub fn clear_heads(&mut self) {
        self.head_lines.clear();
    }

    pub fn add_head_line(&mut self, head: &Line, policy: u32) {
        self.head_lines.push(HeadLineEntry {
            orig_head: Some(head.clone()),
            policy,
            ..HeadLineEntry::default()
        });
    }

    pub fn add_head_via(&mut self, via: ViaHandle, new_pos: Pt, policy: u32) {
        self.head_lines.push(HeadLineEntry {
            the_via: Some(via),
            prev_via: Some(via),
            via_new_pos: Some(new_pos),
            policy,
            ..HeadLineEntry::default()
        });
    }

    pub fn heads_modified(&self) -> bool {
        self.heads_modified
    }

    pub fn head_modified(&self, index: usize) -> bool {
        self.head_lines[index].geometry_modified
    }

    pub fn modified_head(&self, index: usize) -> Option<&Line> {
        self.head_lines[index].new_head.as_ref()
    }

    pub fn modified_head_via(&self, index: usize) -> Option<ViaHandle> {
        self.head_lines[index].the_via
    }

    // ------------------------------------------------------------------
    // root line history

    fn find_root_line_by_line(&self, line: &Line) -> Option<RootEntryRef> {
        for link in line.links() {
            if let Some(e) = self.root_line_history.get(&link.0) {
                return Some(e.clone());
            }
        }
        line.via()
            .and_then(|v| self.root_line_history.get(&v.id.0).cloned())
    }

    fn find_root_line_by_uid(&self, id: ItemId) -> Option<RootEntryRef> {
        self.root_line_history.get(&id.0).cloned()
    }

    fn touch_root_line(&mut self, line: &Line) -> RootEntryRef {
        if let Some(e) = self.find_root_line_by_line(line) {
            return e;
        }
        let entry: RootEntryRef = Rc::new(RefCell::new(RootLineEntry {
            root_line: Some(line.clone()),
            policy: self.default_policy,
            ..RootLineEntry::default()
        }));
        for link in line.links() {
            self.root_line_history.insert(link.0, entry.clone());
        }
        if let Some(v) = line.via() {
            self.root_line_history.insert(v.id.0, entry.clone());
        }
        entry
    }

    fn touch_root_line_item(&mut self, id: ItemId) -> RootEntryRef {
        if let Some(e) = self.find_root_line_by_uid(id) {
            return e;
        }
        let entry: RootEntryRef = Rc::new(RefCell::new(RootLineEntry {
            policy: self.default_policy,
            ..RootLineEntry::default()
        }));
        self.root_line_history.insert(id.0, entry.clone());
        entry
    }

    pub fn set_shove_policy_line(&mut self, line: &Line, policy: u32) {
        self.touch_root_line(line).borrow_mut().policy = policy;
    }

    pub fn set_shove_policy_item(&mut self, id: ItemId, policy: u32) {
        self.touch_root_line_item(id).borrow_mut().policy = policy;
    }

    fn prune_root_lines(&mut self, world: &World, removed_node: NodeId) {
        let (_, added) = world.updated_items(removed_node);
        for id in added {
            self.root_line_history.remove(&id.0);
        }
    }

    // ------------------------------------------------------------------
    // stacks

    fn line_contains_link(line: &Line, id: ItemId) -> bool {
        line.contains_link(id) || line.via().is_some_and(|v| v.id == id)
    }

    fn unwind_line_stack_item(&mut self, id: ItemId, item_is_via: bool) {
        let mut i = 0;
        while i < self.line_stack.len() {
            if Self::line_contains_link(&self.line_stack[i], id) {
                // Keep the via of a "tadpole" even when its parent line
                // dies; on other layers that via is still a collider.
                let ends_with_via = self.line_stack[i].ends_with_via();
                if ends_with_via && !item_is_via {
                    let via = self.line_stack[i].via().cloned();
                    let l = &mut self.line_stack[i];
                    l.clear_links();
                    l.line_mut().clear();
                    if let Some(v) = via {
                        l.append_via(v);
                    }
                    i += 1;
                } else {
                    self.line_stack.remove(i);
                }
            } else {
                i += 1;
            }
        }

        if !item_is_via {
            self.optimizer_queue.retain(|l| !Self::line_contains_link(l, id));
        }
    }

    fn unwind_line_stack(&mut self, world: &World, id: ItemId) {
        let is_via = matches!(world.item(id), Some(Item::Via(_)));
        self.unwind_line_stack_item(id, is_via);
    }

    fn unwind_line_stack_line(&mut self, line: &Line) {
        for &link in line.links() {
            self.unwind_line_stack_item(link, false);
        }
    }

    fn push_line_stack(&mut self, line: Line) -> bool {
        if !line.is_linked() && line.seg_count() != 0 {
            trace!("push line stack failed: unlinked line");
            return false;
        }
        self.prune_line_from_optimizer_queue(&line);
        self.optimizer_queue.push(line.clone());
        self.line_stack.push(line);
        true
    }

    fn prune_line_from_optimizer_queue(&mut self, line: &Line) {
        self.optimizer_queue
            .retain(|q| !line.links().iter().any(|&s| Self::line_contains_link(q, s)));
    }

    fn pop_line_stack(&mut self) {
        if let Some(l) = self.line_stack.pop() {
            self.prune_line_from_optimizer_queue(&l);
        }
    }

    // ------------------------------------------------------------------
    // line replacement

    // Rank lives on the physical items; a line's rank is meaningless until
    // it reaches them.
    fn set_line_rank(&self, world: &mut World, line: &mut Line, rank: i64) {
        line.set_rank(rank);
        for id in line.links().to_vec() {
            if let Some(item) = world.item_mut(id) {
                item.set_rank(rank);
            }
        }
        if let Some(v) = line.via() {
            if v.id.is_valid() {
                if let Some(item) = world.item_mut(v.id) {
                    item.set_rank(rank);
                }
            }
        }
    }

    fn replace_line(
        &mut self,
        world: &mut World,
        old: &Line,
        new: &mut Line,
        include_in_changed_area: bool,
        allow_redundant: bool,
    ) -> RootEntryRef {
        if include_in_changed_area {
            let area = old.bounds().united(&new.bounds());
            self.affected_area =
                Some(self.affected_area.map_or(area, |a| a.united(&area)));
        }

        let entry = self.touch_root_line(old);
        let mut old_copy = old.clone();
        world.replace_line(self.current_node, &mut old_copy, new, allow_redundant);
        entry.borrow_mut().new_line = Some(new.clone());

        for link in new.links() {
            self.root_line_history.insert(link.0, entry.clone());
        }
        if let Some(v) = new.via() {
            self.root_line_history.insert(v.id.0, entry.clone());
        }
        entry
    }

    fn replace_via(
        &mut self,
        world: &mut World,
        old_id: ItemId,
        new_via: Via,
    ) -> Option<ItemId> {
        let old = world.item(old_id)?.clone();
        let area = old.bounds().united(&new_via.shape(new_via.layers.start()).bounds());
        self.affected_area = Some(self.affected_area.map_or(area, |a| a.united(&area)));

        let entry = self.touch_root_line_item(old_id);
        if let Item::Via(ov) = &old {
            let mut e = entry.borrow_mut();
            if e.old_via.is_none() {
                e.old_via = Some(ov.handle());
            }
        }
        world.remove(self.current_node, old_id);
        let mut v = new_via;
        // fresh uid: the overridden original keeps living in its ancestor
        v.id = ItemId::INVALID;
        v.hole = None;
        let new_id = world.add(self.current_node, Item::Via(v), true)?;
        entry.borrow_mut().new_via = world.item(new_id).and_then(|i| match i {
            Item::Via(nv) => Some(nv.handle()),
            _ => None,
        });
        self.root_line_history.insert(new_id.0, entry);
        Some(new_id)
    }

    // ------------------------------------------------------------------
    // geometry of a shove

    fn line_probe(&self, line: &Line) -> Item {
        Item::Segment(SegmentItem {
            id: ItemId::INVALID,
            net: line.net(),
            layer: line.layer(),
            seg: if line.seg_count() > 0 {
                line.seg(0)
            } else {
                crate::geom::seg(line.first_pt(), line.first_pt())
            },
            width: line.width(),
            parent: Default::default(),
            rank: -1,
            marker: 0,
            locked: false,
        })
    }

    // The shoved line must land on the outside of the pusher: the closed
    // polygon of (obstacle + reversed shoved) must not swallow the
    // pusher's start. A heuristic guard, not a proof.
    fn check_shove_direction(cur: &Line, obstacle: &Line, shoved: &Line) -> bool {
        if cur.pt_count() == 0 {
            return true;
        }
        let mut poly = obstacle.line().clone();
        let rev = shoved.line().reversed();
        for &p in rev.pts() {
            poly.append(p);
        }
        poly.set_closed(true);
        !poly.point_strictly_inside(cur.first_pt())
    }

    // Push the obstacle line away from the pusher's lone via.
    fn shove_line_from_lone_via(
        &mut self,
        world: &mut World,
        cur: &Line,
        obstacle: &Line,
    ) -> Option<Line> {
        let via = cur.via()?;
        let obs_probe = self.line_probe(obstacle);
        let mut clearance =
            world.clearance(&Item::Via(via.clone()), &obs_probe, false);

        // The hole may demand more room than the pad ring.
        if let Some(hole_id) = via.hole {
            if let Some(hole) = world.item(hole_id) {
                let hole_cl = world.clearance(hole, &obs_probe, false);
                let layer = obstacle.layer();
                if hole_cl + via.drill / 2 > clearance + via.diameter(layer) / 2 {
                    clearance = hole_cl + via.drill / 2 - via.diameter(layer) / 2;
                }
            }
        }

        let hull = crate::hull::circle_hull(
            &crate::geom::circ(via.pos, via.diameter(obstacle.layer()) / 2),
            clearance + obstacle.width() / 2,
        );

        let path_cw = obstacle.line().walkaround(&hull, true)?;
        let path_ccw = obstacle.line().walkaround(&hull, false)?;
        let shortest = if path_ccw.len() < path_cw.len() { path_ccw } else { path_cw };

        if shortest.pt_count() < 2 {
            return None;
        }
        if shortest.last_pt() != obstacle.last_pt() || shortest.first_pt() != obstacle.first_pt() {
            return None;
        }

        let mut result = obstacle.clone();
        result.clear_links();
        result.set_shape(shortest);

        let cl = self.shove_check_clearance(world, cur, obstacle);
        if result.collides_with_line(cur, cl) {
            return None;
        }
        Some(result)
    }

    // Re-walk the obstacle around the hull chain, trying the four
    // (invert, clockwise) combinations plus endpoint snapping.
    fn shove_line_to_hull_set(
        &mut self,
        world: &mut World,
        cur: &Line,
        obstacle: &Line,
        hulls: &[Polyline],
        permit_adjust_start: bool,
        permit_adjust_end: bool,
    ) -> Option<Line> {
        let permit_adjust = permit_adjust_start || permit_adjust_end;
        // epsilon-reduced: integer rounding of hull vertices must not read
        // as a violation of an exactly-tangent result
        let clearance = self.shove_check_clearance(world, cur, obstacle);

        for attempt in 0..4 {
            let invert = attempt >= 2;
            let clockwise = attempt % 2 == 1;

            let mut l = obstacle.clone();
            l.clear_links();

            if permit_adjust && l.seg_count() >= 1 {
                let nearest_on_hulls = |pref: Pt| -> Option<Pt> {
                    let mut best: Option<(i64, Pt)> = None;
                    for i in 0..hulls.len() {
                        let hull = &hulls[if invert { hulls.len() - 1 - i } else { i }];
                        let p = hull.nearest_pt(pref);
                        let dist = if hull.point_inside(pref) {
                            0
                        } else {
                            p.dist(pref).round() as i64
                        };
                        if dist < ENDPOINT_ON_HULL_THRESHOLD
                            && best.map_or(true, |(d, _)| dist < d)
                        {
                            best = Some((dist, p));
                        }
                    }
                    best.map(|(_, p)| p)
                };

                if permit_adjust_end {
                    if let Some(p) = nearest_on_hulls(l.last_pt()) {
                        l.line_mut().append(p);
                    }
                }
                if permit_adjust_start {
                    if let Some(p) = nearest_on_hulls(l.first_pt()) {
                        l.line_mut().insert(0, p);
                    }
                }
            }

            let obs = l.line().clone();
            let mut path = l.line().clone();
            let mut fail_walk = false;

            for i in 0..hulls.len() {
                let hull = &hulls[if invert { hulls.len() - 1 - i } else { i }];
                match path.walkaround(hull, clockwise) {
                    Some(p) => path = p.simplified(),
                    None => {
                        fail_walk = true;
                        break;
                    }
                }
            }
            if fail_walk {
                continue;
            }

            if path.first_pt() != obs.first_pt() || path.last_pt() != obs.last_pt() {
                trace!("shove attempt {attempt}: endpoints moved");
                continue;
            }

            l.set_shape(path);

            if !Self::check_shove_direction(cur, obstacle, &l) {
                trace!("shove attempt {attempt}: direction check failed");
                continue;
            }
            if l.line().self_intersecting() {
                continue;
            }
            if l.collides_with_line(cur, clearance) {
                continue;
            }
            return Some(l);
        }
        None
    }

    fn shove_check_clearance(&self, world: &World, cur: &Line, obstacle: &Line) -> i64 {
        world.clearance(&self.line_probe(cur), &self.line_probe(obstacle), true)
    }

    // Push the obstacle line out of the pusher's way by the clearance
    // distance.
    pub fn shove_obstacle_line(
        &mut self,
        world: &mut World,
        cur: &Line,
        obstacle_line: &Line,
    ) -> Option<Line> {
        let (jt_start, jt_end) = world.find_line_ends(self.current_node, obstacle_line);
        let voe_start = jt_start.map_or(false, |j| world.joint_via(&j).is_some());
        let voe_end = jt_end.map_or(false, |j| world.joint_via(&j).is_some());

        let mut obstacle = obstacle_line.clone();
        let obs_via = obstacle.remove_via();

        let result = if cur.ends_with_via()
            && (cur.layer() != obstacle.layer() || cur.seg_count() == 0)
        {
            self.shove_line_from_lone_via(world, cur, &obstacle)
        } else {
            let obs_probe = self.line_probe(&obstacle);
            let base_clearance =
                world.clearance(&self.line_probe(cur), &obs_probe, false);
            let mut extra = 0;
            let mut found = None;

            for attempt in 0..3 {
                let mut hulls: Vec<Polyline> = Vec::with_capacity(cur.seg_count() + 1);
                for i in 0..cur.seg_count() {
                    let mut cl = base_clearance + extra;
                    if cur.line().is_arc_seg(i) {
                        cl += crate::hull::ARC_ACCURACY;
                    }
                    let seg_item = Item::Segment(SegmentItem {
                        id: ItemId::INVALID,
                        net: cur.net(),
                        layer: cur.layer(),
                        seg: cur.seg(i),
                        width: cur.width(),
                        parent: Default::default(),
                        rank: -1,
                        marker: 0,
                        locked: false,
                    });
                    hulls.push(item_hull(&seg_item, cl, obstacle.width(), obstacle.layer()));
                }

                if let Some(via) = cur.via() {
                    let mut via_cl =
                        world.clearance(&Item::Via(via.clone()), &obs_probe, false);
                    if let Some(hole_id) = via.hole {
                        if let Some(hole) = world.item(hole_id) {
                            let hole_cl = world.clearance(hole, &obs_probe, false);
                            let layer = obstacle.layer();
                            if hole_cl + via.drill / 2 > via_cl + via.diameter(layer) / 2 {
                                via_cl = hole_cl + via.drill / 2 - via.diameter(layer) / 2;
                            }
                        }
                    }
                    hulls.push(crate::hull::circle_hull(
                        &crate::geom::circ(via.pos, via.diameter(obstacle.layer()) / 2),
                        via_cl + extra + obstacle.width() / 2,
                    ));
                }

                let permit_start = attempt >= 2 && !voe_start;
                let permit_end = attempt >= 2 && !voe_end;

                if let Some(res) = self.shove_line_to_hull_set(
                    world,
                    cur,
                    &obstacle,
                    &hulls,
                    permit_start,
                    permit_end,
                ) {
                    found = Some(res);
                    break;
                }
                extra += HULL_FAILURE_EXPANSION;
            }
            found
        };

        result.map(|mut r| {
            if let Some(v) = obs_via {
                r.append_via(v);
            }
            r
        })
    }

    // ------------------------------------------------------------------
    // collision handlers

    fn assemble(&self, world: &World, seed: ItemId) -> Line {
        world.assemble_line(self.current_node, seed, None, Default::default())
    }

    fn line_has_locked_links(&self, world: &World, line: &Line) -> bool {
        line.links()
            .iter()
            .any(|&id| world.item(id).is_some_and(Item::is_locked))
    }

    fn on_colliding_segment(
        &mut self,
        world: &mut World,
        current: &Line,
        obstacle_id: ItemId,
    ) -> ShoveStatus {
        let assembled = self.assemble(world, obstacle_id);
        if self.line_has_locked_links(world, &assembled) {
            trace!("try walk (locked segments)");
            return ShoveStatus::TryWalk;
        }
        let obstacle_line = self.pre_shove_cleanup(world, &assembled).unwrap_or(assembled);

        match self.shove_obstacle_line(world, current, &obstacle_line) {
            Some(mut shoved) => {
                debug_assert!(obstacle_line.layer() == shoved.layer());
                shoved.line_mut().simplify();
                self.unwind_line_stack_line(&obstacle_line);
                self.replace_line(world, &obstacle_line, &mut shoved, true, false);
                self.set_line_rank(world, &mut shoved, current.rank() - 1);
                if !self.push_line_stack(shoved) {
                    return ShoveStatus::Incomplete;
                }
                ShoveStatus::Ok
            }
            None => ShoveStatus::Incomplete,
        }
    }

    fn on_colliding_arc(
        &mut self,
        world: &mut World,
        current: &Line,
        obstacle_id: ItemId,
    ) -> ShoveStatus {
        // Arc obstacles ride the same path as segments: assemble the whole
        // line and shove it.
        self.on_colliding_segment(world, current, obstacle_id)
    }

    fn on_colliding_line(
        &mut self,
        world: &mut World,
        current: &Line,
        obstacle: &Line,
        next_rank: i64,
    ) -> ShoveStatus {
        match self.shove_obstacle_line(world, current, obstacle) {
            Some(mut shoved) => {
                self.replace_line(world, obstacle, &mut shoved, true, false);
                self.set_line_rank(world, &mut shoved, next_rank);
                if !self.push_line_stack(shoved) {
                    return ShoveStatus::Incomplete;
                }
                ShoveStatus::Ok
            }
            None => ShoveStatus::Incomplete,
        }
    }

    // Walk the current line around a rigid obstacle cluster, accepting the
    // result only if it leaves the rest of the stack shovable.
    fn on_colliding_solid(
        &mut self,
        world: &mut World,
        current: &Line,
        obstacle_id: ItemId,
        obstacle_info: &Obstacle,
    ) -> ShoveStatus {
        // A trailing via may be the actual collider; push it instead.
        if current.ends_with_via() {
            if let Some(via) = current.via() {
                let jt = world
                    .find_joint(self.current_node, via.pos, current.layer(), current.net())
                    .cloned();
                if let Some(jt) = jt {
                    if let Some(via_id) = world.joint_via(&jt) {
                        let via_item = world.item(via_id).cloned();
                        let obs_item = world.item(obstacle_id).cloned();
                        if let (Some(via_item), Some(obs_item)) = (via_item, obs_item) {
                            let cl = world.clearance(&via_item, &obs_item, false);
                            if via_item.collides(&obs_item, cl) {
                                let rank = obs_item.rank() - 1;
                                return self.on_colliding_via(
                                    world,
                                    current,
                                    via_id,
                                    obstacle_info,
                                    rank,
                                );
                            }
                        }
                    }
                }
            }
        }

        let cluster = {
            let mut topo = Topology::new(world, self.current_node);
            topo.assemble_cluster(obstacle_id, current.layer(), 10.0, None)
        };

        let current_rank = current.rank();
        let mut success = false;
        let mut next_rank = current_rank - 1;
        let mut walk_line = current.clone();

        for attempt in 0..2 {
            next_rank = if attempt == 1 || self.settings.jump_over_obstacles {
                current_rank - 1
            } else {
                current_rank + JUMP_OVER_RANK_STEP
            };

            let result = {
                let mut walk = Walkaround::new(world, self.current_node, &self.settings);
                walk.set_solids_only(false);
                walk.restrict_to_cluster(true, &cluster);
                walk.set_allowed_policies(&[WalkPolicy::Shortest]);
                walk.set_iteration_limit(self.settings.walkaround_iteration_limit);
                walk.route(current)
            };

            if result.status(WalkPolicy::Shortest) != WalkStatus::Done {
                continue;
            }

            let mut candidate = result.line(WalkPolicy::Shortest).clone();
            candidate.clear_links();
            candidate.line_mut().simplify();
            if candidate.has_loops() {
                continue;
            }

            if let Some(last) = self.line_stack.first().cloned() {
                let cl = world
                    .clearance(&self.line_probe(&last), &self.line_probe(&candidate), false);
                if last.collides_with_line(&candidate, cl) {
                    if self.shove_obstacle_line(world, &candidate, &last).is_some() {
                        success = true;
                    }
                } else {
                    success = true;
                }
            } else {
                success = true;
            }

            if success {
                walk_line = candidate;
                break;
            }
        }

        if !success {
            return ShoveStatus::Incomplete;
        }

        let mut replacement = walk_line.clone();
        self.replace_line(world, current, &mut replacement, true, false);
        self.set_line_rank(world, &mut replacement, next_rank);

        self.pop_line_stack();
        if !self.push_line_stack(replacement) {
            return ShoveStatus::Incomplete;
        }
        ShoveStatus::Ok
    }

    // Minimum-translation push of a via out of the current line's way.
    fn on_colliding_via(
        &mut self,
        world: &mut World,
        current: &Line,
        via_id: ItemId,
        obstacle_info: &Obstacle,
        next_rank: i64,
    ) -> ShoveStatus {
        let Some(Item::Via(via)) = world.item(via_id).cloned() else {
            return ShoveStatus::Incomplete;
        };
        let layer = current.layer();

        let mut vtmp = via.clone();
        if obstacle_info.max_fanout_width > 0
            && obstacle_info.max_fanout_width > vtmp.diameter(layer)
        {
            vtmp.padstack.set_diameter(layer, obstacle_info.max_fanout_width);
        }

        let clearance =
            world.clearance(&Item::Via(via.clone()), &self.line_probe(current), false);

        let mtv_line = circle_polyline_mtv(
            vtmp.pos,
            vtmp.diameter(layer) / 2,
            current.line(),
            current.width(),
            clearance,
        );

        // The pusher's trailing via takes priority over its track.
        let mut mtv_via = None;
        if let Some(cv) = current.via() {
            let via_cl =
                world.clearance(&Item::Via(cv.clone()), &Item::Via(vtmp.clone()), false);
            mtv_via = circle_shape_mtv(
                vtmp.pos,
                vtmp.diameter(layer) / 2,
                &cv.shape(layer),
                via_cl,
            );
        }

        let force = mtv_via.or(mtv_line).unwrap_or(Pt::zero());
        self.push_or_shove_via(world, via_id, force, next_rank, false)
    }

    // Dragged into a via we already shoved: re-shove its fanout against
    // the current line instead.
    fn on_reverse_colliding_via(
        &mut self,
        world: &mut World,
        current: &Line,
        via_id: ItemId,
    ) -> ShoveStatus {
        let Some(Item::Via(obstacle_via)) = world.item(via_id).cloned() else {
            return ShoveStatus::Incomplete;
        };

        let mut cur = current.clone();
        cur.clear_links();
        cur.remove_via();

        self.unwind_line_stack_line(current);

        let joint = world
            .find_joint(self.current_node, obstacle_via.pos, obstacle_via.layers.start(), obstacle_via.net)
            .cloned();
        let Some(joint) = joint else { return ShoveStatus::Incomplete };

        let mut n = 0;
        for &link in joint.links() {
            let Some(item) = world.item(link) else { continue };
            if !matches!(item, Item::Segment(_) | Item::Arc(_)) {
                continue;
            }
            if !item.layers().overlaps(&crate::item::LayerSet::one(current.layer())) {
                continue;
            }
            let mut head = self.assemble(world, link);
            head.append_via(obstacle_via.clone());

            let Some(shoved) = self.shove_obstacle_line(world, &head, &cur) else {
                return ShoveStatus::Incomplete;
            };
            cur.set_shape(shoved.line().clone());
            n += 1;
        }

        if n == 0 {
            let mut head = current.clone();
            head.clear_links();
            head.line_mut().clear();
            head.append_via(obstacle_via);
            let Some(shoved) = self.shove_obstacle_line(world, &head, &cur) else {
                return ShoveStatus::Incomplete;
            };
            cur.set_shape(shoved.line().clone());
        }

        let mut shoved = cur;
        if let Some(v) = current.via() {
            shoved.append_via(v.clone());
        }

        let current_rank = current.rank();
        self.replace_line(world, current, &mut shoved, true, false);
        self.set_line_rank(world, &mut shoved, current_rank);
        if !self.push_line_stack(shoved) {
            return ShoveStatus::Incomplete;
        }
        ShoveStatus::Ok
    }

    // Push or shove a via by at least |force|; it may travel further so it
    // never lands on an existing joint.
    fn push_or_shove_via(
        &mut self,
        world: &mut World,
        via_id: ItemId,
        force: Pt,
        new_rank: i64,
        dont_unwind_stack: bool,
    ) -> ShoveStatus {
        if force.is_zero() {
            return ShoveStatus::Ok;
        }
        let Some(Item::Via(via)) = world.item(via_id).cloned() else {
            return ShoveStatus::Incomplete;
        };
        let p0 = via.pos;
        let joint = world
            .find_joint(self.current_node, p0, via.layers.start(), via.net)
            .cloned();
        let Some(joint) = joint else {
            trace!("can't find the center-of-via joint");
            return ShoveStatus::Incomplete;
        };

        if !self.settings.shove_vias || via.locked {
            return ShoveStatus::TryWalk;
        }
        if joint.is_locked() {
            return ShoveStatus::Incomplete;
        }

        // Step past any joint already sitting at the target.
        let mut p_pushed = p0 + force;
        let mut guard = 0;
        while world
            .find_joint(self.current_node, p_pushed, via.layers.start(), via.net)
            .is_some()
            && guard < 64
        {
            p_pushed += force.resized(2);
            guard += 1;
        }

        // Assemble the fanout before the via moves.
        let mut dragged: Vec<(Line, Line)> = Vec::new();
        for &link in joint.links() {
            let Some(item) = world.item(link) else { continue };
            if !matches!(item, Item::Segment(_) | Item::Arc(_)) {
                continue;
            }
            let pre =
                world.assemble_line(self.current_node, link, None, Default::default());
            if self.line_has_locked_links(world, &pre) {
                return ShoveStatus::TryWalk;
            }
            let mut pre = pre;
            // orient so the via sits at the end
            if pre.first_pt() == p0 {
                pre.reverse();
            }
            let mut post = pre.clone();
            post.clear_links();
            if let Some(idx) = post.line().find(p0) {
                post.drag_corner(p_pushed, idx);
            }
            post.line_mut().simplify();
            dragged.push((pre, post));
        }

        let mut pushed_via = via.clone();
        pushed_via.pos = p_pushed;
        pushed_via.rank = new_rank;

        if !dont_unwind_stack {
            self.unwind_line_stack(world, via_id);
        }

        let Some(new_via_id) = self.replace_via(world, via_id, pushed_via.clone()) else {
            return ShoveStatus::Incomplete;
        };
        let new_via_value = match world.item(new_via_id) {
            Some(Item::Via(v)) => v.clone(),
            _ => return ShoveStatus::Incomplete,
        };

        if dragged.is_empty() {
            // Stitching via: track it with a bare proxy line so the router
            // won't forget about it.
            let mut proxy = Line::new(Polyline::default(), 0, via.layers.start(), via.net);
            proxy.append_via(new_via_value);
            proxy.set_rank(new_rank);
            if !self.push_line_stack(proxy) {
                return ShoveStatus::Incomplete;
            }
            return ShoveStatus::Ok;
        }

        for (pre, post) in dragged {
            if !dont_unwind_stack {
                self.unwind_line_stack_line(&pre);
            }
            if post.seg_count() > 0 {
                let mut post = post;
                post.clear_links();
                let entry = self.replace_line(world, &pre, &mut post, true, true);
                post.append_via(new_via_value.clone());
                if !dont_unwind_stack {
                    self.unwind_line_stack_line(&post);
                }
                self.set_line_rank(world, &mut post, new_rank);
                entry.borrow_mut().new_line = Some(post.clone());
                if !self.push_line_stack(post) {
                    return ShoveStatus::Incomplete;
                }
            } else {
                let mut pre = pre;
                world.remove_line(self.current_node, &mut pre);
            }
        }

        ShoveStatus::Ok
    }

    // ------------------------------------------------------------------
    // heuristics

    // If a via hangs off tracks wider than itself (or vice versa), push
    // the via with the fanout width so the pair can't oscillate.
    fn fixup_via_collisions(
        &self,
        world: &World,
        current: &Line,
        obs: &mut Obstacle,
    ) -> bool {
        let layer = current.layer();
        let Some(item) = world.item(obs.item) else { return false };

        if let Item::Via(v) = item {
            let joint = world.find_joint(self.current_node, v.pos, v.layers.start(), v.net);
            let Some(joint) = joint else { return false };
            let mut maxw = 0;
            for &link in joint.links() {
                if let Some(Item::Segment(s)) = world.item(link) {
                    maxw = maxw.max(s.width);
                } else if let Some(Item::Arc(a)) = world.item(link) {
                    maxw = maxw.max(a.width);
                }
            }
            obs.max_fanout_width = 0;
            if maxw > 0 && maxw >= v.diameter(layer) {
                obs.max_fanout_width = maxw + 1;
                return true;
            }
            return false;
        }

        let Item::Segment(s) = item else { return false };
        let seg = s.clone();

        for p in [seg.seg.st(), seg.seg.en()] {
            let Some(joint) = world.find_joint(self.current_node, p, seg.layer, seg.net)
            else {
                continue;
            };
            let Some(via_id) = world.joint_via(joint) else { continue };
            let Some(Item::Via(v)) = world.item(via_id) else { continue };
            if v.diameter(seg.layer) > seg.width {
                continue;
            }
            let mut vtest = v.clone();
            vtest.padstack.set_diameter(seg.layer, seg.width);
            let probe = self.line_probe(current);
            let cl = world.clearance(&Item::Via(v.clone()), &probe, false);
            if Item::Via(vtest).collides(&probe, cl) {
                obs.item = via_id;
                obs.max_fanout_width = seg.width + 1;
                return true;
            }
        }
        false
    }

    // A line ending on a colliding via adopts that via so it is pushed
    // along instead of being run over.
    fn patch_tadpole_via(&mut self, world: &mut World, current: &mut Line) {
        if current.pt_count() < 1 || current.ends_with_via() {
            return;
        }
        let jt = world
            .find_joint(self.current_node, current.last_pt(), current.layer(), current.net())
            .cloned();
        let Some(jt) = jt else { return };
        let Some(via_id) = world.joint_via(&jt) else { return };
        let Some(Item::Via(v)) = world.item(via_id).cloned() else { return };
        let colliding = world
            .check_colliding(self.current_node, &Item::Via(v.clone()), &CollisionOpts::default())
            .is_some();
        if colliding {
            current.append_via(v);
        }
    }

    // ------------------------------------------------------------------
    // main loop

    fn shove_iteration(&mut self, world: &mut World, iter: u32) -> ShoveStatus {
        let Some(mut current_line) = self.line_stack.last().cloned() else {
            return ShoveStatus::Ok;
        };

        // Deterministic obstacle priority: solids first, then vias, then
        // tracks, then holes.
        let search_order: [KindMask; 4] = [
            Kind::Solid.into(),
            Kind::Via.into(),
            Kind::Segment | Kind::Arc,
            Kind::Hole.into(),
        ];

        let mut nearest = None;
        for kinds in search_order {
            let history = &self.root_line_history;
            let default_policy = self.default_policy;
            let filter = move |item: &Item| -> bool {
                let policy = history
                    .get(&item.id().0)
                    .map_or(default_policy, |e| e.borrow().policy);
                policy & SHP_IGNORE == 0
            };
            let opts = CollisionOpts {
                kind_mask: kinds,
                corner_mode: self.settings.corner_mode,
                filter: Some(&filter),
                ..CollisionOpts::default()
            };
            nearest = world.nearest_obstacle(self.current_node, &current_line, &opts);
            if nearest.is_some() {
                break;
            }
        }

        let Some(mut nearest) = nearest else {
            trace!("iter {iter}: no nearest item");
            self.line_stack.pop();
            return ShoveStatus::Ok;
        };

        self.fixup_via_collisions(world, &current_line, &mut nearest);

        let ni = nearest.item;
        let Some(ni_item) = world.item(ni).cloned() else {
            return ShoveStatus::Incomplete;
        };

        self.unwind_line_stack(world, ni);

        let reverse = !matches!(ni_item, Item::Solid(_))
            && ni_item.rank() >= 0
            && ni_item.rank() > current_line.rank();

        if reverse {
            match ni_item.kind() {
                Kind::Via => {
                    trace!("iter {iter}: reverse-collide-via");
                    self.patch_tadpole_via(world, &mut current_line);

                    let via_collides_head = current_line.via().is_some_and(|cv| {
                        let cl = world.clearance(&ni_item, &Item::Via(cv.clone()), true);
                        ni_item.collides(&Item::Via(cv.clone()), cl)
                    });
                    if via_collides_head {
                        self.on_colliding_via(
                            world,
                            &current_line,
                            ni,
                            &nearest,
                            ni_item.rank() + 1,
                        )
                    } else {
                        self.on_reverse_colliding_via(world, &current_line, ni)
                    }
                }
                Kind::Segment | Kind::Arc => {
                    trace!("iter {iter}: reverse-collide-line");
                    let rev_line = self.assemble(world, ni);
                    self.pop_line_stack();
                    self.unwind_line_stack_line(&rev_line);
                    self.patch_tadpole_via(world, &mut current_line);

                    let st = if current_line.via().is_some_and(|cv| {
                        let cl = world.clearance(&Item::Via(cv.clone()), &ni_item, true);
                        Item::Via(cv.clone()).collides(&ni_item, cl)
                    }) {
                        let handle = current_line.via().map(Via::handle);
                        match handle.and_then(|h| world.find_via_by_handle(self.current_node, &h))
                        {
                            Some(rvia) => self.on_colliding_via(
                                world,
                                &rev_line,
                                rvia,
                                &nearest,
                                rev_line.rank() + 1,
                            ),
                            None => ShoveStatus::Incomplete,
                        }
                    } else {
                        self.on_colliding_line(
                            world,
                            &rev_line,
                            &current_line,
                            rev_line.rank() + 1,
                        )
                    };

                    if !self.push_line_stack(rev_line) {
                        return ShoveStatus::Incomplete;
                    }
                    st
                }
                _ => {
                    debug_assert!(false, "impossible reverse collision kind");
                    ShoveStatus::Incomplete
                }
            }
        } else {
            match ni_item.kind() {
                Kind::Segment | Kind::Arc => {
                    trace!("iter {iter}: collide-segment");
                    let st = if ni_item.kind() == Kind::Segment {
                        self.on_colliding_segment(world, &current_line, ni)
                    } else {
                        self.on_colliding_arc(world, &current_line, ni)
                    };
                    if st == ShoveStatus::TryWalk {
                        self.on_colliding_solid(world, &current_line, ni, &nearest)
                    } else {
                        st
                    }
                }
                Kind::Via => {
                    trace!("iter {iter}: collide-via");
                    let st = self.on_colliding_via(
                        world,
                        &current_line,
                        ni,
                        &nearest,
                        current_line.rank() - 1,
                    );
                    if st == ShoveStatus::TryWalk {
                        self.on_colliding_solid(world, &current_line, ni, &nearest)
                    } else {
                        st
                    }
                }
                Kind::Hole | Kind::Solid => {
                    trace!("iter {iter}: walk-solid");
                    self.on_colliding_solid(world, &current_line, ni, &nearest)
                }
                Kind::Line => ShoveStatus::Incomplete,
            }
        }
    }

    fn shove_main_loop(&mut self, world: &mut World) -> ShoveStatus {
        let mut st = ShoveStatus::Ok;
        let iter_limit = self.settings.shove_iteration_limit;
        let time_limit = self.settings.shove_time_limit();

        trace!(
            "shove start [root: {} joints, current: {} joints]",
            world.joint_count(self.root),
            world.joint_count(self.current_node)
        );

        while !self.line_stack.is_empty() {
            st = self.shove_iteration(world, self.iter);
            self.iter += 1;

            if st == ShoveStatus::Incomplete
                || time_limit.expired()
                || self.iter >= iter_limit
            {
                trace!(
                    "shove fail [timeout {} iter {}/{}]",
                    time_limit.expired(),
                    self.iter,
                    iter_limit
                );
                return ShoveStatus::Incomplete;
            }
        }
        st
    }

    // ------------------------------------------------------------------
    // springback

    fn head_probes(&self, world: &World) -> Vec<Line> {
        let mut out = Vec::new();
        for h in &self.head_lines {
            if let Some(v) = &h.the_via {
                if let Some(id) = world.find_via_by_handle(self.current_node, v) {
                    if let Some(Item::Via(via)) = world.item(id) {
                        let mut l =
                            Line::new(Polyline::default(), 0, via.layers.start(), via.net);
                        l.append_via(via.clone());
                        out.push(l);
                    }
                }
            } else if let Some(l) = &h.orig_head {
                out.push(l.clone());
            }
        }
        out
    }

    // Pop springback frames whose worlds no longer collide with the new
    // head set, restoring any remembered dragged vias.
    fn reduce_springback(&mut self, world: &mut World, heads: &[Line]) -> NodeId {
        loop {
            let Some(tag) = self.node_stack.last() else { break };
            let (tag_node, locked) = (tag.node, tag.locked);
            if Some(tag_node) == self.springback_do_not_touch {
                break;
            }
            let mut colliding = false;
            for head in heads {
                if world
                    .check_colliding_line(tag_node, head, &CollisionOpts::default())
                    .is_some()
                {
                    colliding = true;
                    break;
                }
            }
            if colliding || locked {
                break;
            }
            trace!("pop springback node {tag_node}");
            self.prune_root_lines(world, tag_node);
            world.destroy_branch(tag_node);
            self.node_stack.pop();
        }

        let Some(tag) = self.node_stack.last() else { return self.root };
        let top_node = tag.node;
        let dragged = tag.dragged_vias.clone();
        for (i, via) in dragged.into_iter().enumerate() {
            if let Some(v) = via {
                if v.valid && i < self.head_lines.len() {
                    self.head_lines[i].prev_via = Some(v);
                    self.head_lines[i].the_via = Some(v);
                    self.head_lines[i].geometry_modified = true;
                }
            }
        }
        top_node
    }

    fn push_springback(&mut self, node: NodeId, area: Option<Rt>) {
        let prev_area = self.node_stack.last().and_then(|t| t.affected_area);
        let affected = match (prev_area, area) {
            (Some(a), Some(b)) => Some(a.united(&b)),
            (a, b) => a.or(b),
        };
        let dragged_vias = self.head_lines.iter().map(|h| h.the_via).collect();
        let seq = self.node_stack.last().map_or(1, |t| t.seq + 1);
        self.node_stack.push(SpringbackTag {
            node,
            affected_area: affected,
            dragged_vias,
            locked: false,
            seq,
        });
    }

    pub fn springback_depth(&self) -> usize {
        self.node_stack.len()
    }

    pub fn add_locked_springback_node(&mut self, node: NodeId) {
        self.node_stack.push(SpringbackTag {
            node,
            affected_area: None,
            dragged_vias: Vec::new(),
            locked: true,
            seq: self.node_stack.last().map_or(1, |t| t.seq + 1),
        });
    }

    pub fn rewind_springback_to(&mut self, world: &mut World, node: NodeId) -> bool {
        let Some(pos) = self.node_stack.iter().position(|t| t.node == node) else {
            return false;
        };
        world.kill_children(node);
        self.node_stack.truncate(pos);
        self.current_node = self.node_stack.last().map_or(self.root, |t| t.node);
        true
    }

    pub fn rewind_to_last_locked_node(&mut self) -> bool {
        while self.node_stack.len() > 1
            && self.node_stack.last().map_or(false, |t| !t.locked)
        {
            self.node_stack.pop();
        }
        match self.node_stack.last() {
            Some(tag) => {
                self.current_node = tag.node;
                tag.locked
            }
            None => {
                self.current_node = self.root;
                false
            }
        }
    }

    pub fn unlock_springback_node(&mut self, node: NodeId) {
        if let Some(tag) = self.node_stack.iter_mut().find(|t| t.node == node) {
            tag.locked = false;
        }
    }

    fn total_affected_area(&self) -> Option<Rt> {
        let stack_area = self.node_stack.last().and_then(|t| t.affected_area);
        match (stack_area, self.affected_area) {
            (Some(a), Some(b)) => Some(a.united(&b)),
            (a, b) => a.or(b),
        }
    }

    // ------------------------------------------------------------------
    // post-pass

    fn run_optimizer(&mut self, world: &mut World) {
        let mut effort = EffortSet::empty();
        let mut n_passes = 0;
        match self.settings.effort {
            OptimizerEffort::Low => {
                effort |= Effort::MergeObtuse;
                n_passes = 1;
            }
            OptimizerEffort::Medium | OptimizerEffort::Full => {
                effort |= Effort::MergeSegments;
                n_passes = 2;
            }
        }
        effort |= Effort::LimitCornerCount;

        let max_width = self.optimizer_queue.iter().map(Line::width).max().unwrap_or(0);
        let area = self.total_affected_area().map(|a| a.inflated(max_width));
        if area.is_some() {
            effort |= Effort::RestrictArea;
        }

        if self.settings.smart_pads && self.settings.corner_mode.is_diagonal() {
            effort |= Effort::SmartPads;
        }
        effort &= !self.opt_disable_mask;

        for _pass in 0..n_passes {
            self.optimizer_queue.reverse();
            for i in 0..self.optimizer_queue.len() {
                let line = self.optimizer_queue[i].clone();
                let entry = self.find_root_line_by_line(&line);
                let mut root_line = None;
                if let Some(e) = &entry {
                    let e = e.borrow();
                    if e.policy & SHP_DONT_OPTIMIZE != 0 || e.is_head {
                        continue;
                    }
                    root_line = e.root_line.clone();
                }

                let optimized = {
                    let mut opt = Optimizer::new(world, self.current_node);
                    opt.set_effort(effort);
                    opt.set_corner_mode(self.settings.corner_mode);
                    if let Some(a) = area {
                        opt.set_restrict_area(a, false);
                    }
                    opt.optimize(&line, root_line.as_ref())
                };

                if let Some(mut better) = optimized {
                    debug_assert!(better.link_count() == 0);
                    self.replace_line(world, &line, &mut better, false, false);
                    self.optimizer_queue[i] = better;
                }
            }
        }
    }

    fn reconstruct_heads(&mut self) {
        for head in self.head_lines.iter_mut() {
            if let Some(orig) = &head.orig_head {
                let entry = orig
                    .links()
                    .iter()
                    .find_map(|l| self.root_line_history.get(&l.0))
                    .or_else(|| {
                        orig.via().and_then(|v| self.root_line_history.get(&v.id.0))
                    });
                if let Some(entry) = entry {
                    let e = entry.borrow();
                    if let (Some(new_line), Some(root)) = (&e.new_line, &e.root_line) {
                        head.geometry_modified =
                            !new_line.line().compare_geometry(root.line());
                        head.new_head = Some(new_line.clone());
                    }
                }
            } else if let Some(via) = head.the_via {
                if let Some(id_entry) = self
                    .root_line_history
                    .values()
                    .find(|e| e.borrow().old_via == Some(via) || e.borrow().new_via == Some(via))
                {
                    let e = id_entry.borrow();
                    if let Some(nv) = e.new_via {
                        head.geometry_modified = true;
                        head.the_via = Some(nv);
                    } else if let Some(ov) = e.old_via {
                        head.the_via = Some(ov);
                    }
                }
            }
            self.heads_modified |= head.geometry_modified;
        }
    }

    // Synthetic head primitives never make it into the committed branch.
    fn remove_heads(&mut self, world: &mut World) {
        let (_, added) = world.updated_items(self.current_node);
        for id in added {
            let is_head = self
                .root_line_history
                .get(&id.0)
                .map_or(false, |e| e.borrow().is_head);
            if is_head {
                world.remove(self.current_node, id);
            }
        }
    }

    fn pre_shove_cleanup(&mut self, world: &mut World, line: &Line) -> Option<Line> {
        let mut simplified = line.line().clone();
        let vc_pre = simplified.pt_count();
        simplified.simplify();
        if simplified.pt_count() == vc_pre {
            return None;
        }
        let mut cleaned = line.clone();
        cleaned.clear_links();
        cleaned.set_shape(simplified);
        let mut replacement = cleaned.clone();
        self.replace_line(world, line, &mut replacement, false, false);
        Some(replacement)
    }

    // ------------------------------------------------------------------
    // entry point

    pub fn run(&mut self, world: &mut World) -> ShoveStatus {
        let mut st = ShoveStatus::Ok;
        self.heads_modified = false;
        self.line_stack.clear();
        self.optimizer_queue.clear();
        self.iter = 0;
        self.affected_area = None;

        trace!(
            "shove run (heads: {}, node {}, depth {})",
            self.head_lines.len(),
            self.current_node,
            world.depth(self.current_node)
        );

        let probes = self.head_probes(world);
        let parent = self.reduce_springback(world, &probes);
        self.current_node = world.branch(parent);
        world.clear_ranks(self.current_node);

        for idx in 0..self.head_lines.len() {
            world.clear_ranks(self.current_node);

            let the_via = self.head_lines[idx].the_via;
            if let Some(via_handle) = the_via {
                let Some(via_id) = world.find_via_by_handle(self.current_node, &via_handle)
                else {
                    st = ShoveStatus::Incomplete;
                    break;
                };
                let Some(new_pos) = self.head_lines[idx].via_new_pos else {
                    debug_assert!(false, "via head without a target position");
                    st = ShoveStatus::Incomplete;
                    break;
                };
                let entry = self.touch_root_line_item(via_id);
                entry.borrow_mut().old_via = Some(via_handle);

                let force = new_pos - via_handle.pos;
                st = self.push_or_shove_via(world, via_id, force, 0, true);
                if st != ShoveStatus::Ok {
                    break;
                }
            } else {
                let Some(mut orig) = self.head_lines[idx].orig_head.clone() else { continue };
                orig.clear_links();

                let mut linked = orig.clone();
                world.add_line(self.current_node, &mut linked, true);

                let mut head = linked.clone();
                if head.seg_count() == 0 && !head.ends_with_via() {
                    st = ShoveStatus::Incomplete;
                    break;
                }

                let policy = self.head_lines[idx].policy;
                if policy & SHP_DONT_LOCK_ENDPOINTS == 0 {
                    if head.pt_count() > 0 {
                        world.lock_joint(
                            self.current_node,
                            head.first_pt(),
                            crate::item::LayerSet::one(head.layer()),
                            head.net(),
                            true,
                        );
                    }
                    if !head.ends_with_via() && head.pt_count() > 0 {
                        world.lock_joint(
                            self.current_node,
                            head.last_pt(),
                            crate::item::LayerSet::one(head.layer()),
                            head.net(),
                            true,
                        );
                    }
                }

                self.set_line_rank(world, &mut head, HEAD_RANK);

                if let Some(via) = head.via().cloned() {
                    let mut head_via = via;
                    head_via.rank = HEAD_RANK;
                    head_via.id = ItemId::INVALID;
                    head_via.hole = None;
                    if let Some(via_id) =
                        world.add(self.current_node, Item::Via(head_via), true)
                    {
                        if let Some(Item::Via(v)) = world.item(via_id) {
                            let v = v.clone();
                            if let Some(hv) = head.via_mut() {
                                *hv = v.clone();
                            }
                            if let Some(hv) = linked.via_mut() {
                                *hv = v;
                            }
                        }
                    }
                }

                let entry = self.touch_root_line(&linked);
                {
                    let mut e = entry.borrow_mut();
                    e.is_head = true;
                    e.root_line = Some(linked.clone());
                    e.policy = policy;
                }
                if let Some(v) = linked.via() {
                    self.root_line_history.insert(v.id.0, entry.clone());
                }
                self.head_lines[idx].orig_head = Some(linked.clone());

                if !self.push_line_stack(head) {
                    st = ShoveStatus::Incomplete;
                    break;
                }
            }

            st = self.shove_main_loop(world);
            if st != ShoveStatus::Ok {
                break;
            }
        }

        trace!(
            "shove status: {:?} after {} iterations, heads {}",
            st,
            self.iter,
            self.head_lines.len()
        );

        if st == ShoveStatus::Ok {
            self.run_optimizer(world);
            self.reconstruct_heads();
            self.remove_heads(world);
            // requires up-to-date via handles, hence after reconstruction
            self.push_springback(self.current_node, self.affected_area);
        } else {
            for head in self.head_lines.iter_mut() {
                if head.prev_via.is_some() {
                    head.the_via = head.prev_via;
                    head.geometry_modified = true;
                    self.heads_modified = true;
                }
            }
            self.prune_root_lines(world, self.current_node);
            world.destroy_branch(self.current_node);
            self.current_node = parent;
        }

        st
    }
}

// Iterative minimum-translation force propagation for a free via: keeps
// nudging a phantom copy out of whatever it collides with until it sits
// clear, falling back to the lead direction when the force stalls.
pub fn via_pushout_force(
    world: &mut World,
    node: NodeId,
    via: &Via,
    direction: Pt,
    collision_mask: KindMask,
    max_iterations: u32,
) -> Option<Pt> {
    let mut mv = via.clone();
    mv.id = ItemId::INVALID;
    let mut total_force = Pt::zero();
    let threshold = via.diameter(via.layers.start()) / 4;

    for iter in 0..max_iterations {
        let opts = CollisionOpts {
            kind_mask: collision_mask,
            limit: Some(1),
            use_epsilon: false,
            ..CollisionOpts::default()
        };
        let Some(obs) = world.check_colliding(node, &Item::Via(mv.clone()), &opts) else {
            return Some(total_force);
        };
        let Some(item) = world.item(obs.item).cloned() else { return None };
        let probe = Item::Via(mv.clone());
        let clearance = world.clearance(&probe, &item, false);
        let layer = mv.layers.start();
        let force = crate::geom::dist::circle_shape_mtv(
            mv.pos,
            mv.diameter(layer) / 2,
            &item.shape(layer),
            clearance,
        );

        let Some(mut force) = force else {
            // a collision with a zero MTV means propagation has failed
            return None;
        };

        // Late in the game with a still-large force the barycentric push
        // is probably circling; follow the lead vector instead.
        if iter > max_iterations / 2 && force.mag() as i64 > threshold {
            force = direction.resized(threshold.max(1));
        } else if force.mag() as i64 > threshold {
            // clamp the step so large keepouts converge predictably
            force = force.resized(threshold.max(1));
        }

        total_force += force;
        mv.pos += force;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pll, pt};
    use crate::item::{LayerSet, NetHandle};
    use crate::node::ROOT;
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(200)))
    }

    fn add_seg(w: &mut World, a: Pt, b: Pt, width: i64, net: u64) -> ItemId {
        w.add(
            ROOT,
            Item::Segment(SegmentItem {
                id: ItemId::INVALID,
                net: NetHandle(net),
                layer: 0,
                seg: crate::geom::seg(a, b),
                width,
                parent: Default::default(),
                rank: -1,
                marker: 0,
                locked: false,
            }),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_shove_head_line_displaces_track() {
        let mut w = world();
        // straight victim track inside the head's clearance zone
        add_seg(&mut w, pt(-8000, 350), pt(8000, 350), 200, 2);

        let head = Line::new(pll(&[pt(-4000, 0), pt(4000, 0)]), 200, 0, NetHandle(1));

        let mut shove = Shove::new(ROOT, RoutingSettings::default());
        shove.add_head_line(&head, SHP_SHOVE);
        let st = shove.run(&mut w);
        assert_eq!(st, ShoveStatus::Ok);

        let node = shove.current_node();
        // the head items were removed post-shove; re-check against the
        // head geometry itself
        assert!(w
            .check_colliding_line(node, &head, &CollisionOpts::default())
            .is_none());
        assert_eq!(shove.springback_depth(), 1);
    }

    #[test]
    fn test_lone_via_shove_scenario() {
        // One via net A, one horizontal segment net B; dragging the via
        // into the track shoves the track away while keeping clearance.
        let mut w = world();
        let seg_id = add_seg(&mut w, pt(-2000, 400), pt(2000, 400), 200, 2);

        let via = Via::new(pt(0, 0), LayerSet::new(0, 31), 600, 300, NetHandle(1));
        let via_id = w.add(ROOT, Item::Via(via.clone()), false).unwrap();
        let Some(Item::Via(added)) = w.item(via_id).cloned() else { panic!() };

        let mut shove = Shove::new(ROOT, RoutingSettings::default());
        shove.add_head_via(added.handle(), pt(0, 200), SHP_SHOVE);
        let st = shove.run(&mut w);
        assert_eq!(st, ShoveStatus::Ok);

        let node = shove.current_node();
        let new_via = shove.modified_head_via(0).expect("via handle");
        assert_eq!(new_via.pos, pt(0, 200));

        // victim segment rerouted: endpoints unchanged, clear of the via
        let (_removed, added_items) = w.updated_items(node);
        let mut found_track = false;
        for id in added_items {
            if let Some(Item::Segment(_)) = w.item(id) {
                let line = w.assemble_line(node, id, None, Default::default());
                if line.net() == NetHandle(2) {
                    found_track = true;
                    assert_eq!(line.first_pt(), pt(-2000, 400));
                    assert_eq!(line.last_pt(), pt(2000, 400));
                }
            }
        }
        // the original track item may have survived untouched only if the
        // shove moved the via elsewhere, which would be wrong here
        assert!(found_track || w.overrides(node, seg_id));

        // post-condition: no collisions remain anywhere near the head
        let via_item = w
            .find_via_by_handle(node, &new_via)
            .and_then(|id| w.item(id).cloned())
            .expect("moved via");
        let opts = CollisionOpts { use_epsilon: false, ..CollisionOpts::default() };
        let mut obstacles = Vec::new();
        w.query_colliding(node, &via_item, &opts, &mut obstacles);
        assert!(obstacles.is_empty(), "via still collides after shove");
    }

    #[test]
    fn test_springback_reduction() {
        let mut w = world();
        add_seg(&mut w, pt(-4000, 400), pt(4000, 400), 200, 2);

        let mut shove = Shove::new(ROOT, RoutingSettings::default());

        // D1: head collides, gets a springback frame
        let head1 = Line::new(pll(&[pt(-4000, 0), pt(4000, 0)]), 200, 0, NetHandle(1));
        shove.clear_heads();
        shove.add_head_line(&head1, SHP_SHOVE);
        assert_eq!(shove.run(&mut w), ShoveStatus::Ok);
        assert_eq!(shove.springback_depth(), 1);

        // D2: far away from anything affected by D1
        let head2 =
            Line::new(pll(&[pt(-4000, -9000), pt(4000, -9000)]), 200, 0, NetHandle(1));
        shove.clear_heads();
        shove.add_head_line(&head2, SHP_SHOVE);
        assert_eq!(shove.run(&mut w), ShoveStatus::Ok);

        // the D1 frame was popped; only D2's frame remains and the current
        // node hangs directly off the root
        assert_eq!(shove.springback_depth(), 1);
        assert_eq!(w.depth(shove.current_node()), 1);
    }
}
