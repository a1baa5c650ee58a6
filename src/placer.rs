use log::trace;

use crate::geom::direction::{build_initial_trace, AngleKind, AngleSet, Dir45};
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::item::{Item, ItemId, LayerSet, NetHandle, Via};
use crate::line::Line;
use crate::node::{AssembleOpts, CollisionOpts, NodeId, World, ROOT};
use crate::optimizer::{Effort, Optimizer};
use crate::settings::{OptimizerEffort, RouterMode, RoutingSettings};
use crate::shove::{Shove, ShoveStatus, SHP_SHOVE};
use crate::walkaround::{WalkPolicy, WalkStatus, Walkaround};

// Angles that must never appear where the head grows out of the tail.
fn forbidden_angles() -> AngleSet {
    AngleKind::Acute | AngleKind::HalfFull | AngleKind::Undefined
}

#[derive(Debug, Clone)]
struct FixedStage {
    tail: Line,
    p_start: Pt,
    direction: Dir45,
}

// Live routing front-end: keeps a committed-but-unfixed tail and a head
// that follows the cursor, re-resolved against the world on every move.
pub struct LinePlacer {
    head: Line,
    tail: Line,
    shove: Shove,
    settings: RoutingSettings,
    current_node: NodeId,
    current_start: Pt,
    p_start: Pt,
    last_p_end: Pt,
    direction: Dir45,
    initial_direction: Dir45,
    net: NetHandle,
    layer: i32,
    width: i64,
    via_diameter: i64,
    via_drill: i64,
    placing_via: bool,
    fixed_stages: Vec<FixedStage>,
    idle: bool,
    has_placed: bool,
}

impl LinePlacer {
    pub fn new(settings: RoutingSettings, net: NetHandle, layer: i32, width: i64) -> Self {
        let initial = settings.initial_direction();
        Self {
            head: Line::new(Polyline::default(), width, layer, net),
            tail: Line::new(Polyline::default(), width, layer, net),
            shove: Shove::new(ROOT, settings.clone()),
            settings,
            current_node: ROOT,
            current_start: Pt::zero(),
            p_start: Pt::zero(),
            last_p_end: Pt::zero(),
            direction: initial,
            initial_direction: initial,
            net,
            layer,
            width,
            via_diameter: 600,
            via_drill: 300,
            placing_via: false,
            fixed_stages: Vec::new(),
            idle: true,
            has_placed: false,
        }
    }

    pub fn current_node(&self) -> NodeId {
        self.current_node
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn has_placed_anything(&self) -> bool {
        self.has_placed
    }

    pub fn set_via_sizes(&mut self, diameter: i64, drill: i64) {
        self.via_diameter = diameter;
        self.via_drill = drill;
    }

    pub fn toggle_via(&mut self, enabled: bool) {
        self.placing_via = enabled;
    }

    pub fn set_layer(&mut self, layer: i32) {
        self.layer = layer;
        self.head.set_layer(layer);
        self.tail.set_layer(layer);
    }

    fn make_via(&self, p: Pt) -> Via {
        Via::new(p, LayerSet::new(0, 31), self.via_diameter, self.via_drill, self.net)
    }

    pub fn head(&self) -> &Line {
        &self.head
    }

    pub fn tail(&self) -> &Line {
        &self.tail
    }

    // The whole uncommitted route: tail then head.
    pub fn trace(&self) -> Line {
        let mut l = self.tail.line().clone();
        l.append_polyline(self.head.line());
        if l.pt_count() > 2 {
            l.simplify();
        }
        let mut out = self.head.clone();
        out.clear_links();
        out.set_shape(l);
        out
    }

    // Begins routing at |p|. A null start (no net context) is allowed; the
    // caller resolves nets before committing.
    pub fn start(&mut self, world: &mut World, p: Pt) -> bool {
        if !self.idle {
            return false;
        }
        world.kill_children(ROOT);
        self.shove = Shove::new(ROOT, self.settings.clone());
        self.current_node = ROOT;
        self.current_start = p;
        self.p_start = p;
        self.last_p_end = p;
        self.direction = self.settings.initial_direction();
        self.initial_direction = self.direction;
        self.head.clear();
        self.tail.clear();
        self.fixed_stages.clear();
        self.idle = false;
        self.has_placed = false;
        true
    }

    fn update_p_start(&mut self) {
        self.p_start = if self.tail.pt_count() > 0 {
            self.tail.last_pt()
        } else {
            self.current_start
        };
    }

    // ------------------------------------------------------------------
    // head routing per mode

    fn build_initial_line(&self, p: Pt) -> Line {
        let diagonal = self.direction.is_diagonal();
        let pl = build_initial_trace(self.p_start, p, diagonal, self.settings.corner_mode);
        let mut l = Line::new(pl, self.width, self.layer, self.net);
        if self.placing_via {
            l.append_via(self.make_via(l.last_pt()));
        }
        l
    }

    fn rh_mark_obstacles(&mut self, world: &mut World, p: Pt) -> Option<(Line, Line)> {
        let initial = self.build_initial_line(p);
        // collisions are highlighted, not resolved
        let _ = world.check_colliding_line(self.current_node, &initial, &CollisionOpts::default());
        Some((initial, self.tail.clone()))
    }

    fn rh_walk_only(&mut self, world: &mut World, p: Pt) -> Option<(Line, Line)> {
        let initial = self.build_initial_line(p);
        let result = {
            let mut walk = Walkaround::new(world, self.current_node, &self.settings);
            walk.set_allowed_policies(&[WalkPolicy::Shortest]);
            walk.route(&initial)
        };
        match result.status(WalkPolicy::Shortest) {
            WalkStatus::Done | WalkStatus::AlmostDone => {
                let mut head = result.line(WalkPolicy::Shortest).clone();
                head.clear_links();
                if self.placing_via && initial.ends_with_via() {
                    head.append_via(self.make_via(head.last_pt()));
                }
                Some((head, self.tail.clone()))
            }
            _ => None,
        }
    }

    fn rh_shove_only(&mut self, world: &mut World, p: Pt) -> Option<(Line, Line)> {
        // walk rigid solids first, shove the rest
        let initial = self.build_initial_line(p);
        let walked = {
            let mut walk = Walkaround::new(world, self.current_node, &self.settings);
            walk.set_solids_only(true);
            walk.set_allowed_policies(&[WalkPolicy::Shortest]);
            walk.route(&initial)
        };
        let new_head = match walked.status(WalkPolicy::Shortest) {
            WalkStatus::Done => {
                let mut l = walked.line(WalkPolicy::Shortest).clone();
                l.clear_links();
                if initial.ends_with_via() {
                    l.append_via(self.make_via(l.last_pt()));
                }
                l
            }
            _ => initial.clone(),
        };

        self.shove.clear_heads();
        self.shove.add_head_line(&new_head, SHP_SHOVE);
        let ok = self.shove.run(world) == ShoveStatus::Ok;
        self.current_node = self.shove.current_node();

        if !ok {
            return self.rh_walk_only(world, p);
        }

        let mut shoved_head = new_head.clone();
        if self.shove.heads_modified() {
            if let Some(m) = self.shove.modified_head(0) {
                let via = shoved_head.via().cloned();
                shoved_head = m.clone();
                shoved_head.clear_links();
                if let Some(v) = via {
                    if !shoved_head.ends_with_via() {
                        shoved_head.append_via(v);
                    }
                }
            }
        }

        let (mut head, tail) = self.split_head_tail(&shoved_head);

        let mut effort = match self.settings.effort {
            OptimizerEffort::Low => crate::optimizer::EffortSet::empty(),
            _ => Effort::MergeSegments.into(),
        };
        if self.settings.smart_pads && self.settings.corner_mode.is_diagonal() {
            effort |= Effort::SmartPads;
        }
        if !effort.is_empty() {
            Optimizer::optimize_line(
                world,
                self.current_node,
                &mut head,
                effort,
                self.settings.corner_mode,
            );
        }
        Some((head, tail))
    }

    // Split a resolved line back into (head, tail) along the old tail.
    fn split_head_tail(&self, new_line: &Line) -> (Line, Line) {
        let old_tail = &self.tail;
        let mut new_tail = old_tail.clone();
        new_tail.clear_links();
        new_tail.remove_via();
        let mut new_head = old_tail.clone();
        new_head.clear_links();
        new_head.clear();

        let mut l2 = new_line.clone();

        if new_line.pt_count() > 1 && old_tail.pt_count() > 1 {
            if l2.line().point_on_edge(old_tail.last_pt()) {
                l2.line_mut().split_at(old_tail.last_pt());
            }
            let mut i = 0;
            let mut found = false;
            while i < old_tail.pt_count() {
                if l2.line().find(old_tail.pt(i)).is_none() {
                    found = true;
                    break;
                }
                i += 1;
            }
            if !found {
                i = i.saturating_sub(1);
            }
            i = i.min(l2.pt_count() - 1);

            if i == 0 {
                new_tail.clear();
            } else {
                new_tail.set_shape(l2.line().slice(0, i as isize));
            }
            new_head.set_shape(l2.line().slice(i, -1));
        } else {
            new_tail.clear();
            new_head = l2;
        }

        if let Some(v) = new_line.via() {
            if !new_head.ends_with_via() {
                new_head.append_via(v.clone());
            }
        }
        (new_head, new_tail)
    }

    fn route_head(&mut self, world: &mut World, p: Pt) -> Option<(Line, Line)> {
        match self.settings.mode {
            RouterMode::MarkObstacles => self.rh_mark_obstacles(world, p),
            RouterMode::Walkaround => self.rh_walk_only(world, p),
            RouterMode::Shove => self.rh_shove_only(world, p),
        }
    }

    // ------------------------------------------------------------------
    // tail/head maintenance

    // If the head crosses the tail, the tail is cut back to the earliest
    // crossing and routing restarts from there.
    fn handle_self_intersections(&mut self) -> bool {
        if self.tail.pt_count() < 2 || self.head.pt_count() < 2 {
            return false;
        }

        // completely new head trace? drop the tail
        if self.tail.first_pt() == self.head.first_pt() {
            self.direction = self.initial_direction;
            self.tail.line_mut().clear();
            return true;
        }

        let ips = self.tail.line().intersect(self.head.line());
        if ips.is_empty() {
            return false;
        }

        let mut n = usize::MAX;
        let mut ipoint = Pt::zero();
        for i in &ips {
            if i.index_our < n {
                n = i.index_our;
                ipoint = i.p;
            }
        }

        // the point where head and tail meet doesn't count
        if ipoint == self.head.first_pt() || ipoint == self.tail.last_pt() {
            return false;
        }

        if n < 2 {
            self.direction = self.initial_direction;
            self.tail.line_mut().clear();
            self.head.line_mut().clear();
        } else {
            let last = self.tail.seg(n - 1);
            self.direction = Dir45::from_seg(&last);
            let cut = self.tail.line().slice(0, n as isize);
            self.tail.set_shape(cut);
        }
        true
    }

    // An acute/right kink between tail and head removes the tail's last
    // shape; the next iteration re-routes with a cleaner posture.
    fn handle_pullback(&mut self) -> bool {
        if self.head.pt_count() < 2 {
            return false;
        }
        let n = self.tail.pt_count();
        if n == 0 {
            return false;
        }
        if n == 1 {
            self.tail.line_mut().clear();
            return true;
        }

        let first_head = Dir45::from_seg(&self.head.seg(0));
        let last_tail = Dir45::from_seg(&self.tail.seg(self.tail.seg_count() - 1));
        let angle = first_head.angle(last_tail);

        let pullback = angle == AngleKind::Right || angle == AngleKind::Acute;
        if !pullback {
            return false;
        }

        self.direction = last_tail;
        trace!("placer: pullback triggered [{n}]");
        if n < 2 {
            self.tail.line_mut().clear();
        } else {
            self.tail.line_mut().remove_last_shape();
        }
        if self.tail.seg_count() == 0 {
            self.direction = self.initial_direction;
        }
        true
    }

    // Try to replace the last tail segments with a single two-segment
    // route to the cursor.
    fn reduce_tail(&mut self, world: &mut World, end: Pt) -> bool {
        let n = self.tail.seg_count();
        if self.head.seg_count() < 1 || n < 2 {
            return false;
        }

        let mut reduce_index = None;
        let mut new_direction = self.direction;

        for i in (0..n).rev() {
            let s = self.tail.seg(i);
            let dir = Dir45::from_seg(&s);
            let replacement =
                build_initial_trace(s.st(), end, dir.is_diagonal(), self.settings.corner_mode);
            if replacement.seg_count() < 1 {
                continue;
            }
            let mut tmp = self.tail.clone();
            tmp.clear_links();
            tmp.set_shape(replacement.clone());
            if world
                .check_colliding_line(self.current_node, &tmp, &CollisionOpts::default())
                .is_some()
            {
                break;
            }
            if Dir45::from_seg(&replacement.seg(0)) == dir {
                new_direction = dir;
                reduce_index = Some(i);
            }
        }

        if let Some(i) = reduce_index {
            trace!("placer: reducing tail: {i}");
            self.direction = new_direction;
            let cut = self.tail.line().slice(0, i as isize);
            self.tail.set_shape(cut);
            self.head.line_mut().clear();
            return true;
        }
        if self.tail.seg_count() == 0 {
            self.direction = self.initial_direction;
        }
        false
    }

    // Absorb a stable head into the tail.
    fn merge_head(&mut self) -> bool {
        let n_head = self.head.seg_count();
        let n_tail = self.tail.seg_count();

        if n_head < 3 {
            trace!("merge failed: not enough head segs");
            return false;
        }
        if n_tail > 0 && self.head.first_pt() != self.tail.last_pt() {
            trace!("merge failed: head and tail discontinuous");
            return false;
        }
        if self.head.count_corners(forbidden_angles()) != 0 {
            return false;
        }

        if n_tail > 0 {
            let dir_head = Dir45::from_seg(&self.head.seg(0));
            let dir_tail = Dir45::from_seg(&self.tail.seg(n_tail - 1));
            if forbidden_angles().contains(dir_head.angle(dir_tail)) {
                return false;
            }
        }

        let head_pl = self.head.line().clone();
        self.tail.line_mut().append_polyline(&head_pl);
        self.tail.line_mut().simplify();
        self.direction = Dir45::from_seg(&self.tail.seg(self.tail.seg_count() - 1));
        self.head.line_mut().clear();
        true
    }

    // Merge the window around the tail/head junction when the optimizer
    // can do better than plain merging.
    fn optimize_tail_head_transition(&mut self, world: &mut World) -> bool {
        let mut line = self.trace();
        let fanout_effort = Effort::FanoutCleanup.into();
        if Optimizer::optimize_line(
            world,
            self.current_node,
            &mut line,
            fanout_effort,
            self.settings.corner_mode,
        ) {
            if line.seg_count() < 1 {
                return false;
            }
            self.head = line.clone();
            self.direction = Dir45::from_seg(&line.seg(0));
            self.tail.line_mut().clear();
            return true;
        }

        let tail_lookback = 3usize;
        let threshold = self.tail.pt_count().min(tail_lookback + 1);
        if self.tail.seg_count() < 3 {
            return false;
        }

        let tail_pts = self.tail.pt_count();
        let mut opt_line = self.tail.line().slice(tail_pts - threshold, -1);
        let end = 2.min(self.head.pt_count() - 1);
        opt_line.append_polyline(&self.head.line().slice(0, end as isize));

        let mut new_head = self.tail.clone();
        new_head.clear_links();
        new_head.set_shape(opt_line);

        if Optimizer::optimize_line(
            world,
            self.current_node,
            &mut new_head,
            Effort::MergeSegments.into(),
            self.settings.corner_mode,
        ) {
            let keep = self.tail.line().slice(0, (tail_pts - threshold) as isize);
            let mut merged = keep;
            merged.append_polyline(new_head.line());
            merged.simplify();
            self.head.line_mut().clear();
            self.tail.set_shape(merged);
            self.direction =
                Dir45::from_seg(&self.tail.seg(self.tail.seg_count() - 1));
            return true;
        }
        false
    }

    fn route_step(&mut self, world: &mut World, p: Pt) {
        let mut fail = false;
        let mut go_back = false;
        let mut n_iter = 1;

        trace!(
            "route step: direction {}, head {} segs, tail {} segs",
            self.direction,
            self.head.seg_count(),
            self.tail.seg_count()
        );

        let mut i = 0;
        while i < n_iter {
            let prev_tail = self.tail.clone();
            let prev_head = self.head.clone();

            if !go_back && self.settings.follow_mouse() {
                self.reduce_tail(world, p);
            }
            go_back = false;
            self.update_p_start();

            match self.route_head(world, p) {
                Some((new_head, new_tail)) => {
                    self.head = new_head;
                    self.tail = new_tail;
                }
                None => {
                    self.tail = prev_tail;
                    self.head = prev_head;
                    // Return a zero-length tail rather than nothing so the
                    // caller still gets feedback that routing is alive.
                    if self.tail.pt_count() == 0 {
                        self.tail.line_mut().append(self.p_start);
                        self.tail.line_mut().append_dup(self.p_start);
                    }
                    fail = true;
                }
            }

            self.update_p_start();
            if fail {
                break;
            }

            if self.handle_self_intersections() {
                n_iter += 1;
                go_back = true;
            }
            if !go_back && self.handle_pullback() {
                n_iter += 1;
                self.head.line_mut().clear();
                go_back = true;
            }
            i += 1;
        }

        if !fail && self.settings.follow_mouse() && !self.optimize_tail_head_transition(world) {
            self.merge_head();
        }

        self.last_p_end = p;
    }

    pub fn route_to(&mut self, world: &mut World, p: Pt) -> bool {
        self.route_step(world, p);
        if self.head.pt_count() == 0 {
            return false;
        }
        self.head.last_pt() == p
    }

    // ------------------------------------------------------------------
    // fixing

    // Commits the routed trace into the current branch; returns false when
    // there is nothing worth fixing yet.
    pub fn fix_route(&mut self, world: &mut World, p: Pt, force_finish: bool) -> bool {
        if self.idle {
            return false;
        }
        let _ = self.route_to(world, p) || force_finish;

        let mut trace = self.trace();
        trace.line_mut().simplify();
        if trace.seg_count() == 0 && !trace.ends_with_via() {
            return false;
        }

        self.fixed_stages.push(FixedStage {
            tail: self.tail.clone(),
            p_start: self.p_start,
            direction: self.direction,
        });

        let node = self.current_node;
        let mut committed = trace.clone();
        committed.clear_links();
        world.add_line(node, &mut committed, false);
        if let Some(v) = trace.via() {
            let mut via = v.clone();
            via.id = ItemId::INVALID;
            via.hole = None;
            world.add(node, Item::Via(via), false);
        }

        // clean up the joints the new line landed on
        if committed.pt_count() > 0 {
            for p in [committed.first_pt(), committed.last_pt()] {
                if let Some(joint) = world.find_joint(node, p, self.layer, self.net).cloned() {
                    for &link in joint.links() {
                        if matches!(world.item(link), Some(Item::Segment(_))) {
                            self.simplify_new_line(world, node, link);
                            break;
                        }
                    }
                }
            }

            if self.settings.remove_loops {
                self.remove_loops(world, node, &committed);
            }
        }

        self.has_placed = true;
        self.tail.clear();
        self.head.clear();
        self.current_start =
            if trace.ends_with_via() && trace.pt_count() > 0 { trace.last_pt() } else { p };
        self.p_start = self.current_start;
        self.direction = self.initial_direction;

        // the fixed stage must survive later springback reductions
        if node != ROOT {
            self.shove.add_locked_springback_node(node);
        }

        if force_finish {
            self.idle = true;
        }
        true
    }

    // Walks back to the state before the last fix.
    pub fn unfix_route(&mut self) -> Option<Pt> {
        let stage = self.fixed_stages.pop()?;
        self.tail = stage.tail;
        self.p_start = stage.p_start;
        self.direction = stage.direction;
        self.head.clear();
        self.idle = false;
        Some(self.p_start)
    }

    // Merges collinear stretches the fixed line created around its
    // endpoints.
    fn simplify_new_line(&mut self, world: &mut World, node: NodeId, seed: ItemId) {
        if world.item(seed).is_none() {
            return;
        }
        let line = world.assemble_line(node, seed, None, AssembleOpts::default());
        let mut simplified = line.line().clone();
        simplified.simplify();
        if simplified.pt_count() < line.pt_count() {
            let mut old = line.clone();
            let mut new = line.clone();
            new.clear_links();
            new.set_shape(simplified);
            world.replace_line(node, &mut old, &mut new, false);
        }
    }

    // Removes older lines made redundant by the newly fixed one.
    fn remove_loops(&mut self, world: &mut World, node: NodeId, latest: &Line) {
        let (ja, jb) = world.find_line_ends(node, latest);
        let (Some(ja), Some(jb)) = (ja, jb) else { return };
        if ja.pos() == jb.pos() {
            return;
        }
        let candidates = world.find_lines_between_joints(node, &ja, &jb);
        for line in candidates {
            if line.links().iter().any(|l| latest.contains_link(*l)) {
                continue;
            }
            let mut doomed = line.clone();
            world.remove_line(node, &mut doomed);
        }
    }

    // Splits the segment under |p| so routing can start from its middle.
    // The two halves inherit everything but the endpoints.
    pub fn split_adjacent_segments(
        world: &mut World,
        node: NodeId,
        item: ItemId,
        p: Pt,
    ) -> bool {
        let Some(Item::Segment(s)) = world.item(item).cloned() else { return false };
        if s.seg.st() == p || s.seg.en() == p || !s.seg.contains(p) {
            return false;
        }
        let mut a = s.clone();
        a.id = ItemId::INVALID;
        a.seg = crate::geom::seg(s.seg.st(), p);
        let mut b = s.clone();
        b.id = ItemId::INVALID;
        b.seg = crate::geom::seg(p, s.seg.en());

        world.remove(node, item);
        world.add(node, Item::Segment(a), true);
        world.add(node, Item::Segment(b), true);
        true
    }

    // Aborts the drag: every tentative branch dies, transient lines become
    // invalid.
    pub fn abort_placement(&mut self, world: &mut World) {
        world.kill_children(ROOT);
        self.shove = Shove::new(ROOT, self.settings.clone());
        self.current_node = ROOT;
        self.head.clear();
        self.tail.clear();
        self.fixed_stages.clear();
        self.idle = true;
    }

    // Pushes everything accumulated in the current branch into the root.
    pub fn commit_placement(&mut self, world: &mut World) -> bool {
        if self.current_node != ROOT {
            world.commit(ROOT, self.current_node);
            self.current_node = ROOT;
            self.shove = Shove::new(ROOT, self.settings.clone());
        }
        self.idle = true;
        self.has_placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pll, pt};
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(200)))
    }

    fn placer() -> LinePlacer {
        LinePlacer::new(RoutingSettings::default(), NetHandle(1), 0, 200)
    }

    #[test]
    fn test_route_simple() {
        let mut w = world();
        let mut p = placer();
        assert!(p.start(&mut w, pt(0, 0)));
        assert!(p.route_to(&mut w, pt(3000, 1000)));
        let trace = p.trace();
        assert_eq!(trace.first_pt(), pt(0, 0));
        assert_eq!(trace.last_pt(), pt(3000, 1000));
        // two-segment 45-degree posture
        assert!(trace.seg_count() <= 2);
    }

    #[test]
    fn test_pullback_on_kink() {
        let mut w = world();
        let mut p = placer();
        // Tail going north, head now demanded to the north-east at an
        // angle that kinks the junction.
        p.start(&mut w, pt(0, 0));
        p.tail.set_shape(pll(&[pt(0, 0), pt(0, 1000), pt(-1000, 2000)]));
        p.head.set_shape(pll(&[pt(-1000, 2000), pt(500, 2200)]));

        let total_before = p.tail.seg_count() + p.head.seg_count();
        assert!(p.handle_pullback());
        let total_after = p.tail.seg_count() + p.head.seg_count();
        assert_eq!(total_before - total_after, 1);
        // tail now ends in the direction of its last remaining segment
        assert_eq!(p.tail.last_pt(), pt(0, 1000));
    }

    #[test]
    fn test_self_intersection_truncates_tail() {
        let mut w = world();
        let mut p = placer();
        p.start(&mut w, pt(0, 0));
        p.tail.set_shape(pll(&[
            pt(0, 0),
            pt(2000, 0),
            pt(2000, 2000),
            pt(4000, 2000),
        ]));
        // head crossing back over the tail's second segment
        p.head.set_shape(pll(&[pt(4000, 2000), pt(4000, 1000), pt(1000, 1000)]));
        assert!(p.handle_self_intersections());
        assert!(p.tail.pt_count() <= 3);
    }

    #[test]
    fn test_fix_and_commit() {
        let mut w = world();
        let mut p = placer();
        p.start(&mut w, pt(0, 0));
        assert!(p.route_to(&mut w, pt(4000, 0)));
        assert!(p.fix_route(&mut w, pt(4000, 0), true));
        assert!(p.commit_placement(&mut w));

        // the fixed track is now part of the root world
        let joint = w.find_joint(ROOT, pt(0, 0), 0, NetHandle(1));
        assert!(joint.is_some_and(|j| !j.is_empty()));
    }

    #[test]
    fn test_unfix_returns_to_previous_stage() {
        let mut w = world();
        let mut p = placer();
        p.start(&mut w, pt(0, 0));
        p.route_to(&mut w, pt(2000, 0));
        assert!(p.fix_route(&mut w, pt(2000, 0), false));
        let resume = p.unfix_route();
        assert!(resume.is_some());
        assert!(!p.is_idle());
    }

    #[test]
    fn test_merge_head_requires_clean_angles() {
        let mut w = world();
        let mut p = placer();
        p.start(&mut w, pt(0, 0));
        p.tail.set_shape(pll(&[pt(0, 0), pt(0, 1000)]));
        // head with an acute joint angle must not merge
        p.head.set_shape(pll(&[
            pt(0, 1000),
            pt(500, 500),
            pt(1500, 500),
            pt(2500, 1500),
        ]));
        assert!(!p.merge_head());
    }
}
