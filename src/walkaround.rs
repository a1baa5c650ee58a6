use std::collections::HashSet;

use log::trace;

use crate::geom::polyline::Polyline;
use crate::item::{Item, ItemId, Kind, KindMask};
use crate::line::Line;
use crate::node::{CollisionOpts, NodeId, World};
use crate::settings::RoutingSettings;
use crate::topo::{Cluster, Topology};

// Extra hull growth applied to cluster hulls so the walked line never hugs
// an obstacle at exactly the clearance distance.
const CLUSTER_HULL_EXTRA: i64 = 1000;

pub const MAX_WALK_POLICIES: usize = 3;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum WalkPolicy {
    Cw = 0,
    Ccw = 1,
    Shortest = 2,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum WalkStatus {
    InProgress,
    AlmostDone,
    Done,
    Stuck,
}

#[derive(Debug, Clone)]
pub struct WalkResult {
    pub status: [WalkStatus; MAX_WALK_POLICIES],
    pub lines: [Line; MAX_WALK_POLICIES],
}

impl WalkResult {
    fn new(initial: &Line) -> Self {
        let mut line = initial.clone();
        line.clear_links();
        Self {
            status: [WalkStatus::InProgress; MAX_WALK_POLICIES],
            lines: [line.clone(), line.clone(), line],
        }
    }

    pub fn line(&self, policy: WalkPolicy) -> &Line {
        &self.lines[policy as usize]
    }

    pub fn status(&self, policy: WalkPolicy) -> WalkStatus {
        self.status[policy as usize]
    }
}

pub struct Walkaround<'a> {
    world: &'a mut World,
    node: NodeId,
    settings: &'a RoutingSettings,
    item_mask: KindMask,
    iteration_limit: u32,
    enabled: [bool; MAX_WALK_POLICIES],
    restricted: Option<HashSet<ItemId>>,
    last_shortest_cluster: Option<Cluster>,
    length_limit_on: bool,
    length_expansion_factor: f64,
    initial_length: i64,
    iteration: u32,
}

impl<'a> Walkaround<'a> {
    pub fn new(world: &'a mut World, node: NodeId, settings: &'a RoutingSettings) -> Self {
        Self {
            world,
            node,
            settings,
            item_mask: KindMask::all() & !KindMask::only(Kind::Line),
            iteration_limit: settings.walkaround_iteration_limit,
            enabled: [true; MAX_WALK_POLICIES],
            restricted: None,
            last_shortest_cluster: None,
            length_limit_on: true,
            length_expansion_factor: 10.0,
            initial_length: 0,
            iteration: 0,
        }
    }

    pub fn set_solids_only(&mut self, solids_only: bool) {
        self.item_mask = if solids_only {
            Kind::Solid | Kind::Hole
        } else {
            KindMask::all() & !KindMask::only(Kind::Line)
        };
    }

    pub fn set_iteration_limit(&mut self, limit: u32) {
        self.iteration_limit = limit;
    }

    pub fn set_length_limit(&mut self, on: bool) {
        self.length_limit_on = on;
    }

    pub fn set_allowed_policies(&mut self, policies: &[WalkPolicy]) {
        self.enabled = [false; MAX_WALK_POLICIES];
        for p in policies {
            self.enabled[*p as usize] = true;
        }
    }

    pub fn restrict_to_cluster(&mut self, enabled: bool, cluster: &Cluster) {
        if enabled {
            let mut set: HashSet<ItemId> = cluster.items.iter().copied().collect();
            for &id in &cluster.items {
                if let Some(hole) = self.world.item(id).and_then(Item::hole) {
                    set.insert(hole);
                }
            }
            self.restricted = Some(set);
        } else {
            self.restricted = None;
        }
    }

    fn nearest_obstacle(&mut self, path: &Line) -> Option<crate::node::Obstacle> {
        let restricted = self.restricted.clone();
        let filter = restricted
            .as_ref()
            .map(|set| move |item: &Item| set.contains(&item.id()));
        let opts = CollisionOpts {
            kind_mask: self.item_mask,
            use_epsilon: false,
            corner_mode: self.settings.corner_mode,
            filter: filter.as_ref().map(|f| f as &dyn Fn(&Item) -> bool),
            ..CollisionOpts::default()
        };
        self.world.nearest_obstacle(self.node, path, &opts)
    }

    // Walks |line| around every hull of |cluster| on one side. Returns
    // false when any hull cannot be walked or the per-cluster time budget
    // runs out.
    fn process_cluster(&mut self, cluster: &Cluster, line: &mut Line, cw: bool) -> bool {
        let budget = self.settings.walkaround_time_limit();
        let is_90 = self.settings.corner_mode.is_90();

        for &cl_item in &cluster.items {
            if budget.expired() {
                trace!("walkaround cluster timeout");
                return false;
            }
            let Some(item) = self.world.item(cl_item).cloned() else { continue };
            let probe_item = probe_seg_item(line);
            let clearance = self.world.clearance(&item, &probe_item, false);
            let mut hull = self.world.hulls.hull(
                &item,
                clearance + CLUSTER_HULL_EXTRA,
                line.width(),
                line.layer(),
            );
            if is_90 {
                hull = Polyline::new_closed(&hull.bounds().pts());
            }

            match line.line().walkaround(&hull, cw) {
                Some(mut walked) => {
                    walked.simplify();
                    line.set_shape(walked);
                }
                None => return false,
            }
        }
        true
    }

    fn single_step(&mut self, result: &mut WalkResult) {
        let mut clusters: [Option<Cluster>; MAX_WALK_POLICIES] = [None, None, None];

        for policy in 0..MAX_WALK_POLICIES {
            if !self.enabled[policy] || result.status[policy] != WalkStatus::InProgress {
                continue;
            }
            let line = result.lines[policy].clone();
            match self.nearest_obstacle(&line) {
                None => {
                    result.status[policy] = WalkStatus::Done;
                }
                Some(obs) => {
                    let mut topo = Topology::new(self.world, self.node);
                    clusters[policy] = Some(topo.assemble_cluster(
                        obs.item,
                        line.layer(),
                        0.0,
                        Some(line.net()),
                    ));
                }
            }
        }

        for (policy, cw) in [(WalkPolicy::Cw as usize, true), (WalkPolicy::Ccw as usize, false)] {
            if !self.enabled[policy] {
                continue;
            }
            if let Some(cluster) = &clusters[policy] {
                let mut line = result.lines[policy].clone();
                if self.process_cluster(&cluster.clone(), &mut line, cw) {
                    result.lines[policy] = line;
                } else {
                    result.status[policy] = WalkStatus::Stuck;
                }
            }
        }

        if self.enabled[WalkPolicy::Shortest as usize] {
            if let Some(cluster) = clusters[WalkPolicy::Shortest as usize].take() {
                self.shortest_step(result, &cluster);
            }
        }
    }

    // Runs both sides on copies, picks the shorter non-colliding one, and
    // swaps to the alternative if the previous cluster still collides.
    fn shortest_step(&mut self, result: &mut WalkResult, cluster: &Cluster) {
        let idx = WalkPolicy::Shortest as usize;
        let base = result.lines[idx].clone();

        let mut path_cw = base.clone();
        let mut path_ccw = base.clone();
        let st_cw = self.process_cluster(cluster, &mut path_cw, true);
        let st_ccw = self.process_cluster(cluster, &mut path_ccw, false);

        let coll_opts =
            CollisionOpts { use_epsilon: false, ..CollisionOpts::default() };
        let cw_coll =
            st_cw && self.world.check_colliding_line(self.node, &path_cw, &coll_opts).is_some();
        let ccw_coll =
            st_ccw && self.world.check_colliding_line(self.node, &path_ccw, &coll_opts).is_some();

        let mut shortest: Option<Line> = None;
        let mut shortest_alt: Option<Line> = None;

        if st_cw && st_ccw {
            if cw_coll == ccw_coll {
                if path_cw.line().len() > path_ccw.line().len() {
                    shortest = Some(path_ccw);
                    shortest_alt = Some(path_cw);
                } else {
                    shortest = Some(path_cw);
                    shortest_alt = Some(path_ccw);
                }
            } else if !cw_coll {
                shortest = Some(path_cw);
            } else {
                shortest = Some(path_ccw);
            }
        } else if st_ccw {
            shortest = Some(path_ccw);
        } else if st_cw {
            shortest = Some(path_cw);
        }

        // If the previous iteration's cluster still collides with the pick,
        // swap to the alternative.
        if let (Some(prev), Some(pick)) = (&self.last_shortest_cluster, &shortest) {
            let mut any_colliding = false;
            for &id in &prev.items {
                let Some(item) = self.world.item(id).cloned() else { continue };
                let probe = probe_seg_item(pick);
                let cl = self.world.clearance(&item, &probe, false);
                for i in 0..pick.seg_count() {
                    let seg_probe = seg_probe_of(pick, i);
                    if seg_probe.collides(&item, cl) {
                        any_colliding = true;
                        break;
                    }
                }
                if any_colliding {
                    break;
                }
            }
            if any_colliding {
                shortest = shortest_alt;
            }
        }

        match shortest {
            Some(line) => result.lines[idx] = line,
            None => result.status[idx] = WalkStatus::Stuck,
        }
        self.last_shortest_cluster = Some(cluster.clone());
    }

    pub fn route(&mut self, initial: &Line) -> WalkResult {
        let mut result = WalkResult::new(initial);
        self.initial_length = initial.line().len().max(1);
        self.iteration = 0;
        self.last_shortest_cluster = None;

        while self.iteration < self.iteration_limit {
            self.single_step(&mut result);

            let mut still_in_progress = false;
            for policy in 0..MAX_WALK_POLICIES {
                if !self.enabled[policy] {
                    continue;
                }
                let factor =
                    result.lines[policy].line().len() as f64 / self.initial_length as f64;
                // A path many times the initial length will not improve;
                // return it as best-effort instead of spinning on the
                // iteration limit.
                if self.length_limit_on
                    && result.status[policy] != WalkStatus::Done
                    && factor > self.length_expansion_factor
                {
                    result.status[policy] = WalkStatus::AlmostDone;
                }
                if result.status[policy] == WalkStatus::InProgress {
                    still_in_progress = true;
                }
            }
            if !still_in_progress {
                break;
            }
            self.iteration += 1;
        }

        for policy in 0..MAX_WALK_POLICIES {
            let st = &mut result.status[policy];
            let line = &result.lines[policy];
            if *st == WalkStatus::InProgress {
                *st = WalkStatus::AlmostDone;
            }
            if line.seg_count() < 1 || line.first_pt() != initial.first_pt() {
                *st = WalkStatus::Stuck;
            } else if line.last_pt() != initial.last_pt() {
                *st = WalkStatus::AlmostDone;
            }
        }
        result
    }
}

fn probe_seg_item(line: &Line) -> Item {
    seg_probe_of(line, 0)
}

fn seg_probe_of(line: &Line, i: usize) -> Item {
    use crate::item::{ItemId, SegmentItem};
    let s = if line.seg_count() > 0 {
        line.seg(i)
    } else {
        crate::geom::seg(line.first_pt(), line.first_pt())
    };
    Item::Segment(SegmentItem {
        id: ItemId::INVALID,
        net: line.net(),
        layer: line.layer(),
        seg: s,
        width: line.width(),
        parent: Default::default(),
        rank: -1,
        marker: 0,
        locked: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::shape::Shape;
    use crate::geom::{pll, pt, rt};
    use crate::item::{LayerSet, NetHandle, Solid};
    use crate::node::ROOT;
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(250)))
    }

    #[test]
    fn test_walk_around_rect_pad() {
        let mut w = world();
        // 1500 x 1000 rectangular pad centred at origin
        let rect = rt(-750, -500, 750, 500);
        let solid =
            Solid::new(pt(0, 0), Shape::Rect(rect), LayerSet::one(0), NetHandle(2));
        w.add(ROOT, Item::Solid(solid), false).unwrap();

        let settings = RoutingSettings::default();
        // line through the pad centre
        let line =
            Line::new(pll(&[pt(-6000, 0), pt(6000, 0)]), 200, 0, NetHandle(1));

        let mut walk = Walkaround::new(&mut w, ROOT, &settings);
        walk.set_allowed_policies(&[WalkPolicy::Shortest]);
        let result = walk.route(&line);

        assert_eq!(result.status(WalkPolicy::Shortest), WalkStatus::Done);
        let out = result.line(WalkPolicy::Shortest);
        assert_eq!(out.first_pt(), pt(-6000, 0));
        assert_eq!(out.last_pt(), pt(6000, 0));
        assert!(out.pt_count() > 2);
        assert!(out.line().len() <= line.line().len() * 5 / 2);

        // result must clear the pad
        assert!(w
            .check_colliding_line(ROOT, out, &CollisionOpts::default())
            .is_none());
    }

    #[test]
    fn test_walk_no_obstacle_is_done() {
        let mut w = world();
        let settings = RoutingSettings::default();
        let line = Line::new(pll(&[pt(0, 0), pt(1000, 0)]), 200, 0, NetHandle(1));
        let mut walk = Walkaround::new(&mut w, ROOT, &settings);
        let result = walk.route(&line);
        assert_eq!(result.status(WalkPolicy::Cw), WalkStatus::Done);
        assert_eq!(result.status(WalkPolicy::Ccw), WalkStatus::Done);
    }

    #[test]
    fn test_walk_cw_ccw_opposite_sides() {
        let mut w = world();
        let solid = Solid::new(
            pt(0, 0),
            Shape::Rect(rt(-500, -500, 500, 500)),
            LayerSet::one(0),
            NetHandle(2),
        );
        w.add(ROOT, Item::Solid(solid), false).unwrap();

        let settings = RoutingSettings::default();
        let line = Line::new(pll(&[pt(-5000, 0), pt(5000, 0)]), 200, 0, NetHandle(1));
        let mut walk = Walkaround::new(&mut w, ROOT, &settings);
        walk.set_allowed_policies(&[WalkPolicy::Cw, WalkPolicy::Ccw]);
        let result = walk.route(&line);

        assert_eq!(result.status(WalkPolicy::Cw), WalkStatus::Done);
        assert_eq!(result.status(WalkPolicy::Ccw), WalkStatus::Done);
        let cw_above = result.line(WalkPolicy::Cw).line().pts().iter().any(|p| p.y > 0);
        let ccw_above = result.line(WalkPolicy::Ccw).line().pts().iter().any(|p| p.y > 0);
        assert_ne!(cw_above, ccw_above);
    }
}
