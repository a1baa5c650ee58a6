use log::trace;

use crate::geom::direction::build_initial_trace;
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::item::{Item, ItemId, NetHandle, Via, ViaHandle};
use crate::line::Line;
use crate::node::{AssembleOpts, CollisionOpts, NodeId, World, ROOT};
use crate::settings::{RouterMode, RoutingSettings};
use crate::shove::{Shove, ShoveStatus, SHP_DONT_LOCK_ENDPOINTS, SHP_SHOVE};
use crate::walkaround::{WalkPolicy, WalkStatus, Walkaround};

// Grab distance deciding corner drag vs segment drag, as a fraction of the
// segment length.
const CORNER_GRAB_RATIO: f64 = 0.2;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DragMode {
    Segment,
    Corner,
    Via,
    FreeAngle,
}

// Per-mode front-end for dragging existing tracks and vias: picks the
// dragged primitive, produces candidate head geometry and hands it to
// shove/walkaround per the active router mode.
pub struct Dragger {
    settings: RoutingSettings,
    shove: Shove,
    mode: DragMode,
    orig_line: Line,
    dragged_via: Option<ViaHandle>,
    seg_index: usize,
    current_node: NodeId,
    last_valid: Option<Line>,
    active: bool,
    free_angle: bool,
}

impl Dragger {
    pub fn new(settings: RoutingSettings) -> Self {
        let free_angle = settings.free_angle_mode;
        Self {
            shove: Shove::new(ROOT, settings.clone()),
            settings,
            mode: DragMode::Segment,
            orig_line: Line::default(),
            dragged_via: None,
            seg_index: 0,
            current_node: ROOT,
            last_valid: None,
            active: false,
            free_angle,
        }
    }

    pub fn mode(&self) -> DragMode {
        self.mode
    }

    pub fn current_node(&self) -> NodeId {
        self.current_node
    }

    pub fn trace(&self) -> Option<&Line> {
        self.last_valid.as_ref()
    }

    // Picks the dragged primitive under |p|. Returns false on empty or
    // unusable starts.
    pub fn start(&mut self, world: &mut World, p: Pt, item: ItemId) -> bool {
        if self.active {
            return false;
        }
        let Some(it) = world.item(item).cloned() else { return false };

        self.shove = Shove::new(ROOT, self.settings.clone());
        self.current_node = ROOT;
        self.last_valid = None;

        match it {
            Item::Via(v) => {
                if v.locked {
                    return false;
                }
                self.mode = DragMode::Via;
                self.dragged_via = Some(v.handle());
            }
            Item::Segment(ref s) => {
                let mut seg_index = 0usize;
                self.orig_line = world.assemble_line(
                    ROOT,
                    item,
                    Some(&mut seg_index),
                    AssembleOpts::default(),
                );
                self.seg_index = seg_index;

                if self.free_angle {
                    self.mode = DragMode::FreeAngle;
                } else {
                    // grab near an endpoint drags the corner, elsewhere the
                    // segment body
                    let d_st = p.dist(s.seg.st());
                    let d_en = p.dist(s.seg.en());
                    let grab = s.seg.len() * CORNER_GRAB_RATIO;
                    self.mode = if d_st.min(d_en) < grab.max(s.width as f64) {
                        DragMode::Corner
                    } else {
                        DragMode::Segment
                    };
                }
            }
            Item::Arc(_) => {
                self.orig_line =
                    world.assemble_line(ROOT, item, None, AssembleOpts::default());
                self.seg_index = 0;
                self.mode = DragMode::Corner;
            }
            _ => return false,
        }

        self.active = true;
        trace!("dragger start mode {:?}", self.mode);
        true
    }

    // The corner of the original line nearest to the cursor, for corner
    // drags.
    fn nearest_corner_index(&self, p: Pt) -> usize {
        let mut best = 0;
        let mut best_d = i128::MAX;
        for (i, &v) in self.orig_line.line().pts().iter().enumerate() {
            let d = v.dist2(p);
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }

    fn dragged_line_shape(&self, p: Pt) -> Line {
        let mut dragged = self.orig_line.clone();
        dragged.clear_links();

        match self.mode {
            DragMode::Corner => {
                let idx = self.nearest_corner_index(p);
                dragged.drag_corner(p, idx);
            }
            DragMode::FreeAngle => {
                let idx = self.nearest_corner_index(p);
                let mut pts = dragged.line().pts().to_vec();
                pts[idx] = p;
                dragged.set_shape(Polyline::new(&pts));
            }
            DragMode::Segment => {
                // translate the grabbed segment laterally, re-mitering the
                // connections to its neighbours
                let s = self.orig_line.seg(self.seg_index.min(self.orig_line.seg_count() - 1));
                let near = s.project(p);
                let delta = p - near;
                let mut pl = Polyline::default();
                let start = self.orig_line.first_pt();
                let end = self.orig_line.last_pt();
                pl.append(start);
                let lead_in = build_initial_trace(
                    start,
                    s.st() + delta,
                    true,
                    self.settings.corner_mode,
                );
                pl.append_polyline(&lead_in);
                pl.append(s.en() + delta);
                let lead_out = build_initial_trace(
                    s.en() + delta,
                    end,
                    false,
                    self.settings.corner_mode,
                );
                pl.append_polyline(&lead_out);
                pl.simplify();
                dragged.set_shape(pl);
            }
            DragMode::Via => {}
        }
        if self.settings.smooth_dragged_segments {
            dragged.line_mut().simplify();
        }
        dragged
    }

    pub fn drag(&mut self, world: &mut World, p: Pt) -> bool {
        if !self.active {
            return false;
        }
        match self.mode {
            DragMode::Via => self.drag_via(world, p),
            DragMode::FreeAngle => self.drag_mark_obstacles(world, p),
            _ => match self.settings.mode {
                RouterMode::Shove => self.drag_shove(world, p),
                RouterMode::Walkaround => self.drag_walkaround(world, p),
                RouterMode::MarkObstacles => self.drag_mark_obstacles(world, p),
            },
        }
    }

    fn drag_via(&mut self, world: &mut World, p: Pt) -> bool {
        let Some(handle) = self.dragged_via else { return false };
        self.shove.clear_heads();
        self.shove.add_head_via(handle, p, SHP_SHOVE);
        let ok = self.shove.run(world) == ShoveStatus::Ok;
        self.current_node = self.shove.current_node();
        // the handle keeps naming the root-world via; every drag re-shoves
        // from the base state after springback reduction
        ok
    }

    fn drag_shove(&mut self, world: &mut World, p: Pt) -> bool {
        let dragged = self.dragged_line_shape(p);

        self.shove.clear_heads();
        // both endpoints of a dragged mid-track stay joints of the old
        // line; don't pin them twice
        self.shove.add_head_line(&dragged, SHP_SHOVE | SHP_DONT_LOCK_ENDPOINTS);
        let ok = self.shove.run(world) == ShoveStatus::Ok;
        self.current_node = self.shove.current_node();

        if ok {
            let final_line = self
                .shove
                .modified_head(0)
                .cloned()
                .unwrap_or_else(|| dragged.clone());
            self.last_valid = Some(final_line);
            true
        } else {
            // keep showing the last resolvable position
            self.last_valid.is_some()
        }
    }

    fn drag_walkaround(&mut self, world: &mut World, p: Pt) -> bool {
        let dragged = self.dragged_line_shape(p);
        let result = {
            let mut walk = Walkaround::new(world, self.current_node, &self.settings);
            walk.set_allowed_policies(&[WalkPolicy::Shortest]);
            walk.route(&dragged)
        };
        match result.status(WalkPolicy::Shortest) {
            WalkStatus::Done => {
                let mut l = result.line(WalkPolicy::Shortest).clone();
                l.clear_links();
                self.last_valid = Some(l);
                true
            }
            _ => self.last_valid.is_some(),
        }
    }

    fn drag_mark_obstacles(&mut self, world: &mut World, p: Pt) -> bool {
        let dragged = self.dragged_line_shape(p);
        let _ = world.check_colliding_line(self.current_node, &dragged, &CollisionOpts::default());
        self.last_valid = Some(dragged);
        true
    }

    // Applies the drag: replaces the original line (or via) in the branch
    // and commits it to the root.
    pub fn fix_route(&mut self, world: &mut World) -> bool {
        if !self.active {
            return false;
        }
        let node = self.current_node;

        match self.mode {
            DragMode::Via => {}
            _ => {
                if let Some(final_line) = self.last_valid.clone() {
                    let mut old = self.orig_line.clone();
                    let mut new = final_line;
                    new.clear_links();
                    if node == ROOT {
                        world.replace_line(ROOT, &mut old, &mut new, false);
                    } else {
                        world.remove_line(node, &mut old);
                        world.add_line(node, &mut new, false);
                    }
                }
            }
        }

        if node != ROOT {
            world.commit(ROOT, node);
        }
        self.active = false;
        self.current_node = ROOT;
        true
    }

    pub fn abort(&mut self, world: &mut World) {
        world.kill_children(ROOT);
        self.active = false;
        self.current_node = ROOT;
        self.last_valid = None;
    }
}

// Rigidly displaces a component's pads, dragging the attached track ends
// along by shoving synthetic head lines.
pub struct ComponentDragger {
    settings: RoutingSettings,
    shove: Shove,
    solids: Vec<ItemId>,
    tethers: Vec<(Line, Pt)>, // (attached line, its pad-side endpoint)
    initial: Pt,
    current_node: NodeId,
    active: bool,
}

impl ComponentDragger {
    pub fn new(settings: RoutingSettings) -> Self {
        Self {
            shove: Shove::new(ROOT, settings.clone()),
            settings,
            solids: Vec::new(),
            tethers: Vec::new(),
            initial: Pt::zero(),
            current_node: ROOT,
            active: false,
        }
    }

    pub fn current_node(&self) -> NodeId {
        self.current_node
    }

    pub fn start(&mut self, world: &mut World, p: Pt, solids: &[ItemId]) -> bool {
        if self.active || solids.is_empty() {
            return false;
        }
        self.solids = solids.to_vec();
        self.tethers.clear();
        self.initial = p;

        // collect the lines ending on each dragged pad
        for &id in solids {
            let Some(Item::Solid(s)) = world.item(id).cloned() else { continue };
            let Some(joint) =
                world.find_joint(ROOT, s.pos, s.layers.start(), s.net).cloned()
            else {
                continue;
            };
            for &link in joint.links() {
                if matches!(world.item(link), Some(Item::Segment(_) | Item::Arc(_))) {
                    let line = world.assemble_line(ROOT, link, None, AssembleOpts::default());
                    let pad_end = if line.last_pt() == s.pos {
                        line.last_pt()
                    } else {
                        line.first_pt()
                    };
                    self.tethers.push((line, pad_end));
                }
            }
        }

        self.shove = Shove::new(ROOT, self.settings.clone());
        self.current_node = ROOT;
        self.active = true;
        true
    }

    pub fn drag(&mut self, world: &mut World, p: Pt) -> bool {
        if !self.active {
            return false;
        }
        let delta = p - self.initial;

        self.shove.clear_heads();
        let mut heads = Vec::new();
        for (line, pad_end) in &self.tethers {
            let mut head = line.clone();
            head.clear_links();
            let idx = if line.last_pt() == *pad_end {
                line.pt_count() - 1
            } else {
                0
            };
            head.drag_corner(*pad_end + delta, idx);
            heads.push(head);
        }
        for head in &heads {
            self.shove.add_head_line(head, SHP_SHOVE | SHP_DONT_LOCK_ENDPOINTS);
        }
        let ok = self.shove.run(world) == ShoveStatus::Ok;
        self.current_node = self.shove.current_node();

        if ok && self.current_node != ROOT {
            // displace the solids in the tentative branch
            for &id in &self.solids {
                let Some(Item::Solid(s)) = world.item(id).cloned() else { continue };
                let mut moved = s;
                moved.id = ItemId::INVALID;
                moved.pos += delta;
                moved.shape = moved.shape.translated(delta);
                for a in moved.anchors.iter_mut() {
                    *a += delta;
                }
                world.remove(self.current_node, id);
                world.add(self.current_node, Item::Solid(moved), true);
            }
            // replace the original tethers with the dragged versions
            for ((line, _), head) in self.tethers.iter().zip(heads.iter()) {
                let mut old = line.clone();
                let mut new = head.clone();
                new.clear_links();
                world.remove_line(self.current_node, &mut old);
                world.add_line(self.current_node, &mut new, true);
            }
        }
        ok
    }

    pub fn fix_route(&mut self, world: &mut World) -> bool {
        if !self.active {
            return false;
        }
        if self.current_node != ROOT {
            world.commit(ROOT, self.current_node);
        }
        self.active = false;
        self.current_node = ROOT;
        true
    }

    pub fn abort(&mut self, world: &mut World) {
        world.kill_children(ROOT);
        self.active = false;
        self.current_node = ROOT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pt, seg};
    use crate::item::{ItemId, LayerSet, ParentHandle, SegmentItem};
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(200)))
    }

    fn add_seg(w: &mut World, a: Pt, b: Pt, net: u64) -> ItemId {
        w.add(
            ROOT,
            Item::Segment(SegmentItem {
                id: ItemId::INVALID,
                net: NetHandle(net),
                layer: 0,
                seg: seg(a, b),
                width: 200,
                parent: ParentHandle::default(),
                rank: -1,
                marker: 0,
                locked: false,
            }),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_corner_vs_segment_mode() {
        let mut w = world();
        let id = add_seg(&mut w, pt(0, 0), pt(10000, 0), 1);

        let mut d = Dragger::new(RoutingSettings::default());
        assert!(d.start(&mut w, pt(100, 0), id));
        assert_eq!(d.mode(), DragMode::Corner);

        let mut d = Dragger::new(RoutingSettings::default());
        assert!(d.start(&mut w, pt(5000, 0), id));
        assert_eq!(d.mode(), DragMode::Segment);
    }

    #[test]
    fn test_via_drag_mode() {
        let mut w = world();
        let via = Via::new(pt(0, 0), LayerSet::new(0, 31), 600, 300, NetHandle(1));
        let id = w.add(ROOT, Item::Via(via), false).unwrap();

        let mut d = Dragger::new(RoutingSettings::default());
        assert!(d.start(&mut w, pt(0, 0), id));
        assert_eq!(d.mode(), DragMode::Via);
        assert!(d.drag(&mut w, pt(500, 500)));
        assert!(d.fix_route(&mut w));

        // the via landed at its new position in the root
        let handle = ViaHandle {
            pos: pt(500, 500),
            layers: LayerSet::new(0, 31),
            net: NetHandle(1),
            valid: true,
        };
        assert!(w.find_via_by_handle(ROOT, &handle).is_some());
    }

    #[test]
    fn test_segment_drag_displaces() {
        let mut w = world();
        let id = add_seg(&mut w, pt(0, 0), pt(10000, 0), 1);

        let mut d = Dragger::new(RoutingSettings::default());
        assert!(d.start(&mut w, pt(5000, 0), id));
        assert!(d.drag(&mut w, pt(5000, 1500)));
        let dragged = d.trace().unwrap().clone();
        assert!(dragged.line().pts().iter().any(|p| p.y >= 1500));
        assert_eq!(dragged.first_pt(), pt(0, 0));
        assert_eq!(dragged.last_pt(), pt(10000, 0));
        assert!(d.fix_route(&mut w));
    }

    #[test]
    fn test_locked_via_refuses_drag() {
        let mut w = world();
        let mut via = Via::new(pt(0, 0), LayerSet::new(0, 31), 600, 300, NetHandle(1));
        via.locked = true;
        let id = w.add(ROOT, Item::Via(via), false).unwrap();
        let mut d = Dragger::new(RoutingSettings::default());
        assert!(!d.start(&mut w, pt(0, 0), id));
    }
}
