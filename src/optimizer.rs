use enumset::{EnumSet, EnumSetType};
use ordered_float::OrderedFloat;

use crate::geom::direction::{build_initial_trace, AngleKind, AngleSet, CornerMode, Dir45};
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::geom::rect::Rt;
use crate::geom::segment::{line_line_intersection, Seg};
use crate::geom::shape::{SegShape, Shape};
use crate::item::{Item, ItemId, Kind, KindMask, NetHandle};
use crate::line::Line;
use crate::node::{CollisionOpts, NodeId, World};

#[derive(Debug, EnumSetType)]
pub enum Effort {
    MergeSegments,
    MergeObtuse,
    MergeColinear,
    SmartPads,
    FanoutCleanup,
    RestrictArea,
    RestrictVertexRange,
    PreserveVertex,
    KeepTopology,
    LimitCornerCount,
}

pub type EffortSet = EnumSet<Effort>;

// Corner-cost model: cheaper is smoother.
pub struct CostEstimator;

impl CostEstimator {
    pub fn corner_cost(a: &Seg, b: &Seg) -> i64 {
        match Dir45::from_seg(a).angle(Dir45::from_seg(b)) {
            AngleKind::Straight => 5,
            AngleKind::Obtuse => 10,
            AngleKind::Right => 30,
            AngleKind::Acute => 50,
            AngleKind::HalfFull => 60,
            AngleKind::Undefined => 100,
        }
    }

    pub fn corner_cost_line(l: &Polyline) -> i64 {
        let mut total = 0;
        for i in 0..l.seg_count().saturating_sub(1) {
            total += Self::corner_cost(&l.seg(i), &l.seg(i + 1));
        }
        total
    }

    // A candidate wins outright on both axes, or within tolerances.
    pub fn is_better(
        old_corner: i64,
        old_len: i64,
        new_corner: i64,
        new_len: i64,
        len_tolerance: f64,
        corner_tolerance: f64,
    ) -> bool {
        (new_corner < old_corner && new_len < old_len)
            || ((new_corner as f64) < old_corner as f64 * corner_tolerance
                && (new_len as f64) < old_len as f64 * len_tolerance)
    }
}

// Single-line optimizer: merges segments, smoothes corners and cleans pad
// exits without ever making the line collide.
pub struct Optimizer<'a> {
    world: &'a mut World,
    node: NodeId,
    effort: EffortSet,
    collision_mask: KindMask,
    corner_mode: CornerMode,
    restrict_area: Option<Rt>,
    restrict_area_strict: bool,
    preserved_vertex: Option<Pt>,
    restricted_vertex_range: Option<(usize, usize)>,
    root_obtuse_limit: Option<usize>,
}

impl<'a> Optimizer<'a> {
    pub fn new(world: &'a mut World, node: NodeId) -> Self {
        Self {
            world,
            node,
            effort: Effort::MergeSegments.into(),
            collision_mask: KindMask::all(),
            corner_mode: CornerMode::Mitered45,
            restrict_area: None,
            restrict_area_strict: false,
            preserved_vertex: None,
            restricted_vertex_range: None,
            root_obtuse_limit: None,
        }
    }

    pub fn set_effort(&mut self, effort: EffortSet) {
        self.effort = effort;
    }

    pub fn set_collision_mask(&mut self, mask: KindMask) {
        self.collision_mask = mask;
    }

    pub fn set_corner_mode(&mut self, mode: CornerMode) {
        self.corner_mode = mode;
    }

    pub fn set_restrict_area(&mut self, area: Rt, strict: bool) {
        self.restrict_area = Some(area);
        self.restrict_area_strict = strict;
    }

    pub fn set_preserved_vertex(&mut self, v: Pt) {
        self.preserved_vertex = Some(v);
    }

    pub fn set_restricted_vertex_range(&mut self, start: usize, end: usize) {
        self.restricted_vertex_range = Some((start, end));
    }

    // One-shot convenience used by the placer.
    pub fn optimize_line(
        world: &mut World,
        node: NodeId,
        line: &mut Line,
        effort: EffortSet,
        corner_mode: CornerMode,
    ) -> bool {
        let mut opt = Optimizer::new(world, node);
        opt.set_effort(effort);
        opt.set_corner_mode(corner_mode);
        match opt.optimize(line, None) {
            Some(better) => {
                *line = better;
                true
            }
            None => false,
        }
    }

    pub fn optimize(&mut self, line: &Line, root: Option<&Line>) -> Option<Line> {
        let mut result = line.clone();
        result.clear_links();

        let has_arcs = line.line().arc_count() > 0;
        let mut improved = false;

        self.root_obtuse_limit = if self.effort.contains(Effort::LimitCornerCount) {
            root.map(|r| r.count_corners(AngleKind::Obtuse.into()))
        } else {
            None
        };

        if !has_arcs && self.effort.contains(Effort::MergeSegments) {
            improved |= self.merge_full(&mut result);
        }
        if !has_arcs && self.effort.contains(Effort::MergeObtuse) {
            improved |= self.merge_obtuse(&mut result);
        }
        if self.effort.contains(Effort::MergeColinear) {
            improved |= self.merge_colinear(&mut result);
        }
        if !has_arcs && self.effort.contains(Effort::SmartPads) {
            improved |= self.run_smart_pads(&mut result);
        }
        if !has_arcs && self.effort.contains(Effort::FanoutCleanup) {
            improved |= self.fanout_cleanup(&mut result);
        }

        improved.then_some(result)
    }

    fn check_colliding(&mut self, line: &Line) -> bool {
        let opts = CollisionOpts {
            kind_mask: self.collision_mask,
            corner_mode: self.corner_mode,
            ..CollisionOpts::default()
        };
        self.world.check_colliding_line(self.node, line, &opts).is_some()
    }

    fn check_colliding_path(&mut self, line: &Line, path: &Polyline) -> bool {
        let mut tmp = line.clone();
        tmp.set_shape(path.clone());
        self.check_colliding(&tmp)
    }

    // Every registered constraint must accept the replacement of vertices
    // [v1..=v2] of |current| by |replacement|.
    fn check_constraints(
        &mut self,
        v1: usize,
        v2: usize,
        origin: &Line,
        current: &Polyline,
        replacement: &Polyline,
    ) -> bool {
        if let Some((rs, re)) = self.restricted_vertex_range {
            if v1 < rs || v2 > re {
                return false;
            }
        }

        if let Some(area) = self.restrict_area {
            let p1_in = area.contains(current.pt(v1));
            let p2_in = area.contains(current.pt(v2.min(current.pt_count() - 1)));
            if self.restrict_area_strict {
                if !(p1_in && p2_in) {
                    return false;
                }
            } else if !p1_in && !p2_in {
                return false;
            }
        }

        if let Some(v) = self.preserved_vertex {
            let mut covered = false;
            for i in v1..v2.min(current.seg_count()) {
                if current.seg(i).dist2_to_pt(v) <= 1 {
                    covered = true;
                    break;
                }
            }
            if covered {
                let mut kept = false;
                for i in 0..replacement.seg_count() {
                    if replacement.seg(i).dist2_to_pt(v) <= 1 {
                        kept = true;
                        break;
                    }
                }
                if !kept {
                    return false;
                }
            }
        }

        if self.effort.contains(Effort::KeepTopology)
            && !self.check_keep_topology(v1, v2, origin, current, replacement)
        {
            return false;
        }

        if let Some(limit) = self.root_obtuse_limit {
            let mut path = current.clone();
            path.replace_range(v1, v2, replacement);
            path.simplify();
            let mut tmp = origin.clone();
            tmp.set_shape(path);
            if tmp.count_corners(AngleKind::Obtuse.into()) > limit {
                return false;
            }
        }

        true
    }

    // The closed polygon formed by the replaced slice and the reversed
    // replacement must not swallow a joint of another net.
    fn check_keep_topology(
        &mut self,
        v1: usize,
        v2: usize,
        origin: &Line,
        current: &Polyline,
        replacement: &Polyline,
    ) -> bool {
        let mut enc = current.slice(v1, v2 as isize);
        let rev = replacement.reversed();
        for &p in rev.pts() {
            enc.append(p);
        }
        enc.set_closed(true);

        let joints = self.world.query_joints(
            self.node,
            &enc.bounds(),
            crate::item::LayerSet::one(origin.layer()),
            Kind::Solid | Kind::Via,
        );
        for j in joints {
            if j.net() == origin.net() {
                continue;
            }
            if enc.pts().contains(&j.pos()) {
                continue;
            }
            if enc.point_inside(j.pos()) {
                return false;
            }
        }
        true
    }

    // Iterative two-segment bypass at decreasing step widths.
    fn merge_full(&mut self, line: &mut Line) -> bool {
        line.line_mut().simplify();
        let segs_pre = line.seg_count();
        let mut step = segs_pre.saturating_sub(1);
        let mut current = line.line().clone();

        loop {
            let n_segs = current.seg_count();
            let max_step = n_segs.saturating_sub(2);
            step = step.min(max_step);
            if step < 1 {
                break;
            }
            if !self.merge_step(line, &mut current, step) {
                step -= 1;
            }
            if step == 0 {
                break;
            }
        }

        line.set_shape(current);
        line.seg_count() < segs_pre
    }

    fn merge_step(&mut self, origin: &Line, current: &mut Polyline, step: usize) -> bool {
        let n_segs = current.seg_count();
        if n_segs < 2 || n_segs <= step {
            return false;
        }
        let cost_orig = CostEstimator::corner_cost_line(current);

        for n in 0..n_segs - step {
            if current.is_arc_seg(n) || current.is_arc_seg(n + step) {
                continue;
            }
            let s1 = current.seg(n);
            let s2 = current.seg(n + step);

            let mut picked: Option<(Polyline, i64)> = None;
            for diag in [true, false] {
                let bypass = build_initial_trace(s1.st(), s2.en(), diag, self.corner_mode);
                if self.check_colliding_path(origin, &bypass) {
                    continue;
                }
                if !self.check_constraints(n, n + step + 1, origin, current, &bypass) {
                    continue;
                }
                let mut path = current.clone();
                path.replace_range(n, n + step + 1, &bypass);
                path.simplify();
                let cost = CostEstimator::corner_cost_line(&path);
                if picked.as_ref().map_or(true, |(_, c)| cost < *c) {
                    picked = Some((path, cost));
                }
            }

            if let Some((path, cost)) = picked {
                if cost < cost_orig {
                    *current = path;
                    return true;
                }
            }
        }
        false
    }

    // Collapse obtuse pairs into their straight intersection.
    fn merge_obtuse(&mut self, line: &mut Line) -> bool {
        let segs_pre = line.seg_count();
        let mut current = line.line().clone();
        let mut step = current.pt_count().saturating_sub(3);

        loop {
            let n_segs = current.seg_count();
            step = step.min(n_segs.saturating_sub(2));
            if step < 2 {
                break;
            }
            let mut found = false;
            for n in 0..n_segs - step {
                let s1 = current.seg(n);
                let s2 = current.seg(n + step);
                if !Dir45::from_seg(&s1).is_obtuse(Dir45::from_seg(&s2)) {
                    continue;
                }
                let Some(ip) = line_line_intersection(&s1, &s2) else { continue };
                let s1_opt = Seg::new(s1.st(), ip);
                let s2_opt = Seg::new(ip, s2.en());
                if !Dir45::from_seg(&s1_opt).is_obtuse(Dir45::from_seg(&s2_opt)) {
                    continue;
                }
                let opt_path = Polyline::new(&[s1_opt.st(), ip, s2_opt.en()]);
                if self.check_colliding_path(line, &opt_path) {
                    continue;
                }
                current.replace_range(n, n + step + 1, &opt_path);
                current.simplify();
                found = true;
                break;
            }
            if !found {
                if step <= 2 {
                    break;
                }
                step -= 1;
            }
        }

        line.set_shape(current);
        line.seg_count() < segs_pre
    }

    fn merge_colinear(&mut self, line: &mut Line) -> bool {
        let n_pre = line.seg_count();
        let pl = line.line_mut();
        let mut i = 0;
        while i + 1 < pl.seg_count() {
            let s1 = pl.seg(i);
            let s2 = pl.seg(i + 1);
            if s1.is_zero_len() || s2.is_zero_len() {
                i += 1;
                continue;
            }
            if !pl.is_pt_on_arc(i + 1)
                && s1.side_of(s2.en()) == 0
                && s1.dir().dot(s2.dir()) >= 0
            {
                pl.remove(i + 1);
            } else {
                i += 1;
            }
        }
        line.seg_count() < n_pre
    }

    fn find_pad_or_via(&self, layer: i32, net: NetHandle, p: Pt) -> Option<ItemId> {
        let joint = self.world.find_joint(self.node, p, layer, net)?;
        joint
            .links()
            .iter()
            .copied()
            .find(|&id| matches!(self.world.item(id), Some(Item::Via(_) | Item::Solid(_))))
    }

    // Candidate exit stubs out of a pad. In 90-degree corner modes only
    // the four axis directions are offered.
    fn compute_breakouts(&self, width: i64, pad: &Item, permit_diagonal: bool) -> Vec<Polyline> {
        let Item::Solid(solid) = pad else { return Vec::new() };
        match &solid.shape {
            Shape::Circle(c) => {
                let mut out = Vec::new();
                let l = (c.r() as f64 * std::f64::consts::SQRT_2).round() as i64;
                for (dx, dy) in octagon_dirs() {
                    if !permit_diagonal && dx != 0 && dy != 0 {
                        continue;
                    }
                    out.push(Polyline::new(&[c.p(), c.p() + Pt::new(dx, dy).resized(l)]));
                }
                out
            }
            Shape::Rect(r) => self.rect_breakouts(width, r, solid.pos, permit_diagonal),
            Shape::Segment(s) => {
                let r = s.seg.bounds().inflated(s.width / 2);
                self.rect_breakouts(width, &r, solid.pos, permit_diagonal)
            }
            Shape::Polygon(pts) => {
                // shoot rays from the anchor to the polygon boundary
                let outline = Polyline::new_closed(pts);
                let bbox = outline.bounds();
                let len = bbox.w().max(bbox.h()) / 2 + 5;
                let mut out = Vec::new();
                for (dx, dy) in octagon_dirs() {
                    if !permit_diagonal && dx != 0 && dy != 0 {
                        continue;
                    }
                    let far = solid.pos + Pt::new(dx, dy).resized(len);
                    let probe = Polyline::new(&[solid.pos, far]);
                    let mut isects = probe.intersect(&outline);
                    isects.sort_by_key(|i| OrderedFloat(solid.pos.dist(i.p)));
                    if let Some(first) = isects.first() {
                        out.push(Polyline::new(&[solid.pos, first.p]));
                    }
                }
                out
            }
            Shape::Compound(_) => Vec::new(),
        }
    }

    fn rect_breakouts(
        &self,
        width: i64,
        r: &Rt,
        center: Pt,
        permit_diagonal: bool,
    ) -> Vec<Polyline> {
        let (sx, sy) = (r.w(), r.h());
        let c = center;
        let d_vert = Pt::new(0, sy / 2 + width);
        let d_horiz = Pt::new(sx / 2 + width, 0);
        let mut out = vec![
            Polyline::new(&[c, c + d_horiz]),
            Polyline::new(&[c, c - d_horiz]),
            Polyline::new(&[c, c + d_vert]),
            Polyline::new(&[c, c - d_vert]),
        ];
        if permit_diagonal {
            let l = width + sx.min(sy) / 2;
            // offset along the long axis so diagonals leave near the ends
            let d_offset = if sx > sy {
                Pt::new((sx - sy) / 2, 0)
            } else if sy > sx {
                Pt::new(0, (sy - sx) / 2)
            } else {
                Pt::zero()
            };
            for (ox, dx, dy) in [
                (1, l, l),
                (1, l, -l),
                (-1, -l, l),
                (-1, -l, -l),
            ] {
                let mid = c + d_offset * ox;
                out.push(Polyline::new(&[c, mid, mid + Pt::new(dx, dy)]));
            }
        }
        out
    }

    fn smart_pads_single(
        &mut self,
        line: &mut Line,
        pad_id: ItemId,
        at_end: bool,
        end_vertex: usize,
    ) -> Option<usize> {
        let pad = self.world.item(pad_id)?.clone();

        // vias stay round; their exit posture belongs to the user
        if matches!(pad, Item::Via(_)) {
            return None;
        }

        let forbidden: AngleSet =
            AngleKind::Acute | AngleKind::Right | AngleKind::HalfFull | AngleKind::Undefined;

        let chain = if at_end { line.line().reversed() } else { line.line().clone() };
        let p_end = end_vertex.min(3).min(chain.pt_count().saturating_sub(1));

        let pad_shape = match &pad {
            Item::Solid(s) => s.shape.clone(),
            _ => return None,
        };

        let breakouts =
            self.compute_breakouts(line.width(), &pad, self.corner_mode.is_diagonal());
        let mut variants: Vec<(usize, i64, Polyline)> = Vec::new();

        for p in 1..=p_end {
            let chord =
                Shape::Segment(SegShape { seg: Seg::new(chain.pt(0), chain.pt(p)), width: line.width() });
            if !pad_shape.collides(&chord, 1) {
                continue;
            }
            for breakout in &breakouts {
                for diag in [true, false] {
                    let connect =
                        build_initial_trace(breakout.last_pt(), chain.pt(p), diag, self.corner_mode);
                    if connect.seg_count() == 0 {
                        continue;
                    }
                    let dir_bkout = Dir45::from_seg(&breakout.seg(breakout.seg_count() - 1));
                    let ang = dir_bkout.angle(Dir45::from_seg(&connect.seg(0)));
                    if forbidden.contains(ang) {
                        continue;
                    }
                    if breakout.len() > chain.len() {
                        continue;
                    }
                    let mut v = breakout.clone();
                    v.append_polyline(&connect);
                    for i in p + 1..chain.pt_count() {
                        v.append(chain.pt(i));
                    }
                    let mut candidate = if at_end { v.reversed() } else { v };
                    candidate.simplify();
                    let mut tmp = line.clone();
                    tmp.set_shape(candidate.clone());
                    if tmp.count_corners(forbidden) == 0 {
                        variants.push((p, breakout.len(), candidate));
                    }
                }
            }
        }

        // Minimise corner cost; on ties prefer the longer pad exit so
        // oblong pads are left along their long side.
        let mut min_cost = CostEstimator::corner_cost_line(line.line());
        let mut max_len = 0;
        let mut best: Option<(usize, Polyline)> = None;

        for (p, blen, path) in variants {
            let cost = CostEstimator::corner_cost_line(&path);
            if self.check_colliding_path(line, &path) {
                continue;
            }
            if cost < min_cost || (cost == min_cost && blen > max_len) {
                if cost <= min_cost {
                    max_len = max_len.max(blen);
                }
                min_cost = min_cost.min(cost);
                best = Some((p, path));
            }
        }

        if let Some((p, path)) = best {
            line.set_shape(path);
            Some(p)
        } else {
            None
        }
    }

    pub fn run_smart_pads(&mut self, line: &mut Line) -> bool {
        if line.pt_count() < 3 {
            return false;
        }
        let p_start = line.first_pt();
        let p_end = line.last_pt();
        let start_pad = self.find_pad_or_via(line.layer(), line.net(), p_start);
        let end_pad = self.find_pad_or_via(line.layer(), line.net(), p_end);

        let mut vtx = None;
        if let Some(pad) = start_pad {
            vtx = self.smart_pads_single(line, pad, false, 3);
        }
        if let Some(pad) = end_pad {
            let limit = match vtx {
                Some(v) => line.pt_count().saturating_sub(1 + v),
                None => line.pt_count().saturating_sub(1),
            };
            self.smart_pads_single(line, pad, true, limit);
        }
        line.line_mut().simplify();
        true
    }

    // Short pad-to-pad connections are replaced by a clean two-segment
    // route when one fits.
    fn fanout_cleanup(&mut self, line: &mut Line) -> bool {
        if line.pt_count() < 3 {
            return false;
        }
        let start_pad = self.find_pad_or_via(line.layer(), line.net(), line.first_pt());
        let end_pad = self.find_pad_or_via(line.layer(), line.net(), line.last_pt());
        if start_pad.is_none() || end_pad.is_none() {
            return false;
        }
        if line.line().len() > line.width() * 10 {
            return false;
        }

        for diag in [true, false] {
            let path = build_initial_trace(line.first_pt(), line.last_pt(), diag, self.corner_mode);
            if !self.check_colliding_path(line, &path) {
                line.set_shape(path);
                return true;
            }
        }
        false
    }
}

fn octagon_dirs() -> [(i64, i64); 8] {
    [(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)]
}

// A differential pair: two coupled legs plus their nominal gap.
#[derive(Debug, Clone)]
pub struct DiffPair {
    pub p: Line,
    pub n: Line,
    pub gap: i64,
}

impl DiffPair {
    pub fn coupled_length(&self) -> i64 {
        self.p.line().len().min(self.n.line().len())
    }
}

// Runs the two-segment bypass on both legs in lockstep, keeping them
// non-colliding against the node and each other.
pub fn optimize_diff_pair(world: &mut World, node: NodeId, pair: &mut DiffPair) -> bool {
    let clearance = pair.gap;
    let mut improved = false;

    for leg in [true, false] {
        let (target, other) = if leg {
            (pair.p.clone(), pair.n.clone())
        } else {
            (pair.n.clone(), pair.p.clone())
        };
        let mut candidate = target.clone();
        let mut opt = Optimizer::new(world, node);
        opt.set_effort(Effort::MergeSegments | Effort::MergeObtuse);
        if let Some(better) = opt.optimize(&candidate, None) {
            candidate = better;
            let legs_clear = !candidate.collides_with_line(&other, clearance);
            let shorter = candidate.line().len() <= target.line().len();
            if legs_clear && shorter {
                if leg {
                    pair.p = candidate;
                } else {
                    pair.n = candidate;
                }
                improved = true;
            }
        }
    }
    improved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pll, pt, rt};
    use crate::item::{LayerSet, Solid};
    use crate::node::ROOT;
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(200)))
    }

    #[test]
    fn test_merge_staircase() {
        let mut w = world();
        // wasteful staircase: should merge down to fewer corners
        let line = Line::new(
            pll(&[
                pt(0, 0),
                pt(1000, 0),
                pt(1000, 1000),
                pt(2000, 1000),
                pt(2000, 2000),
                pt(3000, 2000),
            ]),
            200,
            0,
            NetHandle(1),
        );
        let mut opt = Optimizer::new(&mut w, ROOT);
        opt.set_effort(Effort::MergeSegments.into());
        let better = opt.optimize(&line, None).expect("should improve");
        assert!(better.seg_count() < line.seg_count());
        assert!(
            CostEstimator::corner_cost_line(better.line())
                < CostEstimator::corner_cost_line(line.line())
        );
        assert_eq!(better.first_pt(), line.first_pt());
        assert_eq!(better.last_pt(), line.last_pt());
    }

    #[test]
    fn test_merge_does_not_collide() {
        let mut w = world();
        // obstacle in the shortcut's way
        let solid = Solid::new(
            pt(1500, 500),
            Shape::Rect(rt(1200, 200, 1800, 800)),
            LayerSet::one(0),
            NetHandle(2),
        );
        w.add(ROOT, Item::Solid(solid), false).unwrap();

        let line = Line::new(
            pll(&[pt(0, 0), pt(0, 1500), pt(3000, 1500), pt(3000, 0)]),
            200,
            0,
            NetHandle(1),
        );
        let mut opt = Optimizer::new(&mut w, ROOT);
        opt.set_effort(Effort::MergeSegments.into());
        if let Some(better) = opt.optimize(&line, None) {
            let opts = CollisionOpts::default();
            assert!(w.check_colliding_line(ROOT, &better, &opts).is_none());
        }
    }

    #[test]
    fn test_merge_colinear() {
        let mut w = world();
        let line = Line::new(
            pll(&[pt(0, 0), pt(500, 0), pt(1000, 0), pt(1000, 800)]),
            200,
            0,
            NetHandle(1),
        );
        let mut opt = Optimizer::new(&mut w, ROOT);
        opt.set_effort(Effort::MergeColinear.into());
        let better = opt.optimize(&line, None).expect("collinear merge");
        assert_eq!(better.pt_count(), 3);
    }

    #[test]
    fn test_smart_pads_exits_cleanly() {
        let mut w = world();
        // 1000x400 SMD pad centred at origin, line leaves awkwardly
        let solid = Solid::new(
            pt(0, 0),
            Shape::Rect(rt(-500, -200, 500, 200)),
            LayerSet::one(0),
            NetHandle(1),
        );
        w.add(ROOT, Item::Solid(solid), false).unwrap();

        let mut line = Line::new(
            pll(&[pt(0, 0), pt(0, 900), pt(2500, 900), pt(2500, 3000)]),
            200,
            0,
            NetHandle(1),
        );
        let before = CostEstimator::corner_cost_line(line.line());
        let mut opt = Optimizer::new(&mut w, ROOT);
        opt.set_effort(Effort::SmartPads.into());
        opt.run_smart_pads(&mut line);
        let after = CostEstimator::corner_cost_line(line.line());
        assert!(after <= before);
        assert_eq!(line.first_pt(), pt(0, 0));
        assert_eq!(line.last_pt(), pt(2500, 3000));
    }

    #[test]
    fn test_corner_cost_model() {
        let a = Seg::new(pt(0, 0), pt(100, 0));
        let straight = Seg::new(pt(100, 0), pt(200, 0));
        let obtuse = Seg::new(pt(100, 0), pt(200, 100));
        let right = Seg::new(pt(100, 0), pt(100, 100));
        let acute = Seg::new(pt(100, 0), pt(0, 100));
        assert_eq!(CostEstimator::corner_cost(&a, &straight), 5);
        assert_eq!(CostEstimator::corner_cost(&a, &obtuse), 10);
        assert_eq!(CostEstimator::corner_cost(&a, &right), 30);
        assert_eq!(CostEstimator::corner_cost(&a, &acute), 50);
    }
}
