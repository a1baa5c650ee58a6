use std::collections::{HashSet, VecDeque};

use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::item::{Item, ItemId, Kind, KindMask, NetHandle};
use crate::joint::Joint;
use crate::line::Line;
use crate::node::{AssembleOpts, CollisionOpts, NodeId, World};

// Items treated as rigid by walkaround: the seed plus everything touching
// it (transitively) on the same layer, within an area-expansion budget.
#[derive(Debug, Default, Clone)]
pub struct Cluster {
    pub key: ItemId,
    pub items: Vec<ItemId>,
}

impl Cluster {
    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains(&id)
    }
}

pub struct Topology<'a> {
    world: &'a mut World,
    node: NodeId,
}

impl<'a> Topology<'a> {
    pub fn new(world: &'a mut World, node: NodeId) -> Self {
        Self { world, node }
    }

    pub fn assemble_cluster(
        &mut self,
        seed: ItemId,
        layer: i32,
        area_expansion_limit: f64,
        excluded_net: Option<NetHandle>,
    ) -> Cluster {
        let mut cluster = Cluster { key: seed, items: Vec::new() };
        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut pending: VecDeque<ItemId> = VecDeque::new();
        pending.push_back(seed);
        visited.insert(seed);

        let seed_area = self
            .world
            .item(seed)
            .map(|i| i.bounds())
            .unwrap_or_default();

        while let Some(id) = pending.pop_front() {
            cluster.items.push(id);
            let Some(item) = self.world.item(id).cloned() else { continue };

            // 1-unit clearance: exact touching counts as contact.
            let opts = CollisionOpts {
                kind_mask: Kind::Solid | Kind::Hole | Kind::Via | Kind::Segment | Kind::Arc,
                different_nets_only: false,
                use_epsilon: false,
                clearance_override: Some(1),
                ..CollisionOpts::default()
            };
            let mut touching = Vec::new();
            self.world.query_colliding(self.node, &item, &opts, &mut touching);

            for obs in touching {
                if visited.contains(&obs.item) {
                    continue;
                }
                let Some(other) = self.world.item(obs.item) else { continue };
                if !other.layers().contains(layer) {
                    continue;
                }
                if excluded_net.is_some_and(|net| other.net() == net) {
                    continue;
                }
                // Only rigid bodies propagate the cluster; tracks touching a
                // pad do not drag their whole net in.
                if !matches!(other, Item::Solid(_) | Item::Hole(_) | Item::Via(_)) {
                    continue;
                }
                if area_expansion_limit > 0.0 {
                    let united = seed_area.united(&other.bounds());
                    let ratio = (united.w() as f64 * united.h() as f64)
                        / (seed_area.w().max(1) as f64 * seed_area.h().max(1) as f64);
                    if ratio > area_expansion_limit {
                        continue;
                    }
                }
                visited.insert(obs.item);
                pending.push_back(obs.item);
            }
        }

        cluster.items.sort_unstable();
        cluster.items.dedup();
        cluster
    }

    // The maximal corner-joint-only path through |start|, with its terminal
    // joints.
    pub fn assemble_trivial_path(
        &mut self,
        start: ItemId,
        follow_locked_segments: bool,
    ) -> Option<(Line, (Joint, Joint))> {
        let item = self.world.item(start)?;
        if !matches!(item, Item::Segment(_) | Item::Arc(_)) {
            return None;
        }
        let opts = AssembleOpts {
            follow_locked_segments,
            ..AssembleOpts::default()
        };
        let line = self.world.assemble_line(self.node, start, None, opts);
        let (a, b) = self.world.find_line_ends(self.node, &line);
        Some((line, (a?, b?)))
    }

    // Like the trivial path, but pad interiors are trimmed and replaced by
    // straight entries to the pad anchors, mirroring how track length is
    // measured.
    pub fn assemble_tuning_path(
        &mut self,
        start: ItemId,
    ) -> Option<(Line, Option<ItemId>, Option<ItemId>)> {
        let (line, (ja, jb)) = self.assemble_trivial_path(start, true)?;

        let mut pl = line.line().clone();
        let pad_a = self.joint_pad(&ja);
        let pad_b = self.joint_pad(&jb);

        if let Some(pad) = pad_a {
            pl = self.clip_to_pad(pl, pad, false);
        }
        if let Some(pad) = pad_b {
            pl = self.clip_to_pad(pl, pad, true);
        }

        let mut out = line.clone();
        out.set_shape(pl);
        Some((out, pad_a, pad_b))
    }

    fn joint_pad(&self, joint: &Joint) -> Option<ItemId> {
        joint
            .links()
            .iter()
            .copied()
            .find(|&id| matches!(self.world.item(id), Some(Item::Solid(_))))
    }

    // Drops vertices strictly inside the pad and enters it on a straight
    // line to the anchor.
    fn clip_to_pad(&self, pl: Polyline, pad: ItemId, from_end: bool) -> Polyline {
        let Some(Item::Solid(solid)) = self.world.item(pad) else { return pl };
        let shape = solid.shape.clone();
        let anchor = solid.pos;

        let mut pts: Vec<Pt> = pl.pts().to_vec();
        if from_end {
            pts.reverse();
        }
        let first_outside = pts.iter().position(|&p| !shape.contains_pt(p));
        let mut out: Vec<Pt> = match first_outside {
            Some(0) | None => pts,
            Some(i) => {
                let mut v = vec![anchor];
                v.extend_from_slice(&pts[i..]);
                v
            }
        };
        if from_end {
            out.reverse();
        }
        let mut res = Polyline::new(&out);
        res.simplify();
        res
    }

    pub fn connected_joints(&mut self, start: &Joint) -> Vec<Joint> {
        let mut visited: HashSet<(Pt, NetHandle)> = HashSet::new();
        let mut out = Vec::new();
        let mut pending = VecDeque::new();
        pending.push_back(start.clone());
        visited.insert((start.pos(), start.net()));

        while let Some(joint) = pending.pop_front() {
            out.push(joint.clone());
            for &id in joint.links() {
                let Some(item) = self.world.item(id) else { continue };
                for anchor in item.anchors() {
                    if visited.contains(&(anchor, item.net())) {
                        continue;
                    }
                    if let Some(next) = self.world.find_joint(
                        self.node,
                        anchor,
                        item.layers().start(),
                        item.net(),
                    ) {
                        visited.insert((anchor, item.net()));
                        pending.push_back(next.clone());
                    }
                }
            }
        }
        out
    }

    // Shortest connected path length between two items, walking the joint
    // graph with per-segment lengths.
    pub fn shortest_connection_length(&mut self, from: ItemId, to: ItemId) -> Option<i64> {
        let start = self.item_joint(from)?;
        let layer = start.layers().start();
        let target_anchors: Vec<Pt> = self.world.item(to)?.anchors().to_vec();

        let mut best: std::collections::HashMap<(Pt, NetHandle), i64> =
            std::collections::HashMap::new();
        let mut pending: std::collections::BinaryHeap<std::cmp::Reverse<(i64, Pt, NetHandle)>> =
            std::collections::BinaryHeap::new();
        pending.push(std::cmp::Reverse((0, start.pos(), start.net())));
        best.insert((start.pos(), start.net()), 0);

        while let Some(std::cmp::Reverse((dist, pos, net))) = pending.pop() {
            if target_anchors.contains(&pos) {
                return Some(dist);
            }
            let Some(joint) = self.world.find_joint(self.node, pos, layer, net).cloned() else {
                continue;
            };
            for &link in joint.links() {
                let Some(item) = self.world.item(link) else { continue };
                if !matches!(item, Item::Segment(_) | Item::Arc(_)) {
                    continue;
                }
                let anchors = item.anchors();
                let other = if anchors[0] == pos { anchors[1] } else { anchors[0] };
                let len = pos.dist(other).round() as i64;
                let key = (other, net);
                if best.get(&key).map_or(true, |&d| dist + len < d) {
                    best.insert(key, dist + len);
                    pending.push(std::cmp::Reverse((dist + len, other, net)));
                }
            }
        }
        None
    }

    fn item_joint(&self, id: ItemId) -> Option<Joint> {
        let item = self.world.item(id)?;
        let anchor = item.anchors()[0];
        self.world
            .find_joint(self.node, anchor, item.layers().start(), item.net())
            .cloned()
    }

    pub fn connected_items(&mut self, start: &Joint, kind_mask: KindMask) -> Vec<ItemId> {
        let mut out: Vec<ItemId> = self
            .connected_joints(start)
            .iter()
            .flat_map(|j| j.links().iter().copied())
            .filter(|&id| self.world.item(id).is_some_and(|i| i.of_kind(kind_mask)))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::shape::Shape;
    use crate::geom::{pt, rt, seg};
    use crate::item::{LayerSet, ParentHandle, SegmentItem, Solid};
    use crate::node::ROOT;
    use crate::rules::UniformResolver;

    fn world() -> World {
        World::new(Box::new(UniformResolver::new(200)))
    }

    fn pad(w: &mut World, l: i64, b: i64, r: i64, t: i64, net: u64) -> ItemId {
        let rect = rt(l, b, r, t);
        let solid = Solid::new(
            rect.center(),
            Shape::Rect(rect),
            LayerSet::one(0),
            NetHandle(net),
        );
        w.add(ROOT, Item::Solid(solid), false).unwrap()
    }

    #[test]
    fn test_cluster_touching_pads() {
        let mut w = world();
        let a = pad(&mut w, 0, 0, 1000, 1000, 1);
        let b = pad(&mut w, 1000, 0, 2000, 1000, 2); // touching a
        let c = pad(&mut w, 5000, 0, 6000, 1000, 3); // far away

        let mut topo = Topology::new(&mut w, ROOT);
        let cluster = topo.assemble_cluster(a, 0, 10.0, None);
        assert!(cluster.contains(a));
        assert!(cluster.contains(b));
        assert!(!cluster.contains(c));
    }

    #[test]
    fn test_cluster_excluded_net() {
        let mut w = world();
        let a = pad(&mut w, 0, 0, 1000, 1000, 1);
        let b = pad(&mut w, 1000, 0, 2000, 1000, 2);

        let mut topo = Topology::new(&mut w, ROOT);
        let cluster = topo.assemble_cluster(a, 0, 10.0, Some(NetHandle(2)));
        assert!(cluster.contains(a));
        assert!(!cluster.contains(b));
    }

    #[test]
    fn test_shortest_connection_length() {
        let mut w = world();
        let mk = |w: &mut World, a: Pt, b: Pt| {
            w.add(
                ROOT,
                Item::Segment(SegmentItem {
                    id: ItemId::INVALID,
                    net: NetHandle(1),
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
        };
        let a = mk(&mut w, pt(0, 0), pt(1000, 0));
        let _b = mk(&mut w, pt(1000, 0), pt(1000, 1000));
        let c = mk(&mut w, pt(1000, 1000), pt(3000, 1000));

        let mut topo = Topology::new(&mut w, ROOT);
        let len = topo.shortest_connection_length(a, c).unwrap();
        assert_eq!(len, 2000);
    }

    #[test]
    fn test_trivial_path() {
        let mut w = world();
        let s = Item::Segment(SegmentItem {
            id: ItemId::INVALID,
            net: NetHandle(1),
            layer: 0,
            seg: seg(pt(0, 0), pt(1000, 0)),
            width: 200,
            parent: ParentHandle::default(),
            rank: -1,
            marker: 0,
            locked: false,
        });
        let id = w.add(ROOT, s, false).unwrap();
        let mut topo = Topology::new(&mut w, ROOT);
        let (line, (a, b)) = topo.assemble_trivial_path(id, false).unwrap();
        assert_eq!(line.pt_count(), 2);
        assert_eq!(a.pos(), pt(0, 0));
        assert_eq!(b.pos(), pt(1000, 0));
    }
}
