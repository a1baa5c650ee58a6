use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use strum::Display as EnumDisplay;

use crate::geom::circle::Circle;
use crate::geom::point::Pt;
use crate::geom::rect::Rt;
use crate::geom::segment::Seg;
use crate::geom::shape::{SegShape, Shape};

// Stable 64-bit id; also the key of the shove engine's root-line history.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl ItemId {
    pub const INVALID: ItemId = ItemId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

// Opaque handle to a net in the host application.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct NetHandle(pub u64);

impl NetHandle {
    pub const ORPHAN: NetHandle = NetHandle(0);
}

// Opaque handle to the host object an item was created from.
#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct ParentHandle(pub u64);

pub const LAYER_ANY: i32 = -1;
pub const MAX_LAYER: i32 = 63;

// Contiguous copper layer range [start..end], packable into a 64-bit mask.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct LayerSet {
    start: i32,
    end: i32,
}

impl Default for LayerSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl LayerSet {
    pub const fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub const fn one(layer: i32) -> Self {
        Self { start: layer, end: layer }
    }

    pub const fn empty() -> Self {
        Self { start: -1, end: -2 }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    pub fn is_multilayer(&self) -> bool {
        self.end > self.start
    }

    pub fn mask(&self) -> u64 {
        let mut m = 0u64;
        for l in self.start.max(0)..=self.end.min(MAX_LAYER) {
            m |= 1 << l;
        }
        m
    }

    pub fn overlaps(&self, o: &LayerSet) -> bool {
        self.mask() & o.mask() != 0
    }

    pub fn contains(&self, layer: i32) -> bool {
        layer >= self.start && layer <= self.end
    }

    pub fn merged(&self, o: &LayerSet) -> LayerSet {
        if self.is_empty() {
            *o
        } else if o.is_empty() {
            *self
        } else {
            LayerSet::new(self.start.min(o.start), self.end.max(o.end))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

#[derive(Debug, EnumSetType, EnumDisplay, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum Kind {
    Segment,
    Arc,
    Via,
    Solid,
    Hole,
    Line,
}

pub type KindMask = EnumSet<Kind>;

pub fn linked_kinds() -> KindMask {
    Kind::Segment | Kind::Arc | Kind::Via
}

// Marker bits used to tag transient state on items during an episode.
pub mod marker {
    pub const HEAD: u32 = 0x1;
    pub const VIOLATION: u32 = 0x2;
    pub const LOCKED: u32 = 0x4;
}

#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, EnumDisplay, Serialize, Deserialize, Hash)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ViaType {
    #[default]
    Through,
    Blind,
    Buried,
    Micro,
}

#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, EnumDisplay, Serialize, Deserialize, Hash)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StackMode {
    #[default]
    Normal,
    FrontInnerBack,
    Custom,
}

// Per-layer via diameters. Normal mode keeps one diameter; the other modes
// override per layer.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Padstack {
    pub mode: StackMode,
    pub diameter: i64,
    pub overrides: Vec<(i32, i64)>,
}

impl Padstack {
    pub fn uniform(diameter: i64) -> Self {
        Self { mode: StackMode::Normal, diameter, overrides: Vec::new() }
    }

    pub fn diameter(&self, layer: i32) -> i64 {
        debug_assert!(layer >= 0 || self.mode == StackMode::Normal);
        self.overrides
            .iter()
            .find(|(l, _)| *l == layer)
            .map_or(self.diameter, |(_, d)| *d)
    }

    pub fn set_diameter(&mut self, layer: i32, d: i64) {
        if self.mode == StackMode::Normal || layer == LAYER_ANY {
            self.diameter = d;
            return;
        }
        if let Some(e) = self.overrides.iter_mut().find(|(l, _)| *l == layer) {
            e.1 = d;
        } else {
            self.overrides.push((layer, d));
        }
    }

    // Distinct layers carrying distinct shapes, for multi-layer collision.
    pub fn unique_shape_layers(&self, layers: &LayerSet) -> SmallVec<[i32; 4]> {
        match self.mode {
            StackMode::Normal => smallvec![layers.start()],
            StackMode::FrontInnerBack => {
                smallvec![layers.start(), layers.start() + 1, layers.end()]
            }
            StackMode::Custom => layers.iter().collect(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SegmentItem {
    pub id: ItemId,
    pub net: NetHandle,
    pub layer: i32,
    pub seg: Seg,
    pub width: i64,
    pub parent: ParentHandle,
    pub rank: i64,
    pub marker: u32,
    pub locked: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ArcItem {
    pub id: ItemId,
    pub net: NetHandle,
    pub layer: i32,
    pub p0: Pt,
    pub mid: Pt,
    pub p1: Pt,
    pub cw: bool,
    pub width: i64,
    pub parent: ParentHandle,
    pub rank: i64,
    pub marker: u32,
    pub locked: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Via {
    pub id: ItemId,
    pub net: NetHandle,
    pub layers: LayerSet,
    pub pos: Pt,
    pub padstack: Padstack,
    pub drill: i64,
    pub via_type: ViaType,
    pub is_free: bool,
    pub is_virtual: bool,
    pub hole: Option<ItemId>,
    pub parent: ParentHandle,
    pub rank: i64,
    pub marker: u32,
    pub locked: bool,
}

impl Via {
    pub fn new(pos: Pt, layers: LayerSet, diameter: i64, drill: i64, net: NetHandle) -> Self {
        Self {
            id: ItemId::INVALID,
            net,
            layers,
            pos,
            padstack: Padstack::uniform(diameter),
            drill,
            via_type: ViaType::Through,
            is_free: false,
            is_virtual: false,
            hole: None,
            parent: ParentHandle::default(),
            rank: -1,
            marker: 0,
            locked: false,
        }
    }

    // A virtual via pins a joint during shove; it is never committed.
    pub fn new_virtual(pos: Pt, layer: i32, diameter: i64, net: NetHandle) -> Self {
        let mut v = Self::new(pos, LayerSet::one(layer), diameter, 0, net);
        v.is_virtual = true;
        v
    }

    pub fn diameter(&self, layer: i32) -> i64 {
        self.padstack.diameter(layer)
    }

    pub fn shape(&self, layer: i32) -> Shape {
        Shape::Circle(Circle::new(self.pos, self.diameter(layer) / 2))
    }

    pub fn handle(&self) -> ViaHandle {
        ViaHandle { pos: self.pos, layers: self.layers, net: self.net, valid: true }
    }
}

// Position-based reference to a via that survives branch churn.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub struct ViaHandle {
    pub pos: Pt,
    pub layers: LayerSet,
    pub net: NetHandle,
    pub valid: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Solid {
    pub id: ItemId,
    pub net: NetHandle,
    pub layers: LayerSet,
    pub pos: Pt,
    pub shape: Shape,
    pub anchors: Vec<Pt>,
    pub routable: bool,
    pub pad_to_die: i64,
    pub pad_to_die_delay: i64,
    pub hole: Option<ItemId>,
    pub parent: ParentHandle,
    pub rank: i64,
    pub marker: u32,
    pub locked: bool,
}

impl Solid {
    pub fn new(pos: Pt, shape: Shape, layers: LayerSet, net: NetHandle) -> Self {
        Self {
            id: ItemId::INVALID,
            net,
            layers,
            pos,
            shape,
            anchors: Vec::new(),
            routable: true,
            pad_to_die: 0,
            pad_to_die_delay: 0,
            hole: None,
            parent: ParentHandle::default(),
            rank: -1,
            marker: 0,
            locked: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Hole {
    pub id: ItemId,
    pub net: NetHandle,
    pub layers: LayerSet,
    pub center: Pt,
    pub radius: i64,
    pub owner_item: Option<ItemId>,
    pub rank: i64,
    pub marker: u32,
}

// The indexable item kinds, as a tagged union. A Line is an aggregate view
// and never lives in the index, so it is not a variant here.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Item {
    Segment(SegmentItem),
    Arc(ArcItem),
    Via(Via),
    Solid(Solid),
    Hole(Hole),
}

impl Item {
    pub fn kind(&self) -> Kind {
        match self {
            Item::Segment(_) => Kind::Segment,
            Item::Arc(_) => Kind::Arc,
            Item::Via(_) => Kind::Via,
            Item::Solid(_) => Kind::Solid,
            Item::Hole(_) => Kind::Hole,
        }
    }

    pub fn of_kind(&self, mask: KindMask) -> bool {
        mask.contains(self.kind())
    }

    pub fn id(&self) -> ItemId {
        match self {
            Item::Segment(s) => s.id,
            Item::Arc(a) => a.id,
            Item::Via(v) => v.id,
            Item::Solid(s) => s.id,
            Item::Hole(h) => h.id,
        }
    }

    pub fn set_id(&mut self, id: ItemId) {
        match self {
            Item::Segment(s) => s.id = id,
            Item::Arc(a) => a.id = id,
            Item::Via(v) => v.id = id,
            Item::Solid(s) => s.id = id,
            Item::Hole(h) => h.id = id,
        }
    }

    pub fn net(&self) -> NetHandle {
        match self {
            Item::Segment(s) => s.net,
            Item::Arc(a) => a.net,
            Item::Via(v) => v.net,
            Item::Solid(s) => s.net,
            Item::Hole(h) => h.net,
        }
    }

    pub fn layers(&self) -> LayerSet {
        match self {
            Item::Segment(s) => LayerSet::one(s.layer),
            Item::Arc(a) => LayerSet::one(a.layer),
            Item::Via(v) => v.layers,
            Item::Solid(s) => s.layers,
            Item::Hole(h) => h.layers,
        }
    }

    pub fn layers_overlap(&self, o: &Item) -> bool {
        self.layers().overlaps(&o.layers())
    }

    pub fn rank(&self) -> i64 {
        match self {
            Item::Segment(s) => s.rank,
            Item::Arc(a) => a.rank,
            Item::Via(v) => v.rank,
            Item::Solid(s) => s.rank,
            Item::Hole(h) => h.rank,
        }
    }

    pub fn set_rank(&mut self, rank: i64) {
        match self {
            Item::Segment(s) => s.rank = rank,
            Item::Arc(a) => a.rank = rank,
            Item::Via(v) => v.rank = rank,
            Item::Solid(s) => s.rank = rank,
            Item::Hole(h) => h.rank = rank,
        }
    }

    pub fn marker(&self) -> u32 {
        match self {
            Item::Segment(s) => s.marker,
            Item::Arc(a) => a.marker,
            Item::Via(v) => v.marker,
            Item::Solid(s) => s.marker,
            Item::Hole(h) => h.marker,
        }
    }

    pub fn set_marker(&mut self, marker: u32) {
        match self {
            Item::Segment(s) => s.marker = marker,
            Item::Arc(a) => a.marker = marker,
            Item::Via(v) => v.marker = marker,
            Item::Solid(s) => s.marker = marker,
            Item::Hole(h) => h.marker = marker,
        }
    }

    pub fn is_locked(&self) -> bool {
        match self {
            Item::Segment(s) => s.locked,
            Item::Arc(a) => a.locked,
            Item::Via(v) => v.locked,
            Item::Solid(s) => s.locked,
            Item::Hole(_) => false,
        }
    }

    pub fn is_routable(&self) -> bool {
        match self {
            Item::Solid(s) => s.routable,
            _ => true,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Item::Via(v) if v.is_virtual)
    }

    pub fn width(&self) -> i64 {
        match self {
            Item::Segment(s) => s.width,
            Item::Arc(a) => a.width,
            Item::Via(v) => v.diameter(v.layers.start()),
            Item::Hole(h) => h.radius * 2,
            Item::Solid(_) => 0,
        }
    }

    pub fn hole(&self) -> Option<ItemId> {
        match self {
            Item::Via(v) => v.hole,
            Item::Solid(s) => s.hole,
            _ => None,
        }
    }

    pub fn shape(&self, layer: i32) -> Shape {
        match self {
            Item::Segment(s) => Shape::Segment(SegShape { seg: s.seg, width: s.width }),
            // Arcs collide on their chord; hulls add the sagitta allowance.
            Item::Arc(a) => {
                Shape::Segment(SegShape { seg: Seg::new(a.p0, a.p1), width: a.width })
            }
            Item::Via(v) => v.shape(layer),
            Item::Solid(s) => s.shape.clone(),
            Item::Hole(h) => Shape::Circle(Circle::new(h.center, h.radius)),
        }
    }

    pub fn bounds(&self) -> Rt {
        match self {
            Item::Via(v) => {
                let mut b = Rt::empty();
                for l in v.padstack.unique_shape_layers(&v.layers) {
                    b = b.united(&v.shape(l).bounds());
                }
                b
            }
            other => other.shape(self.layers().start()).bounds(),
        }
    }

    // Anchors: endpoints of tracks, centres of vias/pads plus extra pins.
    pub fn anchors(&self) -> SmallVec<[Pt; 2]> {
        match self {
            Item::Segment(s) => smallvec![s.seg.st(), s.seg.en()],
            Item::Arc(a) => smallvec![a.p0, a.p1],
            Item::Via(v) => smallvec![v.pos],
            Item::Solid(s) => {
                let mut out: SmallVec<[Pt; 2]> = smallvec![s.pos];
                out.extend(s.anchors.iter().copied());
                out
            }
            Item::Hole(h) => smallvec![h.center],
        }
    }

    pub fn anchor(&self, n: usize) -> Pt {
        self.anchors()[n]
    }

    // True collision test between two concrete items at the given
    // clearance; multi-layer vias collide per distinct shape layer.
    pub fn collides(&self, o: &Item, clearance: i64) -> bool {
        if !self.layers_overlap(o) {
            return false;
        }
        if self.is_virtual() || o.is_virtual() {
            return false;
        }
        match (self, o) {
            (Item::Via(a), Item::Via(b)) => {
                for l in a.padstack.unique_shape_layers(&a.layers) {
                    if b.layers.contains(l) && a.shape(l).collides(&b.shape(l), clearance) {
                        return true;
                    }
                }
                false
            }
            _ => {
                let layer = if self.layers().is_multilayer() {
                    o.layers().start()
                } else {
                    self.layers().start()
                };
                self.shape(layer).collides(&o.shape(layer), clearance)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pt, seg};

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
    fn test_layer_set() {
        let a = LayerSet::new(0, 31);
        let b = LayerSet::one(5);
        assert!(a.overlaps(&b));
        assert!(a.is_multilayer());
        assert!(!b.is_multilayer());
        assert_eq!(a.merged(&LayerSet::one(40)).end(), 40);
        assert!(!LayerSet::one(1).overlaps(&LayerSet::one(2)));
    }

    #[test]
    fn test_padstack() {
        let mut p = Padstack::uniform(600);
        assert_eq!(p.diameter(3), 600);
        p.mode = StackMode::FrontInnerBack;
        p.set_diameter(0, 800);
        assert_eq!(p.diameter(0), 800);
        assert_eq!(p.diameter(1), 600);
    }

    #[test]
    fn test_collides() {
        let a = seg_item(pt(0, 0), pt(1000, 0), 200, 1);
        let b = seg_item(pt(0, 350), pt(1000, 350), 200, 2);
        // gap = 350 - 100 - 100 = 150
        assert!(a.collides(&b, 200));
        assert!(!a.collides(&b, 150));
    }

    #[test]
    fn test_via_segment_collision() {
        let v = Item::Via(Via::new(pt(0, 0), LayerSet::new(0, 31), 600, 300, NetHandle(1)));
        let s = seg_item(pt(-1000, 400), pt(1000, 400), 200, 2);
        // gap = 400 - 300 - 100 = 0
        assert!(v.collides(&s, 200));
    }
}
