use eyre::{eyre, Result};

use crate::debug::{DebugDecorator, NullDecorator};
use crate::geom::point::Pt;
use crate::geom::polyline::Polyline;
use crate::item::{Item, ItemId, NetHandle, Via};
use crate::line::Line;
use crate::node::{NodeId, World, ROOT};
use crate::placer::LinePlacer;
use crate::dragger::{ComponentDragger, Dragger};
use crate::rules::RuleResolver;
use crate::settings::RoutingSettings;

// Host-side services the core consumes by contract: net naming, layer
// mapping, UI feedback and tuning measurements.
pub trait RouterIface {
    fn net_name(&self, net: NetHandle) -> String {
        format!("net-{}", net.0)
    }

    fn net_code(&self, net: NetHandle) -> i64 {
        net.0 as i64
    }

    fn orphaned_net_handle(&self) -> NetHandle {
        NetHandle::ORPHAN
    }

    fn router_layer_from_board(&self, board_layer: i32) -> i32 {
        board_layer
    }

    fn board_layer_from_router(&self, router_layer: i32) -> i32 {
        router_layer
    }

    // Unflashed pads/vias collide with their hole only.
    fn is_flashed_on_layer(&self, _via: &Via, _layer: i32) -> bool {
        true
    }

    fn display_ratline(&mut self, _line: &Polyline, _net: NetHandle) {}

    fn display_path_line(&mut self, _line: &Polyline, _importance: i32) {}

    fn calculate_routed_path_length(&self, _items: &[ItemId]) -> i64 {
        0
    }

    fn calculate_routed_path_delay(&self, _items: &[ItemId]) -> i64 {
        0
    }
}

#[derive(Debug, Default)]
pub struct NullIface;

impl RouterIface for NullIface {}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum RouterState {
    Idle,
    RouteTrack,
    DragSegment,
    DragComponent,
}

// The core's front door: owns the world, the active placer/dragger and the
// settings, and reports failures as messages instead of mutating anything.
pub struct Router {
    world: World,
    settings: RoutingSettings,
    iface: Box<dyn RouterIface>,
    debug: Box<dyn DebugDecorator>,
    state: RouterState,
    placer: Option<LinePlacer>,
    dragger: Option<Dragger>,
    component_dragger: Option<ComponentDragger>,
    failure_reason: Option<String>,
}

impl Router {
    pub fn new(resolver: Box<dyn RuleResolver>, iface: Box<dyn RouterIface>) -> Self {
        Self {
            world: World::new(resolver),
            settings: RoutingSettings::default(),
            iface,
            debug: Box::new(NullDecorator),
            state: RouterState::Idle,
            placer: None,
            dragger: None,
            component_dragger: None,
            failure_reason: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn iface(&self) -> &dyn RouterIface {
        self.iface.as_ref()
    }

    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: RoutingSettings) {
        self.settings = settings;
    }

    pub fn set_debug_decorator(&mut self, debug: Box<dyn DebugDecorator>) {
        self.debug = debug;
    }

    pub fn debug_decorator(&mut self) -> &mut dyn DebugDecorator {
        self.debug.as_mut()
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RouterState::Idle
    }

    pub fn set_failure_reason(&mut self, reason: impl Into<String>) {
        self.failure_reason = Some(reason.into());
    }

    pub fn failure_reason(&mut self) -> Option<String> {
        self.failure_reason.take()
    }

    // The node whose contents should currently be displayed.
    pub fn current_node(&self) -> NodeId {
        match self.state {
            RouterState::RouteTrack => {
                self.placer.as_ref().map_or(ROOT, LinePlacer::current_node)
            }
            RouterState::DragSegment => {
                self.dragger.as_ref().map_or(ROOT, Dragger::current_node)
            }
            RouterState::DragComponent => self
                .component_dragger
                .as_ref()
                .map_or(ROOT, ComponentDragger::current_node),
            RouterState::Idle => ROOT,
        }
    }

    // ------------------------------------------------------------------
    // routing

    pub fn start_routing(&mut self, p: Pt, net: NetHandle, layer: i32, width: i64) -> Result<()> {
        if self.state != RouterState::Idle {
            return Err(eyre!("router is busy"));
        }
        let mut placer = LinePlacer::new(self.settings.clone(), net, layer, width);
        if !placer.start(&mut self.world, p) {
            return Err(eyre!("cannot start routing at {p}"));
        }
        self.placer = Some(placer);
        self.state = RouterState::RouteTrack;
        Ok(())
    }

    pub fn move_to(&mut self, p: Pt) -> bool {
        let Some(placer) = self.placer.as_mut() else { return false };
        placer.route_to(&mut self.world, p)
    }

    pub fn fix_route(&mut self, p: Pt, force_finish: bool) -> bool {
        let Some(placer) = self.placer.as_mut() else { return false };
        let fixed = placer.fix_route(&mut self.world, p, force_finish);
        if fixed && force_finish {
            self.commit_routing();
        }
        fixed
    }

    pub fn toggle_via(&mut self, enabled: bool) {
        if let Some(placer) = self.placer.as_mut() {
            placer.toggle_via(enabled);
        }
    }

    pub fn undo_last_segment(&mut self) -> Option<Pt> {
        self.placer.as_mut().and_then(LinePlacer::unfix_route)
    }

    pub fn commit_routing(&mut self) {
        if let Some(mut placer) = self.placer.take() {
            placer.commit_placement(&mut self.world);
        }
        self.state = RouterState::Idle;
    }

    // The current uncommitted trace, for display.
    pub fn trace(&self) -> Option<Line> {
        self.placer.as_ref().map(LinePlacer::trace)
    }

    // ------------------------------------------------------------------
    // dragging

    pub fn start_dragging(&mut self, p: Pt, item: ItemId) -> Result<()> {
        if self.state != RouterState::Idle {
            return Err(eyre!("router is busy"));
        }
        let mut dragger = Dragger::new(self.settings.clone());
        if !dragger.start(&mut self.world, p, item) {
            return Err(eyre!("cannot drag this item"));
        }
        self.dragger = Some(dragger);
        self.state = RouterState::DragSegment;
        Ok(())
    }

    pub fn start_dragging_component(&mut self, p: Pt, solids: &[ItemId]) -> Result<()> {
        if self.state != RouterState::Idle {
            return Err(eyre!("router is busy"));
        }
        let mut dragger = ComponentDragger::new(self.settings.clone());
        if !dragger.start(&mut self.world, p, solids) {
            return Err(eyre!("cannot drag this component"));
        }
        self.component_dragger = Some(dragger);
        self.state = RouterState::DragComponent;
        Ok(())
    }

    pub fn drag_to(&mut self, p: Pt) -> bool {
        match self.state {
            RouterState::DragSegment => self
                .dragger
                .as_mut()
                .map_or(false, |d| d.drag(&mut self.world, p)),
            RouterState::DragComponent => self
                .component_dragger
                .as_mut()
                .map_or(false, |d| d.drag(&mut self.world, p)),
            _ => false,
        }
    }

    pub fn fix_drag(&mut self) -> bool {
        let fixed = match self.state {
            RouterState::DragSegment => self
                .dragger
                .take()
                .map_or(false, |mut d| d.fix_route(&mut self.world)),
            RouterState::DragComponent => self
                .component_dragger
                .take()
                .map_or(false, |mut d| d.fix_route(&mut self.world)),
            _ => false,
        };
        self.state = RouterState::Idle;
        fixed
    }

    // Kills all tentative branches; any transient lines the caller still
    // holds must be discarded.
    pub fn stop_routing(&mut self) {
        if let Some(mut placer) = self.placer.take() {
            placer.abort_placement(&mut self.world);
        }
        if let Some(mut dragger) = self.dragger.take() {
            dragger.abort(&mut self.world);
        }
        if let Some(mut dragger) = self.component_dragger.take() {
            dragger.abort(&mut self.world);
        }
        self.state = RouterState::Idle;
    }

    // Convenience for hosts syncing their board into the router world.
    pub fn add_item(&mut self, item: Item) -> Option<ItemId> {
        self.world.add(ROOT, item, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::pt;
    use crate::rules::UniformResolver;

    fn router() -> Router {
        Router::new(Box::new(UniformResolver::new(200)), Box::new(NullIface))
    }

    #[test]
    fn test_route_and_commit() {
        let mut r = router();
        r.start_routing(pt(0, 0), NetHandle(1), 0, 200).unwrap();
        assert!(r.move_to(pt(5000, 0)));
        assert!(r.fix_route(pt(5000, 0), true));
        assert!(r.is_idle());
        assert!(r.world().find_joint(ROOT, pt(5000, 0), 0, NetHandle(1)).is_some());
    }

    #[test]
    fn test_busy_router_refuses_second_start() {
        let mut r = router();
        r.start_routing(pt(0, 0), NetHandle(1), 0, 200).unwrap();
        assert!(r.start_routing(pt(100, 0), NetHandle(2), 0, 200).is_err());
        r.stop_routing();
        assert!(r.is_idle());
    }

    #[test]
    fn test_failure_reason_roundtrip() {
        let mut r = router();
        r.set_failure_reason("Unable to find complementary differential pair nets");
        assert!(r.failure_reason().is_some());
        assert!(r.failure_reason().is_none());
    }
}
