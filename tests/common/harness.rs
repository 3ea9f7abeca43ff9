//! Test harness for a two-node flow.
//!
//! Provides a complete setup, the way a host window would wire things, with
//! event tracking and helper methods for simulating user interactions.

#![allow(dead_code)]

use super::CallbackTracker;
use slint_flow::{
    Edge, FlowConfig, FlowController, Handle, HandleRef, HandleType, Key, MeasurementCache, Modifiers, Node,
    PointerTarget, Position, Rect, StatePatch, Transform, XYPosition,
};

pub const NODE_WIDTH: f32 = 150.0;
pub const NODE_HEIGHT: f32 = 100.0;

/// Test harness for a flow with nodes "1" at (100, 100) and "2" at (400, 200)
/// joined by edge "e1-2".
///
/// Every node gets a target handle on its left and a source handle on its
/// right, both vertically centered.
pub struct FlowTestHarness {
    pub ctrl: FlowController,
    pub measurements: MeasurementCache,
    pub tracker: CallbackTracker,
}

impl FlowTestHarness {
    /// Create a new test harness with default nodes and edges.
    pub fn new() -> Self {
        Self::with_config(FlowConfig::default())
    }

    pub fn with_config(config: FlowConfig) -> Self {
        Self::with_nodes_and_edges(
            config,
            vec![
                Node::new("1", XYPosition::new(100.0, 100.0)),
                Node::new("2", XYPosition::new(400.0, 200.0)),
            ],
            vec![Edge::new("e1-2", "1", "2")],
        )
    }

    /// Create a new test harness with custom nodes and edges. All nodes are
    /// measured at the default size.
    pub fn with_nodes_and_edges(config: FlowConfig, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let ctrl = FlowController::with_config(config).unwrap();
        let tracker = CallbackTracker::new();
        ctrl.store().update_events(|events| tracker.install(events));
        ctrl.store().set_container_size(1000.0, 800.0);

        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        ctrl.store().set_state(StatePatch::nodes(nodes).with_edges(edges));

        let harness = Self { ctrl, measurements: MeasurementCache::new(), tracker };
        for id in &ids {
            harness.report_node(id, NODE_WIDTH, NODE_HEIGHT);
        }
        harness.measure();
        harness.tracker.clear();
        harness
    }

    /// Record a node size plus default handles, as a rendered node would.
    pub fn report_node(&self, id: &str, width: f32, height: f32) {
        self.measurements.handle_node_report(id, width, height);
        let y = height / 2.0 - 5.0;
        let target = Handle::new(id, None, HandleType::Target, Position::Left, Rect::new(-5.0, y, 10.0, 10.0));
        let source = Handle::new(id, None, HandleType::Source, Position::Right, Rect::new(width - 5.0, y, 10.0, 10.0));
        self.measurements.handle_handle_report(target).unwrap();
        self.measurements.handle_handle_report(source).unwrap();
    }

    /// Push every recorded measurement into the store.
    pub fn measure(&self) {
        let ids: Vec<String> = self.ctrl.store().nodes().into_iter().map(|n| n.id).collect();
        self.ctrl
            .store()
            .update_node_internals(&self.measurements, ids.iter().map(String::as_str));
    }

    // === Queries ===

    pub fn node_position(&self, id: &str) -> XYPosition {
        self.ctrl.store().node(id).unwrap().position
    }

    /// Screen position of a flow-space point.
    pub fn screen(&self, x: f32, y: f32) -> XYPosition {
        self.ctrl.flow_to_screen(XYPosition::new(x, y))
    }

    /// Screen position of a node's center.
    pub fn node_center(&self, id: &str) -> XYPosition {
        let rect = self.ctrl.store().internal_node(id).unwrap().rect();
        self.ctrl.flow_to_screen(rect.center())
    }

    /// Screen position of a node's default handle center.
    pub fn handle_center(&self, id: &str, handle_type: HandleType) -> XYPosition {
        let node = self.ctrl.store().internal_node(id).unwrap();
        let handle = node.handle(None, handle_type).unwrap();
        self.ctrl.flow_to_screen(handle.absolute_rect(node.position_absolute).center())
    }

    pub fn selected_node_ids(&self) -> Vec<String> {
        self.ctrl.store().selected_nodes().into_iter().map(|n| n.id).collect()
    }

    pub fn selected_edge_ids(&self) -> Vec<String> {
        self.ctrl.store().selected_edges().into_iter().map(|e| e.id).collect()
    }

    pub fn viewport(&self) -> Transform {
        self.ctrl.store().transform()
    }

    // === Pointer helpers ===

    pub fn mouse_down(&self, target: PointerTarget, at: XYPosition) -> bool {
        self.ctrl.pointer_down(target, at, Modifiers::NONE)
    }

    pub fn mouse_down_on_node(&self, id: &str, at: XYPosition, modifiers: Modifiers) -> bool {
        self.ctrl.pointer_down(PointerTarget::Node(id.into()), at, modifiers)
    }

    pub fn mouse_down_on_handle(&self, id: &str, handle_type: HandleType) -> bool {
        let at = self.handle_center(id, handle_type);
        self.ctrl
            .pointer_down(PointerTarget::Handle(HandleRef::new(id, None, handle_type)), at, Modifiers::NONE)
    }

    pub fn mouse_move(&self, at: XYPosition) {
        self.ctrl.pointer_move(at);
    }

    pub fn mouse_up(&self, at: XYPosition) {
        self.ctrl.pointer_up(at);
    }

    /// Simulate a complete click on a node body.
    pub fn click_node(&self, id: &str, modifiers: Modifiers) {
        let at = self.node_center(id);
        self.mouse_down_on_node(id, at, modifiers);
        self.mouse_up(at);
    }

    /// Simulate a complete drag of a node by a screen-space delta.
    pub fn drag_node(&self, id: &str, dx: f32, dy: f32) {
        let start = self.node_center(id);
        let end = XYPosition::new(start.x + dx, start.y + dy);
        self.mouse_down_on_node(id, start, Modifiers::NONE);
        self.mouse_move(end);
        self.mouse_up(end);
    }

    /// Simulate a complete drag from one node's source handle to a screen point.
    pub fn drag_connection(&self, from: &str, to: XYPosition) {
        self.mouse_down_on_handle(from, HandleType::Source);
        self.mouse_move(to);
        self.mouse_up(to);
    }

    /// Simulate a complete drag on the empty pane.
    pub fn drag_pane(&self, from: XYPosition, to: XYPosition, modifiers: Modifiers) {
        self.ctrl.pointer_down(PointerTarget::Pane, from, modifiers);
        self.mouse_move(to);
        self.mouse_up(to);
    }

    /// Simulate scroll (for zoom).
    pub fn scroll(&self, at: XYPosition, delta_y: f32) {
        self.ctrl.wheel(at, XYPosition::new(0.0, delta_y), Modifiers::NONE);
    }

    // === Keyboard helpers ===

    pub fn key_tap(&self, key: Key) -> bool {
        self.ctrl.key_down(key, Modifiers::NONE)
    }

    pub fn key_tap_with(&self, key: Key, modifiers: Modifiers) -> bool {
        self.ctrl.key_down(key, modifiers)
    }

    /// Run one animation frame.
    pub fn pump_frame(&self) -> bool {
        self.ctrl.animation_frame()
    }
}

impl Default for FlowTestHarness {
    fn default() -> Self {
        Self::new()
    }
}
