//! Event sinks consumed by host code.
//!
//! Every sink is optional. `on_error` falls back to a `tracing` warning so
//! reported problems are never silently lost.

use crate::changes::{EdgeChange, NodeChange};
use crate::error::{ErrorCode, FlowError};
use crate::geometry::Transform;
use crate::graph::{Connection, HandleType, Node, NodeId};
use std::rc::Rc;

/// Where a connection gesture started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectStart {
    pub node_id: NodeId,
    pub handle_id: Option<String>,
    pub handle_type: HandleType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionChange {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<String>,
}

/// Optional callbacks, cheap to clone (handlers are reference counted).
#[derive(Default, Clone)]
pub struct FlowEvents {
    nodes_change: Option<Rc<dyn Fn(&[NodeChange])>>,
    edges_change: Option<Rc<dyn Fn(&[EdgeChange])>>,
    connect: Option<Rc<dyn Fn(&Connection)>>,
    connect_start: Option<Rc<dyn Fn(&ConnectStart)>>,
    connect_end: Option<Rc<dyn Fn(Option<&Connection>)>>,
    click_connect_start: Option<Rc<dyn Fn(&ConnectStart)>>,
    click_connect_end: Option<Rc<dyn Fn(Option<&Connection>)>>,
    selection_change: Option<Rc<dyn Fn(&SelectionChange)>>,
    node_click: Option<Rc<dyn Fn(&Node)>>,
    node_drag_start: Option<Rc<dyn Fn(&[Node])>>,
    node_drag: Option<Rc<dyn Fn(&[Node])>>,
    node_drag_stop: Option<Rc<dyn Fn(&[Node])>>,
    viewport_change: Option<Rc<dyn Fn(Transform)>>,
    error: Option<Rc<dyn Fn(ErrorCode, &str)>>,
}

impl FlowEvents {
    pub fn new() -> Self {
        Self::default()
    }

    // === Registration ===

    pub fn on_nodes_change(&mut self, f: impl Fn(&[NodeChange]) + 'static) {
        self.nodes_change = Some(Rc::new(f));
    }

    pub fn on_edges_change(&mut self, f: impl Fn(&[EdgeChange]) + 'static) {
        self.edges_change = Some(Rc::new(f));
    }

    pub fn on_connect(&mut self, f: impl Fn(&Connection) + 'static) {
        self.connect = Some(Rc::new(f));
    }

    pub fn on_connect_start(&mut self, f: impl Fn(&ConnectStart) + 'static) {
        self.connect_start = Some(Rc::new(f));
    }

    /// Called when a drag-to-connect gesture ends, with the connection made (if any).
    pub fn on_connect_end(&mut self, f: impl Fn(Option<&Connection>) + 'static) {
        self.connect_end = Some(Rc::new(f));
    }

    pub fn on_click_connect_start(&mut self, f: impl Fn(&ConnectStart) + 'static) {
        self.click_connect_start = Some(Rc::new(f));
    }

    pub fn on_click_connect_end(&mut self, f: impl Fn(Option<&Connection>) + 'static) {
        self.click_connect_end = Some(Rc::new(f));
    }

    pub fn on_selection_change(&mut self, f: impl Fn(&SelectionChange) + 'static) {
        self.selection_change = Some(Rc::new(f));
    }

    pub fn on_node_click(&mut self, f: impl Fn(&Node) + 'static) {
        self.node_click = Some(Rc::new(f));
    }

    pub fn on_node_drag_start(&mut self, f: impl Fn(&[Node]) + 'static) {
        self.node_drag_start = Some(Rc::new(f));
    }

    pub fn on_node_drag(&mut self, f: impl Fn(&[Node]) + 'static) {
        self.node_drag = Some(Rc::new(f));
    }

    pub fn on_node_drag_stop(&mut self, f: impl Fn(&[Node]) + 'static) {
        self.node_drag_stop = Some(Rc::new(f));
    }

    pub fn on_viewport_change(&mut self, f: impl Fn(Transform) + 'static) {
        self.viewport_change = Some(Rc::new(f));
    }

    pub fn on_error(&mut self, f: impl Fn(ErrorCode, &str) + 'static) {
        self.error = Some(Rc::new(f));
    }

    // === Emission ===

    pub(crate) fn nodes_change(&self, changes: &[NodeChange]) {
        if let (Some(f), false) = (&self.nodes_change, changes.is_empty()) {
            f(changes);
        }
    }

    pub(crate) fn edges_change(&self, changes: &[EdgeChange]) {
        if let (Some(f), false) = (&self.edges_change, changes.is_empty()) {
            f(changes);
        }
    }

    pub(crate) fn connect(&self, connection: &Connection) {
        if let Some(f) = &self.connect {
            f(connection);
        }
    }

    pub(crate) fn connect_start(&self, start: &ConnectStart) {
        if let Some(f) = &self.connect_start {
            f(start);
        }
    }

    pub(crate) fn connect_end(&self, connection: Option<&Connection>) {
        if let Some(f) = &self.connect_end {
            f(connection);
        }
    }

    pub(crate) fn click_connect_start(&self, start: &ConnectStart) {
        if let Some(f) = &self.click_connect_start {
            f(start);
        }
    }

    pub(crate) fn click_connect_end(&self, connection: Option<&Connection>) {
        if let Some(f) = &self.click_connect_end {
            f(connection);
        }
    }

    pub(crate) fn selection_change(&self, change: &SelectionChange) {
        if let Some(f) = &self.selection_change {
            f(change);
        }
    }

    pub(crate) fn node_click(&self, node: &Node) {
        if let Some(f) = &self.node_click {
            f(node);
        }
    }

    pub(crate) fn node_drag_start(&self, nodes: &[Node]) {
        if let Some(f) = &self.node_drag_start {
            f(nodes);
        }
    }

    pub(crate) fn node_drag(&self, nodes: &[Node]) {
        if let Some(f) = &self.node_drag {
            f(nodes);
        }
    }

    pub(crate) fn node_drag_stop(&self, nodes: &[Node]) {
        if let Some(f) = &self.node_drag_stop {
            f(nodes);
        }
    }

    pub(crate) fn viewport_change(&self, transform: Transform) {
        if let Some(f) = &self.viewport_change {
            f(transform);
        }
    }

    /// Report a recoverable problem.
    pub(crate) fn error(&self, error: &FlowError) {
        let message = error.to_string();
        match &self.error {
            Some(f) => f(error.code(), &message),
            None => tracing::warn!(code = error.code().as_str(), "{message}"),
        }
    }
}
