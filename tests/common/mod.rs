//! Common test utilities for integration tests.

#![allow(dead_code)]

pub mod harness;

use slint_flow::{ConnectStart, Connection, EdgeChange, ErrorCode, FlowEvents, NodeChange, SelectionChange, Transform};
use std::cell::RefCell;
use std::rc::Rc;

/// Tracks event sink invocations for testing.
///
/// Each field records calls to the corresponding sink with their arguments.
#[derive(Default, Clone)]
pub struct CallbackTracker {
    pub nodes_change: Rc<RefCell<Vec<Vec<NodeChange>>>>,
    pub edges_change: Rc<RefCell<Vec<Vec<EdgeChange>>>>,
    pub connect: Rc<RefCell<Vec<Connection>>>,
    pub connect_start: Rc<RefCell<Vec<ConnectStart>>>,
    /// `None` entries are gestures that ended without a connection.
    pub connect_end: Rc<RefCell<Vec<Option<Connection>>>>,
    pub click_connect_start: Rc<RefCell<Vec<ConnectStart>>>,
    pub click_connect_end: Rc<RefCell<Vec<Option<Connection>>>>,
    pub selection_change: Rc<RefCell<Vec<SelectionChange>>>,
    /// (node_id,)
    pub node_click: Rc<RefCell<Vec<String>>>,
    /// Ids of the dragged nodes per call
    pub node_drag_start: Rc<RefCell<Vec<Vec<String>>>>,
    pub node_drag: Rc<RefCell<Vec<Vec<String>>>>,
    pub node_drag_stop: Rc<RefCell<Vec<Vec<String>>>>,
    pub viewport_change: Rc<RefCell<Vec<Transform>>>,
    pub errors: Rc<RefCell<Vec<(ErrorCode, String)>>>,
}

impl CallbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recording handler for every sink.
    pub fn install(&self, events: &mut FlowEvents) {
        let ids = |nodes: &[slint_flow::Node]| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();

        let t = self.clone();
        events.on_nodes_change(move |c| t.nodes_change.borrow_mut().push(c.to_vec()));
        let t = self.clone();
        events.on_edges_change(move |c| t.edges_change.borrow_mut().push(c.to_vec()));
        let t = self.clone();
        events.on_connect(move |c| t.connect.borrow_mut().push(c.clone()));
        let t = self.clone();
        events.on_connect_start(move |s| t.connect_start.borrow_mut().push(s.clone()));
        let t = self.clone();
        events.on_connect_end(move |c| t.connect_end.borrow_mut().push(c.cloned()));
        let t = self.clone();
        events.on_click_connect_start(move |s| t.click_connect_start.borrow_mut().push(s.clone()));
        let t = self.clone();
        events.on_click_connect_end(move |c| t.click_connect_end.borrow_mut().push(c.cloned()));
        let t = self.clone();
        events.on_selection_change(move |s| t.selection_change.borrow_mut().push(s.clone()));
        let t = self.clone();
        events.on_node_click(move |n| t.node_click.borrow_mut().push(n.id.clone()));
        let t = self.clone();
        events.on_node_drag_start(move |n| t.node_drag_start.borrow_mut().push(ids(n)));
        let t = self.clone();
        events.on_node_drag(move |n| t.node_drag.borrow_mut().push(ids(n)));
        let t = self.clone();
        events.on_node_drag_stop(move |n| t.node_drag_stop.borrow_mut().push(ids(n)));
        let t = self.clone();
        events.on_viewport_change(move |v| t.viewport_change.borrow_mut().push(v));
        let t = self.clone();
        events.on_error(move |code, message| t.errors.borrow_mut().push((code, message.to_owned())));
    }

    pub fn error_codes(&self) -> Vec<&'static str> {
        self.errors.borrow().iter().map(|(code, _)| code.as_str()).collect()
    }

    /// Clear all recorded calls.
    pub fn clear(&self) {
        self.nodes_change.borrow_mut().clear();
        self.edges_change.borrow_mut().clear();
        self.connect.borrow_mut().clear();
        self.connect_start.borrow_mut().clear();
        self.connect_end.borrow_mut().clear();
        self.click_connect_start.borrow_mut().clear();
        self.click_connect_end.borrow_mut().clear();
        self.selection_change.borrow_mut().clear();
        self.node_click.borrow_mut().clear();
        self.node_drag_start.borrow_mut().clear();
        self.node_drag.borrow_mut().clear();
        self.node_drag_stop.borrow_mut().clear();
        self.viewport_change.borrow_mut().clear();
        self.errors.borrow_mut().clear();
    }
}
