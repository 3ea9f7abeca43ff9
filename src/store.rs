//! The flow store: single source of truth for one flow instance.
//!
//! [`FlowStore`] is a cheap, clonable handle (like the UI controllers it is
//! passed to). State lives in a [`FlowState`] snapshot that is only ever
//! replaced through [`FlowStore::set_state`], which merges a [`StatePatch`],
//! rebuilds the derived lookups in the same step and then notifies
//! subscribers. A subscriber therefore never observes `nodes` without the
//! matching `node_lookup`.
//!
//! # Example
//!
//! ```ignore
//! let store = FlowStore::new(FlowConfig::default())?;
//! store.set_nodes(vec![Node::new("1", XYPosition::new(0.0, 0.0))]);
//!
//! let sub = store.subscribe(|state| println!("{} nodes", state.nodes.len()));
//! store.select_nodes(["1"]);
//! sub.unsubscribe();
//! ```

use crate::changes::{self, Change, EdgeChange, NodeChange};
use crate::config::FlowConfig;
use crate::connection::ConnectionState;
use crate::error::{FlowError, Result};
use crate::events::{FlowEvents, SelectionChange};
use crate::geometry::{rects_bounds, Dimensions, Position, Rect, Transform, XYPosition};
use crate::graph::{
    connection_exists, ConnectionValidator, Edge, EdgeId, Handle, HandleType, Node, NodeId,
    PredicateValidator,
};
use crate::measure::MeasurementSource;
use crate::selection::SelectionManager;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

/// z offset of selected nodes when `elevate_nodes_on_select` is on.
const SELECTED_NODE_Z: i32 = 1000;

/// A node plus everything derived from it: absolute position, stacking order
/// and measured handles.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
    pub node: Node,
    pub position_absolute: XYPosition,
    pub z: i32,
    pub handles: Vec<Handle>,
}

impl InternalNode {
    pub fn dimensions(&self) -> Dimensions {
        self.node.dimensions()
    }

    /// Absolute bounds in flow space.
    pub fn rect(&self) -> Rect {
        Rect::from_position(self.position_absolute, self.dimensions())
    }

    /// `None` as id matches the first handle of that type.
    pub fn handle(&self, id: Option<&str>, handle_type: HandleType) -> Option<&Handle> {
        self.handles
            .iter()
            .find(|h| h.handle_type == handle_type && (id.is_none() || h.id.as_deref() == id))
    }
}

/// Where an edge attaches on both ends, absolute flow coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePosition {
    pub source: XYPosition,
    pub target: XYPosition,
    pub source_position: Position,
    pub target_position: Position,
}

/// Serializable nodes/edges/viewport triple for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub viewport: Transform,
}

/// Snapshot of the whole flow.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub node_lookup: HashMap<NodeId, InternalNode>,
    pub edge_lookup: HashMap<EdgeId, Edge>,
    /// parent id -> direct children
    pub parent_lookup: HashMap<NodeId, BTreeSet<NodeId>>,
    pub selected_nodes: SelectionManager,
    pub selected_edges: SelectionManager,
    pub transform: Transform,
    pub width: f32,
    pub height: f32,
    pub connection: ConnectionState,
    /// First handle of a click-to-connect gesture.
    pub connection_click_start: Option<Handle>,
    pub config: FlowConfig,
    broken_nodes: HashSet<NodeId>,
    dangling_edges: HashSet<EdgeId>,
}

/// Partial state for [`FlowStore::set_state`]; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub nodes: Option<Vec<Node>>,
    pub edges: Option<Vec<Edge>>,
    pub transform: Option<Transform>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub connection: Option<ConnectionState>,
    pub connection_click_start: Option<Option<Handle>>,
    pub config: Option<FlowConfig>,
    /// Measured handles per node, node-local coordinates.
    pub handles: Option<Vec<(NodeId, Vec<Handle>)>>,
}

impl StatePatch {
    pub fn nodes(nodes: Vec<Node>) -> Self {
        Self { nodes: Some(nodes), ..Default::default() }
    }

    pub fn edges(edges: Vec<Edge>) -> Self {
        Self { edges: Some(edges), ..Default::default() }
    }

    pub fn transform(transform: Transform) -> Self {
        Self { transform: Some(transform), ..Default::default() }
    }

    pub fn connection(connection: ConnectionState) -> Self {
        Self { connection: Some(connection), ..Default::default() }
    }

    pub fn with_edges(mut self, edges: Vec<Edge>) -> Self {
        self.edges = Some(edges);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_none()
            && self.edges.is_none()
            && self.transform.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.connection.is_none()
            && self.connection_click_start.is_none()
            && self.config.is_none()
            && self.handles.is_none()
    }
}

/// Absolute position of `node`: its own position plus those of its parent
/// chain. The walk is bounded by the lookup size, so a cycle is detected
/// rather than followed forever.
pub fn get_node_absolute_position<'a>(node: &'a Node, lookup: &HashMap<&str, &'a Node>) -> Result<XYPosition> {
    Ok(ancestry(node, lookup)?
        .iter()
        .fold(XYPosition::default(), |acc, n| acc + n.position))
}

/// `node` and its ancestors, root first.
fn ancestry<'a>(node: &'a Node, lookup: &HashMap<&str, &'a Node>) -> Result<Vec<&'a Node>> {
    let mut chain = vec![node];
    let mut current = node;
    while let Some(parent_id) = current.parent_id.as_deref() {
        if chain.len() > lookup.len() {
            return Err(FlowError::CyclicParent(node.id.clone()));
        }
        let parent = lookup.get(parent_id).ok_or_else(|| FlowError::ParentNotFound {
            node_id: current.id.clone(),
            parent_id: parent_id.to_owned(),
        })?;
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    Ok(chain)
}

impl FlowState {
    fn new(config: FlowConfig) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_lookup: HashMap::new(),
            edge_lookup: HashMap::new(),
            parent_lookup: HashMap::new(),
            selected_nodes: SelectionManager::new(),
            selected_edges: SelectionManager::new(),
            transform: Transform::IDENTITY,
            width: 0.0,
            height: 0.0,
            connection: ConnectionState::None,
            connection_click_start: None,
            config,
            broken_nodes: HashSet::new(),
            dangling_edges: HashSet::new(),
        }
    }

    pub fn internal_node(&self, id: &str) -> Option<&InternalNode> {
        self.node_lookup.get(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_lookup.get(id).map(|n| &n.node)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_lookup.get(id)
    }

    pub fn container_size(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Bounds of the nodes accepted by `filter`, `None` if there are none.
    pub fn nodes_bounds<F>(&self, mut filter: F) -> Option<Rect>
    where
        F: FnMut(&InternalNode) -> bool,
    {
        rects_bounds(
            self.nodes
                .iter()
                .filter_map(|n| self.node_lookup.get(&n.id))
                .filter(|n| filter(*n))
                .map(InternalNode::rect),
        )
    }

    /// Nodes overlapping `rect` (any overlap when `partially`, fully contained
    /// otherwise). Hidden and unmeasured nodes never intersect.
    pub fn intersecting_nodes(&self, rect: &Rect, partially: bool) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter_map(|n| self.node_lookup.get(&n.id))
            .filter(|n| !n.node.hidden && n.node.is_measured())
            .filter(|n| {
                let node_rect = n.rect();
                let overlap = rect.overlapping_area(&node_rect);
                (partially && overlap > 0.0) || overlap >= node_rect.width * node_rect.height
            })
            .map(|n| &n.node)
            .collect()
    }

    /// Edges that can be drawn: not hidden, both endpoints present and visible.
    pub fn visible_edges(&self) -> Vec<&Edge> {
        let visible = |id: &str| self.node_lookup.get(id).is_some_and(|n| !n.node.hidden);
        self.edges
            .iter()
            .filter(|e| !e.hidden && visible(&e.source) && visible(&e.target))
            .collect()
    }

    /// Attachment points of `edge`. Nodes without measured handles attach at
    /// their bottom (source) and top (target) centers.
    pub fn edge_position(&self, edge: &Edge) -> Result<EdgePosition> {
        let (source, source_position) =
            self.edge_anchor(edge, &edge.source, edge.source_handle.as_deref(), HandleType::Source)?;
        let (target, target_position) =
            self.edge_anchor(edge, &edge.target, edge.target_handle.as_deref(), HandleType::Target)?;
        Ok(EdgePosition { source, target, source_position, target_position })
    }

    fn edge_anchor(
        &self,
        edge: &Edge,
        node_id: &str,
        handle_id: Option<&str>,
        handle_type: HandleType,
    ) -> Result<(XYPosition, Position)> {
        let node = self.node_lookup.get(node_id).ok_or_else(|| FlowError::DanglingEdge {
            edge_id: edge.id.clone(),
            node_id: node_id.to_owned(),
        })?;
        if node.handles.is_empty() {
            let rect = node.rect();
            let x = rect.x + rect.width / 2.0;
            return Ok(match handle_type {
                HandleType::Source => (XYPosition::new(x, rect.bottom()), Position::Bottom),
                HandleType::Target => (XYPosition::new(x, rect.y), Position::Top),
            });
        }
        let handle = node.handle(handle_id, handle_type).ok_or_else(|| FlowError::EdgeHandleNotFound {
            edge_id: edge.id.clone(),
            handle_type: handle_type.to_string(),
            handle_id: handle_id.unwrap_or("null").to_owned(),
        })?;
        Ok((handle.anchor(node.position_absolute), handle.position))
    }

    /// Merge `patch`, rebuilding derived data. Returns newly detected problems.
    fn merge(&mut self, patch: StatePatch) -> Vec<FlowError> {
        let mut errors = Vec::new();
        let nodes_changed = patch.nodes.is_some() || patch.config.is_some();
        let edges_changed = patch.edges.is_some();

        if let Some(nodes) = patch.nodes {
            self.nodes = nodes;
        }
        if let Some(edges) = patch.edges {
            self.edges = edges;
        }
        if let Some(config) = patch.config {
            self.config = config;
        }
        if let Some(transform) = patch.transform {
            self.transform = transform;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
        if let Some(connection) = patch.connection {
            self.connection = connection;
        }
        if let Some(start) = patch.connection_click_start {
            self.connection_click_start = start;
        }

        if nodes_changed {
            self.rebuild_node_lookup(&mut errors);
            self.selected_nodes
                .replace_selection(self.nodes.iter().filter(|n| n.selected).map(|n| n.id.as_str()));
        }
        if let Some(handles) = patch.handles {
            for (node_id, mut handles) in handles {
                if let Some(internal) = self.node_lookup.get_mut(&node_id) {
                    handles.iter_mut().for_each(|h| h.node_id = node_id.clone());
                    internal.handles = handles;
                }
            }
        }
        if nodes_changed || edges_changed {
            self.rebuild_edge_lookup(&mut errors);
        }
        if edges_changed {
            self.selected_edges
                .replace_selection(self.edges.iter().filter(|e| e.selected).map(|e| e.id.as_str()));
        }
        errors
    }

    fn rebuild_node_lookup(&mut self, errors: &mut Vec<FlowError>) {
        let mut previous = std::mem::take(&mut self.node_lookup);
        let by_id: HashMap<&str, &Node> = self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let elevate = self.config.elevate_nodes_on_select;
        let mut parent_lookup: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        let mut lookup = HashMap::with_capacity(self.nodes.len());
        let mut broken = HashSet::new();

        for node in &self.nodes {
            let chain = match ancestry(node, &by_id) {
                Ok(chain) => chain,
                Err(err) => {
                    if !self.broken_nodes.contains(&node.id) {
                        errors.push(err);
                    }
                    broken.insert(node.id.clone());
                    vec![node]
                }
            };

            let mut position_absolute = XYPosition::default();
            let mut z = 0;
            for (depth, n) in chain.iter().enumerate() {
                position_absolute = position_absolute + n.position;
                let own = n.z_index + if elevate && n.selected { SELECTED_NODE_Z } else { 0 };
                z = if depth > 0 && z >= own { z + 1 } else { own };
            }

            if chain.len() > 1 {
                if let Some(parent_id) = &node.parent_id {
                    parent_lookup.entry(parent_id.clone()).or_default().insert(node.id.clone());
                }
            }

            let handles = previous.remove(&node.id).map(|n| n.handles).unwrap_or_default();
            lookup.insert(
                node.id.clone(),
                InternalNode { node: node.clone(), position_absolute, z, handles },
            );
        }

        self.node_lookup = lookup;
        self.parent_lookup = parent_lookup;
        self.broken_nodes = broken;
    }

    fn rebuild_edge_lookup(&mut self, errors: &mut Vec<FlowError>) {
        let mut dangling = HashSet::new();
        for edge in &self.edges {
            let missing = [&edge.source, &edge.target]
                .into_iter()
                .find(|id| !self.node_lookup.contains_key(id.as_str()));
            if let Some(node_id) = missing {
                if !self.dangling_edges.contains(&edge.id) {
                    errors.push(FlowError::DanglingEdge { edge_id: edge.id.clone(), node_id: node_id.clone() });
                }
                dangling.insert(edge.id.clone());
            }
        }
        self.edge_lookup = self.edges.iter().map(|e| (e.id.clone(), e.clone())).collect();
        self.dangling_edges = dangling;
    }
}

type Listener = Rc<dyn Fn(&FlowState)>;

struct StoreInner {
    state: RefCell<FlowState>,
    listeners: RefCell<Vec<(usize, Listener)>>,
    next_listener: Cell<usize>,
    pending: RefCell<VecDeque<StatePatch>>,
    notifying: Cell<bool>,
    events: RefCell<FlowEvents>,
    validator: RefCell<Option<Rc<dyn ConnectionValidator>>>,
}

/// Shared handle to one flow's state. Clone it to share it across callbacks.
#[derive(Clone)]
pub struct FlowStore {
    inner: Rc<StoreInner>,
}

/// Non-owning store handle, for collaborators that must not keep the flow alive.
#[derive(Clone)]
pub struct WeakFlowStore {
    inner: Weak<StoreInner>,
}

impl WeakFlowStore {
    pub fn upgrade(&self) -> Option<FlowStore> {
        self.inner.upgrade().map(|inner| FlowStore { inner })
    }
}

/// Returned by [`FlowStore::subscribe`].
#[must_use = "dropping the handle keeps the listener subscribed; call `unsubscribe` to remove it"]
pub struct Unsubscribe {
    store: Weak<StoreInner>,
    id: usize,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

impl FlowStore {
    /// Fails only if `config` is invalid.
    pub fn new(config: FlowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(FlowState::new(config)),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                pending: RefCell::new(VecDeque::new()),
                notifying: Cell::new(false),
                events: RefCell::new(FlowEvents::default()),
                validator: RefCell::new(None),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakFlowStore {
        WeakFlowStore { inner: Rc::downgrade(&self.inner) }
    }

    // === Core contract ===

    /// Current snapshot. Do not hold the guard across calls that modify the store.
    pub fn get_state(&self) -> Ref<'_, FlowState> {
        self.inner.state.borrow()
    }

    /// Merge `patch` and notify subscribers synchronously.
    ///
    /// Calls made from inside a subscriber are queued and applied, in order,
    /// once the current notification round has finished.
    pub fn set_state(&self, patch: StatePatch) {
        if patch.is_empty() {
            return;
        }
        if self.inner.notifying.get() {
            self.inner.pending.borrow_mut().push_back(patch);
            return;
        }
        let mut next = Some(patch);
        while let Some(patch) = next {
            let errors = self.inner.state.borrow_mut().merge(patch);
            for err in &errors {
                self.report(err);
            }
            self.notify();
            next = self.inner.pending.borrow_mut().pop_front();
        }
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self.inner.listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
        self.inner.notifying.set(true);
        {
            let state = self.inner.state.borrow();
            for listener in &listeners {
                listener(&state);
            }
        }
        self.inner.notifying.set(false);
    }

    pub fn subscribe(&self, listener: impl Fn(&FlowState) + 'static) -> Unsubscribe {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, Rc::new(listener)));
        Unsubscribe { store: Rc::downgrade(&self.inner), id }
    }

    // === Collaborators ===

    pub fn events(&self) -> FlowEvents {
        self.inner.events.borrow().clone()
    }

    pub fn set_events(&self, events: FlowEvents) {
        *self.inner.events.borrow_mut() = events;
    }

    /// Register sinks in place, e.g. `store.update_events(|e| e.on_connect(...))`.
    pub fn update_events(&self, f: impl FnOnce(&mut FlowEvents)) {
        f(&mut self.inner.events.borrow_mut());
    }

    /// Hand a recoverable problem to `on_error`.
    pub fn report(&self, error: &FlowError) {
        self.events().error(error);
    }

    pub fn set_connection_validator(&self, validator: impl ConnectionValidator + 'static) {
        *self.inner.validator.borrow_mut() = Some(Rc::new(validator));
    }

    /// Install an `is_valid_connection` predicate.
    pub fn set_is_valid_connection(&self, predicate: impl Fn(&crate::graph::Connection) -> bool + 'static) {
        self.set_connection_validator(PredicateValidator(predicate));
    }

    pub fn connection_validator(&self) -> Option<Rc<dyn ConnectionValidator>> {
        self.inner.validator.borrow().clone()
    }

    pub fn config(&self) -> FlowConfig {
        self.get_state().config.clone()
    }

    pub fn set_config(&self, config: FlowConfig) -> Result<()> {
        config.validate()?;
        self.set_state(StatePatch { config: Some(config), ..Default::default() });
        Ok(())
    }

    // === Plain accessors ===

    pub fn set_nodes(&self, nodes: Vec<Node>) {
        self.set_state(StatePatch::nodes(nodes));
    }

    pub fn set_edges(&self, edges: Vec<Edge>) {
        self.set_state(StatePatch::edges(edges));
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.get_state().nodes.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.get_state().edges.clone()
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.get_state().node(id).cloned()
    }

    pub fn edge(&self, id: &str) -> Option<Edge> {
        self.get_state().edge(id).cloned()
    }

    pub fn internal_node(&self, id: &str) -> Option<InternalNode> {
        self.get_state().internal_node(id).cloned()
    }

    pub fn get_node_absolute_position(&self, id: &str) -> Option<XYPosition> {
        self.get_state().internal_node(id).map(|n| n.position_absolute)
    }

    pub fn transform(&self) -> Transform {
        self.get_state().transform
    }

    pub fn set_container_size(&self, width: f32, height: f32) {
        self.set_state(StatePatch { width: Some(width), height: Some(height), ..Default::default() });
    }

    pub fn selected_nodes(&self) -> Vec<Node> {
        let state = self.get_state();
        state.nodes.iter().filter(|n| state.selected_nodes.contains(&n.id)).cloned().collect()
    }

    pub fn selected_edges(&self) -> Vec<Edge> {
        let state = self.get_state();
        state.edges.iter().filter(|e| state.selected_edges.contains(&e.id)).cloned().collect()
    }

    pub fn get_nodes_bounds<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Option<Rect> {
        let ids: HashSet<&str> = ids.into_iter().collect();
        let state = self.get_state();
        let bounds = state.nodes_bounds(|n| ids.contains(n.node.id.as_str()));
        bounds
    }

    pub fn get_intersecting_nodes(&self, rect: &Rect, partially: bool) -> Vec<Node> {
        self.get_state().intersecting_nodes(rect, partially).into_iter().cloned().collect()
    }

    pub fn visible_edges(&self) -> Vec<Edge> {
        self.get_state().visible_edges().into_iter().cloned().collect()
    }

    /// Attachment points of edge `id`; problems are reported and yield `None`.
    pub fn get_edge_position(&self, id: &str) -> Option<EdgePosition> {
        let result = {
            let state = self.get_state();
            let edge = state.edge(id)?;
            let position = state.edge_position(edge);
            position
        };
        result.map_err(|err| self.report(&err)).ok()
    }

    pub fn to_object(&self) -> FlowSnapshot {
        let state = self.get_state();
        FlowSnapshot { nodes: state.nodes.clone(), edges: state.edges.clone(), viewport: state.transform }
    }

    pub fn from_object(&self, snapshot: FlowSnapshot) {
        self.set_state(StatePatch {
            nodes: Some(snapshot.nodes),
            edges: Some(snapshot.edges),
            transform: Some(snapshot.viewport),
            ..Default::default()
        });
    }

    // === Changes ===

    /// Apply node changes (when nodes are uncontrolled) and emit `on_nodes_change`.
    pub fn trigger_node_changes(&self, changes: Vec<NodeChange>) {
        if changes.is_empty() {
            return;
        }
        if self.get_state().config.has_default_nodes {
            let nodes = changes::apply_node_changes(&changes, &self.get_state().nodes);
            self.set_nodes(nodes);
        }
        self.events().nodes_change(&changes);
    }

    /// Apply edge changes (when edges are uncontrolled) and emit `on_edges_change`.
    pub fn trigger_edge_changes(&self, changes: Vec<EdgeChange>) {
        if changes.is_empty() {
            return;
        }
        if self.get_state().config.has_default_edges {
            let edges = changes::apply_edge_changes(&changes, &self.get_state().edges);
            self.set_edges(edges);
        }
        self.events().edges_change(&changes);
    }

    // === Element actions ===

    /// Replace node `id` with `f` applied to a copy. Missing ids are reported.
    pub fn update_node(&self, id: &str, f: impl FnOnce(&mut Node)) -> bool {
        let Some(current) = self.node(id) else {
            self.report(&FlowError::NodeNotFound(id.to_owned()));
            return false;
        };
        let mut next = current.clone();
        f(&mut next);
        if next != current {
            self.trigger_node_changes(vec![Change::Replace { id: id.to_owned(), item: next }]);
        }
        true
    }

    /// Shallow-merge `data` into an object payload, replace it otherwise.
    pub fn update_node_data(&self, id: &str, data: serde_json::Value) -> bool {
        self.update_node(id, |node| match (&mut node.data, data) {
            (serde_json::Value::Object(current), serde_json::Value::Object(update)) => current.extend(update),
            (slot, data) => *slot = data,
        })
    }

    /// Replace edge `id` with `f` applied to a copy. Missing ids are reported.
    pub fn update_edge(&self, id: &str, f: impl FnOnce(&mut Edge)) -> bool {
        let Some(current) = self.edge(id) else {
            self.report(&FlowError::EdgeNotFound(id.to_owned()));
            return false;
        };
        let mut next = current.clone();
        f(&mut next);
        if next != current {
            self.trigger_edge_changes(vec![Change::Replace { id: id.to_owned(), item: next }]);
        }
        true
    }

    pub fn add_nodes(&self, nodes: Vec<Node>) {
        self.trigger_node_changes(nodes.into_iter().map(|item| Change::Add { item, index: None }).collect());
    }

    /// Add edges, skipping (and reporting) ones without endpoints and
    /// silently skipping duplicates.
    pub fn add_edges(&self, edges: Vec<Edge>) {
        let mut known = self.edges();
        let mut changes = Vec::new();
        for edge in edges {
            if edge.source.is_empty() || edge.target.is_empty() {
                self.report(&FlowError::EdgeMissingEndpoint);
                continue;
            }
            if connection_exists(&edge.connection(), &known) {
                continue;
            }
            known.push(edge.clone());
            changes.push(Change::Add { item: edge, index: None });
        }
        self.trigger_edge_changes(changes);
    }

    /// Delete nodes (with their descendants) and edges (plus edges touching
    /// deleted nodes). Non-deletable elements are kept. Returns what was removed.
    pub fn delete_elements<'a>(
        &self,
        node_ids: impl IntoIterator<Item = &'a str>,
        edge_ids: impl IntoIterator<Item = &'a str>,
    ) -> (Vec<Node>, Vec<Edge>) {
        let (nodes, edges) = {
            let state = self.get_state();
            let mut doomed: BTreeSet<&str> = node_ids
                .into_iter()
                .filter(|id| state.node(id).is_some_and(Node::is_deletable))
                .collect();
            let mut stack: Vec<&str> = doomed.iter().copied().collect();
            while let Some(id) = stack.pop() {
                for child in state.parent_lookup.get(id).into_iter().flatten() {
                    if doomed.insert(child.as_str()) {
                        stack.push(child.as_str());
                    }
                }
            }
            let edge_ids: HashSet<&str> = edge_ids.into_iter().collect();
            let nodes: Vec<Node> = state.nodes.iter().filter(|n| doomed.contains(n.id.as_str())).cloned().collect();
            let edges: Vec<Edge> = state
                .edges
                .iter()
                .filter(|e| e.is_deletable())
                .filter(|e| {
                    edge_ids.contains(e.id.as_str())
                        || doomed.contains(e.source.as_str())
                        || doomed.contains(e.target.as_str())
                })
                .cloned()
                .collect();
            (nodes, edges)
        };

        self.trigger_edge_changes(edges.iter().map(|e| Change::Remove { id: e.id.clone() }).collect());
        self.trigger_node_changes(nodes.iter().map(|n| Change::Remove { id: n.id.clone() }).collect());
        (nodes, edges)
    }

    /// Pull sizes and handle bounds for `ids` from `source`.
    ///
    /// Nodes the source cannot measure are skipped.
    pub fn update_node_internals<'a>(&self, source: &dyn MeasurementSource, ids: impl IntoIterator<Item = &'a str>) {
        let mut handles = Vec::new();
        let mut changes = Vec::new();
        for id in ids {
            let Some(node) = self.node(id) else {
                self.report(&FlowError::NodeNotFound(id.to_owned()));
                continue;
            };
            let Some(measurement) = source.measure_node(id) else {
                tracing::debug!(id, "node has no measurable element");
                continue;
            };
            if node.measured != Some(measurement.dimensions) {
                changes.push(Change::Dimensions {
                    id: id.to_owned(),
                    dimensions: Some(measurement.dimensions),
                    set_attributes: false,
                });
            }
            handles.push((id.to_owned(), measurement.handles));
        }
        if !handles.is_empty() {
            self.set_state(StatePatch { handles: Some(handles), ..Default::default() });
        }
        self.trigger_node_changes(changes);
    }

    // === Selection ===

    /// Make exactly `ids` the selected nodes and deselect all edges.
    pub fn select_nodes<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let nodes = ids.into_iter().map(str::to_owned).collect();
        self.apply_selection(nodes, BTreeSet::new());
    }

    pub fn add_selected_nodes<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let (mut nodes, edges) = self.current_selection();
        nodes.extend(ids.into_iter().map(str::to_owned));
        self.apply_selection(nodes, edges);
    }

    /// Make exactly `ids` the selected edges and deselect all nodes.
    pub fn select_edges<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let edges = ids.into_iter().map(str::to_owned).collect();
        self.apply_selection(BTreeSet::new(), edges);
    }

    pub fn add_selected_edges<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let (nodes, mut edges) = self.current_selection();
        edges.extend(ids.into_iter().map(str::to_owned));
        self.apply_selection(nodes, edges);
    }

    pub fn clear_selection(&self) {
        self.apply_selection(BTreeSet::new(), BTreeSet::new());
    }

    /// Click on a node: `multi` toggles it, a plain click makes it the only selection.
    pub fn select_node_interaction(&self, id: &str, multi: bool) {
        let (mut nodes, edges) = self.current_selection();
        let mut selection = SelectionManager::new();
        selection.replace_selection(nodes.iter().map(String::as_str));
        selection.handle_interaction(id, multi);
        nodes = selection.iter().map(str::to_owned).collect();
        self.apply_selection(nodes, if multi { edges } else { BTreeSet::new() });
    }

    /// Click on an edge, same rules as [`select_node_interaction`](Self::select_node_interaction).
    pub fn select_edge_interaction(&self, id: &str, multi: bool) {
        let (nodes, edges) = self.current_selection();
        let mut selection = SelectionManager::new();
        selection.replace_selection(edges.iter().map(String::as_str));
        selection.handle_interaction(id, multi);
        let edges = selection.iter().map(str::to_owned).collect();
        self.apply_selection(if multi { nodes } else { BTreeSet::new() }, edges);
    }

    /// Box selection: nodes inside `rect` (flow space) plus the edges touching them.
    pub fn select_in_rect(&self, rect: &Rect, partially: bool, multi: bool) {
        let (mut nodes, mut edges) = if multi { self.current_selection() } else { Default::default() };
        {
            let state = self.get_state();
            let inside: HashSet<&str> = state
                .intersecting_nodes(rect, partially)
                .into_iter()
                .map(|n| n.id.as_str())
                .collect();
            nodes.extend(inside.iter().map(|id| (*id).to_owned()));
            edges.extend(
                crate::graph::get_connected_edges(&inside, &state.edges)
                    .into_iter()
                    .map(|e| e.id.clone()),
            );
        }
        self.apply_selection(nodes, edges);
    }

    fn current_selection(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let state = self.get_state();
        (
            state.selected_nodes.iter().map(str::to_owned).collect(),
            state.selected_edges.iter().map(str::to_owned).collect(),
        )
    }

    /// Select exactly `node_ids`/`edge_ids` (unselectable ones are dropped),
    /// flags and sets together in one update.
    fn apply_selection(&self, mut node_ids: BTreeSet<String>, mut edge_ids: BTreeSet<String>) {
        let (node_changes, edge_changes, patch) = {
            let state = self.get_state();
            let selectable = state.config.elements_selectable;
            node_ids.retain(|id| state.node(id).is_some_and(|n| n.is_selectable(selectable)));
            edge_ids.retain(|id| state.edge(id).is_some_and(|e| e.is_selectable(selectable)));

            let node_changes = changes::selection_changes(&state.nodes, node_ids.iter().map(String::as_str));
            let edge_changes = changes::selection_changes(&state.edges, edge_ids.iter().map(String::as_str));
            let mut patch = StatePatch::default();
            if state.config.has_default_nodes && !node_changes.is_empty() {
                patch.nodes = Some(changes::apply_node_changes(&node_changes, &state.nodes));
            }
            if state.config.has_default_edges && !edge_changes.is_empty() {
                patch.edges = Some(changes::apply_edge_changes(&edge_changes, &state.edges));
            }
            (node_changes, edge_changes, patch)
        };
        if node_changes.is_empty() && edge_changes.is_empty() {
            return;
        }

        self.set_state(patch);
        let events = self.events();
        events.nodes_change(&node_changes);
        events.edges_change(&edge_changes);
        events.selection_change(&SelectionChange {
            nodes: node_ids.into_iter().collect(),
            edges: edge_ids.into_iter().collect(),
        });
    }
}
