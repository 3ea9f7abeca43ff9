//! Handle-to-handle connection gestures.
//!
//! Two independent state machines share one [`ConnectionEngine`]:
//!
//! - **drag**: pointer-down on a handle ([`start`](ConnectionEngine::start)),
//!   moves ([`update`](ConnectionEngine::update)) snap to the nearest
//!   compatible handle within `connection_radius`, pointer-up
//!   ([`end`](ConnectionEngine::end)) connects if the candidate is valid;
//! - **click**: a first [`click`](ConnectionEngine::click) on a handle arms
//!   it, a second one on another handle completes the connection.
//!
//! The drag state lives in `FlowState::connection`, the click state in
//! `FlowState::connection_click_start`; neither touches the other.

use crate::config::ConnectionMode;
use crate::error::FlowError;
use crate::events::ConnectStart;
use crate::geometry::{Position, XYPosition};
use crate::graph::{
    Connection, Edge, Handle, HandleType, NodeId, ValidationError, ValidationResult,
};
use crate::store::{FlowState, FlowStore, InternalNode, StatePatch};

/// Drag-to-connect state, one per flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionState {
    #[default]
    None,
    InProgress(ConnectionInProgress),
}

impl ConnectionState {
    pub fn in_progress(&self) -> bool {
        matches!(self, ConnectionState::InProgress(_))
    }

    pub fn as_in_progress(&self) -> Option<&ConnectionInProgress> {
        match self {
            ConnectionState::InProgress(progress) => Some(progress),
            ConnectionState::None => None,
        }
    }
}

/// A connection being dragged. Points are absolute flow coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInProgress {
    pub from: XYPosition,
    pub from_handle: Handle,
    pub from_position: Position,
    pub from_node: NodeId,
    /// Candidate handle anchor, or the pointer when there is no candidate.
    pub to: XYPosition,
    pub to_handle: Option<Handle>,
    pub to_position: Option<Position>,
    pub to_node: Option<NodeId>,
    /// `None`: no candidate in range. `Some(false)`: candidate rejected.
    pub is_valid: Option<bool>,
}

/// A handle as the UI names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleRef {
    pub node_id: NodeId,
    pub handle_id: Option<String>,
    pub handle_type: HandleType,
}

impl HandleRef {
    pub fn new(node_id: impl Into<NodeId>, handle_id: Option<&str>, handle_type: HandleType) -> Self {
        Self { node_id: node_id.into(), handle_id: handle_id.map(str::to_owned), handle_type }
    }
}

/// The connection `from` -> `to` describes, oriented upstream to downstream.
pub fn oriented_connection(from: &Handle, to: &Handle) -> Connection {
    let (source, target) = match from.handle_type {
        HandleType::Source => (from, to),
        HandleType::Target => (to, from),
    };
    Connection {
        source: source.node_id.clone(),
        target: target.node_id.clone(),
        source_handle: source.id.clone(),
        target_handle: target.id.clone(),
    }
}

/// Whether `mode` allows pairing `from` with `to`.
pub fn handles_compatible(mode: ConnectionMode, from: &Handle, to: &Handle) -> ValidationResult {
    match mode {
        ConnectionMode::Strict if from.handle_type == to.handle_type => {
            ValidationResult::Invalid(ValidationError::IncompatibleHandleType)
        }
        ConnectionMode::Loose if from.same_handle(to) => ValidationResult::Invalid(ValidationError::SameHandle),
        _ => ValidationResult::Valid,
    }
}

/// Nearest handle to `pointer` within `radius`, skipping `from`'s own node and
/// handles `mode` does not allow. Nodes are visited in array order and
/// handles in measured order; on equal distance the first one wins.
pub fn closest_handle<'a>(
    state: &'a FlowState,
    pointer: XYPosition,
    from: &Handle,
    radius: f32,
    mode: ConnectionMode,
) -> Option<(&'a InternalNode, &'a Handle)> {
    let mut best: Option<(&InternalNode, &Handle, f32)> = None;
    for node in state.nodes.iter().filter_map(|n| state.node_lookup.get(&n.id)) {
        if node.node.id == from.node_id || node.node.hidden {
            continue;
        }
        for handle in &node.handles {
            if !handles_compatible(mode, from, handle).is_valid() {
                continue;
            }
            let distance = handle.absolute_rect(node.position_absolute).center().distance(pointer);
            if distance > radius {
                continue;
            }
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((node, handle, distance));
            }
        }
    }
    best.map(|(node, handle, _)| (node, handle))
}

/// Handle whose bounds contain `pointer` (any type), skipping `from`'s own node.
fn handle_under_pointer<'a>(
    state: &'a FlowState,
    pointer: XYPosition,
    from: &Handle,
) -> Option<(&'a InternalNode, &'a Handle)> {
    state
        .nodes
        .iter()
        .filter_map(|n| state.node_lookup.get(&n.id))
        .filter(|n| n.node.id != from.node_id && !n.node.hidden)
        .flat_map(|n| n.handles.iter().map(move |h| (n, h)))
        .find(|(n, h)| h.absolute_rect(n.position_absolute).contains(pointer))
}

/// Drives both connection state machines against a [`FlowStore`].
#[derive(Clone)]
pub struct ConnectionEngine {
    store: FlowStore,
}

impl ConnectionEngine {
    pub fn new(store: FlowStore) -> Self {
        Self { store }
    }

    pub fn state(&self) -> ConnectionState {
        self.store.get_state().connection.clone()
    }

    /// Resolve a UI handle reference, reporting why it can't be used.
    fn resolve(&self, handle: &HandleRef) -> Option<(Handle, XYPosition)> {
        if handle.node_id.is_empty() {
            self.store.report(&FlowError::HandleWithoutNode);
            return None;
        }
        let resolved = {
            let state = self.store.get_state();
            match state.internal_node(&handle.node_id) {
                None => Err(FlowError::NodeNotFound(handle.node_id.clone())),
                Some(node) if !node.node.is_connectable(state.config.nodes_connectable) => Ok(None),
                Some(node) => Ok(node
                    .handle(handle.handle_id.as_deref(), handle.handle_type)
                    .map(|h| (h.clone(), node.position_absolute))),
            }
        };
        match resolved {
            Ok(Some(found)) => Some(found),
            Ok(None) => {
                tracing::debug!(node = %handle.node_id, "handle is not connectable or not measured");
                None
            }
            Err(err) => {
                self.store.report(&err);
                None
            }
        }
    }

    /// Check `from` -> `to` against the mode, the target's connectability and
    /// the user validator.
    fn evaluate(&self, state: &FlowState, from: &Handle, to: &Handle) -> (ValidationResult, Connection) {
        let connection = oriented_connection(from, to);
        let result = handles_compatible(state.config.connection_mode, from, to);
        if !result.is_valid() {
            return (result, connection);
        }
        let node_connectable = state
            .node(&to.node_id)
            .is_some_and(|n| n.is_connectable(state.config.nodes_connectable));
        if !to.connectable_end || !node_connectable {
            return (ValidationResult::Invalid(ValidationError::NotConnectable(to.node_id.clone())), connection);
        }
        let result = match self.store.connection_validator() {
            Some(validator) => validator.validate(&connection, &state.edges),
            None => ValidationResult::Valid,
        };
        (result, connection)
    }

    /// Validate a finished connection against the handles the nodes actually have.
    pub fn is_valid_connection(&self, connection: &Connection) -> ValidationResult {
        let state = self.store.get_state();
        let find = |node_id: &str, handle_id: Option<&str>, handle_type: HandleType| {
            let node = state.internal_node(node_id)?;
            let handle = match state.config.connection_mode {
                ConnectionMode::Strict => node.handle(handle_id, handle_type),
                ConnectionMode::Loose => node
                    .handle(handle_id, handle_type)
                    .or_else(|| node.handle(handle_id, handle_type.opposite())),
            };
            handle.cloned()
        };
        let Some(source) = find(&connection.source, connection.source_handle.as_deref(), HandleType::Source) else {
            return ValidationResult::Invalid(ValidationError::HandleNotFound {
                node_id: connection.source.clone(),
                handle_type: HandleType::Source,
            });
        };
        let Some(target) = find(&connection.target, connection.target_handle.as_deref(), HandleType::Target) else {
            return ValidationResult::Invalid(ValidationError::HandleNotFound {
                node_id: connection.target.clone(),
                handle_type: HandleType::Target,
            });
        };
        if !source.connectable_start {
            return ValidationResult::Invalid(ValidationError::NotConnectable(source.node_id));
        }
        self.evaluate(&state, &source, &target).0
    }

    // === Drag to connect ===

    /// Pointer-down on a handle. `pointer` is in flow space.
    pub fn start(&self, handle: &HandleRef, pointer: XYPosition) -> bool {
        if self.store.get_state().connection.in_progress() {
            return false;
        }
        let Some((from_handle, node_position)) = self.resolve(handle) else {
            return false;
        };
        if !from_handle.connectable_start {
            return false;
        }

        let from = from_handle.anchor(node_position);
        let start = ConnectStart {
            node_id: from_handle.node_id.clone(),
            handle_id: from_handle.id.clone(),
            handle_type: from_handle.handle_type,
        };
        self.store.set_state(StatePatch::connection(ConnectionState::InProgress(ConnectionInProgress {
            from,
            from_position: from_handle.position,
            from_node: from_handle.node_id.clone(),
            from_handle,
            to: pointer,
            to_handle: None,
            to_position: None,
            to_node: None,
            is_valid: None,
        })));
        tracing::trace!(node = %start.node_id, "connection started");
        self.store.events().connect_start(&start);
        true
    }

    /// Pointer moved to `pointer` (flow space). Returns the new `is_valid`.
    pub fn update(&self, pointer: XYPosition) -> Option<bool> {
        let next = {
            let state = self.store.get_state();
            let progress = state.connection.as_in_progress()?;
            let from = &progress.from_handle;
            let candidate = handle_under_pointer(&state, pointer, from).or_else(|| {
                closest_handle(&state, pointer, from, state.config.connection_radius, state.config.connection_mode)
            });

            let mut next = progress.clone();
            match candidate {
                Some((node, handle)) => {
                    let (result, _) = self.evaluate(&state, from, handle);
                    next.to = handle.anchor(node.position_absolute);
                    next.to_position = Some(handle.position);
                    next.to_node = Some(node.node.id.clone());
                    next.to_handle = Some(handle.clone());
                    next.is_valid = Some(result.is_valid());
                }
                None => {
                    next.to = pointer;
                    next.to_handle = None;
                    next.to_position = None;
                    next.to_node = None;
                    next.is_valid = None;
                }
            }
            next
        };
        let is_valid = next.is_valid;
        tracing::trace!(?is_valid, "connection moved");
        self.store.set_state(StatePatch::connection(ConnectionState::InProgress(next)));
        is_valid
    }

    /// Pointer-up: connect if the current candidate is valid, then reset.
    pub fn end(&self) -> Option<Connection> {
        let current = self.store.get_state().connection.clone();
        let ConnectionState::InProgress(progress) = current else {
            return None;
        };
        let connection = match (&progress.to_handle, progress.is_valid) {
            (Some(to), Some(true)) => Some(oriented_connection(&progress.from_handle, to)),
            _ => None,
        };
        self.store.set_state(StatePatch::connection(ConnectionState::None));
        if let Some(connection) = &connection {
            self.connect(connection);
        }
        self.store.events().connect_end(connection.as_ref());
        connection
    }

    /// Abort a drag-to-connect gesture (e.g. Escape).
    pub fn cancel(&self) -> bool {
        if !self.store.get_state().connection.in_progress() {
            return false;
        }
        self.store.set_state(StatePatch::connection(ConnectionState::None));
        self.store.events().connect_end(None);
        true
    }

    fn connect(&self, connection: &Connection) {
        self.store.events().connect(connection);
        if self.store.get_state().config.has_default_edges {
            self.store.add_edges(vec![Edge::from_connection(connection)]);
        }
    }

    // === Click to connect ===

    pub fn click_start(&self) -> Option<Handle> {
        self.store.get_state().connection_click_start.clone()
    }

    /// Click on a handle: arms it, or completes/abandons an armed connection.
    pub fn click(&self, handle: &HandleRef) -> Option<Connection> {
        let Some(from) = self.click_start() else {
            let (from, _) = self.resolve(handle)?;
            if !from.connectable_start {
                return None;
            }
            let start = ConnectStart {
                node_id: from.node_id.clone(),
                handle_id: from.id.clone(),
                handle_type: from.handle_type,
            };
            self.store.set_state(StatePatch { connection_click_start: Some(Some(from)), ..Default::default() });
            self.store.events().click_connect_start(&start);
            return None;
        };

        let connection = self.resolve(handle).and_then(|(to, _)| {
            if from.same_handle(&to) {
                return None;
            }
            let (result, connection) = {
                let state = self.store.get_state();
                self.evaluate(&state, &from, &to)
            };
            result.is_valid().then_some(connection)
        });

        self.store.set_state(StatePatch { connection_click_start: Some(None), ..Default::default() });
        if let Some(connection) = &connection {
            self.connect(connection);
        }
        self.store.events().click_connect_end(connection.as_ref());
        connection
    }

    pub fn cancel_click(&self) -> bool {
        if self.click_start().is_none() {
            return false;
        }
        self.store.set_state(StatePatch { connection_click_start: Some(None), ..Default::default() });
        self.store.events().click_connect_end(None);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::error::ErrorCode;
    use crate::geometry::Rect;
    use crate::graph::{CompositeValidator, Node, PredicateValidator};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn source_handle(node: &str, id: Option<&str>) -> Handle {
        Handle::new(node, id, HandleType::Source, Position::Right, Rect::new(145.0, 15.0, 10.0, 10.0))
    }

    fn target_handle(node: &str, id: Option<&str>) -> Handle {
        Handle::new(node, id, HandleType::Target, Position::Left, Rect::new(-5.0, 15.0, 10.0, 10.0))
    }

    /// Node 1 at (0,0) with a source handle, node 2 at (300,0) with a target handle.
    fn setup(config: FlowConfig) -> (FlowStore, ConnectionEngine) {
        let store = FlowStore::new(config).unwrap();
        store.set_nodes(vec![
            Node::new("1", XYPosition::new(0.0, 0.0)).with_size(150.0, 40.0),
            Node::new("2", XYPosition::new(300.0, 0.0)).with_size(150.0, 40.0),
        ]);
        store.set_state(StatePatch {
            handles: Some(vec![
                ("1".into(), vec![source_handle("1", None)]),
                ("2".into(), vec![target_handle("2", None)]),
            ]),
            ..Default::default()
        });
        let engine = ConnectionEngine::new(store.clone());
        (store, engine)
    }

    fn src(node: &str) -> HandleRef {
        HandleRef::new(node, None, HandleType::Source)
    }

    fn tgt(node: &str) -> HandleRef {
        HandleRef::new(node, None, HandleType::Target)
    }

    // ========================================================================
    // Drag to connect
    // ========================================================================

    #[test]
    fn test_start_captures_from_anchor() {
        let (_, engine) = setup(FlowConfig::default());
        assert!(engine.start(&src("1"), XYPosition::new(150.0, 20.0)));
        let state = engine.state();
        let progress = state.as_in_progress().unwrap();
        assert_eq!(progress.from, XYPosition::new(155.0, 20.0));
        assert_eq!(progress.from_node, "1");
        assert_eq!(progress.is_valid, None);
    }

    #[test]
    fn test_snaps_to_nearest_compatible_handle() {
        let (_, engine) = setup(FlowConfig::default());
        engine.start(&src("1"), XYPosition::new(150.0, 20.0));

        assert_eq!(engine.update(XYPosition::new(290.0, 22.0)), Some(true));
        let state = engine.state();
        let progress = state.as_in_progress().unwrap();
        assert_eq!(progress.to, XYPosition::new(295.0, 20.0));
        assert_eq!(progress.to_node.as_deref(), Some("2"));
        assert_eq!(progress.to_position, Some(Position::Left));
    }

    #[test]
    fn test_out_of_range_is_null_not_false() {
        let (_, engine) = setup(FlowConfig::default());
        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        assert_eq!(engine.update(XYPosition::new(200.0, 200.0)), None);
        let state = engine.state();
        assert_eq!(state.as_in_progress().unwrap().to, XYPosition::new(200.0, 200.0));
    }

    #[test]
    fn test_own_node_handle_under_pointer_is_not_a_candidate() {
        let (store, engine) = setup(FlowConfig::default());
        store.set_state(StatePatch {
            handles: Some(vec![("1".into(), vec![source_handle("1", None), target_handle("1", None)])]),
            ..Default::default()
        });

        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        // directly over node 1's own target handle
        assert_eq!(engine.update(XYPosition::new(0.0, 20.0)), None);
        let state = engine.state();
        assert_eq!(state.as_in_progress().unwrap().to_node, None);

        assert_eq!(engine.end(), None);
        assert!(store.edges().is_empty());
    }

    #[test]
    fn test_end_connects_and_adds_edge() {
        let (store, engine) = setup(FlowConfig::default());
        let connected = Rc::new(RefCell::new(Vec::new()));
        store.update_events(|e| {
            let connected = connected.clone();
            e.on_connect(move |c| connected.borrow_mut().push(c.clone()));
        });

        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        engine.update(XYPosition::new(300.0, 20.0));
        let connection = engine.end().unwrap();

        assert_eq!(connection, Connection::new("1", "2"));
        assert_eq!(*connected.borrow(), vec![Connection::new("1", "2")]);
        assert_eq!(store.edges()[0].id, "xy-edge__1-2");
        assert!(!engine.state().in_progress());
    }

    #[test]
    fn test_starting_from_target_orients_connection() {
        let (_, engine) = setup(FlowConfig::default());
        engine.start(&tgt("2"), XYPosition::new(300.0, 20.0));
        assert_eq!(engine.update(XYPosition::new(150.0, 20.0)), Some(true));
        assert_eq!(engine.end(), Some(Connection::new("1", "2")));
    }

    #[test]
    fn test_strict_mode_ignores_same_type_in_radius() {
        let (store, engine) = setup(FlowConfig::default());
        store.add_nodes(vec![Node::new("3", XYPosition::new(0.0, 100.0)).with_size(150.0, 40.0)]);
        store.set_state(StatePatch {
            handles: Some(vec![("3".into(), vec![source_handle("3", None)])]),
            ..Default::default()
        });

        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        // near node 3's source handle center (150, 120) but not on it
        assert_eq!(engine.update(XYPosition::new(150.0, 132.0)), None);
        // directly over it: a candidate, but an invalid one
        assert_eq!(engine.update(XYPosition::new(150.0, 120.0)), Some(false));
        assert_eq!(engine.end(), None);
        assert!(store.edges().is_empty());
    }

    #[test]
    fn test_loose_mode_accepts_same_type() {
        let config = FlowConfig { connection_mode: ConnectionMode::Loose, ..FlowConfig::default() };
        let (store, engine) = setup(config);
        store.add_nodes(vec![Node::new("3", XYPosition::new(0.0, 100.0)).with_size(150.0, 40.0)]);
        store.set_state(StatePatch {
            handles: Some(vec![("3".into(), vec![source_handle("3", None)])]),
            ..Default::default()
        });
        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        assert_eq!(engine.update(XYPosition::new(150.0, 125.0)), Some(true));
        assert_eq!(engine.end(), Some(Connection::new("1", "3")));
    }

    #[test]
    fn test_user_predicate_rejects() {
        let (store, engine) = setup(FlowConfig::default());
        store.set_connection_validator(
            CompositeValidator::new().add(PredicateValidator(|c: &Connection| c.target != "2")),
        );
        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        assert_eq!(engine.update(XYPosition::new(300.0, 20.0)), Some(false));
    }

    #[test]
    fn test_equidistant_handles_first_node_wins() {
        let (store, engine) = setup(FlowConfig::default());
        // node 4 mirrors node 2 below the pointer line; both target centers are 10 away
        store.add_nodes(vec![Node::new("4", XYPosition::new(300.0, 20.0)).with_size(150.0, 40.0)]);
        store.set_state(StatePatch {
            handles: Some(vec![("4".into(), vec![target_handle("4", None)])]),
            ..Default::default()
        });
        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        assert_eq!(engine.update(XYPosition::new(290.0, 30.0)), Some(true));
        let state = engine.state();
        assert_eq!(state.as_in_progress().unwrap().to_node.as_deref(), Some("2"));
    }

    #[test]
    fn test_cancel_emits_connect_end_without_connection() {
        let (store, engine) = setup(FlowConfig::default());
        let ends = Rc::new(RefCell::new(Vec::new()));
        store.update_events(|e| {
            let ends = ends.clone();
            e.on_connect_end(move |c| ends.borrow_mut().push(c.cloned()));
        });
        engine.start(&src("1"), XYPosition::new(150.0, 20.0));
        engine.update(XYPosition::new(300.0, 20.0));
        assert!(engine.cancel());
        assert_eq!(*ends.borrow(), vec![None]);
        assert!(store.edges().is_empty());
        assert!(!engine.cancel());
    }

    #[test]
    fn test_handle_without_node_is_reported() {
        let (store, engine) = setup(FlowConfig::default());
        let codes = Rc::new(RefCell::new(Vec::new()));
        store.update_events(|e| {
            let codes = codes.clone();
            e.on_error(move |code, _| codes.borrow_mut().push(code));
        });
        assert!(!engine.start(&src(""), XYPosition::default()));
        assert!(!engine.start(&src("9"), XYPosition::default()));
        assert_eq!(*codes.borrow(), vec![ErrorCode::HandleWithoutNode, ErrorCode::NodeNotFound]);
    }

    // ========================================================================
    // Click to connect
    // ========================================================================

    #[test]
    fn test_click_connect_two_clicks() {
        let (store, engine) = setup(FlowConfig::default());
        assert_eq!(engine.click(&src("1")), None);
        assert!(engine.click_start().is_some());
        assert!(!engine.state().in_progress());

        assert_eq!(engine.click(&tgt("2")), Some(Connection::new("1", "2")));
        assert!(engine.click_start().is_none());
        assert_eq!(store.edges().len(), 1);
    }

    #[test]
    fn test_click_same_handle_abandons() {
        let (store, engine) = setup(FlowConfig::default());
        engine.click(&src("1"));
        assert_eq!(engine.click(&src("1")), None);
        assert!(engine.click_start().is_none());
        assert!(store.edges().is_empty());
    }

    #[test]
    fn test_click_and_drag_machines_are_independent() {
        let (_, engine) = setup(FlowConfig::default());
        engine.click(&src("1"));
        assert!(engine.start(&tgt("2"), XYPosition::new(300.0, 20.0)));
        assert!(engine.cancel());
        assert!(engine.click_start().is_some());
    }

    // ========================================================================
    // is_valid_connection()
    // ========================================================================

    #[test]
    fn test_reverse_connection_without_source_handle_is_invalid() {
        let (_, engine) = setup(FlowConfig::default());
        assert!(engine.is_valid_connection(&Connection::new("1", "2")).is_valid());
        assert_eq!(
            engine.is_valid_connection(&Connection::new("2", "1")),
            ValidationResult::Invalid(ValidationError::HandleNotFound {
                node_id: "2".into(),
                handle_type: HandleType::Source,
            })
        );
    }
}
