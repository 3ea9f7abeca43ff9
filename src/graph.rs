//! Flow data model: nodes, edges, handles and connections.
//!
//! Also hosts the connection validation framework and the edge helpers
//! (`add_edge`, `reconnect_edge`, incomers/outgoers) hosts use on their own
//! copies of the edge array.

use crate::error::{FlowError, Result};
use crate::geometry::{CoordinateExtent, Dimensions, Position, Rect, XYPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub type NodeId = String;
pub type EdgeId = String;

fn is_false(value: &bool) -> bool {
    !*value
}

fn yes() -> bool {
    true
}

/// Positional clamp for a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeExtent {
    /// Keep the node inside its parent's bounds.
    Parent,
    /// Keep the node inside explicit flow-space bounds.
    #[serde(untagged)]
    Bounds(CoordinateExtent),
}

/// A node in the flow. `position` is relative to the parent when `parent_id` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub position: XYPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dragging: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<NodeExtent>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub expand_parent: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, position: XYPosition) -> Self {
        Self {
            id: id.into(),
            position,
            width: None,
            height: None,
            measured: None,
            parent_id: None,
            z_index: 0,
            selected: false,
            dragging: false,
            hidden: false,
            draggable: None,
            selectable: None,
            connectable: None,
            deletable: None,
            extent: None,
            expand_parent: false,
            node_type: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_extent(mut self, extent: NodeExtent) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Explicit size wins over the measured one; unknown sides are 0.
    pub fn dimensions(&self) -> Dimensions {
        let measured = self.measured.unwrap_or_default();
        Dimensions::new(
            self.width.unwrap_or(measured.width),
            self.height.unwrap_or(measured.height),
        )
    }

    pub fn is_measured(&self) -> bool {
        let d = self.dimensions();
        d.width > 0.0 && d.height > 0.0
    }

    pub fn is_draggable(&self, default: bool) -> bool {
        self.draggable.unwrap_or(default)
    }

    pub fn is_selectable(&self, default: bool) -> bool {
        self.selectable.unwrap_or(default)
    }

    pub fn is_connectable(&self, default: bool) -> bool {
        self.connectable.unwrap_or(default)
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable.unwrap_or(true)
    }
}

/// An edge between two nodes. `None` handles mean the default, unnamed handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub animated: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Edge {
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            selected: false,
            animated: false,
            hidden: false,
            deletable: None,
            selectable: None,
            edge_type: None,
            data: serde_json::Value::Null,
        }
    }

    /// Edge with the default id derived from the connection endpoints.
    pub fn from_connection(connection: &Connection) -> Self {
        let mut edge = Edge::new(edge_id_for(connection), &connection.source, &connection.target);
        edge.source_handle = connection.source_handle.clone();
        edge.target_handle = connection.target_handle.clone();
        edge
    }

    pub fn connection(&self) -> Connection {
        Connection {
            source: self.source.clone(),
            target: self.target.clone(),
            source_handle: self.source_handle.clone(),
            target_handle: self.target_handle.clone(),
        }
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable.unwrap_or(true)
    }

    pub fn is_selectable(&self, default: bool) -> bool {
        self.selectable.unwrap_or(default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleType {
    Source,
    Target,
}

impl HandleType {
    pub fn opposite(&self) -> HandleType {
        match self {
            HandleType::Source => HandleType::Target,
            HandleType::Target => HandleType::Source,
        }
    }
}

impl fmt::Display for HandleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleType::Source => f.write_str("source"),
            HandleType::Target => f.write_str("target"),
        }
    }
}

/// Connection point on a node. Derived from measurement, never persisted.
///
/// `x`/`y` are relative to the node's top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handle {
    pub node_id: NodeId,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub handle_type: HandleType,
    pub position: Position,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "yes")]
    pub connectable_start: bool,
    #[serde(default = "yes")]
    pub connectable_end: bool,
}

impl Handle {
    pub fn new(
        node_id: impl Into<NodeId>,
        id: Option<&str>,
        handle_type: HandleType,
        position: Position,
        bounds: Rect,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            id: id.map(str::to_owned),
            handle_type,
            position,
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            connectable_start: true,
            connectable_end: true,
        }
    }

    /// Absolute bounds given the owning node's absolute position.
    pub fn absolute_rect(&self, node_position: XYPosition) -> Rect {
        Rect::new(node_position.x + self.x, node_position.y + self.y, self.width, self.height)
    }

    /// Absolute anchor point on the handle's outer side, where edges attach.
    pub fn anchor(&self, node_position: XYPosition) -> XYPosition {
        let r = self.absolute_rect(node_position);
        match self.position {
            Position::Top => XYPosition::new(r.x + r.width / 2.0, r.y),
            Position::Right => XYPosition::new(r.right(), r.y + r.height / 2.0),
            Position::Bottom => XYPosition::new(r.x + r.width / 2.0, r.bottom()),
            Position::Left => XYPosition::new(r.x, r.y + r.height / 2.0),
        }
    }

    pub fn same_handle(&self, other: &Handle) -> bool {
        self.node_id == other.node_id && self.id == other.id && self.handle_type == other.handle_type
    }
}

/// A finalized connection, always oriented upstream (`source`) to downstream (`target`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(mut self, source_handle: Option<&str>, target_handle: Option<&str>) -> Self {
        self.source_handle = source_handle.map(str::to_owned);
        self.target_handle = target_handle.map(str::to_owned);
        self
    }

    fn matches(&self, edge: &Edge) -> bool {
        edge.source == self.source
            && edge.target == self.target
            && edge.source_handle == self.source_handle
            && edge.target_handle == self.target_handle
    }
}

/// Default edge id: `xy-edge__{source}{sourceHandle}-{target}{targetHandle}`.
pub fn edge_id_for(connection: &Connection) -> EdgeId {
    format!(
        "xy-edge__{}{}-{}{}",
        connection.source,
        connection.source_handle.as_deref().unwrap_or(""),
        connection.target,
        connection.target_handle.as_deref().unwrap_or("")
    )
}

pub fn connection_exists(connection: &Connection, edges: &[Edge]) -> bool {
    edges.iter().any(|e| connection.matches(e))
}

/// Append `edge` unless an edge with the same endpoints already exists.
pub fn add_edge(edge: Edge, edges: &[Edge]) -> Result<Vec<Edge>> {
    if edge.source.is_empty() || edge.target.is_empty() {
        return Err(FlowError::EdgeMissingEndpoint);
    }
    let mut out = edges.to_vec();
    if !connection_exists(&edge.connection(), edges) {
        out.push(edge);
    }
    Ok(out)
}

/// Point an existing edge at new endpoints. The edge gets the default id for
/// its new connection.
pub fn reconnect_edge(old_edge_id: &str, connection: &Connection, edges: &[Edge]) -> Result<Vec<Edge>> {
    if connection.source.is_empty() || connection.target.is_empty() {
        return Err(FlowError::EdgeMissingEndpoint);
    }
    let old = edges
        .iter()
        .find(|e| e.id == old_edge_id)
        .ok_or_else(|| FlowError::ReconnectMissingEdge(old_edge_id.to_owned()))?;

    let mut edge = old.clone();
    edge.id = edge_id_for(connection);
    edge.source = connection.source.clone();
    edge.target = connection.target.clone();
    edge.source_handle = connection.source_handle.clone();
    edge.target_handle = connection.target_handle.clone();

    Ok(edges
        .iter()
        .filter(|e| e.id != old_edge_id)
        .cloned()
        .chain(std::iter::once(edge))
        .collect())
}

/// Edges touching any of the given nodes.
pub fn get_connected_edges<'a>(node_ids: &HashSet<&str>, edges: &'a [Edge]) -> Vec<&'a Edge> {
    edges
        .iter()
        .filter(|e| node_ids.contains(e.source.as_str()) || node_ids.contains(e.target.as_str()))
        .collect()
}

/// Nodes with an edge pointing into `node_id`.
pub fn get_incomers<'a>(node_id: &str, nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    let sources: HashSet<&str> = edges
        .iter()
        .filter(|e| e.target == node_id)
        .map(|e| e.source.as_str())
        .collect();
    nodes.iter().filter(|n| sources.contains(n.id.as_str())).collect()
}

/// Nodes `node_id` has an edge pointing to.
pub fn get_outgoers<'a>(node_id: &str, nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    let targets: HashSet<&str> = edges
        .iter()
        .filter(|e| e.source == node_id)
        .map(|e| e.target.as_str())
        .collect();
    nodes.iter().filter(|n| targets.contains(n.id.as_str())).collect()
}

// ============================================================================
// Connection Validation Framework
// ============================================================================

/// Result of connection validation with optional rejection reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Combine two results (AND logic): returns first error if any
    pub fn and(self, other: ValidationResult) -> ValidationResult {
        match self {
            ValidationResult::Valid => other,
            invalid => invalid,
        }
    }
}

/// Reasons why a connection was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Source or target is empty
    MissingEndpoint,
    /// Start and end are the exact same handle
    SameHandle,
    /// Strict mode requires a source handle on one end and a target on the other
    IncompatibleHandleType,
    /// The node or handle does not accept connections
    NotConnectable(NodeId),
    /// The node has no handle with this id and type
    HandleNotFound { node_id: NodeId, handle_type: HandleType },
    /// An edge with the same endpoints already exists
    DuplicateEdge,
    /// A user predicate rejected the connection
    Rejected,
    Custom(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEndpoint => write!(f, "Connection needs a source and a target"),
            Self::SameHandle => write!(f, "Cannot connect handle to itself"),
            Self::IncompatibleHandleType => write!(f, "Must connect a source handle to a target handle"),
            Self::NotConnectable(id) => write!(f, "Node {} is not connectable", id),
            Self::HandleNotFound { node_id, handle_type } => {
                write!(f, "Node {} has no matching {} handle", node_id, handle_type)
            }
            Self::DuplicateEdge => write!(f, "Edge already exists"),
            Self::Rejected => write!(f, "Connection rejected"),
            Self::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

/// Custom connection validation logic.
///
/// Implement this to add rules for connecting handles; compose several with
/// [`CompositeValidator`].
///
/// # Example
///
/// ```ignore
/// struct NoSelfLoops;
///
/// impl ConnectionValidator for NoSelfLoops {
///     fn validate(&self, connection: &Connection, _edges: &[Edge]) -> ValidationResult {
///         if connection.source == connection.target {
///             ValidationResult::Invalid(ValidationError::Custom("no self loops".into()))
///         } else {
///             ValidationResult::Valid
///         }
///     }
/// }
/// ```
pub trait ConnectionValidator {
    fn validate(&self, connection: &Connection, edges: &[Edge]) -> ValidationResult;
}

/// Checks endpoints are present and not the identical handle.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicConnectionValidator;

impl ConnectionValidator for BasicConnectionValidator {
    fn validate(&self, connection: &Connection, _edges: &[Edge]) -> ValidationResult {
        if connection.source.is_empty() || connection.target.is_empty() {
            return ValidationResult::Invalid(ValidationError::MissingEndpoint);
        }
        if connection.source == connection.target && connection.source_handle == connection.target_handle {
            return ValidationResult::Invalid(ValidationError::SameHandle);
        }
        ValidationResult::Valid
    }
}

/// Refuses connections that duplicate an existing edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDuplicatesValidator;

impl ConnectionValidator for NoDuplicatesValidator {
    fn validate(&self, connection: &Connection, edges: &[Edge]) -> ValidationResult {
        if connection_exists(connection, edges) {
            ValidationResult::Invalid(ValidationError::DuplicateEdge)
        } else {
            ValidationResult::Valid
        }
    }
}

/// Adapts an `is_valid_connection(connection) -> bool` closure.
pub struct PredicateValidator<F>(pub F);

impl<F> ConnectionValidator for PredicateValidator<F>
where
    F: Fn(&Connection) -> bool,
{
    fn validate(&self, connection: &Connection, _edges: &[Edge]) -> ValidationResult {
        if (self.0)(connection) {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(ValidationError::Rejected)
        }
    }
}

/// All validators must pass (AND logic); the first failure short-circuits.
#[derive(Default)]
pub struct CompositeValidator {
    validators: Vec<Box<dyn ConnectionValidator>>,
}

impl CompositeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators run in insertion order.
    pub fn add<V: ConnectionValidator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl ConnectionValidator for CompositeValidator {
    fn validate(&self, connection: &Connection, edges: &[Edge]) -> ValidationResult {
        for v in &self.validators {
            let result = v.validate(connection, edges);
            if !result.is_valid() {
                return result;
            }
        }
        ValidationResult::Valid
    }
}
