//! # Slint Flow
//!
//! A headless interaction and state engine for node-based flow editors:
//! data flow diagrams, pipelines, state machines and any other interface made
//! of draggable nodes joined by edges.
//!
//! The crate owns the model (nodes, edges, handles, viewport, selection) and
//! the gestures that change it. Drawing is left to the UI; the [`models`]
//! module mirrors the state into Slint `VecModel`s.
//!
//! ## Features
//!
//! - **Single store** - One [`FlowStore`] per flow with synchronous, ordered notifications
//! - **Change-driven** - Every edit is a [`Change`] record, appliable by the host with [`apply_node_changes`]
//! - **Explicit gestures** - Drag, connect, pan and box-select never overlap ([`GestureState`])
//! - **Validated connections** - Pluggable [`ConnectionValidator`]s plus strict/loose handle rules
//! - **Reported, not fatal** - Problems reach the `on_error` sink with a stable [`ErrorCode`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use slint_flow::{FlowConfig, FlowController, Node, StatePatch, XYPosition};
//!
//! let ctrl = FlowController::with_config(FlowConfig::default())?;
//! ctrl.store().set_state(StatePatch::nodes(vec![
//!     Node::new("1", XYPosition::new(0.0, 0.0)),
//!     Node::new("2", XYPosition::new(300.0, 0.0)),
//! ]));
//! window.on_node_pressed(ctrl.node_pressed_callback());
//! ```
//!
//! ## Modules
//!
//! - [`store`] - Flow state, derived lookups and the subscription contract
//! - [`changes`] - Change records, diffing and applying them
//! - [`connection`] - Connection state machine (drag and click to connect)
//! - [`drag`] - Node dragging with thresholds, snapping, extents and parent expansion
//! - [`viewport`] - Pan, zoom and coalesced `fit_view`
//! - [`controller`] - Routes raw input to the engines
//! - [`measure`] - Size and handle measurement
//! - [`registry`] - Node and edge type registries

pub mod changes;
pub mod config;
pub mod connection;
pub mod controller;
pub mod drag;
pub mod error;
pub mod events;
pub mod geometry;
pub mod graph;
pub mod measure;
pub mod models;
pub mod registry;
pub mod selection;
pub mod store;
pub mod viewport;

pub use changes::{apply, apply_edge_changes, apply_node_changes, diff, Change, EdgeChange, FlowItem, NodeChange};
pub use config::{ConnectionMode, FlowConfig};
pub use connection::{ConnectionEngine, ConnectionInProgress, ConnectionState, HandleRef};
pub use controller::{FlowController, GestureState, Key, Modifiers, PointerTarget};
pub use drag::{DragEngine, DragRelease};
pub use error::{ErrorCode, FlowError, Result};
pub use events::{ConnectStart, FlowEvents, SelectionChange};
pub use geometry::{CoordinateExtent, Dimensions, Position, Rect, Transform, XYPosition};
pub use graph::{
    Connection, Edge, EdgeId, Handle, HandleType, Node, NodeExtent, NodeId,
    // Connection validation framework
    BasicConnectionValidator, CompositeValidator, ConnectionValidator, NoDuplicatesValidator,
    PredicateValidator, ValidationError, ValidationResult,
};
pub use measure::{MeasurementCache, MeasurementSource, NodeMeasurement};
pub use models::ModelBridge;
pub use registry::{EdgeTypeRegistry, NodeTypeRegistry};
pub use selection::SelectionManager;
pub use store::{FlowSnapshot, FlowState, FlowStore, StatePatch, Unsubscribe, WeakFlowStore};
pub use viewport::{FitViewHandle, FitViewOptions, ViewportController};
