//! Error taxonomy for the flow engine.
//!
//! Most problems are *reported*, not propagated: the store hands them to the
//! `on_error` sink (see [`FlowEvents`](crate::events::FlowEvents)) together with
//! a stable [`ErrorCode`] and carries on with a safe fallback. Only building a
//! store from an invalid configuration is fatal.

use std::fmt;
use thiserror::Error;

/// Stable identifiers handed to `on_error(code, message)`.
///
/// The numeric strings are part of the public contract; hosts match on them to
/// filter or translate diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingStore,
    NodeTypeNotFound,
    ParentExtentWithoutParent,
    EdgeMissingEndpoint,
    ReconnectMissingEdge,
    EdgeHandleNotFound,
    HandleWithoutNode,
    EdgeTypeNotFound,
    NodeNotFound,
    NodeNotInitialized,
    CyclicParent,
    ParentNotFound,
    DanglingEdge,
    InvalidConfig,
    EdgeNotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingStore => "001",
            Self::NodeTypeNotFound => "003",
            Self::ParentExtentWithoutParent => "005",
            Self::EdgeMissingEndpoint => "006",
            Self::ReconnectMissingEdge => "007",
            Self::EdgeHandleNotFound => "008",
            Self::HandleWithoutNode => "010",
            Self::EdgeTypeNotFound => "011",
            Self::NodeNotFound => "012",
            Self::NodeNotInitialized => "015",
            Self::CyclicParent => "016",
            Self::ParentNotFound => "017",
            Self::DanglingEdge => "018",
            Self::InvalidConfig => "019",
            Self::EdgeNotFound => "020",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the engine can detect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("no flow store is attached to this controller")]
    MissingStore,
    #[error("node type \"{0}\" not found, using fallback type \"default\"")]
    NodeTypeNotFound(String),
    #[error("edge type \"{0}\" not found, using fallback type \"default\"")]
    EdgeTypeNotFound(String),
    #[error("node \"{0}\" uses a parent extent but has no parent")]
    ParentExtentWithoutParent(String),
    #[error("can't create edge, an edge needs a source and a target")]
    EdgeMissingEndpoint,
    #[error("the old edge with id={0} does not exist")]
    ReconnectMissingEdge(String),
    #[error("couldn't find {handle_type} handle \"{handle_id}\" for edge \"{edge_id}\"")]
    EdgeHandleNotFound {
        edge_id: String,
        handle_type: String,
        handle_id: String,
    },
    #[error("handle has no node id")]
    HandleWithoutNode,
    #[error("node with id \"{0}\" does not exist, it may have been removed")]
    NodeNotFound(String),
    #[error("node \"{0}\" has not been measured yet and can't be dragged")]
    NodeNotInitialized(String),
    #[error("parent chain of node \"{0}\" contains a cycle")]
    CyclicParent(String),
    #[error("parent \"{parent_id}\" of node \"{node_id}\" does not exist")]
    ParentNotFound { node_id: String, parent_id: String },
    #[error("edge \"{edge_id}\" references missing node \"{node_id}\"")]
    DanglingEdge { edge_id: String, node_id: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("edge with id \"{0}\" does not exist, it may have been removed")]
    EdgeNotFound(String),
}

impl FlowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingStore => ErrorCode::MissingStore,
            Self::NodeTypeNotFound(_) => ErrorCode::NodeTypeNotFound,
            Self::EdgeTypeNotFound(_) => ErrorCode::EdgeTypeNotFound,
            Self::ParentExtentWithoutParent(_) => ErrorCode::ParentExtentWithoutParent,
            Self::EdgeMissingEndpoint => ErrorCode::EdgeMissingEndpoint,
            Self::ReconnectMissingEdge(_) => ErrorCode::ReconnectMissingEdge,
            Self::EdgeHandleNotFound { .. } => ErrorCode::EdgeHandleNotFound,
            Self::HandleWithoutNode => ErrorCode::HandleWithoutNode,
            Self::NodeNotFound(_) => ErrorCode::NodeNotFound,
            Self::NodeNotInitialized(_) => ErrorCode::NodeNotInitialized,
            Self::CyclicParent(_) => ErrorCode::CyclicParent,
            Self::ParentNotFound { .. } => ErrorCode::ParentNotFound,
            Self::DanglingEdge { .. } => ErrorCode::DanglingEdge,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::EdgeNotFound(_) => ErrorCode::EdgeNotFound,
        }
    }
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;
