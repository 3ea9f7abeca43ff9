//! Node and edge type registries.
//!
//! The engine only resolves type names; drawing is the renderer's business.
//! Unknown names fall back to `"default"` and the fallback is reported through
//! `on_error`.

use crate::error::FlowError;
use crate::events::FlowEvents;
use crate::geometry::{XYPosition, Dimensions};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const DEFAULT_TYPE: &str = "default";

/// What a node renderer gets to draw one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeProps<'a> {
    pub id: &'a str,
    pub node_type: &'a str,
    pub data: &'a serde_json::Value,
    pub position_absolute: XYPosition,
    pub dimensions: Dimensions,
    pub z: i32,
    pub selected: bool,
    pub dragging: bool,
    pub connectable: bool,
}

/// What an edge renderer gets to draw one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeProps<'a> {
    pub id: &'a str,
    pub edge_type: &'a str,
    pub data: &'a serde_json::Value,
    pub source: XYPosition,
    pub target: XYPosition,
    pub selected: bool,
    pub animated: bool,
}

pub trait NodeRenderer {
    fn render(&self, props: &NodeProps<'_>);
}

pub trait EdgeRenderer {
    fn render(&self, props: &EdgeProps<'_>);
}

/// Placeholder for the built-in types; the UI layer draws them.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl NodeRenderer for BuiltinRenderer {
    fn render(&self, _props: &NodeProps<'_>) {}
}

impl EdgeRenderer for BuiltinRenderer {
    fn render(&self, _props: &EdgeProps<'_>) {}
}

/// Closed map from type name to renderer with a guaranteed `"default"` entry.
pub struct TypeRegistry<R: ?Sized> {
    entries: BTreeMap<String, Rc<R>>,
    builtin: Rc<R>,
}

impl<R: ?Sized> Clone for TypeRegistry<R> {
    fn clone(&self) -> Self {
        Self { entries: self.entries.clone(), builtin: self.builtin.clone() }
    }
}

pub type NodeTypeRegistry = TypeRegistry<dyn NodeRenderer>;
pub type EdgeTypeRegistry = TypeRegistry<dyn EdgeRenderer>;

impl<R: ?Sized> TypeRegistry<R> {
    fn with_builtins(names: &[&str], builtin: Rc<R>) -> Self {
        let entries = names
            .iter()
            .map(|name| ((*name).to_owned(), builtin.clone()))
            .collect();
        Self { entries, builtin }
    }

    pub fn register(&mut self, name: impl Into<String>, renderer: Rc<R>) {
        self.entries.insert(name.into(), renderer);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    fn lookup(&self, name: Option<&str>) -> Result<(&str, &Rc<R>), String> {
        let wanted = name.unwrap_or(DEFAULT_TYPE);
        match self.entries.get_key_value(wanted) {
            Some((key, renderer)) => Ok((key.as_str(), renderer)),
            None => Err(wanted.to_owned()),
        }
    }

    fn fallback(&self) -> (&str, &Rc<R>) {
        (DEFAULT_TYPE, self.entries.get(DEFAULT_TYPE).unwrap_or(&self.builtin))
    }
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        let builtin: Rc<dyn NodeRenderer> = Rc::new(BuiltinRenderer);
        Self::with_builtins(&[DEFAULT_TYPE, "input", "output", "group"], builtin)
    }

    /// Resolve a node type, reporting (and falling back to `"default"`) when unknown.
    pub fn resolve(&self, name: Option<&str>, events: &FlowEvents) -> (&str, &Rc<dyn NodeRenderer>) {
        self.lookup(name).unwrap_or_else(|missing| {
            events.error(&FlowError::NodeTypeNotFound(missing));
            self.fallback()
        })
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeTypeRegistry {
    pub fn new() -> Self {
        let builtin: Rc<dyn EdgeRenderer> = Rc::new(BuiltinRenderer);
        Self::with_builtins(
            &[DEFAULT_TYPE, "straight", "step", "smoothstep", "simplebezier"],
            builtin,
        )
    }

    /// Resolve an edge type, reporting (and falling back to `"default"`) when unknown.
    pub fn resolve(&self, name: Option<&str>, events: &FlowEvents) -> (&str, &Rc<dyn EdgeRenderer>) {
        self.lookup(name).unwrap_or_else(|missing| {
            events.error(&FlowError::EdgeTypeNotFound(missing));
            self.fallback()
        })
    }
}

impl Default for EdgeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
