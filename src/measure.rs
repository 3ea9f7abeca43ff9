//! Node and handle measurement.
//!
//! The engine never measures anything itself. A [`MeasurementSource`] answers
//! "how big is node `id` and where are its handles"; in a Slint UI that is a
//! [`MeasurementCache`] fed by the callbacks below, in tests any double will do.
//!
//! # Example
//!
//! ```ignore
//! use slint_flow::MeasurementCache;
//!
//! let cache = MeasurementCache::new();
//!
//! // Wire up callbacks (one-time setup)
//! window.on_node_size_changed(cache.node_size_callback());
//! window.on_handle_bounds_changed(cache.handle_bounds_callback());
//!
//! // Push what was measured into the store
//! store.update_node_internals(&cache, &["1", "2"]);
//! ```

use crate::error::{FlowError, Result};
use crate::geometry::{Dimensions, Position, Rect};
use crate::graph::{Handle, HandleType, NodeId};
use slint::SharedString;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Size and handle layout of one node, handles in node-local coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeasurement {
    pub dimensions: Dimensions,
    pub handles: Vec<Handle>,
}

/// Pluggable measurement collaborator.
pub trait MeasurementSource {
    /// `None` when the node has no backing element (not rendered, or gone).
    fn measure_node(&self, node_id: &str) -> Option<NodeMeasurement>;
}

impl<F> MeasurementSource for F
where
    F: Fn(&str) -> Option<NodeMeasurement>,
{
    fn measure_node(&self, node_id: &str) -> Option<NodeMeasurement> {
        self(node_id)
    }
}

/// In-memory measurements reported by the UI.
///
/// Clone this cache to share it across callbacks; clones see the same data.
#[derive(Clone, Default)]
pub struct MeasurementCache {
    nodes: Rc<RefCell<HashMap<NodeId, NodeMeasurement>>>,
}

impl MeasurementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_node_report(&self, node_id: &str, width: f32, height: f32) {
        self.nodes
            .borrow_mut()
            .entry(node_id.to_owned())
            .or_default()
            .dimensions = Dimensions::new(width, height);
    }

    /// Record or replace one handle. Handles are keyed by `(id, type)` within
    /// their node; report order is kept for new handles.
    pub fn handle_handle_report(&self, handle: Handle) -> Result<()> {
        if handle.node_id.is_empty() {
            return Err(FlowError::HandleWithoutNode);
        }
        let mut nodes = self.nodes.borrow_mut();
        let handles = &mut nodes.entry(handle.node_id.clone()).or_default().handles;
        match handles.iter_mut().find(|h| h.same_handle(&handle)) {
            Some(slot) => *slot = handle,
            None => handles.push(handle),
        }
        Ok(())
    }

    /// Forget a node (its element was destroyed).
    pub fn remove_node(&self, node_id: &str) {
        self.nodes.borrow_mut().remove(node_id);
    }

    pub fn clear(&self) {
        self.nodes.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    // === Callback factories ===

    /// Callback for `node-size-changed(id, width, height)`.
    pub fn node_size_callback(&self) -> impl Fn(SharedString, f32, f32) + Clone {
        let cache = self.clone();
        move |id, width, height| cache.handle_node_report(id.as_str(), width, height)
    }

    /// Callback for `handle-bounds-changed(node_id, handle_id, type, position, x, y, w, h)`.
    ///
    /// An empty `handle_id` is the node's default handle. `handle_type` is 0
    /// for source and 1 for target; `position` is 0..=3 for top, right, bottom
    /// and left.
    #[allow(clippy::type_complexity)]
    pub fn handle_bounds_callback(
        &self,
    ) -> impl Fn(SharedString, SharedString, i32, i32, f32, f32, f32, f32) + Clone {
        let cache = self.clone();
        move |node_id, handle_id, handle_type, position, x, y, width, height| {
            let handle_type = if handle_type == 0 { HandleType::Source } else { HandleType::Target };
            let position = match position {
                1 => Position::Right,
                2 => Position::Bottom,
                3 => Position::Left,
                _ => Position::Top,
            };
            let id = (!handle_id.is_empty()).then_some(handle_id.as_str());
            let handle = Handle::new(node_id.as_str(), id, handle_type, position, Rect::new(x, y, width, height));
            if let Err(err) = cache.handle_handle_report(handle) {
                tracing::warn!(code = err.code().as_str(), "{err}");
            }
        }
    }
}

impl MeasurementSource for MeasurementCache {
    fn measure_node(&self, node_id: &str) -> Option<NodeMeasurement> {
        self.nodes.borrow().get(node_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(node: &str, id: Option<&str>, ty: HandleType, x: f32) -> Handle {
        Handle::new(node, id, ty, Position::Right, Rect::new(x, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_node_report_then_measure() {
        let cache = MeasurementCache::new();
        cache.handle_node_report("1", 150.0, 40.0);
        let m = cache.measure_node("1").unwrap();
        assert_eq!(m.dimensions, Dimensions::new(150.0, 40.0));
        assert!(m.handles.is_empty());
        assert!(cache.measure_node("2").is_none());
    }

    #[test]
    fn test_handle_report_replaces_same_handle() {
        let cache = MeasurementCache::new();
        cache.handle_handle_report(handle("1", Some("a"), HandleType::Source, 0.0)).unwrap();
        cache.handle_handle_report(handle("1", Some("b"), HandleType::Source, 5.0)).unwrap();
        cache.handle_handle_report(handle("1", Some("a"), HandleType::Source, 20.0)).unwrap();

        let handles = cache.measure_node("1").unwrap().handles;
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].id.as_deref(), Some("a"));
        assert_eq!(handles[0].x, 20.0);
    }

    #[test]
    fn test_handle_without_node_is_rejected() {
        let cache = MeasurementCache::new();
        let err = cache.handle_handle_report(handle("", None, HandleType::Target, 0.0)).unwrap_err();
        assert_eq!(err, FlowError::HandleWithoutNode);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_callbacks_share_cache() {
        let cache = MeasurementCache::new();
        let on_size = cache.node_size_callback();
        let on_handle = cache.handle_bounds_callback();

        on_size(SharedString::from("7"), 100.0, 50.0);
        on_handle(SharedString::from("7"), SharedString::new(), 1, 3, -5.0, 20.0, 10.0, 10.0);

        let m = cache.measure_node("7").unwrap();
        assert_eq!(m.dimensions.width, 100.0);
        assert_eq!(m.handles[0].handle_type, HandleType::Target);
        assert_eq!(m.handles[0].position, Position::Left);
        assert_eq!(m.handles[0].id, None);
    }

    #[test]
    fn test_closure_is_a_source() {
        let source = |id: &str| {
            (id == "x").then(|| NodeMeasurement { dimensions: Dimensions::new(1.0, 2.0), handles: vec![] })
        };
        assert!(source.measure_node("x").is_some());
        assert!(source.measure_node("y").is_none());
    }
}
