//! Slint model bridge.
//!
//! [`ModelBridge`] mirrors the store's visible nodes, edges and selection into
//! `slint::VecModel`s. Rows are built by user-supplied constructors from
//! [`NodeProps`] / [`EdgeProps`] and synced in place: existing rows are
//! updated, new ones pushed and surplus ones removed.
//!
//! ```ignore
//! let nodes = Rc::new(VecModel::<NodeRow>::default());
//! let mut bridge = ModelBridge::new(&store);
//! bridge.bind_nodes(nodes.clone(), |p| NodeRow {
//!     id: p.id.into(),
//!     x: p.position_absolute.x,
//!     y: p.position_absolute.y,
//!     selected: p.selected,
//! });
//! window.set_nodes(ModelRc::from(nodes));
//!
//! // Keep the models current from now on
//! let _sub = Rc::new(bridge).attach();
//! ```

use crate::error::{FlowError, Result};
use crate::events::FlowEvents;
use crate::registry::{EdgeProps, EdgeTypeRegistry, NodeProps, NodeTypeRegistry};
use crate::store::{FlowState, FlowStore, Unsubscribe, WeakFlowStore};
use slint::{Model, SharedString, VecModel};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Internal traits for syncing rows built from props.
trait NodeSyncer {
    fn sync(&self, props: &[NodeProps<'_>]);
}

trait EdgeSyncer {
    fn sync(&self, props: &[EdgeProps<'_>]);
}

struct ConcreteRowSyncer<P, F> {
    model: Rc<VecModel<P>>,
    constructor: F,
}

impl<P: Clone + 'static, F> ConcreteRowSyncer<P, F> {
    fn sync_rows(&self, rows: impl ExactSizeIterator<Item = P>) {
        let len = rows.len();
        for (i, row) in rows.enumerate() {
            if i < self.model.row_count() {
                self.model.set_row_data(i, row);
            } else {
                self.model.push(row);
            }
        }
        while self.model.row_count() > len {
            self.model.remove(self.model.row_count() - 1);
        }
    }
}

impl<P, F> NodeSyncer for ConcreteRowSyncer<P, F>
where
    P: Clone + 'static,
    F: Fn(&NodeProps<'_>) -> P,
{
    fn sync(&self, props: &[NodeProps<'_>]) {
        self.sync_rows(props.iter().map(&self.constructor));
    }
}

impl<P, F> EdgeSyncer for ConcreteRowSyncer<P, F>
where
    P: Clone + 'static,
    F: Fn(&EdgeProps<'_>) -> P,
{
    fn sync(&self, props: &[EdgeProps<'_>]) {
        self.sync_rows(props.iter().map(&self.constructor));
    }
}

/// Mirrors one store into Slint models.
pub struct ModelBridge {
    store: WeakFlowStore,
    node_types: NodeTypeRegistry,
    edge_types: EdgeTypeRegistry,
    nodes: Option<Box<dyn NodeSyncer>>,
    edges: Option<Box<dyn EdgeSyncer>>,
    selected_nodes: Option<Rc<VecModel<SharedString>>>,
    selected_edges: Option<Rc<VecModel<SharedString>>>,
    /// Problems seen by the last sync, so a steady state doesn't repeat them.
    reported: RefCell<HashSet<String>>,
}

impl ModelBridge {
    pub fn new(store: &FlowStore) -> Self {
        Self {
            store: store.downgrade(),
            node_types: NodeTypeRegistry::new(),
            edge_types: EdgeTypeRegistry::new(),
            nodes: None,
            edges: None,
            selected_nodes: None,
            selected_edges: None,
            reported: RefCell::default(),
        }
    }

    pub fn with_node_types(mut self, registry: NodeTypeRegistry) -> Self {
        self.node_types = registry;
        self
    }

    pub fn with_edge_types(mut self, registry: EdgeTypeRegistry) -> Self {
        self.edge_types = registry;
        self
    }

    /// Mirror visible nodes, in draw order, into `model`.
    pub fn bind_nodes<P, F>(&mut self, model: Rc<VecModel<P>>, constructor: F)
    where
        P: Clone + 'static,
        F: Fn(&NodeProps<'_>) -> P + 'static,
    {
        self.nodes = Some(Box::new(ConcreteRowSyncer { model, constructor }));
    }

    /// Mirror drawable edges into `model`.
    pub fn bind_edges<P, F>(&mut self, model: Rc<VecModel<P>>, constructor: F)
    where
        P: Clone + 'static,
        F: Fn(&EdgeProps<'_>) -> P + 'static,
    {
        self.edges = Some(Box::new(ConcreteRowSyncer { model, constructor }));
    }

    pub fn bind_selected_nodes(&mut self, model: Rc<VecModel<SharedString>>) {
        self.selected_nodes = Some(model);
    }

    pub fn bind_selected_edges(&mut self, model: Rc<VecModel<SharedString>>) {
        self.selected_edges = Some(model);
    }

    /// Sync all bound models from the current state.
    pub fn sync(&self) -> Result<()> {
        let store = self.store.upgrade().ok_or(FlowError::MissingStore)?;
        let problems = {
            let state = store.get_state();
            self.sync_state(&state)
        };
        for problem in problems {
            store.report(&problem);
        }
        Ok(())
    }

    /// Keep the models in sync on every store notification.
    pub fn attach(self: Rc<Self>) -> Result<Unsubscribe> {
        let store = self.store.upgrade().ok_or(FlowError::MissingStore)?;
        self.sync()?;
        let bridge = self.clone();
        Ok(store.subscribe(move |state| {
            let problems = bridge.sync_state(state);
            if let Some(store) = bridge.store.upgrade() {
                for problem in problems {
                    store.report(&problem);
                }
            }
        }))
    }

    /// Returns the problems that have not been reported before.
    fn sync_state(&self, state: &FlowState) -> Vec<FlowError> {
        // unknown types are collected here and reported once the state borrow is gone
        let silent = FlowEvents::new();
        let mut problems = Vec::new();

        if let Some(syncer) = &self.nodes {
            let mut rows = Vec::new();
            for node in state.nodes.iter().filter(|n| !n.hidden) {
                let Some(internal) = state.internal_node(&node.id) else { continue };
                let known = node.node_type.as_deref().filter(|name| self.node_types.contains(name));
                if let (Some(name), None) = (node.node_type.as_deref(), known) {
                    problems.push(FlowError::NodeTypeNotFound(name.to_owned()));
                }
                let (node_type, renderer) = self.node_types.resolve(known, &silent);
                let props = NodeProps {
                    id: &node.id,
                    node_type,
                    data: &node.data,
                    position_absolute: internal.position_absolute,
                    dimensions: internal.dimensions(),
                    z: internal.z,
                    selected: node.selected,
                    dragging: node.dragging,
                    connectable: node.is_connectable(state.config.nodes_connectable),
                };
                renderer.render(&props);
                rows.push(props);
            }
            syncer.sync(&rows);
        }

        if let Some(syncer) = &self.edges {
            let mut rows = Vec::new();
            for edge in state.visible_edges() {
                let position = match state.edge_position(edge) {
                    Ok(position) => position,
                    Err(err) => {
                        problems.push(err);
                        continue;
                    }
                };
                let known = edge.edge_type.as_deref().filter(|name| self.edge_types.contains(name));
                if let (Some(name), None) = (edge.edge_type.as_deref(), known) {
                    problems.push(FlowError::EdgeTypeNotFound(name.to_owned()));
                }
                let (edge_type, renderer) = self.edge_types.resolve(known, &silent);
                let props = EdgeProps {
                    id: &edge.id,
                    edge_type,
                    data: &edge.data,
                    source: position.source,
                    target: position.target,
                    selected: edge.selected,
                    animated: edge.animated,
                };
                renderer.render(&props);
                rows.push(props);
            }
            syncer.sync(&rows);
        }

        if let Some(model) = &self.selected_nodes {
            state.selected_nodes.sync_to_model(model);
        }
        if let Some(model) = &self.selected_edges {
            state.selected_edges.sync_to_model(model);
        }

        // only problems still present stay remembered; one that clears and comes back is reported again
        let current: HashSet<String> = problems.iter().map(ToString::to_string).collect();
        let previous = self.reported.replace(current);
        problems.retain(|p| !previous.contains(&p.to_string()));
        problems
    }
}
