//! Node dragging.
//!
//! A press on a node body starts a *pending* gesture. Once the pointer has
//! moved further than `node_drag_threshold` (flow units) the gesture becomes a
//! drag; releasing before that is a click. All positions handed to the engine
//! are flow-space, so a drag is zoom-compensated by construction.
//!
//! ```text
//! Idle --pointer_down--> Pending --move > threshold--> Active --pointer_up--> Idle
//!                           |                            |
//!                           +--pointer_up (click)--------+--cancel (restore)--> Idle
//! ```

use crate::changes::{Change, NodeChange};
use crate::error::FlowError;
use crate::geometry::{clamp_position, snap_position, CoordinateExtent, Dimensions, Rect, XYPosition};
use crate::graph::{Node, NodeExtent, NodeId};
use crate::store::{FlowState, FlowStore, InternalNode};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// Keyboard nudge step without snapping.
const NUDGE_STEP: f32 = 1.0;
const NUDGE_STEP_FAST: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
struct DragItem {
    id: NodeId,
    start_position: XYPosition,
    start_absolute: XYPosition,
    dimensions: Dimensions,
    parent_id: Option<NodeId>,
    extent: Option<NodeExtent>,
    expand_parent: bool,
}

#[derive(Debug, Clone, Default)]
enum DragPhase {
    #[default]
    Idle,
    Pending {
        node_id: NodeId,
        start: XYPosition,
        multi: bool,
        /// Nothing could be dragged; the release is still a click.
        blocked: bool,
    },
    Active {
        items: Vec<DragItem>,
        start: XYPosition,
        /// Pre-drag copies of parents that may grow and their other children.
        originals: Vec<Node>,
    },
}

/// What a pointer release resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum DragRelease {
    /// No gesture was in progress.
    Ignored,
    /// The press never became a drag.
    Click(NodeId),
    /// A drag ended; the ids of the nodes that were moved.
    Dropped(Vec<NodeId>),
}

/// Drives node drags against a [`FlowStore`]. Clone it to share it.
#[derive(Clone)]
pub struct DragEngine {
    store: FlowStore,
    phase: Rc<RefCell<DragPhase>>,
}

impl DragEngine {
    pub fn new(store: FlowStore) -> Self {
        Self { store, phase: Rc::default() }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(*self.phase.borrow(), DragPhase::Active { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.phase.borrow(), DragPhase::Pending { .. })
    }

    /// Ids of the nodes being dragged (empty unless a drag is active).
    pub fn dragged_ids(&self) -> Vec<NodeId> {
        match &*self.phase.borrow() {
            DragPhase::Active { items, .. } => items.iter().map(|i| i.id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Press on the body of node `node_id` at flow-space `pointer`.
    pub fn pointer_down(&self, node_id: &str, pointer: XYPosition, multi: bool) -> bool {
        if self.store.get_state().node(node_id).is_none() {
            self.store.report(&FlowError::NodeNotFound(node_id.to_owned()));
            return false;
        }
        *self.phase.borrow_mut() =
            DragPhase::Pending { node_id: node_id.to_owned(), start: pointer, multi, blocked: false };
        true
    }

    /// Pointer moved to flow-space `pointer`. Returns whether a drag is active.
    pub fn pointer_move(&self, pointer: XYPosition) -> bool {
        let pending = match &*self.phase.borrow() {
            DragPhase::Idle => return false,
            DragPhase::Pending { blocked: true, .. } => return false,
            DragPhase::Pending { node_id, start, .. } => Some((node_id.clone(), *start)),
            DragPhase::Active { .. } => None,
        };
        if let Some((node_id, start)) = pending {
            let threshold = self.store.get_state().config.node_drag_threshold;
            if threshold > 0.0 && pointer.distance(start) <= threshold {
                return false;
            }
            if !self.activate(&node_id, start) {
                if let DragPhase::Pending { blocked, .. } = &mut *self.phase.borrow_mut() {
                    *blocked = true;
                }
                return false;
            }
        }
        self.drag_to(pointer);
        true
    }

    /// Release: finish the drag, or resolve the press as a click.
    pub fn pointer_up(&self) -> DragRelease {
        let phase = std::mem::take(&mut *self.phase.borrow_mut());
        match phase {
            DragPhase::Idle => DragRelease::Ignored,
            DragPhase::Pending { node_id, multi, .. } => {
                self.click(&node_id, multi);
                DragRelease::Click(node_id)
            }
            DragPhase::Active { items, .. } => {
                let (changes, nodes) = {
                    let state = self.store.get_state();
                    let nodes: Vec<Node> = items
                        .iter()
                        .filter_map(|item| state.node(&item.id))
                        .map(|n| Node { dragging: false, ..n.clone() })
                        .collect();
                    let changes: Vec<NodeChange> = nodes
                        .iter()
                        .map(|n| Change::Position { id: n.id.clone(), position: Some(n.position), dragging: Some(false) })
                        .collect();
                    (changes, nodes)
                };
                tracing::debug!(count = nodes.len(), "node drag stopped");
                self.store.trigger_node_changes(changes);
                self.store.events().node_drag_stop(&nodes);
                DragRelease::Dropped(nodes.into_iter().map(|n| n.id).collect())
            }
        }
    }

    /// Abort the gesture, restoring every touched node to its pre-drag state.
    pub fn cancel(&self) -> bool {
        let phase = std::mem::take(&mut *self.phase.borrow_mut());
        let (items, originals) = match phase {
            DragPhase::Active { items, originals, .. } => (items, originals),
            DragPhase::Pending { .. } => return true,
            DragPhase::Idle => return false,
        };

        let (changes, restored) = {
            let state = self.store.get_state();
            let mut changes: Vec<NodeChange> = originals
                .iter()
                .filter(|original| state.node(&original.id).is_some_and(|n| n != *original))
                .map(|original| Change::Replace { id: original.id.clone(), item: original.clone() })
                .collect();
            let mut restored = Vec::new();
            for item in &items {
                let Some(node) = state.node(&item.id) else { continue };
                changes.push(Change::Position {
                    id: item.id.clone(),
                    position: Some(item.start_position),
                    dragging: Some(false),
                });
                restored.push(Node { position: item.start_position, dragging: false, ..node.clone() });
            }
            (changes, restored)
        };
        tracing::debug!(count = restored.len(), "node drag cancelled");
        self.store.trigger_node_changes(changes);
        self.store.events().node_drag_stop(&restored);
        true
    }

    /// Move the selected nodes by one keyboard step in `direction` (unit
    /// vector components). Snapping uses the grid as the step.
    pub fn nudge(&self, direction: XYPosition, fast: bool) -> bool {
        let changes = {
            let state = self.store.get_state();
            let config = &state.config;
            let step = if config.snap_to_grid {
                XYPosition::new(config.snap_grid[0], config.snap_grid[1])
            } else if fast {
                XYPosition::new(NUDGE_STEP_FAST, NUDGE_STEP_FAST)
            } else {
                XYPosition::new(NUDGE_STEP, NUDGE_STEP)
            };
            let offset = XYPosition::new(direction.x * step.x, direction.y * step.y);
            let selected: HashSet<&str> = state.selected_nodes.iter().collect();

            state
                .nodes
                .iter()
                .filter(|n| selected.contains(n.id.as_str()) && n.is_draggable(config.nodes_draggable))
                .filter_map(|n| state.internal_node(&n.id))
                .filter(|n| !has_ancestor_in(&state, &n.node, &selected))
                .filter_map(|n| {
                    let extent = effective_extent(&state, n.node.parent_id.as_deref(), n.node.extent.as_ref(), false);
                    let absolute = clamp_position(n.position_absolute + offset, &extent, n.dimensions());
                    let position = absolute - (n.position_absolute - n.node.position);
                    (position != n.node.position).then(|| Change::Position {
                        id: n.node.id.clone(),
                        position: Some(position),
                        dragging: None,
                    })
                })
                .collect::<Vec<NodeChange>>()
        };
        let moved = !changes.is_empty();
        self.store.trigger_node_changes(changes);
        moved
    }

    fn click(&self, node_id: &str, multi: bool) {
        let node = {
            let state = self.store.get_state();
            state
                .node(node_id)
                .map(|n| (n.clone(), n.is_selectable(state.config.elements_selectable)))
        };
        let Some((node, selectable)) = node else {
            tracing::debug!(node_id, "clicked node vanished");
            return;
        };
        if selectable {
            self.store.select_node_interaction(node_id, multi);
        }
        self.store.events().node_click(&node);
    }

    /// Pending -> Active. Returns false when nothing ended up draggable.
    fn activate(&self, node_id: &str, start: XYPosition) -> bool {
        let mut errors = Vec::new();
        let (items, originals, select_pressed) = {
            let state = self.store.get_state();
            let config = &state.config;
            let Some(pressed) = state.node(node_id) else {
                tracing::debug!(node_id, "pressed node vanished before the drag started");
                return false;
            };

            let group = pressed.selected && state.selected_nodes.len() > 1;
            let ids: HashSet<&str> = if group {
                state.selected_nodes.iter().collect()
            } else {
                HashSet::from([node_id])
            };

            let mut items = Vec::new();
            for node in state.nodes.iter().filter(|n| ids.contains(n.id.as_str())) {
                let Some(internal) = state.internal_node(&node.id) else { continue };
                if !node.is_draggable(config.nodes_draggable) || has_ancestor_in(&state, node, &ids) {
                    continue;
                }
                if !node.is_measured() {
                    errors.push(FlowError::NodeNotInitialized(node.id.clone()));
                    continue;
                }
                let mut extent = node.extent;
                if extent == Some(NodeExtent::Parent) && node.parent_id.is_none() {
                    errors.push(FlowError::ParentExtentWithoutParent(node.id.clone()));
                    extent = None;
                }
                items.push(DragItem {
                    id: node.id.clone(),
                    start_position: node.position,
                    start_absolute: internal.position_absolute,
                    dimensions: internal.dimensions(),
                    parent_id: node.parent_id.clone(),
                    extent,
                    expand_parent: node.expand_parent,
                });
            }

            let dragged: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
            let parents: HashSet<&str> = items
                .iter()
                .filter(|i| i.expand_parent)
                .filter_map(|i| i.parent_id.as_deref())
                .collect();
            let originals = parents
                .iter()
                .flat_map(|p| {
                    std::iter::once(*p).chain(state.parent_lookup.get(*p).into_iter().flatten().map(String::as_str))
                })
                .filter(|id| !dragged.contains(id))
                .filter_map(|id| state.node(id).cloned())
                .collect();

            let select_pressed = !group
                && config.select_nodes_on_drag
                && pressed.is_selectable(config.elements_selectable)
                && !items.is_empty();
            (items, originals, select_pressed)
        };

        for err in &errors {
            self.store.report(err);
        }
        if items.is_empty() {
            return false;
        }
        if select_pressed {
            self.store.select_nodes([node_id]);
        }

        let nodes: Vec<Node> = {
            let state = self.store.get_state();
            items.iter().filter_map(|i| state.node(&i.id)).cloned().collect()
        };
        tracing::debug!(count = items.len(), "node drag started");
        *self.phase.borrow_mut() = DragPhase::Active { items, start, originals };
        self.store.events().node_drag_start(&nodes);
        true
    }

    fn drag_to(&self, pointer: XYPosition) {
        let (changes, moved, vanished) = {
            let phase = self.phase.borrow();
            let DragPhase::Active { items, start, .. } = &*phase else { return };
            let state = self.store.get_state();
            let delta = pointer - *start;
            let mut vanished = Vec::new();

            // (item, internal node, new absolute position)
            let mut placed = Vec::new();
            for item in items {
                let Some(internal) = state.internal_node(&item.id) else {
                    vanished.push(item.id.clone());
                    continue;
                };
                let mut absolute = item.start_absolute + delta;
                if state.config.snap_to_grid {
                    absolute = snap_position(absolute, state.config.snap_grid);
                }
                let extent =
                    effective_extent(&state, item.parent_id.as_deref(), item.extent.as_ref(), item.expand_parent);
                placed.push((item, internal, clamp_position(absolute, &extent, item.dimensions)));
            }

            let mut changes: Vec<NodeChange> = Vec::new();
            let mut parent_shift: BTreeMap<&str, XYPosition> = BTreeMap::new();
            for (parent_id, parent, grown) in expansions(&state, &placed) {
                let current = parent.rect();
                let shift = XYPosition::new(current.x - grown.x, current.y - grown.y);
                if shift != XYPosition::default() {
                    changes.push(Change::Position {
                        id: parent_id.to_owned(),
                        position: Some(parent.node.position - shift),
                        dragging: None,
                    });
                    let dragged: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
                    for child in state.parent_lookup.get(parent_id).into_iter().flatten() {
                        if dragged.contains(child.as_str()) {
                            continue;
                        }
                        if let Some(sibling) = state.node(child) {
                            changes.push(Change::Position {
                                id: child.clone(),
                                position: Some(sibling.position + shift),
                                dragging: None,
                            });
                        }
                    }
                }
                changes.push(Change::Dimensions {
                    id: parent_id.to_owned(),
                    dimensions: Some(Dimensions::new(grown.width, grown.height)),
                    set_attributes: true,
                });
                parent_shift.insert(parent_id, shift);
            }

            let mut moved = Vec::new();
            for (item, internal, absolute) in &placed {
                let shift = item
                    .parent_id
                    .as_deref()
                    .and_then(|p| parent_shift.get(p))
                    .copied()
                    .unwrap_or_default();
                let parent_absolute = internal.position_absolute - internal.node.position - shift;
                let position = *absolute - parent_absolute;
                changes.push(Change::Position { id: item.id.clone(), position: Some(position), dragging: Some(true) });
                moved.push(Node { position, dragging: true, ..internal.node.clone() });
            }
            (changes, moved, vanished)
        };

        if !vanished.is_empty() {
            tracing::debug!(?vanished, "dragged nodes vanished, dropping them from the drag");
            if let DragPhase::Active { items, .. } = &mut *self.phase.borrow_mut() {
                items.retain(|i| !vanished.contains(&i.id));
            }
        }
        tracing::trace!(?pointer, count = moved.len(), "node drag");
        self.store.trigger_node_changes(changes);
        self.store.events().node_drag(&moved);
    }
}

/// Extent a node at `parent_id` is clamped to, in absolute flow space.
/// Nodes that grow their parent are not clamped by it.
fn effective_extent(
    state: &FlowState,
    parent_id: Option<&str>,
    extent: Option<&NodeExtent>,
    expand_parent: bool,
) -> CoordinateExtent {
    let parent = parent_id.and_then(|p| state.internal_node(p));
    match (extent, parent) {
        (Some(NodeExtent::Parent), Some(parent)) if !expand_parent => CoordinateExtent::from_rect(&parent.rect()),
        (Some(NodeExtent::Bounds(bounds)), Some(parent)) => {
            let offset = parent.position_absolute;
            let (min, max) = (bounds.min(), bounds.max());
            CoordinateExtent([[min.x + offset.x, min.y + offset.y], [max.x + offset.x, max.y + offset.y]])
        }
        (Some(NodeExtent::Bounds(bounds)), None) => *bounds,
        _ => state.config.node_extent,
    }
}

/// Parents that must grow to hold their `expand_parent` children, with the
/// grown absolute rect.
fn expansions<'a>(
    state: &'a FlowState,
    placed: &[(&'a DragItem, &'a InternalNode, XYPosition)],
) -> Vec<(&'a str, &'a InternalNode, Rect)> {
    let mut grown: BTreeMap<&str, (&InternalNode, Rect)> = BTreeMap::new();
    for (item, _, absolute) in placed.iter().filter(|(item, _, _)| item.expand_parent) {
        let Some(parent_id) = item.parent_id.as_deref() else { continue };
        let Some(parent) = state.internal_node(parent_id) else { continue };
        let child = Rect::from_position(*absolute, item.dimensions);
        let entry = grown.entry(parent_id).or_insert((parent, parent.rect()));
        entry.1 = entry.1.union(&child);
    }
    grown
        .into_iter()
        .filter(|(_, (parent, rect))| *rect != parent.rect())
        .map(|(id, (parent, rect))| (id, parent, rect))
        .collect()
}

/// Whether any ancestor of `node` is in `ids`. Bounded by the lookup size.
fn has_ancestor_in(state: &FlowState, node: &Node, ids: &HashSet<&str>) -> bool {
    let mut current = node.parent_id.as_deref();
    for _ in 0..state.node_lookup.len() {
        let Some(parent_id) = current else { return false };
        if ids.contains(parent_id) {
            return true;
        }
        current = state.node(parent_id).and_then(|p| p.parent_id.as_deref());
    }
    false
}
