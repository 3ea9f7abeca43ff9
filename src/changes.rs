//! Change records for node and edge collections, plus diff and apply.
//!
//! `apply(diff(a, b), a)` reproduces `b` (up to order for entries whose
//! relative order changed); this is what lets a host keep its own copy of the
//! nodes in sync with the store by replaying the changes it receives.

use crate::geometry::{Dimensions, XYPosition};
use crate::graph::{Edge, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Items a [`Change`] can target.
pub trait FlowItem: Clone + PartialEq {
    fn id(&self) -> &str;
    fn set_selected(&mut self, selected: bool);

    /// Apply a `position` change. Items without a position ignore it.
    fn apply_position(&mut self, _position: Option<XYPosition>, _dragging: Option<bool>) {}

    /// Apply a `dimensions` change. Items without a size ignore it.
    fn apply_dimensions(&mut self, _dimensions: Option<Dimensions>, _set_attributes: bool) {}

    /// Most specific change turning `old` into `self` (same id assumed).
    fn change_from(&self, old: &Self) -> Change<Self>;
}

/// One mutation of a node or edge collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum Change<T> {
    Add {
        item: T,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    Remove {
        id: String,
    },
    #[serde(alias = "update")]
    Replace {
        id: String,
        item: T,
    },
    Select {
        id: String,
        selected: bool,
    },
    #[serde(rename_all = "camelCase")]
    Position {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<XYPosition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dragging: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Dimensions {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<Dimensions>,
        #[serde(default)]
        set_attributes: bool,
    },
    /// Any change type this version does not know about.
    #[serde(other)]
    Unknown,
}

pub type NodeChange = Change<Node>;
pub type EdgeChange = Change<Edge>;

impl<T: FlowItem> Change<T> {
    /// Id of the targeted item (`None` for unknown changes).
    pub fn id(&self) -> Option<&str> {
        match self {
            Change::Add { item, .. } => Some(item.id()),
            Change::Remove { id }
            | Change::Replace { id, .. }
            | Change::Select { id, .. }
            | Change::Position { id, .. }
            | Change::Dimensions { id, .. } => Some(id),
            Change::Unknown => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Add { .. } => "add",
            Change::Remove { .. } => "remove",
            Change::Replace { .. } => "replace",
            Change::Select { .. } => "select",
            Change::Position { .. } => "position",
            Change::Dimensions { .. } => "dimensions",
            Change::Unknown => "unknown",
        }
    }
}

impl FlowItem for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    fn apply_position(&mut self, position: Option<XYPosition>, dragging: Option<bool>) {
        if let Some(position) = position {
            self.position = position;
        }
        if let Some(dragging) = dragging {
            self.dragging = dragging;
        }
    }

    fn apply_dimensions(&mut self, dimensions: Option<Dimensions>, set_attributes: bool) {
        if let Some(dimensions) = dimensions {
            self.measured = Some(dimensions);
            if set_attributes {
                self.width = Some(dimensions.width);
                self.height = Some(dimensions.height);
            }
        }
    }

    fn change_from(&self, old: &Self) -> Change<Self> {
        let mut probe = old.clone();
        probe.position = self.position;
        probe.dragging = self.dragging;
        if probe == *self {
            return Change::Position {
                id: self.id.clone(),
                position: Some(self.position),
                dragging: (old.dragging != self.dragging).then_some(self.dragging),
            };
        }

        let mut probe = old.clone();
        probe.selected = self.selected;
        if probe == *self {
            return Change::Select { id: self.id.clone(), selected: self.selected };
        }

        if self.measured.is_some() {
            let mut probe = old.clone();
            probe.measured = self.measured;
            if probe == *self {
                return Change::Dimensions {
                    id: self.id.clone(),
                    dimensions: self.measured,
                    set_attributes: false,
                };
            }
        }

        Change::Replace { id: self.id.clone(), item: self.clone() }
    }
}

impl FlowItem for Edge {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    fn change_from(&self, old: &Self) -> Change<Self> {
        let mut probe = old.clone();
        probe.selected = self.selected;
        if probe == *self {
            Change::Select { id: self.id.clone(), selected: self.selected }
        } else {
            Change::Replace { id: self.id.clone(), item: self.clone() }
        }
    }
}

/// Changes turning `old` into `new`, matched by id.
///
/// Order: removals (in `old` order), then updates and additions (in `new`
/// order, updates first). Unchanged items produce nothing.
pub fn diff<T: FlowItem>(old: &[T], new: &[T]) -> Vec<Change<T>> {
    let old_by_id: HashMap<&str, &T> = old.iter().map(|item| (item.id(), item)).collect();
    let new_ids: std::collections::HashSet<&str> = new.iter().map(|item| item.id()).collect();

    let removals = old
        .iter()
        .filter(|item| !new_ids.contains(item.id()))
        .map(|item| Change::Remove { id: item.id().to_owned() });

    let updates = new.iter().filter_map(|item| {
        let previous = old_by_id.get(item.id())?;
        (*previous != item).then(|| item.change_from(previous))
    });

    let additions = new
        .iter()
        .enumerate()
        .filter(|(_, item)| !old_by_id.contains_key(item.id()))
        .map(|(index, item)| Change::Add { item: item.clone(), index: Some(index) });

    removals.chain(updates).chain(additions).collect()
}

/// Apply `changes` in order onto a copy of `items`.
///
/// Changes naming an id that isn't present and unknown change types are
/// skipped with a warning.
pub fn apply<T: FlowItem>(changes: &[Change<T>], items: &[T]) -> Vec<T> {
    let mut out = items.to_vec();
    for change in changes {
        match change {
            Change::Add { item, index } => match index {
                Some(index) if *index <= out.len() => out.insert(*index, item.clone()),
                _ => out.push(item.clone()),
            },
            Change::Remove { id } => out.retain(|item| item.id() != id),
            Change::Replace { id, item } => {
                if let Some(slot) = find_mut(&mut out, id, change.kind()) {
                    *slot = item.clone();
                }
            }
            Change::Select { id, selected } => {
                if let Some(slot) = find_mut(&mut out, id, change.kind()) {
                    slot.set_selected(*selected);
                }
            }
            Change::Position { id, position, dragging } => {
                if let Some(slot) = find_mut(&mut out, id, change.kind()) {
                    slot.apply_position(*position, *dragging);
                }
            }
            Change::Dimensions { id, dimensions, set_attributes } => {
                if let Some(slot) = find_mut(&mut out, id, change.kind()) {
                    slot.apply_dimensions(*dimensions, *set_attributes);
                }
            }
            Change::Unknown => {
                tracing::warn!("ignoring change of unknown type");
            }
        }
    }
    out
}

fn find_mut<'a, T: FlowItem>(items: &'a mut [T], id: &str, kind: &str) -> Option<&'a mut T> {
    let found = items.iter_mut().find(|item| item.id() == id);
    if found.is_none() {
        tracing::warn!(id, kind, "change targets an item that does not exist");
    }
    found
}

pub fn apply_node_changes(changes: &[NodeChange], nodes: &[Node]) -> Vec<Node> {
    apply(changes, nodes)
}

pub fn apply_edge_changes(changes: &[EdgeChange], edges: &[Edge]) -> Vec<Edge> {
    apply(changes, edges)
}

/// `select` changes that make exactly `ids` selected, touching only items whose flag flips.
pub fn selection_changes<'a, T, I>(items: &[T], ids: I) -> Vec<Change<T>>
where
    T: FlowItem + Selected,
    I: IntoIterator<Item = &'a str>,
{
    let wanted: std::collections::HashSet<&str> = ids.into_iter().collect();
    items
        .iter()
        .filter_map(|item| {
            let selected = wanted.contains(item.id());
            (item.is_selected() != selected).then(|| Change::Select {
                id: item.id().to_owned(),
                selected,
            })
        })
        .collect()
}

/// Read access to the per-item selection flag.
pub trait Selected {
    fn is_selected(&self) -> bool;
}

impl Selected for Node {
    fn is_selected(&self) -> bool {
        self.selected
    }
}

impl Selected for Edge {
    fn is_selected(&self) -> bool {
        self.selected
    }
}
