use std::collections::BTreeSet;
use slint::{Model, SharedString, VecModel};

/// Authoritative set of selected ids (one instance for nodes, one for edges).
///
/// The `selected` flag on each node/edge mirrors membership here; the store
/// keeps both in step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionManager {
    selected: BTreeSet<String>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle selection of an item based on interaction modifiers.
    ///
    /// `multi` (shift/meta held) toggles the item; a plain click replaces the
    /// selection unless the item is already the sole selected one.
    pub fn handle_interaction(&mut self, id: &str, multi: bool) {
        if multi {
            if !self.selected.remove(id) {
                self.selected.insert(id.to_owned());
            }
        } else {
            if self.selected.len() == 1 && self.selected.contains(id) {
                return;
            }
            self.selected.clear();
            self.selected.insert(id.to_owned());
        }
    }

    /// Clear the current selection
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Replace the current selection with a new set of IDs
    ///
    /// Useful for box selection sync
    pub fn replace_selection<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected.clear();
        self.extend(ids);
    }

    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected.extend(ids.into_iter().map(Into::into));
    }

    pub fn insert(&mut self, id: &str) -> bool {
        self.selected.insert(id.to_owned())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.selected.remove(id)
    }

    /// Drop ids the predicate rejects (e.g. items that no longer exist).
    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.selected.retain(|id| keep(id));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Selected ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.selected.iter().map(String::as_str)
    }

    /// Sync the selection into a Slint model, replacing its rows.
    pub fn sync_to_model(&self, model: &VecModel<SharedString>) {
        model.set_vec(self.selected.iter().map(|id| SharedString::from(id.as_str())).collect::<Vec<_>>());
    }

    /// Sync the selection from any Slint model (e.g. after box selection in the UI).
    pub fn sync_from_model(&mut self, model: &dyn Model<Data = SharedString>) {
        self.selected.clear();
        for i in 0..model.row_count() {
            if let Some(id) = model.row_data(i) {
                self.selected.insert(id.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
