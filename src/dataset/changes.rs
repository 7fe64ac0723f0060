//! Change tracking between persists
//!
//! A [`ChangeSet`] belongs to one dataset handle. It records which items
//! were added, modified or removed, which subsets are dirty, and whether
//! dataset-level metadata changed. The exporter consults it on `save` and
//! the dataset clears it once the save has succeeded.

use std::collections::{BTreeMap, BTreeSet};

/// Item-level change since the last persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemChange {
    /// Not on disk yet
    Added,
    /// On disk, content changed
    Modified,
    /// On disk, no longer in memory
    Removed,
}

impl ItemChange {
    /// Combine an earlier change with a later one on the same item
    pub fn then(self, later: ItemChange) -> ItemChange {
        use ItemChange::*;
        match (self, later) {
            (Added, Removed) => Removed,
            (Added, _) => Added,
            (Removed, Added) | (Removed, Modified) | (Modified, Added) => Modified,
            (_, later) => later,
        }
    }

    /// Whether the item's media must be produced again
    pub fn is_dirty(self) -> bool {
        !matches!(self, ItemChange::Removed)
    }
}

/// `(subset, id)` key of a tracked item
pub type ItemKey = (String, String);

/// Changes recorded since the last successful persist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    items: BTreeMap<ItemKey, ItemChange>,
    subsets: BTreeSet<String>,
    metadata: bool,
}

impl ChangeSet {
    /// Empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item change; marks its subset dirty
    pub fn record(&mut self, subset: &str, id: &str, change: ItemChange) {
        let key = (subset.to_string(), id.to_string());
        let merged = match self.items.get(&key) {
            Some(previous) => previous.then(change),
            None => change,
        };
        self.items.insert(key, merged);
        self.subsets.insert(subset.to_string());
    }

    /// Mark a whole subset dirty
    pub fn mark_subset(&mut self, subset: &str) {
        self.subsets.insert(subset.to_string());
    }

    /// Mark categories/infos as changed
    pub fn mark_metadata(&mut self) {
        self.metadata = true;
    }

    /// Whether categories or infos changed
    pub fn metadata_changed(&self) -> bool {
        self.metadata
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.subsets.is_empty() && !self.metadata
    }

    pub fn is_subset_dirty(&self, subset: &str) -> bool {
        self.subsets.contains(subset)
    }

    /// Dirty subsets in name order
    pub fn dirty_subsets(&self) -> impl Iterator<Item = &str> {
        self.subsets.iter().map(String::as_str)
    }

    /// Recorded change of an item, if any
    pub fn item_change(&self, subset: &str, id: &str) -> Option<ItemChange> {
        self.items
            .get(&(subset.to_string(), id.to_string()))
            .copied()
    }

    /// All recorded item changes
    pub fn items(&self) -> impl Iterator<Item = (&ItemKey, ItemChange)> {
        self.items.iter().map(|(key, change)| (key, *change))
    }

    /// Fold changes recorded later into this set
    pub fn merge(&mut self, later: ChangeSet) {
        for ((subset, id), change) in later.items {
            self.record(&subset, &id, change);
        }
        self.subsets.extend(later.subsets);
        self.metadata |= later.metadata;
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.items.clear();
        self.subsets.clear();
        self.metadata = false;
    }
}
