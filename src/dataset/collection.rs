//! In-memory dataset with change tracking

use crate::config::ExportOptions;
use crate::dataset::{ChangeSet, ItemChange};
use crate::error::{DatasetError, Result};
use crate::model::{Categories, DatasetItem, Infos};
use crate::store::{Exporter, ImportOptions, Importer, SaveReport};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Items of one subset, in insertion order
#[derive(Debug, Clone, Default)]
struct SubsetItems {
    items: Vec<DatasetItem>,
    index: HashMap<String, usize>,
}

impl SubsetItems {
    fn get(&self, id: &str) -> Option<&DatasetItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Insert or replace; returns the replaced item
    fn upsert(&mut self, item: DatasetItem) -> Option<DatasetItem> {
        match self.index.get(&item.id) {
            Some(&i) => Some(std::mem::replace(&mut self.items[i], item)),
            None => {
                self.index.insert(item.id.clone(), self.items.len());
                self.items.push(item);
                None
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<DatasetItem> {
        let position = self.index.remove(id)?;
        let item = self.items.remove(position);
        for i in self.index.values_mut() {
            if *i > position {
                *i -= 1;
            }
        }
        Some(item)
    }
}

/// Export location and options a dataset is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Dataset root directory
    pub root: PathBuf,
    /// Options of the last persist
    pub options: ExportOptions,
}

/// A dataset: items partitioned into named subsets
///
/// Every mutation is recorded in the handle's [`ChangeSet`]. Once bound to
/// a directory by [`Dataset::export`] or [`Dataset::import`], the dataset
/// can be persisted incrementally with [`Dataset::save`].
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    subsets: BTreeMap<String, SubsetItems>,
    categories: Categories,
    infos: Infos,
    changes: ChangeSet,
    binding: Option<Binding>,
}

impl Dataset {
    /// Empty, unbound dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset holding `items`
    pub fn from_items(items: impl IntoIterator<Item = DatasetItem>) -> Self {
        let mut dataset = Self::new();
        for item in items {
            dataset.put(item);
        }
        dataset
    }

    /// Set categories
    pub fn with_categories(mut self, categories: Categories) -> Self {
        self.set_categories(categories);
        self
    }

    /// Set infos
    pub fn with_infos(mut self, infos: Infos) -> Self {
        self.set_infos(infos);
        self
    }

    pub fn categories(&self) -> &Categories {
        &self.categories
    }

    pub fn infos(&self) -> &Infos {
        &self.infos
    }

    /// Replace categories; every subset is rewritten at the next save
    pub fn set_categories(&mut self, categories: Categories) {
        if self.categories != categories {
            self.categories = categories;
            self.changes.mark_metadata();
        }
    }

    /// Replace infos; every subset is rewritten at the next save
    pub fn set_infos(&mut self, infos: Infos) {
        if self.infos != infos {
            self.infos = infos;
            self.changes.mark_metadata();
        }
    }

    /// Add an item, or replace the item with the same `(id, subset)`
    pub fn put(&mut self, item: DatasetItem) {
        let (id, subset) = item.key();
        let replaced = self.subsets.entry(subset.clone()).or_default().upsert(item);
        let change = if replaced.is_some() {
            ItemChange::Modified
        } else {
            ItemChange::Added
        };
        self.changes.record(&subset, &id, change);
    }

    /// Remove an item
    pub fn remove(&mut self, id: &str, subset: &str) -> Option<DatasetItem> {
        let items = self.subsets.get_mut(subset)?;
        let removed = items.remove(id)?;
        if items.items.is_empty() {
            self.subsets.remove(subset);
        }
        self.changes.record(subset, id, ItemChange::Removed);
        Some(removed)
    }

    pub fn get(&self, id: &str, subset: &str) -> Option<&DatasetItem> {
        self.subsets.get(subset)?.get(id)
    }

    /// Look an item up, failing with [`DatasetError::ItemNotFound`]
    pub fn item(&self, id: &str, subset: &str) -> Result<&DatasetItem> {
        self.get(id, subset).ok_or_else(|| DatasetError::ItemNotFound {
            id: id.to_string(),
            subset: subset.to_string(),
        })
    }

    /// Total number of items
    pub fn len(&self) -> usize {
        self.subsets.values().map(|s| s.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    /// Names of non-empty subsets, sorted
    pub fn subset_names(&self) -> Vec<&str> {
        self.subsets.keys().map(String::as_str).collect()
    }

    /// Items of a subset in insertion order
    pub fn subset_items(&self, subset: &str) -> &[DatasetItem] {
        self.subsets
            .get(subset)
            .map(|s| s.items.as_slice())
            .unwrap_or_default()
    }

    /// All items, subset by subset
    pub fn iter(&self) -> impl Iterator<Item = &DatasetItem> {
        self.subsets.values().flat_map(|s| s.items.iter())
    }

    /// Keep only items matching `predicate`
    pub fn filter(&mut self, mut predicate: impl FnMut(&DatasetItem) -> bool) {
        let doomed: Vec<(String, String)> = self
            .iter()
            .filter(|item| !predicate(*item))
            .map(DatasetItem::key)
            .collect();
        for (id, subset) in doomed {
            self.remove(&id, &subset);
        }
    }

    /// Rewrite every item; `None` drops it
    ///
    /// An item that comes back under another `(id, subset)` counts as
    /// removed from its old place and added to the new one.
    pub fn transform(&mut self, mut f: impl FnMut(DatasetItem) -> Option<DatasetItem>) {
        let old = std::mem::take(&mut self.subsets);
        let mut changes = ChangeSet::new();

        for item in old.into_values().flat_map(|s| s.items) {
            let (id, subset) = item.key();
            let before = item.clone();
            match f(item) {
                None => changes.record(&subset, &id, ItemChange::Removed),
                Some(after) => {
                    if after.key() != (id.clone(), subset.clone()) {
                        changes.record(&subset, &id, ItemChange::Removed);
                        changes.record(&after.subset, &after.id, ItemChange::Added);
                    } else if after != before {
                        changes.record(&subset, &id, ItemChange::Modified);
                    }
                    let target = after.subset.clone();
                    self.subsets.entry(target).or_default().upsert(after);
                }
            }
        }

        debug!("Transform recorded {} item changes", changes.items().count());
        self.changes.merge(changes);
    }

    /// Changes since the last successful persist
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Take the recorded changes, leaving an empty set
    pub fn take_changes(&mut self) -> ChangeSet {
        std::mem::take(&mut self.changes)
    }

    /// Export location, if bound
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub(crate) fn bind(&mut self, root: &Path, options: ExportOptions) {
        self.binding = Some(Binding {
            root: root.to_path_buf(),
            options,
        });
    }

    /// Write the whole dataset to `root` and bind to it
    pub fn export(&mut self, root: impl AsRef<Path>, options: ExportOptions) -> Result<SaveReport> {
        let root = root.as_ref();
        let exporter = Exporter::new(options)?;
        let report = exporter.export(self, root)?;
        self.bind(root, exporter.options().clone());
        self.changes.clear();
        Ok(report)
    }

    /// Persist changes since the last export, import or save
    ///
    /// Only dirty subsets are rewritten. Fails with
    /// [`DatasetError::NotBound`] when the dataset has no export location.
    pub fn save(&mut self, save_media: bool) -> Result<SaveReport> {
        let binding = self.binding.as_ref().ok_or(DatasetError::NotBound)?;
        let root = binding.root.clone();
        let options = binding.options.clone().save_media(save_media);

        let exporter = Exporter::new(options)?;
        let report = exporter.save(self, &root, &self.changes)?;
        self.bind(&root, exporter.options().clone());
        self.changes.clear();
        Ok(report)
    }

    /// Load a dataset and bind it to `root`
    pub fn import(root: impl AsRef<Path>) -> Result<Self> {
        Importer::new().import(root.as_ref())
    }

    /// [`Dataset::import`] with explicit options
    pub fn import_with(root: impl AsRef<Path>, options: ImportOptions) -> Result<Self> {
        Importer::with_options(options).import(root.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_items([
            DatasetItem::new(1).with_subset("a"),
            DatasetItem::new(2).with_subset("b"),
            DatasetItem::new(3).with_subset("a"),
        ])
    }

    #[test]
    fn test_put_get_remove() {
        let mut dataset = sample();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.subset_names(), vec!["a", "b"]);

        let ids: Vec<&str> = dataset.subset_items("a").iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);

        assert!(dataset.remove("1", "a").is_some());
        assert!(dataset.get("1", "a").is_none());
        assert_eq!(dataset.item("3", "a").unwrap().id, "3");
        assert!(matches!(
            dataset.item("1", "a"),
            Err(DatasetError::ItemNotFound { .. })
        ));

        dataset.remove("2", "b");
        assert_eq!(dataset.subset_names(), vec!["a"]);
    }

    #[test]
    fn test_put_tracks_changes() {
        let mut dataset = sample();
        dataset.take_changes();

        dataset.put(DatasetItem::new(1).with_subset("a").with_attribute("x", 1i64));
        dataset.put(DatasetItem::new(9).with_subset("c"));

        let changes = dataset.changes();
        assert_eq!(changes.item_change("a", "1"), Some(ItemChange::Modified));
        assert_eq!(changes.item_change("c", "9"), Some(ItemChange::Added));
        assert!(!changes.is_subset_dirty("b"));
    }

    #[test]
    fn test_transform_moves_items() {
        let mut dataset = sample();
        dataset.take_changes();

        dataset.transform(|item| match item.id.as_str() {
            "2" => Some(item.with_subset("a")),
            "3" => None,
            _ => Some(item),
        });

        assert_eq!(dataset.subset_names(), vec!["a"]);
        let changes = dataset.changes();
        assert_eq!(changes.item_change("b", "2"), Some(ItemChange::Removed));
        assert_eq!(changes.item_change("a", "2"), Some(ItemChange::Added));
        assert_eq!(changes.item_change("a", "3"), Some(ItemChange::Removed));
        assert_eq!(changes.item_change("a", "1"), None);
        assert!(changes.is_subset_dirty("b"));
    }

    #[test]
    fn test_metadata_changes_are_tracked() {
        let mut dataset = sample();
        dataset.take_changes();

        dataset.set_infos(Infos::new());
        assert!(dataset.changes().is_empty());

        let mut infos = Infos::new();
        infos.insert("source".to_string(), serde_json::json!("camera"));
        dataset.set_infos(infos);
        assert!(dataset.changes().metadata_changed());
    }

    #[test]
    fn test_save_requires_binding() {
        let mut dataset = sample();
        assert!(matches!(dataset.save(true), Err(DatasetError::NotBound)));
        assert!(!dataset.changes().is_empty());
    }
}
