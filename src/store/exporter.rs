//! Full export and incremental save
//!
//! Both run in two phases. First every subset that needs writing is
//! encoded and written in parallel (subsets touch disjoint files). Then,
//! once all writes succeeded, shards and media of vanished subsets and
//! media no longer referenced are removed.

use crate::config::{ExportOptions, Sharding};
use crate::dataset::{ChangeSet, Dataset, ItemChange};
use crate::error::{collect_errors, DatasetError, Result};
use crate::fs::{atomic_write, remove_dir_if_exists, remove_file_if_exists};
use crate::model::DEFAULT_SUBSET_NAME;
use crate::store::layout::{list_shards, media_dir, resolve, validate_subset_name, MEDIA_DIR};
use crate::store::record::RecordEncoder;
use crate::store::schema::ShardMetadata;
use crate::store::shard::{read_shard_metadata, ShardWriter};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What an export or save did to the directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Shard files written
    pub written: Vec<PathBuf>,
    /// Files removed (shards and media)
    pub deleted: Vec<PathBuf>,
    /// Subsets whose shards were regenerated
    pub rewritten_subsets: Vec<String>,
    /// Subsets removed from disk
    pub removed_subsets: Vec<String>,
    /// Subsets left untouched
    pub untouched_subsets: Vec<String>,
    /// Out-of-line media files written
    pub media_written: usize,
}

/// Outcome of writing one subset
struct SubsetWrite {
    subset: String,
    shards: Vec<PathBuf>,
    media_refs: HashSet<String>,
    media_written: usize,
}

/// Writes datasets in the sharded Arrow layout
#[derive(Debug, Clone)]
pub struct Exporter {
    options: ExportOptions,
    sharding: Sharding,
}

impl Exporter {
    /// Exporter with validated options
    pub fn new(options: ExportOptions) -> Result<Self> {
        let sharding = options.sharding().map_err(DatasetError::config)?;
        Ok(Self { options, sharding })
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn sharding(&self) -> Sharding {
        self.sharding
    }

    /// Write every subset of `dataset` under `root`
    ///
    /// Shards and media of subsets not in the dataset are removed.
    pub fn export(&self, dataset: &Dataset, root: &Path) -> Result<SaveReport> {
        info!("Exporting {} items to {}", dataset.len(), root.display());
        self.persist(dataset, root, None)
    }

    /// Write only what `changes` marks dirty
    ///
    /// Clean subsets that are already on disk are left byte-for-byte
    /// untouched. Every subset is rewritten when dataset metadata or the
    /// options differ from what the existing shards record.
    pub fn save(&self, dataset: &Dataset, root: &Path, changes: &ChangeSet) -> Result<SaveReport> {
        info!(
            "Saving {} items to {} ({} dirty subsets)",
            dataset.len(),
            root.display(),
            changes.dirty_subsets().count()
        );
        self.persist(dataset, root, Some(changes))
    }

    fn persist(
        &self,
        dataset: &Dataset,
        root: &Path,
        changes: Option<&ChangeSet>,
    ) -> Result<SaveReport> {
        std::fs::create_dir_all(root).map_err(|e| DatasetError::io(root, e))?;

        // An empty dataset still gets a (single, empty) shard so that the
        // directory stays recognizable.
        let mut targets: Vec<&str> = dataset.subset_names();
        if targets.is_empty() {
            targets.push(DEFAULT_SUBSET_NAME);
        }
        for subset in &targets {
            validate_subset_name(subset)?;
        }

        let on_disk = list_shards(root)?;
        let reference = ShardMetadata::new(
            "",
            dataset.categories(),
            dataset.infos(),
            &self.options,
        );

        let full = match changes {
            None => true,
            Some(changes) if changes.metadata_changed() => true,
            Some(_) => match on_disk.values().flatten().next() {
                None => false,
                Some(shard) => match read_shard_metadata(&shard.path) {
                    Ok(existing) => !existing.is_consistent_with(&reference),
                    Err(e) => {
                        warn!(
                            "Cannot read {}: {}; rewriting everything",
                            shard.path.display(),
                            e
                        );
                        true
                    }
                },
            },
        };
        if full && changes.is_some() {
            debug!("Dataset metadata or options changed, rewriting all subsets");
        }

        let mut report = SaveReport::default();
        let mut to_write = Vec::new();
        for subset in &targets {
            let dirty = changes.is_some_and(|c| c.is_subset_dirty(subset));
            if full || dirty || !on_disk.contains_key(*subset) {
                to_write.push(*subset);
            } else {
                report.untouched_subsets.push(subset.to_string());
            }
        }

        let results: Vec<Result<SubsetWrite>> = to_write
            .par_iter()
            .map(|subset| {
                self.write_subset(dataset, root, subset, changes.filter(|_| !full))
                    .map_err(|e| e.with_context(format!("subset '{}'", subset)))
            })
            .collect();
        let writes = collect_errors(results)?;

        // Every write succeeded; now drop what is no longer referenced
        let targets: BTreeSet<&str> = targets.into_iter().collect();
        for (subset, shards) in &on_disk {
            if targets.contains(subset.as_str()) {
                continue;
            }
            for shard in shards {
                if remove_file_if_exists(&shard.path)? {
                    report.deleted.push(shard.path.clone());
                }
            }
            let dir = media_dir(root, subset);
            if remove_dir_if_exists(&dir)? {
                report.deleted.push(dir);
            }
            info!("Removed subset '{}'", subset);
            report.removed_subsets.push(subset.clone());
        }
        report.deleted.extend(remove_orphan_media_dirs(root, &targets)?);

        for write in writes {
            report
                .deleted
                .extend(sweep_media(root, &write.subset, &write.media_refs)?);
            report.media_written += write.media_written;
            report.written.extend(write.shards);
            report.rewritten_subsets.push(write.subset);
        }

        info!(
            "Wrote {} shards in {} subsets, removed {} files, {} subsets untouched",
            report.written.len(),
            report.rewritten_subsets.len(),
            report.deleted.len(),
            report.untouched_subsets.len()
        );
        Ok(report)
    }

    /// Encode and write one subset
    ///
    /// With `changes` present only media of added or modified items is
    /// produced again; otherwise all media is.
    fn write_subset(
        &self,
        dataset: &Dataset,
        root: &Path,
        subset: &str,
        changes: Option<&ChangeSet>,
    ) -> Result<SubsetWrite> {
        let encoder = RecordEncoder::new(root, subset, &self.options);
        let items = dataset.subset_items(subset);

        let mut records = Vec::with_capacity(items.len());
        let mut media_refs = HashSet::new();
        let mut media_written = 0;

        for item in items {
            let rewrite_media = match changes {
                None => true,
                Some(changes) => changes
                    .item_change(subset, &item.id)
                    .is_some_and(ItemChange::is_dirty),
            };
            let encoded = encoder.encode(item, rewrite_media)?;
            for file in &encoded.media_files {
                atomic_write(&resolve(root, &file.relative_path), &file.bytes)?;
                media_written += 1;
            }
            media_refs.extend(encoded.media_refs);
            records.push(encoded.record);
        }

        let metadata =
            ShardMetadata::new(subset, dataset.categories(), dataset.infos(), &self.options);
        let shards = ShardWriter::new(&metadata)?.write_subset(root, subset, &records)?;
        debug!(
            "Subset '{}': {} items in {} shards, {} media files written",
            subset,
            records.len(),
            shards.len(),
            media_written
        );

        Ok(SubsetWrite {
            subset: subset.to_string(),
            shards,
            media_refs,
            media_written,
        })
    }
}

/// Remove files under a subset's media directory that no row refers to
fn sweep_media(root: &Path, subset: &str, referenced: &HashSet<String>) -> Result<Vec<PathBuf>> {
    let dir = media_dir(root, subset);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    if referenced.is_empty() {
        let removed = remove_dir_if_exists(&dir)?;
        return Ok(if removed { vec![dir] } else { Vec::new() });
    }

    let mut deleted = Vec::new();
    for entry in WalkDir::new(&dir).contents_first(true) {
        let entry = entry.map_err(|e| DatasetError::io(&dir, e.into()))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            // Only succeeds for directories left empty
            let _ = std::fs::remove_dir(path);
            continue;
        }
        let relative = relative_slash_path(root, path);
        if !referenced.contains(&relative) && remove_file_if_exists(path)? {
            debug!("Removed unreferenced media {}", path.display());
            deleted.push(path.to_path_buf());
        }
    }
    Ok(deleted)
}

/// Media directories of subsets that do not exist anymore
fn remove_orphan_media_dirs(root: &Path, targets: &BTreeSet<&str>) -> Result<Vec<PathBuf>> {
    let media_root = root.join(MEDIA_DIR);
    if !media_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut deleted = Vec::new();
    for entry in std::fs::read_dir(&media_root).map_err(|e| DatasetError::io(&media_root, e))? {
        let entry = entry.map_err(|e| DatasetError::io(&media_root, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !targets.contains(name.as_str()) && entry.path().is_dir() {
            remove_dir_if_exists(&entry.path())?;
            deleted.push(entry.path());
        }
    }
    // Only succeeds when empty
    let _ = std::fs::remove_dir(&media_root);
    Ok(deleted)
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
