//! Detection and import of sharded Arrow datasets

use crate::dataset::Dataset;
use crate::error::{DatasetError, Result};
use crate::store::layout::{list_shards, ShardFile};
use crate::store::record::RecordDecoder;
use crate::store::schema::{ShardMetadata, FORMAT_SIGNATURE};
use crate::store::shard::{read_shard, read_shard_metadata};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Options for importing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Fail when an item refers to out-of-line media that is missing
    pub require_media: bool,
}

impl ImportOptions {
    pub fn require_media(mut self, require: bool) -> Self {
        self.require_media = require;
        self
    }
}

/// Reads datasets written by [`crate::store::Exporter`]
#[derive(Debug, Clone, Default)]
pub struct Importer {
    options: ImportOptions,
}

impl Importer {
    /// Format name used by the environment registry
    pub const NAME: &'static str = "arrow";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ImportOptions) -> Self {
        Self { options }
    }

    /// Whether `path` holds a dataset in this format
    ///
    /// Only shard names and schema footers are inspected.
    pub fn detect(path: &Path) -> bool {
        let shards = match list_shards(path) {
            Ok(shards) if !shards.is_empty() => shards,
            _ => return false,
        };
        shards.values().flatten().all(|shard| {
            read_shard_metadata(&shard.path).is_ok_and(|meta| meta.format == FORMAT_SIGNATURE)
        })
    }

    /// Load the dataset at `root`, bound to `root` with its recorded options
    pub fn import(&self, root: &Path) -> Result<Dataset> {
        let shards = list_shards(root)?;
        if shards.is_empty() {
            return Err(DatasetError::import(root, "no shard files found"));
        }

        let mut reference: Option<ShardMetadata> = None;
        let mut items = Vec::new();

        for (subset, files) in &shards {
            check_complete(root, subset, files)?;

            for file in files {
                let (metadata, records) = read_shard(&file.path)?;
                check_metadata(&file.path, subset, &metadata, reference.as_ref())?;

                let decoder =
                    RecordDecoder::new(root, subset).require_media(self.options.require_media);
                for record in records {
                    items.push(decoder.decode(record)?);
                }
                if reference.is_none() {
                    reference = Some(metadata);
                }
            }
            debug!("Read {} shards of subset '{}'", files.len(), subset);
        }

        // Non-empty by the check above
        let reference =
            reference.ok_or_else(|| DatasetError::import(root, "no shard files found"))?;

        let mut dataset = Dataset::from_items(items)
            .with_categories(reference.categories)
            .with_infos(reference.infos);
        dataset.bind(root, reference.options);
        dataset.take_changes();

        info!(
            "Imported {} items in {} subsets from {}",
            dataset.len(),
            dataset.subset_names().len(),
            root.display()
        );
        Ok(dataset)
    }
}

/// Shards of a subset must be exactly `0..count` with one agreed count
fn check_complete(root: &Path, subset: &str, files: &[ShardFile]) -> Result<()> {
    let count = files[0].count;
    let complete = files.len() == count
        && files
            .iter()
            .enumerate()
            .all(|(i, file)| file.index == i && file.count == count);

    if !complete {
        let found: BTreeMap<usize, usize> = files.iter().map(|f| (f.index, f.count)).collect();
        return Err(DatasetError::import(
            root,
            format!(
                "subset '{}' has an incomplete shard set: expected {} shards, found {:?}",
                subset, count, found
            ),
        ));
    }
    Ok(())
}

fn check_metadata(
    path: &Path,
    subset: &str,
    metadata: &ShardMetadata,
    reference: Option<&ShardMetadata>,
) -> Result<()> {
    if metadata.format != FORMAT_SIGNATURE {
        return Err(DatasetError::import(
            path,
            format!("unknown format signature '{}'", metadata.format),
        ));
    }
    if metadata.subset != subset {
        return Err(DatasetError::import(
            path,
            format!("file name says subset '{}', metadata says '{}'", subset, metadata.subset),
        ));
    }
    if let Some(reference) = reference {
        if !metadata.is_consistent_with(reference) {
            return Err(DatasetError::import(
                path,
                "categories, infos or export options conflict with other shards",
            ));
        }
    }
    Ok(())
}
