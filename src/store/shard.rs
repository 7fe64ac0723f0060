//! Shard writer and reader
//!
//! A shard is an Arrow IPC file of [`ItemRecord`] rows split into record
//! batches of at most `max_chunk_size` rows. The schema carries the
//! [`ShardMetadata`], so any shard decodes on its own.

use crate::config::Sharding;
use crate::error::{DatasetError, IoResultExt, Result};
use crate::fs::{atomic_write, remove_file_if_exists};
use crate::store::layout::{list_shards, shard_file_name};
use crate::store::record::ItemRecord;
use crate::store::schema::{columns, item_schema, ShardMetadata};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, StringArray, StringBuilder, UInt8Array,
    UInt8Builder,
};
use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Split `n` items into `k` contiguous blocks
///
/// The first `n % k` blocks get one extra item; blocks are empty when
/// `k > n`.
pub fn block_ranges(n: usize, k: usize) -> Vec<Range<usize>> {
    if k == 0 {
        return Vec::new();
    }
    let (base, extra) = (n / k, n % k);
    let mut start = 0;
    (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Serializes the rows of one subset into shard files
pub struct ShardWriter {
    schema: SchemaRef,
    max_chunk_size: usize,
    sharding: Sharding,
}

impl ShardWriter {
    /// Writer for shards carrying `metadata`, laid out per its options
    pub fn new(metadata: &ShardMetadata) -> Result<Self> {
        let sharding = metadata.options.sharding().map_err(DatasetError::config)?;
        Ok(Self {
            schema: item_schema(metadata)?,
            max_chunk_size: metadata.options.max_chunk_size,
            sharding,
        })
    }

    /// Encode rows into one IPC file image
    pub fn encode_shard(&self, records: &[ItemRecord]) -> Result<Vec<u8>> {
        let mut writer = FileWriter::try_new(Vec::new(), &self.schema)?;
        for chunk in records.chunks(self.max_chunk_size) {
            writer.write(&self.records_to_batch(chunk)?)?;
        }
        writer.finish()?;
        Ok(writer.into_inner()?)
    }

    fn records_to_batch(&self, records: &[ItemRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let mut id_builder = StringBuilder::with_capacity(len, len * 8);
        let mut type_builder = UInt8Builder::with_capacity(len);
        let mut path_builder = StringBuilder::with_capacity(len, len * 16);
        let mut bytes_builder = BinaryBuilder::with_capacity(len, 0);
        let mut info_builder = BinaryBuilder::with_capacity(len, 0);
        let mut annotations_builder = BinaryBuilder::with_capacity(len, len * 16);
        let mut attributes_builder = BinaryBuilder::with_capacity(len, len * 8);

        for record in records {
            id_builder.append_value(&record.id);
            type_builder.append_option(record.media_type);
            path_builder.append_option(record.media_path.as_deref());
            bytes_builder.append_option(record.media_bytes.as_deref());
            info_builder.append_option(record.media_info.as_deref());
            annotations_builder.append_value(&record.annotations);
            attributes_builder.append_value(&record.attributes);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(id_builder.finish()),
            Arc::new(type_builder.finish()),
            Arc::new(path_builder.finish()),
            Arc::new(bytes_builder.finish()),
            Arc::new(info_builder.finish()),
            Arc::new(annotations_builder.finish()),
            Arc::new(attributes_builder.finish()),
        ];

        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    /// Encode a subset into the shard images to be written, in order
    pub fn plan(&self, records: &[ItemRecord]) -> Result<Vec<Vec<u8>>> {
        match self.sharding {
            Sharding::Single => Ok(vec![self.encode_shard(records)?]),
            Sharding::Count(count) => block_ranges(records.len(), count)
                .into_iter()
                .map(|range| self.encode_shard(&records[range]))
                .collect(),
            Sharding::MaxBytes(limit) => {
                if records.is_empty() {
                    return Ok(vec![self.encode_shard(records)?]);
                }
                let empty = self.encode_shard(&[])?.len() as u64;
                let mut shards = Vec::new();
                for range in greedy_ranges(records, empty, limit) {
                    self.encode_bounded(records, range, limit, &mut shards)?;
                }
                Ok(shards)
            }
        }
    }

    /// Encode `range`, halving it until the shard fits or holds one row
    fn encode_bounded(
        &self,
        records: &[ItemRecord],
        range: Range<usize>,
        limit: u64,
        out: &mut Vec<Vec<u8>>,
    ) -> Result<()> {
        let bytes = self.encode_shard(&records[range.clone()])?;
        if bytes.len() as u64 <= limit || range.len() <= 1 {
            out.push(bytes);
            return Ok(());
        }
        let mid = range.start + range.len() / 2;
        self.encode_bounded(records, range.start..mid, limit, out)?;
        self.encode_bounded(records, mid..range.end, limit, out)
    }

    /// Write the shards of `subset` under `root`, replacing previous ones
    ///
    /// New shards land via temp file + rename; shards of the subset with
    /// other names are removed only once all new shards are in place.
    pub fn write_subset(
        &self,
        root: &Path,
        subset: &str,
        records: &[ItemRecord],
    ) -> Result<Vec<PathBuf>> {
        let shards = self.plan(records)?;
        let count = shards.len();

        let mut written = Vec::with_capacity(count);
        for (index, bytes) in shards.iter().enumerate() {
            let path = root.join(shard_file_name(subset, index, count));
            atomic_write(&path, bytes)?;
            debug!(
                "Wrote shard {} ({} bytes)",
                path.display(),
                bytes.len()
            );
            written.push(path);
        }

        if let Some(previous) = list_shards(root)?.remove(subset) {
            for stale in previous.iter().filter(|f| !written.contains(&f.path)) {
                remove_file_if_exists(&stale.path)?;
                debug!("Removed stale shard {}", stale.path.display());
            }
        }

        Ok(written)
    }
}

/// Greedy packing by estimated row size
///
/// `base` is the size of an empty shard. The estimate is only a first cut;
/// [`ShardWriter::encode_bounded`] enforces the limit on real sizes.
fn greedy_ranges(records: &[ItemRecord], base: u64, limit: u64) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut size = base;

    for (i, record) in records.iter().enumerate() {
        let estimate = record.estimated_size();
        if i > start && size + estimate > limit {
            ranges.push(start..i);
            start = i;
            size = base;
        }
        size += estimate;
    }
    ranges.push(start..records.len());
    ranges
}

fn open_reader(path: &Path) -> Result<FileReader<BufReader<File>>> {
    let file = File::open(path).with_path(path)?;
    FileReader::try_new(BufReader::new(file), None)
        .map_err(|e| DatasetError::import(path, format!("not an Arrow IPC file: {}", e)))
}

/// Read only the metadata of a shard (schema footer, no batches)
pub fn read_shard_metadata(path: &Path) -> Result<ShardMetadata> {
    let reader = open_reader(path)?;
    ShardMetadata::from_schema(&reader.schema())
        .map_err(|e| DatasetError::import(path, e.to_string()))
}

/// Read a whole shard
pub fn read_shard(path: &Path) -> Result<(ShardMetadata, Vec<ItemRecord>)> {
    let reader = open_reader(path)?;
    let metadata = ShardMetadata::from_schema(&reader.schema())
        .map_err(|e| DatasetError::import(path, e.to_string()))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| DatasetError::import(path, e.to_string()))?;
        batch_to_records(&batch, path, &mut records)?;
    }
    Ok((metadata, records))
}

fn column<'b, T: Array + 'static>(
    batch: &'b RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'b T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| DatasetError::import(path, format!("missing or mistyped column '{}'", name)))
}

fn batch_to_records(batch: &RecordBatch, path: &Path, out: &mut Vec<ItemRecord>) -> Result<()> {
    let ids = column::<StringArray>(batch, columns::ID, path)?;
    let types = column::<UInt8Array>(batch, columns::MEDIA_TYPE, path)?;
    let paths = column::<StringArray>(batch, columns::MEDIA_PATH, path)?;
    let bytes = column::<BinaryArray>(batch, columns::MEDIA_BYTES, path)?;
    let infos = column::<BinaryArray>(batch, columns::MEDIA_INFO, path)?;
    let annotations = column::<BinaryArray>(batch, columns::ANNOTATIONS, path)?;
    let attributes = column::<BinaryArray>(batch, columns::ATTRIBUTES, path)?;

    for i in 0..batch.num_rows() {
        if ids.is_null(i) {
            return Err(DatasetError::import(path, format!("row {} has no id", i)));
        }
        out.push(ItemRecord {
            id: ids.value(i).to_string(),
            media_type: (!types.is_null(i)).then(|| types.value(i)),
            media_path: (!paths.is_null(i)).then(|| paths.value(i).to_string()),
            media_bytes: (!bytes.is_null(i)).then(|| bytes.value(i).to_vec()),
            media_info: (!infos.is_null(i)).then(|| infos.value(i).to_vec()),
            annotations: annotations.value(i).to_vec(),
            attributes: attributes.value(i).to_vec(),
        });
    }
    Ok(())
}
