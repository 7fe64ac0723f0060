//! Arrow schema and self-describing metadata of shard files

use crate::config::ExportOptions;
use crate::error::{DatasetError, Result};
use crate::model::{Categories, Infos};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Value of [`ShardMetadata::format`] identifying this format
pub const FORMAT_SIGNATURE: &str = "dsarrow";

/// Current shard layout version
pub const FORMAT_VERSION: &str = "1.0";

/// Schema metadata key holding the JSON-encoded [`ShardMetadata`]
///
/// Everything lives under a single key: Arrow keeps schema metadata in a
/// `HashMap`, and several keys would be written in random order.
pub const METADATA_KEY: &str = "dsarrow.meta";

/// Column names
pub mod columns {
    /// Item id
    pub const ID: &str = "id";
    /// Media kind code (null = no media)
    pub const MEDIA_TYPE: &str = "media_type";
    /// Original relative media path
    pub const MEDIA_PATH: &str = "media_path";
    /// Embedded media bytes
    pub const MEDIA_BYTES: &str = "media_bytes";
    /// bincode-encoded media details
    pub const MEDIA_INFO: &str = "media_info";
    /// bincode-encoded annotations
    pub const ANNOTATIONS: &str = "annotations";
    /// bincode-encoded item attributes
    pub const ATTRIBUTES: &str = "attributes";
}

/// Metadata stored in every shard
///
/// Identical for all shards of a dataset apart from `subset`, which is
/// what lets any single shard be decoded on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMetadata {
    /// Format signature
    pub format: String,
    /// Layout version
    pub version: String,
    /// Subset the shard belongs to
    pub subset: String,
    /// Dataset categories
    pub categories: Categories,
    /// Dataset infos
    pub infos: Infos,
    /// Options the dataset was exported with
    pub options: ExportOptions,
}

impl ShardMetadata {
    /// Metadata for a shard of `subset`
    pub fn new(
        subset: &str,
        categories: &Categories,
        infos: &Infos,
        options: &ExportOptions,
    ) -> Self {
        Self {
            format: FORMAT_SIGNATURE.to_string(),
            version: FORMAT_VERSION.to_string(),
            subset: subset.to_string(),
            categories: categories.clone(),
            infos: infos.clone(),
            options: options.clone(),
        }
    }

    /// Whether two shards agree on dataset-level metadata
    pub fn is_consistent_with(&self, other: &ShardMetadata) -> bool {
        self.categories == other.categories
            && self.infos == other.infos
            && self.options == other.options
    }

    /// Serialize into Arrow schema metadata
    pub fn to_schema_metadata(&self) -> Result<HashMap<String, String>> {
        let json = serde_json::to_string(self)?;
        Ok(HashMap::from([(METADATA_KEY.to_string(), json)]))
    }

    /// Read from Arrow schema metadata
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let json = schema.metadata().get(METADATA_KEY).ok_or_else(|| {
            DatasetError::Encoding(format!("missing '{}' schema metadata", METADATA_KEY))
        })?;
        Ok(serde_json::from_str(json)?)
    }
}

/// Schema of shard record batches, carrying `metadata`
pub fn item_schema(metadata: &ShardMetadata) -> Result<SchemaRef> {
    let fields = vec![
        Field::new(columns::ID, DataType::Utf8, false),
        Field::new(columns::MEDIA_TYPE, DataType::UInt8, true),
        Field::new(columns::MEDIA_PATH, DataType::Utf8, true),
        Field::new(columns::MEDIA_BYTES, DataType::Binary, true),
        Field::new(columns::MEDIA_INFO, DataType::Binary, true),
        Field::new(columns::ANNOTATIONS, DataType::Binary, false),
        Field::new(columns::ATTRIBUTES, DataType::Binary, false),
    ];

    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        metadata.to_schema_metadata()?,
    )))
}

/// Media details that do not fit the flat columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// `(height, width)` of an image, when known
    pub size: Option<(u32, u32)>,
    /// Relative path of the out-of-line media file
    pub file: Option<String>,
    /// Related images of a point cloud
    pub extra_images: Vec<ExtraImage>,
}

/// A related image of a point cloud
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraImage {
    /// Original relative path
    pub path: Option<String>,
    /// Embedded bytes
    pub bytes: Option<Vec<u8>>,
    /// Relative path of the out-of-line file
    pub file: Option<String>,
    /// `(height, width)`, when known
    pub size: Option<(u32, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelCategories;

    #[test]
    fn test_metadata_roundtrip_through_schema() {
        let mut infos = Infos::new();
        infos.insert("author".to_string(), serde_json::json!("тест"));
        let categories = Categories::with_labels(LabelCategories::from_names(["猫", "dog"]));
        let meta = ShardMetadata::new("train", &categories, &infos, &ExportOptions::default());

        let schema = item_schema(&meta).unwrap();
        assert_eq!(schema.fields().len(), 7);
        assert_eq!(ShardMetadata::from_schema(&schema).unwrap(), meta);
    }

    #[test]
    fn test_metadata_json_is_stable() {
        let mut infos = Infos::new();
        infos.insert("b".to_string(), serde_json::json!(2));
        infos.insert("a".to_string(), serde_json::json!({"z": 1, "y": 2}));
        let meta =
            ShardMetadata::new("s", &Categories::default(), &infos, &ExportOptions::default());

        let first = meta.to_schema_metadata().unwrap();
        let second = meta.clone().to_schema_metadata().unwrap();
        assert_eq!(first, second);
        let json = &first[METADATA_KEY];
        assert!(json.find("\"a\"").unwrap() < json.find("\"b\"").unwrap());
    }

    #[test]
    fn test_consistency_ignores_subset() {
        let options = ExportOptions::default();
        let a = ShardMetadata::new("a", &Categories::default(), &Infos::new(), &options);
        let b = ShardMetadata::new("b", &Categories::default(), &Infos::new(), &options);
        assert!(a.is_consistent_with(&b));

        let c = ShardMetadata::new(
            "a",
            &Categories::with_labels(LabelCategories::from_names(["x"])),
            &Infos::new(),
            &options,
        );
        assert!(!a.is_consistent_with(&c));
    }
}
