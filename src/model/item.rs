//! Dataset items

use crate::model::{Annotation, AttributeValue, Attributes, MediaElement};
use crate::error::Result;

/// Subset name used for items without an explicit subset
pub const DEFAULT_SUBSET_NAME: &str = "default";

/// A single dataset item, identified by `(id, subset)`
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetItem {
    /// Item id
    pub id: String,
    /// Subset name
    pub subset: String,
    /// Optional media payload
    pub media: Option<MediaElement>,
    /// Annotations
    pub annotations: Vec<Annotation>,
    /// Item attributes
    pub attributes: Attributes,
}

impl DatasetItem {
    /// Create an item in the default subset
    pub fn new(id: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            subset: DEFAULT_SUBSET_NAME.to_string(),
            media: None,
            annotations: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    /// Set the subset
    pub fn with_subset(mut self, subset: impl Into<String>) -> Self {
        let subset = subset.into();
        self.subset = if subset.is_empty() {
            DEFAULT_SUBSET_NAME.to_string()
        } else {
            subset
        };
        self
    }

    /// Attach media
    pub fn with_media(mut self, media: impl Into<MediaElement>) -> Self {
        self.media = Some(media.into());
        self
    }

    /// Set annotations
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Add an item attribute
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// `(id, subset)` identity key
    pub fn key(&self) -> (String, String) {
        (self.id.clone(), self.subset.clone())
    }

    /// Strict comparison: identity, annotations, attributes and decoded media
    pub fn same_content(&self, other: &DatasetItem) -> Result<bool> {
        if self.id != other.id
            || self.subset != other.subset
            || self.annotations != other.annotations
            || self.attributes != other.attributes
        {
            return Ok(false);
        }
        match (&self.media, &other.media) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => a.same_content(b),
            _ => Ok(false),
        }
    }
}
