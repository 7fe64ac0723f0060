//! Annotations and typed attributes attached to dataset items

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Free-form text
    Str(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Ordered attribute map; ordering keeps encoded bytes stable
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Geometry and payload of an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationKind {
    /// Whole-item class label
    Label { label: u32 },
    /// Axis-aligned box, top-left corner plus size
    Bbox {
        label: Option<u32>,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    },
    /// Keypoints as flat `[x0, y0, x1, y1, ...]`
    Points { label: Option<u32>, points: Vec<f32> },
    /// Closed polygon as flat `[x0, y0, x1, y1, ...]`
    Polygon { label: Option<u32>, points: Vec<f32> },
    /// Text caption
    Caption { caption: String },
}

/// An annotation of a dataset item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation id, unique within the item
    pub id: u64,
    /// Group id linking related annotations (0 = ungrouped)
    pub group: u64,
    /// Kind-specific data
    pub kind: AnnotationKind,
    /// Extra attributes
    pub attributes: Attributes,
}

impl Annotation {
    /// Create an annotation with no id, group or attributes
    pub fn new(kind: AnnotationKind) -> Self {
        Self {
            id: 0,
            group: 0,
            kind,
            attributes: Attributes::new(),
        }
    }

    /// Whole-item label
    pub fn label(label: u32) -> Self {
        Self::new(AnnotationKind::Label { label })
    }

    /// Bounding box
    pub fn bbox(x: f32, y: f32, w: f32, h: f32, label: Option<u32>) -> Self {
        Self::new(AnnotationKind::Bbox { label, x, y, w, h })
    }

    /// Polygon
    pub fn polygon(points: Vec<f32>, label: Option<u32>) -> Self {
        Self::new(AnnotationKind::Polygon { label, points })
    }

    /// Keypoints
    pub fn points(points: Vec<f32>, label: Option<u32>) -> Self {
        Self::new(AnnotationKind::Points { label, points })
    }

    /// Caption
    pub fn caption(caption: impl Into<String>) -> Self {
        Self::new(AnnotationKind::Caption {
            caption: caption.into(),
        })
    }

    /// Set the annotation id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Set the group id
    pub fn with_group(mut self, group: u64) -> Self {
        self.group = group;
        self
    }

    /// Add an attribute
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Label index, if this kind carries one
    pub fn label_id(&self) -> Option<u32> {
        match &self.kind {
            AnnotationKind::Label { label } => Some(*label),
            AnnotationKind::Bbox { label, .. }
            | AnnotationKind::Points { label, .. }
            | AnnotationKind::Polygon { label, .. } => *label,
            AnnotationKind::Caption { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_id() {
        assert_eq!(Annotation::label(3).label_id(), Some(3));
        assert_eq!(Annotation::bbox(0.0, 0.0, 1.0, 1.0, None).label_id(), None);
        assert_eq!(Annotation::caption("hello").label_id(), None);
    }

    #[test]
    fn test_bincode_roundtrip_keeps_attributes() {
        let ann = Annotation::polygon(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0], Some(2))
            .with_id(7)
            .with_group(1)
            .with_attribute("occluded", true)
            .with_attribute("score", 0.5)
            .with_attribute("note", "кот");

        let bytes = bincode::serialize(&ann).unwrap();
        let back: Annotation = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, ann);
    }
}
