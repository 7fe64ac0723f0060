//! Dataset-level categories and info metadata

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One label of a label set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCategory {
    /// Label name
    pub name: String,
    /// Parent label name (empty = none)
    #[serde(default)]
    pub parent: String,
    /// Attribute names allowed for this label
    #[serde(default)]
    pub attributes: BTreeSet<String>,
}

/// Ordered label set; annotation label ids index into it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCategories {
    /// Labels in id order
    pub items: Vec<LabelCategory>,
    /// Attribute names shared by all labels
    #[serde(default)]
    pub attributes: BTreeSet<String>,
}

impl LabelCategories {
    /// Build from label names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories = Self::default();
        for name in names {
            categories.add(name, "");
        }
        categories
    }

    /// Append a label and return its id
    pub fn add(&mut self, name: impl Into<String>, parent: impl Into<String>) -> u32 {
        self.items.push(LabelCategory {
            name: name.into(),
            parent: parent.into(),
            attributes: BTreeSet::new(),
        });
        (self.items.len() - 1) as u32
    }

    /// Find a label id by name
    pub fn find(&self, name: &str) -> Option<u32> {
        self.items.iter().position(|c| c.name == name).map(|i| i as u32)
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the label set is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// All category sets of a dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    /// Label set, if the dataset has labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelCategories>,
}

impl Categories {
    /// Categories with just a label set
    pub fn with_labels(labels: LabelCategories) -> Self {
        Self {
            labels: Some(labels),
        }
    }
}

/// Free-form dataset-level metadata
pub type Infos = BTreeMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_lookup() {
        let labels = LabelCategories::from_names(["cat", "dog", "猫"]);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.find("dog"), Some(1));
        assert_eq!(labels.find("猫"), Some(2));
        assert_eq!(labels.find("bird"), None);
    }
}
