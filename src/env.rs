//! Registry of dataset format detectors
//!
//! Several formats can share a directory-based layout; the environment asks
//! every registered detector and reports all formats that match.

use crate::store::Importer;
use std::path::Path;
use tracing::debug;

/// Something that can recognize a dataset format on disk
pub trait FormatDetector: Send + Sync {
    /// Format name
    fn name(&self) -> &str;

    /// Whether `path` holds a dataset in this format
    fn detect(&self, path: &Path) -> bool;
}

/// The sharded Arrow format of this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowFormat;

impl FormatDetector for ArrowFormat {
    fn name(&self) -> &str {
        Importer::NAME
    }

    fn detect(&self, path: &Path) -> bool {
        Importer::detect(path)
    }
}

/// Known formats
pub struct Environment {
    detectors: Vec<Box<dyn FormatDetector>>,
}

impl Default for Environment {
    fn default() -> Self {
        let mut env = Self::empty();
        env.register(ArrowFormat);
        env
    }
}

impl Environment {
    /// Registry with the built-in formats
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without any formats
    pub fn empty() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Add a format; a format with the same name is replaced
    pub fn register(&mut self, detector: impl FormatDetector + 'static) {
        self.detectors.retain(|d| d.name() != detector.name());
        self.detectors.push(Box::new(detector));
    }

    /// Names of registered formats
    pub fn formats(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Names of all formats matching `path`
    pub fn detect_dataset(&self, path: &Path) -> Vec<String> {
        let matches: Vec<String> = self
            .detectors
            .iter()
            .filter(|d| d.detect(path))
            .map(|d| d.name().to_string())
            .collect();
        debug!("{} matches formats {:?}", path.display(), matches);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportOptions;
    use crate::dataset::Dataset;
    use crate::model::DatasetItem;
    use tempfile::TempDir;

    /// Directories with an `annotations.json` file
    struct JsonFormat;

    impl FormatDetector for JsonFormat {
        fn name(&self) -> &str {
            "json"
        }

        fn detect(&self, path: &Path) -> bool {
            path.join("annotations.json").is_file()
        }
    }

    #[test]
    fn test_builtin_formats() {
        assert_eq!(Environment::new().formats(), vec!["arrow"]);
        assert!(Environment::empty().formats().is_empty());
    }

    #[test]
    fn test_detect_dataset_disambiguates() {
        let mut env = Environment::new();
        env.register(JsonFormat);

        let arrow_dir = TempDir::new().unwrap();
        let mut dataset = Dataset::from_items([DatasetItem::new(1)]);
        dataset.export(arrow_dir.path(), ExportOptions::default()).unwrap();
        assert_eq!(env.detect_dataset(arrow_dir.path()), vec!["arrow"]);

        let json_dir = TempDir::new().unwrap();
        std::fs::write(json_dir.path().join("annotations.json"), b"{}").unwrap();
        assert_eq!(env.detect_dataset(json_dir.path()), vec!["json"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut env = Environment::new();
        env.register(ArrowFormat);
        assert_eq!(env.formats().len(), 1);
    }
}
