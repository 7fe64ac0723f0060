//! Error types for dsarrow
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dataset operations
#[derive(Error, Debug)]
pub enum DatasetError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory does not hold a readable dataset of this format
    #[error("Failed to import dataset from '{path}': {message}")]
    Import { path: PathBuf, message: String },

    /// `save()` called on a dataset that was never exported or imported
    #[error("Dataset is not bound to an export location; call export() first")]
    NotBound,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Arrow encoding/decoding error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Image encoding/decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Annotation or metadata (de)serialization error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Item lookup failed
    #[error("Item '{id}' not found in subset '{subset}'")]
    ItemNotFound { id: String, subset: String },

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        count: usize,
        errors: Vec<DatasetError>,
    },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DatasetError>,
    },
}

impl DatasetError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an import error for a directory or shard file
    pub fn import(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Import {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is an import error (possibly wrapped in context)
    pub fn is_import_error(&self) -> bool {
        match self {
            Self::Import { .. } => true,
            Self::WithContext { source, .. } => source.is_import_error(),
            Self::MultipleErrors { errors, .. } => errors.iter().any(|e| e.is_import_error()),
            _ => false,
        }
    }
}

/// Result type alias for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        DatasetError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        DatasetError::Encoding(err.to_string())
    }
}

impl From<bincode::Error> for DatasetError {
    fn from(err: bincode::Error) -> Self {
        DatasetError::Encoding(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| DatasetError::io(path, e))
    }
}

/// Collects multiple results into a single result
pub fn collect_errors<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(successes),
        1 => Err(errors.remove(0)),
        count => Err(DatasetError::MultipleErrors { count, errors }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DatasetError::io("/test/path", io_err).with_context("reading shard");
        assert_eq!(
            err.to_string(),
            "reading shard: I/O error at '/test/path': file not found"
        );
    }

    #[test]
    fn test_import_error_through_context() {
        let err = DatasetError::import("/data", "no shards").with_context("loading");
        assert!(err.is_import_error());
        assert!(!DatasetError::NotBound.is_import_error());
    }

    #[test]
    fn test_collect_errors() {
        let results: Vec<Result<i32>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(collect_errors(results).unwrap(), vec![1, 2, 3]);

        let results: Vec<Result<i32>> = vec![
            Ok(1),
            Err(DatasetError::NotBound),
            Err(DatasetError::config("bad")),
        ];
        match collect_errors(results) {
            Err(DatasetError::MultipleErrors { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
