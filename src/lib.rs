//! # dsarrow - Sharded Arrow Dataset Store
//!
//! dsarrow keeps annotated datasets (images, point clouds, labels, boxes,
//! polygons, captions) on disk as Arrow IPC shard files, one group of
//! shards per subset. Saving a modified dataset rewrites only the subsets
//! that changed; every other file stays byte-for-byte identical.
//!
//! ## Features
//!
//! - **Self-describing shards**: every shard carries categories, infos and
//!   export options in its schema metadata
//! - **Flexible sharding**: record batch size, exact shard count or a
//!   shard size cap
//! - **Incremental save**: explicit change set per dataset handle
//! - **Atomic writes**: temp file + rename, never a half-written shard
//! - **Media handling**: embedded or out-of-line, optional PNG/TIFF/JPEG
//!   re-encoding
//!
//! ## Quick Start
//!
//! ```no_run
//! use dsarrow::prelude::*;
//!
//! let mut dataset = Dataset::from_items([
//!     DatasetItem::new(1).with_subset("train"),
//!     DatasetItem::new(2).with_subset("test"),
//! ]);
//! dataset.export("/data/my_dataset", ExportOptions::default()).unwrap();
//!
//! // Only the "test" subset is rewritten
//! dataset.put(DatasetItem::new(3).with_subset("test"));
//! dataset.save(true).unwrap();
//!
//! let loaded = Dataset::import("/data/my_dataset").unwrap();
//! assert_eq!(loaded.len(), 3);
//! ```
//!
//! ## Sharding
//!
//! ```no_run
//! use dsarrow::prelude::*;
//!
//! let options = ExportOptions::default()
//!     .max_chunk_size(20)
//!     .max_shard_size(parse_size("1M").unwrap())
//!     .image_ext(ImageExt::Jpeg { quality: 95 });
//!
//! let mut dataset = Dataset::new();
//! dataset.export("/data/sharded", options).unwrap();
//! ```
//!
//! Concurrent `save`/`export` calls against the same directory are not
//! guarded; callers must serialize them.

#![warn(clippy::all)]

pub mod config;
pub mod dataset;
pub mod env;
pub mod error;
pub mod fs;
pub mod hash;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use config::{ExportOptions, ImageExt};
pub use dataset::{ChangeSet, Dataset, ItemChange};
pub use env::Environment;
pub use error::{DatasetError, Result};
pub use store::{Exporter, ImportOptions, Importer, SaveReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use dsarrow::prelude::*;
    //! ```

    pub use crate::config::{parse_size, ExportOptions, ImageExt};
    pub use crate::dataset::{random_split, ChangeSet, Dataset, ItemChange};
    pub use crate::env::{Environment, FormatDetector};
    pub use crate::error::{DatasetError, Result};
    pub use crate::hash::{DirectorySnapshot, SnapshotDiff};
    pub use crate::model::{
        Annotation, AnnotationKind, Categories, DatasetItem, Image, Infos, LabelCategories,
        MediaElement, Pixels, PointCloud,
    };
    pub use crate::store::{Exporter, ImportOptions, Importer, SaveReport};
}
