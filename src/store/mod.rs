//! Sharded Arrow IPC dataset store
//!
//! This module provides:
//! - On-disk layout: shard naming, listing, out-of-line media paths
//! - Shard schema and self-describing metadata
//! - Shard writer honoring chunk size, shard count and shard size limits
//! - Full export and incremental save
//! - Import and format detection

pub mod exporter;
pub mod importer;
pub mod layout;
pub mod record;
pub mod schema;
pub mod shard;

pub use exporter::{Exporter, SaveReport};
pub use importer::{ImportOptions, Importer};
pub use layout::{list_shards, ShardFile};
pub use schema::ShardMetadata;
pub use shard::ShardWriter;
