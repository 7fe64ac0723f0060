//! Content hashing of dataset directories
//!
//! Provides fast XXHash3 digests of files and snapshot diffs used to check
//! which files an export or save touched.

mod snapshot;

pub use snapshot::*;
