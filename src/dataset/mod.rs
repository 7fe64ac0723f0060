//! In-memory datasets
//!
//! This module provides:
//! - `Dataset`: items grouped into subsets, bound to an export location
//! - `ChangeSet`: what changed since the last persist
//! - Transforms such as `random_split`

mod changes;
mod collection;
pub mod transforms;

pub use changes::*;
pub use collection::*;
pub use transforms::random_split;
