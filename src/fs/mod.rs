//! File system helpers
//!
//! Atomic replace-by-rename writes and tolerant removal used by the
//! shard writer and media writer.

mod atomic;

pub use atomic::*;
