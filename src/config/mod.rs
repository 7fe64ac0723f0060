//! Configuration module for dsarrow
//!
//! Provides configuration management including CLI arguments
//! and export options.

mod settings;

pub use settings::*;
