//! In-memory data model
//!
//! Items, media payloads, annotations and dataset-level categories.

mod annotation;
mod categories;
mod item;
mod media;

pub use annotation::*;
pub use categories::*;
pub use item::*;
pub use media::*;
