//! # markly-core
//!
//! Core types, traits, and abstractions for the markly AI batch-enrichment
//! engine.
//!
//! This crate provides the job, bookmark and tag models, the store and
//! analyzer traits the engine consumes, and the tag-name reconciliation
//! rules. Enable the `mock` feature for in-memory stores used by tests.

pub mod defaults;
pub mod error;
pub mod models;
pub mod tags;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use tags::{map_tag_names_to_ids, normalize_tag_name, sanitize_tag_names, unmatched_tag_names};
pub use traits::*;
