//! # markly-jobs
//!
//! Batch enrichment jobs for markly.
//!
//! This crate provides:
//! - A job manager that starts, pauses and recovers per-user batch jobs
//! - A bounded-concurrency runner with per-item failure isolation
//! - Per-bookmark enrichment through the website analyzer
//! - Lifecycle notifications via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use markly_db::Database;
//! use markly_inference::HttpWebsiteAnalyzer;
//! use markly_jobs::{BatchConfig, BatchJobManager, JobRegistry};
//!
//! let db = Database::connect("postgres://...").await?;
//! let analyzer = Arc::new(HttpWebsiteAnalyzer::from_env()?);
//! let manager = BatchJobManager::from_database(
//!     &db,
//!     analyzer,
//!     JobRegistry::new(),
//!     BatchConfig::from_env(),
//! );
//!
//! let mut events = manager.subscribe();
//! let job = manager.start("user-1", manager.config().default_request()).await?;
//! while let Ok(event) = events.recv().await {
//!     if event.job_id() == job.id && event.is_final() {
//!         break;
//!     }
//! }
//!
//! // Abort runners on shutdown; their jobs are recovered on the next read.
//! manager.shutdown();
//! ```

pub mod config;
pub mod enrich;
pub mod events;
pub mod manager;
pub mod registry;
pub mod runner;

// Re-export core types
pub use markly_core::*;

pub use config::BatchConfig;
pub use enrich::{enrich_bookmark, EnrichContext, TagCache};
pub use events::BatchJobEvent;
pub use manager::BatchJobManager;
pub use registry::{JobRegistry, StartGuard};
pub use runner::{clamp_limit, run_batch, BatchRunSummary};
