//! # markly-inference
//!
//! Client for the external AI website analyzer used by the batch
//! enrichment runner.
//!
//! ```rust,ignore
//! use markly_inference::HttpWebsiteAnalyzer;
//! use markly_core::WebsiteAnalyzer;
//!
//! let analyzer = HttpWebsiteAnalyzer::from_env()?;
//! let analysis = analyzer
//!     .analyze("https://www.rust-lang.org", &["Rust".to_string()], "user-1")
//!     .await?;
//! println!("{} tagged {:?}", analysis.title, analysis.tags);
//! ```

pub mod http;

pub use http::{AnalyzerConfig, HttpWebsiteAnalyzer};
