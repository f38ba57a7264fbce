//! Stagecrawl: a resumable, bounded-concurrency crawl pipeline
//!
//! This crate implements a chain of alternating stages. A scheduling stage turns
//! a batch of input records into fetchable task descriptors; a crawl stage fetches
//! every descriptor concurrently behind an admission gate, hands each body to a
//! parse strategy and collects the produced records. Every stage can persist its
//! output to a named slot so an interrupted run resumes without redoing work.
//!
//! # Example
//!
//! ```no_run
//! use stagecrawl::crawler::{CrawlStage, HttpFetcher};
//! use stagecrawl::pipeline::chain;
//! use stagecrawl::stage::{SchedulingStage, TaskDescriptor};
//! use stagecrawl::storage::SlotStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> stagecrawl::Result<()> {
//! let store = SlotStore::new("./slots", "letters");
//! let fetcher = Arc::new(HttpFetcher::with_defaults()?);
//!
//! let mut schedule = SchedulingStage::new("letter", store.clone(), |_: &[String]| {
//!     Ok::<_, String>(
//!         ('A'..='C')
//!             .map(|c| TaskDescriptor::new(format!("https://example.com/{c}"), c.to_string()))
//!             .collect(),
//!     )
//! })?;
//!
//! let mut crawl = CrawlStage::new("letter", store, fetcher, |body: &str, letter: &String| {
//!     Ok::<_, String>(Some(vec![format!("{letter}: {} bytes", body.len())]))
//! })?;
//!
//! chain(&mut schedule, &mut crawl).await?;
//! crawl.save()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod pipeline;
pub mod progress;
pub mod stage;
pub mod storage;

use thiserror::Error;

/// Main error type for pipeline operations
///
/// Only fatal errors travel through this type. Per-task failures (a fetch that
/// could not connect, a parse strategy that rejected a body) are recorded by the
/// crawl stage and never abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid pipeline composition: {0}")]
    Configuration(String),

    #[error("Scheduling stage '{stage}' failed: {message}")]
    Schedule { stage: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use crawler::{CrawlStage, Fetch, FetchError, HttpFetcher};
pub use pipeline::{chain, retry, Feed};
pub use progress::ProgressTracker;
pub use stage::{SchedulingStage, Stage, StageKind, StageState, TaskDescriptor};
pub use storage::{SlotKey, SlotKind, SlotStore};
