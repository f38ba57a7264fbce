//! Configuration module for Stagecrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use stagecrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("pipeline.toml")).unwrap();
//! println!("Admission gate size: {}", config.pipeline.max_in_flight);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    HttpConfig, PipelineConfig, PipelineSection, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REFRESH_INTERVAL_MS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
