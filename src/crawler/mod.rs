//! Crawler module: the fetch-and-parse half of the pipeline
//!
//! This module contains:
//! - The crawl stage, a bounded-concurrency fetch/parse executor
//! - The fetch collaborator seam and its HTTP implementation
//! - Per-task failure types

mod executor;
mod fetcher;

pub use executor::{CrawlFailure, CrawlStage};
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher};
