//! Integration tests for stagecrawl pipelines

mod crawl_tests;
mod resume_tests;
