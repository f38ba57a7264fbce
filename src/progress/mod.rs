//! Progress module for live crawl instrumentation
//!
//! This module provides a progress and health reporter that every concurrent
//! worker of one crawl run shares:
//!
//! - `ProgressTracker`: lock-free completion and failure counters, a one-shot
//!   completion signal, and a background display loop
//! - `ProgressSnapshot`: a point-in-time read of the counters with the derived
//!   ratio, throughput, ETA and health figures
//! - Rendering helpers for the in-place progress line

mod display;
mod tracker;

pub use display::{format_hms, render_bar, render_line, Eta, HealthBand, BAR_STEPS};
pub use tracker::{ProgressSnapshot, ProgressTracker, DEFAULT_LABEL, MIN_REFRESH};
