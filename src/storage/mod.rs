//! Storage module for persisting stage output
//!
//! This module handles the resumability layer of the pipeline:
//! - Slot keys naming one stage's persisted output
//! - The file-backed slot store (save without overwrite, load, inspect)
//! - Storage error types
//!
//! A slot holds one stage's accumulated sequence. Once written it is treated as
//! committed: re-running a pipeline with the same slot keys loads the slot instead
//! of recomputing the stage.

mod file;

pub use file::{SlotEntry, SlotStore};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during slot operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Slot {} does not hold a valid record sequence: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The two kinds of stage that own a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Output of a scheduling stage (task descriptors, or the retry worklist)
    Schedule,
    /// Output of a crawl stage (parsed records)
    Crawl,
}

impl SlotKind {
    /// File suffix used for slots of this kind
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Schedule => "sch",
            Self::Crawl => "crl",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "sch" => Some(Self::Schedule),
            "crl" => Some(Self::Crawl),
            _ => None,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::Crawl => write!(f, "crawl"),
        }
    }
}

/// Identifies one persisted slot: `(pipeline, stage, kind)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub pipeline: String,
    pub stage: String,
    pub kind: SlotKind,
}

impl SlotKey {
    pub fn new(pipeline: impl Into<String>, stage: impl Into<String>, kind: SlotKind) -> Self {
        Self {
            pipeline: pipeline.into(),
            stage: stage.into(),
            kind,
        }
    }

    /// Deterministic file name for this slot
    ///
    /// `<pipeline>.<stage>.<suffix>`, or `<stage>.<suffix>` for an unnamed pipeline.
    pub fn file_name(&self) -> String {
        if self.pipeline.is_empty() {
            format!("{}.{}", self.stage, self.kind.suffix())
        } else {
            format!("{}.{}.{}", self.pipeline, self.stage, self.kind.suffix())
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.file_name())
    }
}
