//! Stage module: the units a pipeline is built from
//!
//! This module provides:
//! - `TaskDescriptor`: a fetch target plus the context its parse step needs
//! - `StageState`: the per-stage accumulator and its `ready` flag
//! - `SchedulingStage`: wraps a user-supplied schedule strategy
//! - `Stage`: the interface both stage kinds expose to the pipeline
//!
//! The crawl stage lives in the `crawler` module.

mod schedule;
mod state;
mod task;

pub use schedule::SchedulingStage;
pub use state::StageState;
pub use task::TaskDescriptor;

use crate::storage::{SlotKey, SlotKind};
use std::fmt;

/// The two kinds of stage a pipeline alternates between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Turns an input batch into task descriptors
    Scheduling,
    /// Fetches and parses task descriptors into records
    Crawl,
}

impl StageKind {
    /// Slot kind used to persist this stage's output
    pub fn slot_kind(&self) -> SlotKind {
        match self {
            Self::Scheduling => SlotKind::Schedule,
            Self::Crawl => SlotKind::Crawl,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduling => write!(f, "scheduling"),
            Self::Crawl => write!(f, "crawl"),
        }
    }
}

/// Common interface of pipeline stages
pub trait Stage {
    /// Stage name, also the stage part of its slot key
    fn name(&self) -> &str;

    fn kind(&self) -> StageKind;

    /// True once the stage holds output for this run, computed or loaded
    fn is_ready(&self) -> bool;

    fn slot_key(&self) -> &SlotKey;
}
