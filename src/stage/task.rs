use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of work for a crawl stage: what to fetch and what its parse step needs
///
/// `context` is opaque to the engine; it is handed back to the parse strategy
/// together with the fetched body (e.g. the artist a song listing belongs to).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDescriptor<C = ()> {
    /// Fetch key, typically a URL
    pub target: String,

    /// Immutable data for the parse step
    pub context: C,
}

impl<C> TaskDescriptor<C> {
    pub fn new(target: impl Into<String>, context: C) -> Self {
        Self {
            target: target.into(),
            context,
        }
    }
}

impl TaskDescriptor<()> {
    /// A descriptor whose parse step needs nothing beyond the body
    pub fn target_only(target: impl Into<String>) -> Self {
        Self::new(target, ())
    }
}

impl<C> fmt::Display for TaskDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)
    }
}
