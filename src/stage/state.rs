/// Per-stage accumulator
///
/// `accumulated` may hold `None` entries (a persisted slot can contain nulls);
/// `data` never yields them. A stage should only be read through `data` once it
/// is `ready`.
#[derive(Debug, Clone)]
pub struct StageState<T> {
    accumulated: Vec<Option<T>>,
    ready: bool,
}

impl<T> StageState<T> {
    pub fn new() -> Self {
        Self {
            accumulated: Vec::new(),
            ready: false,
        }
    }

    /// State restored from a slot; ready immediately
    pub fn loaded(accumulated: Vec<Option<T>>) -> Self {
        Self {
            accumulated,
            ready: true,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn accumulated(&self) -> &[Option<T>] {
        &self.accumulated
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        self.accumulated.extend(items.into_iter().map(Some));
    }

    /// Replaces the accumulated output wholesale
    pub fn replace(&mut self, items: impl IntoIterator<Item = T>) {
        self.accumulated = items.into_iter().map(Some).collect();
    }

    /// Non-null entries, in accumulation order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.accumulated.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<T: Clone> StageState<T> {
    /// Owned copy of the non-null entries
    pub fn data(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Default for StageState<T> {
    fn default() -> Self {
        Self::new()
    }
}
