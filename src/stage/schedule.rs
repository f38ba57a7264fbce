//! Scheduling stage
//!
//! Wraps a pure, user-supplied strategy that derives task descriptors from an
//! input batch. The stage owns the resumability bookkeeping around it: slot
//! loading at construction, the `ready` flag, and saving.

use crate::stage::{Stage, StageKind, StageState, TaskDescriptor};
use crate::storage::{SlotKey, SlotStore};
use crate::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

type ScheduleFn<I, C> =
    Box<dyn Fn(&[I]) -> std::result::Result<Vec<TaskDescriptor<C>>, String> + Send + Sync>;

/// Turns a batch of input records into an ordered list of task descriptors
///
/// `I` is the record type received from the previous crawl stage (or the seed
/// batch), `C` the context carried by each produced descriptor.
pub struct SchedulingStage<I, C> {
    name: String,
    store: SlotStore,
    key: SlotKey,
    state: StageState<TaskDescriptor<C>>,
    schedule: ScheduleFn<I, C>,
}

impl<I, C> SchedulingStage<I, C>
where
    C: Clone + Serialize + DeserializeOwned,
{
    /// Creates a scheduling stage, restoring its slot if one exists
    ///
    /// # Arguments
    ///
    /// * `name` - Stage name, used for its slot key
    /// * `store` - Slot store of the pipeline run
    /// * `schedule` - Strategy mapping an input batch to task descriptors
    ///
    /// # Returns
    ///
    /// * `Ok(SchedulingStage)` - Ready if a slot was loaded, pending otherwise
    /// * `Err(PipelineError)` - An existing slot could not be read
    pub fn new<F, E>(name: impl Into<String>, store: SlotStore, schedule: F) -> Result<Self>
    where
        F: Fn(&[I]) -> std::result::Result<Vec<TaskDescriptor<C>>, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let name = name.into();
        let key = store.key(&name, StageKind::Scheduling.slot_kind());

        let state = match store.load(&key)? {
            Some(items) => {
                tracing::info!("{} loaded.", key);
                StageState::loaded(items)
            }
            None => StageState::new(),
        };

        Ok(Self {
            name,
            store,
            key,
            state,
            schedule: Box::new(move |input| schedule(input).map_err(|e| e.to_string())),
        })
    }

    /// Runs the schedule strategy once over `input` and marks the stage ready
    ///
    /// A stage restored from its slot is already ready; advancing it does not
    /// invoke the strategy again. A failing strategy aborts the pipeline.
    pub fn advance(&mut self, input: &[I]) -> Result<()> {
        if self.state.is_ready() {
            tracing::debug!("Stage '{}' already ready, not rescheduling", self.name);
            return Ok(());
        }

        let tasks = (self.schedule)(input).map_err(|message| PipelineError::Schedule {
            stage: self.name.clone(),
            message,
        })?;

        tracing::info!(
            "Stage '{}' scheduled {} tasks from {} inputs",
            self.name,
            tasks.len(),
            input.len()
        );

        self.state.extend(tasks);
        self.state.mark_ready();
        Ok(())
    }

    /// Task descriptors currently held, nulls excluded
    pub fn data(&self) -> Vec<TaskDescriptor<C>> {
        self.state.data()
    }

    pub fn state(&self) -> &StageState<TaskDescriptor<C>> {
        &self.state
    }

    /// Replaces the held descriptors with the ones that failed downstream
    ///
    /// Chaining this stage into its crawl stage again then retries only those.
    pub fn replace_with_failures(&mut self, failed: Vec<TaskDescriptor<C>>) {
        self.state.replace(failed);
    }

    /// Persists the held descriptors unless the slot already exists
    pub fn save(&self) -> Result<bool> {
        Ok(self.store.save(&self.key, self.state.accumulated())?)
    }

    /// Persists the held descriptors, replacing an existing slot
    ///
    /// Used after a retry so the slot reflects what still failed.
    pub fn save_forced(&self) -> Result<()> {
        Ok(self.store.save_forced(&self.key, self.state.accumulated())?)
    }
}

impl<I, C> Stage for SchedulingStage<I, C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Scheduling
    }

    fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    fn slot_key(&self) -> &SlotKey {
        &self.key
    }
}

impl<I, C> fmt::Debug for SchedulingStage<I, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulingStage")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("ready", &self.state.is_ready())
            .field("accumulated", &self.state.accumulated().len())
            .finish()
    }
}
