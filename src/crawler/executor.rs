//! Crawl stage - bounded-concurrency fetch and parse
//!
//! This module contains the engine that turns task descriptors into records:
//! - One spawned worker per descriptor
//! - An admission gate bounding the number of outstanding fetches
//! - Per-task failure isolation and accounting
//! - Live progress reporting through a shared `ProgressTracker`
//!
//! The gate throttles request issuance only. A worker gives its permit back as
//! soon as its fetch returns, so parsing never holds a network slot.

use crate::config::{PipelineConfig, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REFRESH_INTERVAL_MS};
use crate::crawler::fetcher::{Fetch, FetchError};
use crate::progress::{ProgressSnapshot, ProgressTracker, MIN_REFRESH};
use crate::stage::{Stage, StageKind, StageState, TaskDescriptor};
use crate::storage::{SlotKey, SlotStore};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type ParseFn<C, R> =
    dyn Fn(&str, &C) -> std::result::Result<Option<Vec<R>>, String> + Send + Sync;

/// Why a single task ended up in the failed set
#[derive(Debug, Clone, Error)]
pub enum CrawlFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Parse failure for {target}: {message}")]
    Parse { target: String, message: String },

    #[error("Worker for {target} terminated abnormally: {message}")]
    Aborted { target: String, message: String },
}

/// Fetches task descriptors concurrently and parses the responses into records
///
/// `C` is the descriptor context type, `R` the record type handed to the next
/// scheduling stage.
pub struct CrawlStage<C, R> {
    name: String,
    store: SlotStore,
    key: SlotKey,
    fetcher: Arc<dyn Fetch>,
    parse: Arc<ParseFn<C, R>>,
    max_in_flight: usize,
    refresh_interval: Duration,
    show_progress: bool,
    state: StageState<R>,
    failed: Vec<TaskDescriptor<C>>,
    last_run: Option<ProgressSnapshot>,
}

impl<C, R> CrawlStage<C, R>
where
    R: Serialize + DeserializeOwned,
{
    /// Creates a crawl stage, restoring its slot if one exists
    ///
    /// # Arguments
    ///
    /// * `name` - Stage name, used for its slot key and progress label
    /// * `store` - Slot store of the pipeline run
    /// * `fetcher` - Fetch collaborator shared by all workers
    /// * `parse` - Strategy turning a fetched body and the descriptor context
    ///   into records; `Ok(None)` means "nothing here", `Err` a parse failure
    pub fn new<F, E>(
        name: impl Into<String>,
        store: SlotStore,
        fetcher: Arc<dyn Fetch>,
        parse: F,
    ) -> Result<Self>
    where
        F: Fn(&str, &C) -> std::result::Result<Option<Vec<R>>, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let name = name.into();
        let key = store.key(&name, StageKind::Crawl.slot_kind());

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
            fetcher,
            parse: Arc::new(move |body: &str, context: &C| {
                parse(body, context).map_err(|e| e.to_string())
            }),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            show_progress: true,
            state,
            failed: Vec::new(),
            last_run: None,
        })
    }

    /// Persists the accumulated records unless the slot already exists
    pub fn save(&self) -> Result<bool> {
        Ok(self.store.save(&self.key, self.state.accumulated())?)
    }

    /// Persists the accumulated records, replacing an existing slot
    pub fn save_forced(&self) -> Result<()> {
        Ok(self.store.save_forced(&self.key, self.state.accumulated())?)
    }
}

impl<C, R> CrawlStage<C, R> {
    /// Sets the admission gate size (at least 1)
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Sets the progress redraw interval (at least `MIN_REFRESH`)
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(MIN_REFRESH);
        self
    }

    /// Enables or disables the progress line on stderr
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Applies the gate size and refresh interval from a pipeline configuration
    pub fn with_config(self, config: &PipelineConfig) -> Self {
        self.with_max_in_flight(config.pipeline.max_in_flight)
            .with_refresh_interval(config.pipeline.refresh_interval())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn state(&self) -> &StageState<R> {
        &self.state
    }

    /// Descriptors that failed during the most recent run
    pub fn failed(&self) -> &[TaskDescriptor<C>] {
        &self.failed
    }

    /// Final counters of the most recent run
    pub fn last_run(&self) -> Option<ProgressSnapshot> {
        self.last_run
    }
}

impl<C, R: Clone> CrawlStage<C, R> {
    /// Records accumulated so far, nulls excluded
    pub fn data(&self) -> Vec<R> {
        self.state.data()
    }
}

impl<C, R> CrawlStage<C, R>
where
    C: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    /// Crawls every descriptor and returns the ones that failed
    ///
    /// Each descriptor is admitted through the gate in order and handed to its
    /// own worker. Connectivity and parse failures are recorded and never abort
    /// the run. Returns once every worker has terminated and the tracker has
    /// seen every completion. Records are appended to the stage's output in
    /// completion order, which is unspecified.
    pub async fn run(&mut self, tasks: Vec<TaskDescriptor<C>>) -> Vec<TaskDescriptor<C>> {
        let total = tasks.len();
        tracing::info!(
            "Stage '{}': crawling {} tasks, at most {} in flight",
            self.name,
            total,
            self.max_in_flight
        );

        let tracker =
            ProgressTracker::with_options(total as u64, Some(self.refresh_interval), &self.name);
        let display = self.show_progress.then(|| tracker.track());

        let gate = Arc::new(Semaphore::new(self.max_in_flight));
        let sink = Arc::new(RunSink::default());

        let mut workers = Vec::with_capacity(total);
        for task in tasks {
            let permit = match gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let failure = CrawlFailure::Aborted {
                        target: task.target.clone(),
                        message: e.to_string(),
                    };
                    sink.record_failure(task, failure, &tracker);
                    continue;
                }
            };
            tracing::debug!("Admitted {}", task.target);

            let worker = Worker {
                fetcher: self.fetcher.clone(),
                parse: self.parse.clone(),
                tracker: tracker.clone(),
                sink: sink.clone(),
            };
            let descriptor = task.clone();
            workers.push((tokio::spawn(worker.crawl(task, permit)), descriptor));
        }

        for (handle, descriptor) in workers {
            if let Err(e) = handle.await {
                let failure = CrawlFailure::Aborted {
                    target: descriptor.target.clone(),
                    message: e.to_string(),
                };
                tracing::error!("{}", failure);
                sink.record_failure(descriptor, failure, &tracker);
            }
        }

        tracker.wait().await;
        if let Some(display) = display {
            let _ = display.await;
        }

        let records = std::mem::take(&mut *lock(&sink.records));
        let failed = std::mem::take(&mut *lock(&sink.failed));

        let snapshot = tracker.snapshot();
        tracing::info!(
            "Stage '{}' finished: {}/{} done, {} records, {} failed, health {:.2}%",
            self.name,
            snapshot.done,
            snapshot.total,
            records.len(),
            snapshot.failed,
            100.0 * snapshot.success()
        );

        self.state.extend(records);
        self.state.mark_ready();
        self.failed = failed.clone();
        self.last_run = Some(snapshot);
        failed
    }
}

impl<C, R> Stage for CrawlStage<C, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Crawl
    }

    fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    fn slot_key(&self) -> &SlotKey {
        &self.key
    }
}

impl<C, R> fmt::Debug for CrawlStage<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlStage")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("max_in_flight", &self.max_in_flight)
            .field("ready", &self.state.is_ready())
            .field("accumulated", &self.state.accumulated().len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

/// Shared, append-only outputs of one run
struct RunSink<C, R> {
    records: Mutex<Vec<R>>,
    failed: Mutex<Vec<TaskDescriptor<C>>>,
}

impl<C, R> Default for RunSink<C, R> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
        }
    }
}

impl<C, R> RunSink<C, R> {
    fn record_failure(
        &self,
        task: TaskDescriptor<C>,
        failure: CrawlFailure,
        tracker: &ProgressTracker,
    ) {
        tracing::warn!("{}", failure);
        lock(&self.failed).push(task);
        tracker.fail();
    }
}

struct Worker<C, R> {
    fetcher: Arc<dyn Fetch>,
    parse: Arc<ParseFn<C, R>>,
    tracker: ProgressTracker,
    sink: Arc<RunSink<C, R>>,
}

impl<C, R> Worker<C, R> {
    async fn crawl(self, task: TaskDescriptor<C>, permit: OwnedSemaphorePermit) {
        let fetched = self.fetcher.fetch(&task.target).await;
        drop(permit);

        let outcome = match fetched {
            Ok(body) => self.parse_body(&body, &task),
            Err(e) => Err(CrawlFailure::Fetch(e)),
        };

        match outcome {
            Ok(Some(records)) => {
                lock(&self.sink.records).extend(records);
                self.tracker.advance();
            }
            Ok(None) => {
                tracing::debug!("No records in {}", task.target);
                self.tracker.advance();
            }
            Err(failure) => self.sink.record_failure(task, failure, &self.tracker),
        }
    }

    /// Runs the parse strategy, turning a panic into a parse failure
    fn parse_body(
        &self,
        body: &str,
        task: &TaskDescriptor<C>,
    ) -> std::result::Result<Option<Vec<R>>, CrawlFailure> {
        let parsed = catch_unwind(AssertUnwindSafe(|| (self.parse)(body, &task.context)))
            .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));

        parsed.map_err(|message| CrawlFailure::Parse {
            target: task.target.clone(),
            message,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("parser panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("parser panicked: {s}")
    } else {
        "parser panicked".to_string()
    }
}

// Guarded collections are append-only, so a poisoned lock still holds usable data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
