//! Thread-safe progress tracker shared by the workers of one crawl run
//!
//! Counters are plain atomics: workers only ever increment them and readers only
//! ever load them, so no lock is held on the hot path. `done` and `failed` are
//! updated independently; a display tick may see a failure's completion before
//! its failure, never the other way round. The completion signal is only sent
//! once both counters hold their final values.

use crate::progress::display::{render_line, Eta};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Label printed in front of the progress line unless one is given
pub const DEFAULT_LABEL: &str = "Progress:";

/// Shortest accepted redraw interval
pub const MIN_REFRESH: Duration = Duration::from_millis(10);

/// Point-in-time read of a tracker's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub done: u64,
    pub failed: u64,
}

impl ProgressSnapshot {
    /// Completion ratio in `[0, 1]`; an empty run counts as complete
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }

    /// Share of completed tasks that failed; zero before any completion
    pub fn failure_rate(&self) -> f64 {
        if self.done == 0 {
            0.0
        } else {
            self.failed as f64 / self.done as f64
        }
    }

    /// Health: `1 - failed/done`, perfect before any completion
    pub fn success(&self) -> f64 {
        1.0 - self.failure_rate()
    }

    /// Completions per second over `elapsed`
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.done as f64 / secs
        } else {
            0.0
        }
    }

    /// Projected remaining time: `elapsed * (total - done) / done`
    pub fn eta(&self, elapsed: Duration) -> Eta {
        if self.done == 0 {
            return Eta::Unknown;
        }
        let remaining = self.total.saturating_sub(self.done) as f64;
        Eta::Remaining(Duration::from_secs_f64(
            elapsed.as_secs_f64() * remaining / self.done as f64,
        ))
    }
}

struct Inner {
    label: String,
    total: u64,
    refresh: Duration,
    done: AtomicU64,
    failed: AtomicU64,
    finished: AtomicBool,
    started_at: Mutex<Instant>,
    completion: watch::Sender<bool>,
}

/// Live progress and health reporter
///
/// Cloning is cheap and every clone observes the same counters, so each worker
/// can own a handle.
///
/// # Example
///
/// ```
/// use stagecrawl::progress::ProgressTracker;
///
/// # async fn example() {
/// let tracker = ProgressTracker::new(2);
/// tracker.advance();
/// tracker.fail();
/// tracker.wait().await;
///
/// let snapshot = tracker.snapshot();
/// assert_eq!((snapshot.done, snapshot.failed), (2, 1));
/// # }
/// ```
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

impl ProgressTracker {
    /// Creates a tracker for `total` tasks with the default label and cadence
    pub fn new(total: u64) -> Self {
        Self::with_options(total, None, DEFAULT_LABEL)
    }

    /// Creates a tracker with an optional refresh interval (defaults to 500ms,
    /// never below `MIN_REFRESH`)
    pub fn with_options(total: u64, refresh: Option<Duration>, label: impl Into<String>) -> Self {
        let (completion, _) = watch::channel(total == 0);

        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                total,
                refresh: refresh.unwrap_or(Duration::from_millis(500)).max(MIN_REFRESH),
                done: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                finished: AtomicBool::new(false),
                started_at: Mutex::new(Instant::now()),
                completion,
            }),
        }
    }

    pub fn total(&self) -> u64 {
        self.inner.total
    }

    pub fn done(&self) -> u64 {
        self.inner.done.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Acquire)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// True once the completion signal was sent: every task completed and
    /// was counted, or the tracker was explicitly finished
    pub fn is_finished(&self) -> bool {
        *self.inner.completion.borrow()
    }

    /// Records one completed task
    ///
    /// Does nothing once the tracker is finished. Returns whether the counter
    /// moved. The completion signal fires on the increment that reaches `total`.
    pub fn advance(&self) -> bool {
        match self.bump_done() {
            Some(reached_total) => {
                if reached_total {
                    self.signal_completion();
                }
                true
            }
            None => false,
        }
    }

    /// Records one failed task, which also counts as a completed attempt
    pub fn fail(&self) -> bool {
        // Completion first so readers never see failed > done; the signal
        // waits for the failure so the final snapshot is exact
        match self.bump_done() {
            Some(reached_total) => {
                self.inner.failed.fetch_add(1, Ordering::AcqRel);
                if reached_total {
                    self.signal_completion();
                }
                true
            }
            None => false,
        }
    }

    /// Increments `done` unless finished; `Some(true)` when it reached `total`
    fn bump_done(&self) -> Option<bool> {
        let total = self.inner.total;
        let finished = &self.inner.finished;

        self.inner
            .done
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |done| {
                (done < total && !finished.load(Ordering::Acquire)).then_some(done + 1)
            })
            .ok()
            .map(|previous| previous + 1 == total)
    }

    /// Marks the tracker finished regardless of the counters
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::Release);
        self.signal_completion();
    }

    /// Restarts the elapsed-time clock
    pub fn start(&self) {
        *self
            .inner
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.inner
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.inner.total,
            done: self.done(),
            failed: self.failed(),
        }
    }

    /// Projected remaining time at this instant
    pub fn eta(&self) -> Eta {
        self.snapshot().eta(self.elapsed())
    }

    /// Renders the current progress line
    pub fn render(&self) -> String {
        render_line(self.label(), &self.snapshot(), self.elapsed())
    }

    /// Waits until the tracker is finished
    ///
    /// Parks on the completion signal; there is no polling.
    pub async fn wait(&self) {
        let mut rx = self.inner.completion.subscribe();
        // The sender lives in `inner`, which `self` keeps alive
        let _ = rx.wait_for(|finished| *finished).await;
    }

    /// Spawns the display loop on the current runtime
    ///
    /// The loop redraws the progress line on stderr every refresh interval,
    /// draws one final line once the tracker is finished and prints the total
    /// elapsed time. The handle yields the snapshot of that final line.
    pub fn track(&self) -> JoinHandle<ProgressSnapshot> {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.display().await })
    }

    async fn display(&self) -> ProgressSnapshot {
        self.start();

        let bar = ProgressBar::new(self.total());
        bar.set_style(
            ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        while !self.is_finished() {
            let snapshot = self.snapshot();
            bar.set_position(snapshot.done);
            bar.set_message(render_line(self.label(), &snapshot, self.elapsed()));

            tokio::select! {
                _ = tokio::time::sleep(self.inner.refresh) => {}
                _ = self.wait() => {}
            }
        }

        // Read once more after the signal so the last line carries final counts
        let snapshot = self.snapshot();
        bar.set_position(snapshot.done);
        bar.finish_with_message(render_line(self.label(), &snapshot, self.elapsed()));
        eprintln!("Time elapsed: {:.1}s", self.elapsed().as_secs_f64());
        snapshot
    }

    fn signal_completion(&self) {
        self.inner.completion.send_replace(true);
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("label", &self.inner.label)
            .field("snapshot", &self.snapshot())
            .field("finished", &self.is_finished())
            .finish()
    }
}
