//! Pipeline composition
//!
//! A pipeline alternates scheduling and crawl stages:
//!
//! ```text
//! SchedulingStage -> CrawlStage -> SchedulingStage -> CrawlStage -> ...
//! ```
//!
//! `chain(prev, next)` connects two neighbours. Which pairings are legal is
//! encoded in the sealed `Feed` trait, so chaining two stages of the same kind,
//! or a stage type this crate does not define, is rejected when the pipeline is
//! compiled:
//!
//! ```compile_fail
//! use stagecrawl::pipeline::chain;
//! use stagecrawl::stage::{SchedulingStage, TaskDescriptor};
//! use stagecrawl::storage::SlotStore;
//!
//! # async fn example() -> stagecrawl::Result<()> {
//! let store = SlotStore::new("./slots", "p");
//! let mut a = SchedulingStage::new("a", store.clone(), |_: &[String]| {
//!     Ok::<_, String>(vec![TaskDescriptor::target_only("x")])
//! })?;
//! let mut b = SchedulingStage::new("b", store, |_: &[TaskDescriptor]| {
//!     Ok::<_, String>(vec![TaskDescriptor::target_only("y")])
//! })?;
//! chain(&mut a, &mut b).await?;
//! # Ok(())
//! # }
//! ```

use crate::crawler::CrawlStage;
use crate::stage::{SchedulingStage, Stage};
use crate::{PipelineError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

mod sealed {
    pub trait Sealed<Next> {}
}

impl<I, C, R> sealed::Sealed<CrawlStage<C, R>> for SchedulingStage<I, C> {}
impl<C, R, C2> sealed::Sealed<SchedulingStage<R, C2>> for CrawlStage<C, R> {}

/// A stage that can hand its output to `Next`
///
/// Implemented for exactly two pairings:
/// - `SchedulingStage<I, C>` feeding `CrawlStage<C, R>`: the crawl stage runs
///   over the scheduled descriptors and the scheduling stage keeps the ones
///   that failed
/// - `CrawlStage<C, R>` feeding `SchedulingStage<R, C2>`: the scheduling stage
///   advances over the crawled records
#[async_trait]
pub trait Feed<Next: Stage>: Stage + sealed::Sealed<Next> {
    /// Moves this stage's output into `next`, regardless of whether `next` is
    /// already ready
    async fn feed(&mut self, next: &mut Next) -> Result<()>;
}

#[async_trait]
impl<I, C, R> Feed<CrawlStage<C, R>> for SchedulingStage<I, C>
where
    C: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    async fn feed(&mut self, next: &mut CrawlStage<C, R>) -> Result<()> {
        if !self.is_ready() {
            self.advance(&[])?;
        }

        let failed = next.run(self.data()).await;
        self.replace_with_failures(failed);
        Ok(())
    }
}

#[async_trait]
impl<C, R, C2> Feed<SchedulingStage<R, C2>> for CrawlStage<C, R>
where
    C: Send,
    R: Clone + Send,
    C2: Clone + Serialize + DeserializeOwned + Send,
{
    async fn feed(&mut self, next: &mut SchedulingStage<R, C2>) -> Result<()> {
        if !self.is_ready() {
            return Err(PipelineError::Configuration(format!(
                "crawl stage '{}' has no output to feed into '{}'; chain it after its scheduling stage first",
                self.name(),
                next.name()
            )));
        }

        next.advance(&self.data())
    }
}

/// Connects `prev` to `next` and returns `next` for further chaining
///
/// If `next` is already ready (typically restored from its slot) it is returned
/// untouched and `prev` is not consulted. Otherwise `prev` feeds it:
/// - scheduling into crawl: `prev` is scheduled with an empty batch if it never
///   was, `next` crawls `prev`'s descriptors, and `prev` keeps only the
///   descriptors that failed
/// - crawl into scheduling: `next` is advanced over `prev`'s records; `prev`
///   must be ready
///
/// # Example
///
/// ```no_run
/// # use stagecrawl::crawler::CrawlStage;
/// # use stagecrawl::stage::{SchedulingStage, TaskDescriptor};
/// use stagecrawl::pipeline::chain;
///
/// # async fn example(
/// #     mut artists: SchedulingStage<String, ()>,
/// #     mut artist_pages: CrawlStage<(), String>,
/// #     mut songs: SchedulingStage<String, String>,
/// # ) -> stagecrawl::Result<()> {
/// let artist_pages = chain(&mut artists, &mut artist_pages).await?;
/// chain(artist_pages, &mut songs).await?;
/// # Ok(())
/// # }
/// ```
pub async fn chain<'n, P, N>(prev: &mut P, next: &'n mut N) -> Result<&'n mut N>
where
    P: Feed<N>,
    N: Stage,
{
    if next.is_ready() {
        tracing::info!(
            "Stage '{}' ({}) already ready from {}, skipping",
            next.name(),
            next.kind(),
            next.slot_key()
        );
        return Ok(next);
    }

    tracing::debug!(
        "Chaining {} stage '{}' into {} stage '{}'",
        prev.kind(),
        prev.name(),
        next.kind(),
        next.name()
    );
    prev.feed(&mut *next).await?;
    Ok(next)
}

/// Feeds `prev` into `next` even though `next` is already ready
///
/// This is how a resumed pipeline works off a retry worklist: a scheduling
/// stage restored from its slot holds only the descriptors that failed last
/// time, and retrying it into its (also restored) crawl stage crawls just those,
/// appending the new records to the crawl stage's output.
pub async fn retry<'n, P, N>(prev: &mut P, next: &'n mut N) -> Result<&'n mut N>
where
    P: Feed<N>,
    N: Stage,
{
    tracing::info!(
        "Retrying {} stage '{}' into '{}'",
        prev.kind(),
        prev.name(),
        next.name()
    );
    prev.feed(&mut *next).await?;
    Ok(next)
}
