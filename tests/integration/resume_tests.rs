//! Resumability tests
//!
//! Each "run" builds its stages afresh over the same slot directory, the way a
//! restarted process would.

use async_trait::async_trait;
use stagecrawl::crawler::{CrawlStage, Fetch, FetchError};
use stagecrawl::pipeline::{chain, retry};
use stagecrawl::stage::{SchedulingStage, Stage, TaskDescriptor};
use stagecrawl::storage::{SlotKind, SlotStore};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-process site: `/<n>` pages list `n` numbered items; targets marked down
/// refuse connections
#[derive(Default)]
struct NumberSite {
    down: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
}

impl NumberSite {
    fn take_down(&self, target: &str) {
        self.down.lock().unwrap().insert(target.to_string());
    }

    fn restore(&self) {
        self.down.lock().unwrap().clear();
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for NumberSite {
    async fn fetch(&self, target: &str) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.down.lock().unwrap().contains(target) {
            return Err(FetchError::connectivity(target, "connection refused"));
        }
        let n: usize = target.trim_start_matches('/').parse().unwrap_or(0);
        Ok((1..=n)
            .map(|i| format!("{target}#{i}"))
            .collect::<Vec<_>>()
            .join(","))
    }
}

/// Stages of one run plus counters of how often their strategies ran
struct Run {
    schedule: SchedulingStage<String, usize>,
    crawl: CrawlStage<usize, String>,
    schedule_calls: Arc<AtomicUsize>,
    parse_calls: Arc<AtomicUsize>,
}

fn start_run(dir: &Path, site: Arc<NumberSite>) -> Run {
    let store = SlotStore::new(dir, "numbers");
    let schedule_calls = Arc::new(AtomicUsize::new(0));
    let parse_calls = Arc::new(AtomicUsize::new(0));

    let counter = schedule_calls.clone();
    let schedule = SchedulingStage::new("page", store.clone(), move |_: &[String]| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(
            (1..=4)
                .map(|n| TaskDescriptor::new(format!("/{n}"), n))
                .collect(),
        )
    })
    .unwrap();

    let counter = parse_calls.clone();
    let crawl = CrawlStage::new("page", store, site, move |body: &str, n: &usize| {
        counter.fetch_add(1, Ordering::SeqCst);
        let items: Vec<String> = body.split(',').map(str::to_string).collect();
        if items.len() != *n {
            return Err(format!("expected {n} items, got {}", items.len()));
        }
        Ok(Some(items))
    })
    .unwrap()
    .with_progress(false);

    Run {
        schedule,
        crawl,
        schedule_calls,
        parse_calls,
    }
}

fn sorted(mut records: Vec<String>) -> Vec<String> {
    records.sort();
    records
}

#[tokio::test]
async fn test_rerun_over_saved_slots_does_no_work() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(NumberSite::default());

    let mut first = start_run(dir.path(), site.clone());
    chain(&mut first.schedule, &mut first.crawl).await.unwrap();
    assert!(first.schedule.save().unwrap());
    assert!(first.crawl.save().unwrap());
    assert_eq!(first.crawl.data().len(), 1 + 2 + 3 + 4);
    let fetches = site.fetches();

    let mut second = start_run(dir.path(), site.clone());
    assert!(second.schedule.is_ready());
    assert!(second.crawl.is_ready());
    chain(&mut second.schedule, &mut second.crawl).await.unwrap();

    assert_eq!(second.schedule_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.parse_calls.load(Ordering::SeqCst), 0);
    assert_eq!(site.fetches(), fetches);
    assert_eq!(
        second.crawl.state().accumulated(),
        first.crawl.state().accumulated()
    );
}

#[tokio::test]
async fn test_interrupted_run_resumes_from_last_saved_stage() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(NumberSite::default());

    // The first run got as far as scheduling
    let mut first = start_run(dir.path(), site.clone());
    first.schedule.advance(&[]).unwrap();
    assert!(first.schedule.save().unwrap());
    drop(first);

    let mut second = start_run(dir.path(), site.clone());
    assert!(second.schedule.is_ready());
    assert!(!second.crawl.is_ready());
    chain(&mut second.schedule, &mut second.crawl).await.unwrap();

    assert_eq!(second.schedule_calls.load(Ordering::SeqCst), 0);
    assert_eq!(site.fetches(), 4);
    assert_eq!(second.crawl.data().len(), 10);
}

#[tokio::test]
async fn test_save_never_overwrites_a_slot() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(NumberSite::default());

    let mut first = start_run(dir.path(), site.clone());
    chain(&mut first.schedule, &mut first.crawl).await.unwrap();
    assert!(first.crawl.save().unwrap());

    let store = SlotStore::new(dir.path(), "numbers");
    let key = store.key("page", SlotKind::Crawl);
    let committed = std::fs::read(store.path(&key)).unwrap();

    // A second stage under the same name that produced different output
    let mut other = start_run(dir.path(), site);
    other.crawl.run(vec![TaskDescriptor::new("/1", 1)]).await;
    assert!(!other.crawl.save().unwrap());

    assert_eq!(std::fs::read(store.path(&key)).unwrap(), committed);
}

#[tokio::test]
async fn test_failures_become_next_runs_worklist() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(NumberSite::default());
    site.take_down("/3");

    let mut first = start_run(dir.path(), site.clone());
    chain(&mut first.schedule, &mut first.crawl).await.unwrap();
    assert_eq!(first.crawl.failed(), &[TaskDescriptor::new("/3", 3)]);
    assert_eq!(first.schedule.data(), vec![TaskDescriptor::new("/3", 3)]);
    assert!(first.schedule.save().unwrap());
    assert!(first.crawl.save().unwrap());
    let fetches = site.fetches();

    site.restore();
    let mut second = start_run(dir.path(), site.clone());
    assert_eq!(second.schedule.data(), vec![TaskDescriptor::new("/3", 3)]);
    retry(&mut second.schedule, &mut second.crawl).await.unwrap();

    assert_eq!(site.fetches(), fetches + 1);
    assert!(second.schedule.data().is_empty());
    second.schedule.save_forced().unwrap();
    second.crawl.save_forced().unwrap();

    let third = start_run(dir.path(), site);
    assert!(third.schedule.data().is_empty());
    let expected: Vec<String> = (1..=4)
        .flat_map(|n| (1..=n).map(move |i| format!("/{n}#{i}")))
        .collect();
    assert_eq!(sorted(third.crawl.data()), sorted(expected));
}

#[tokio::test]
async fn test_parse_failures_are_retried_too() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(NumberSite::default());
    let store = SlotStore::new(dir.path(), "numbers");

    let mut schedule = SchedulingStage::new("odd", store.clone(), |_: &[String]| {
        // "/0" yields an empty body that the parser rejects
        Ok::<_, String>(vec![TaskDescriptor::new("/0", 1), TaskDescriptor::new("/2", 2)])
    })
    .unwrap();
    let mut crawl = CrawlStage::new("odd", store, site, |body: &str, n: &usize| {
        let items: Vec<String> = body
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if items.len() == *n {
            Ok(Some(items))
        } else {
            Err("item count mismatch")
        }
    })
    .unwrap()
    .with_progress(false);

    chain(&mut schedule, &mut crawl).await.unwrap();

    assert_eq!(schedule.data(), vec![TaskDescriptor::new("/0", 1)]);
    assert_eq!(crawl.last_run().unwrap().failed, 1);
    assert_eq!(crawl.kind().to_string(), "crawl");
}
