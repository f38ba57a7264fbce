//! End-to-end crawl tests
//!
//! These tests use wiremock to serve a small catalogue site and drive a
//! multi-stage pipeline against it with the HTTP fetcher.

use serde::{Deserialize, Serialize};
use stagecrawl::crawler::{CrawlStage, Fetch, HttpFetcher};
use stagecrawl::pipeline::chain;
use stagecrawl::stage::{SchedulingStage, Stage, TaskDescriptor};
use stagecrawl::storage::{SlotKind, SlotStore};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Song {
    artist: String,
    title: String,
}

async fn mount_page(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Letter index pages list artist slugs, one per line; artist pages list songs
async fn catalogue() -> MockServer {
    let server = MockServer::start().await;
    mount_page(&server, "/letter/a", 200, "abba\nacdc\n").await;
    mount_page(&server, "/letter/b", 200, "blur\n").await;
    mount_page(&server, "/abba/", 200, "Waterloo\nSOS\n").await;
    mount_page(&server, "/acdc/", 200, "Thunderstruck\n").await;
    mount_page(&server, "/blur/", 200, "Song 2\n").await;
    server
}

fn lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_full_pipeline_against_mock_site() {
    let server = catalogue().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let store = SlotStore::new(dir.path(), "catalogue");
    let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::with_defaults().unwrap());

    let letter_base = base.clone();
    let mut letter_sch = SchedulingStage::new("letter", store.clone(), move |_: &[String]| {
        Ok::<_, String>(
            ["a", "b"]
                .iter()
                .map(|l| TaskDescriptor::target_only(format!("{letter_base}/letter/{l}")))
                .collect(),
        )
    })
    .unwrap();

    let mut letter_crl = CrawlStage::new("letter", store.clone(), fetcher.clone(), |body: &str, _: &()| {
        Ok::<_, String>(Some(lines(body)))
    })
    .unwrap()
    .with_progress(false);

    let artist_base = base.clone();
    let mut artist_sch = SchedulingStage::new("artist", store.clone(), move |artists: &[String]| {
        Ok::<_, String>(
            artists
                .iter()
                .map(|a| TaskDescriptor::new(format!("{artist_base}/{a}/"), a.clone()))
                .collect(),
        )
    })
    .unwrap();

    let mut artist_crl = CrawlStage::new("artist", store.clone(), fetcher, |body: &str, artist: &String| {
        Ok::<_, String>(Some(
            lines(body)
                .into_iter()
                .map(|title| Song {
                    artist: artist.clone(),
                    title,
                })
                .collect(),
        ))
    })
    .unwrap()
    .with_progress(false)
    .with_max_in_flight(2);

    let letter_crl = chain(&mut letter_sch, &mut letter_crl).await.unwrap();
    let artist_sch = chain(letter_crl, &mut artist_sch).await.unwrap();
    chain(artist_sch, &mut artist_crl).await.unwrap();

    assert!(artist_crl.is_ready());
    assert!(artist_crl.failed().is_empty());

    let mut songs = artist_crl.data();
    songs.sort_by(|a, b| (&a.artist, &a.title).cmp(&(&b.artist, &b.title)));
    let titles: Vec<&str> = songs.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["SOS", "Waterloo", "Thunderstruck", "Song 2"]);

    assert!(artist_crl.save().unwrap());
    let reloaded: Vec<Option<Song>> = store
        .load(&store.key("artist", SlotKind::Crawl))
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.len(), 4);
}

#[tokio::test]
async fn test_unreachable_target_is_recorded_not_fatal() {
    let server = catalogue().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let store = SlotStore::new(dir.path(), "catalogue");

    let mut schedule = SchedulingStage::new("mixed", store.clone(), move |_: &[String]| {
        Ok::<_, String>(vec![
            TaskDescriptor::target_only(format!("{base}/letter/a")),
            // Nothing listens on the discard port
            TaskDescriptor::target_only("http://127.0.0.1:9/letter/z"),
        ])
    })
    .unwrap();

    let mut crawl = CrawlStage::new(
        "mixed",
        store,
        Arc::new(HttpFetcher::with_defaults().unwrap()),
        |body: &str, _: &()| Ok::<_, String>(Some(lines(body))),
    )
    .unwrap()
    .with_progress(false);

    chain(&mut schedule, &mut crawl).await.unwrap();

    let snapshot = crawl.last_run().unwrap();
    assert_eq!((snapshot.done, snapshot.failed), (2, 1));
    assert_eq!(crawl.data(), vec!["abba".to_string(), "acdc".to_string()]);
    assert_eq!(
        schedule.data(),
        vec![TaskDescriptor::target_only("http://127.0.0.1:9/letter/z")]
    );
}

#[tokio::test]
async fn test_error_status_body_reaches_parser() {
    let server = MockServer::start().await;
    mount_page(&server, "/missing", 404, "not here").await;

    let fetcher = HttpFetcher::with_defaults().unwrap();
    let body = fetcher
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "not here");
}

#[tokio::test]
async fn test_query_parameters_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("lang", "pt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("found"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_defaults()
        .unwrap()
        .with_query([("lang", "pt")]);
    let body = fetcher
        .fetch(&format!("{}/search", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "found");
}

#[tokio::test]
async fn test_parse_rejection_keeps_descriptor_for_retry() {
    let server = MockServer::start().await;
    mount_page(&server, "/ok", 200, "<pre>chords</pre>").await;
    mount_page(&server, "/broken", 200, "<html></html>").await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let store = SlotStore::new(dir.path(), "chords");

    let mut schedule = SchedulingStage::new("song", store.clone(), move |_: &[String]| {
        Ok::<_, String>(vec![
            TaskDescriptor::target_only(format!("{base}/ok")),
            TaskDescriptor::target_only(format!("{base}/broken")),
        ])
    })
    .unwrap();

    let mut crawl = CrawlStage::new(
        "song",
        store,
        Arc::new(HttpFetcher::with_defaults().unwrap()),
        |body: &str, _: &()| -> Result<Option<Vec<String>>, &'static str> {
            let start = body.find("<pre>").ok_or("no <pre> block")? + "<pre>".len();
            let end = body.find("</pre>").ok_or("unterminated <pre> block")?;
            Ok(Some(vec![body[start..end].to_string()]))
        },
    )
    .unwrap()
    .with_progress(false);

    chain(&mut schedule, &mut crawl).await.unwrap();

    assert_eq!(crawl.data(), vec!["chords".to_string()]);
    assert_eq!(crawl.failed().len(), 1);
    assert!(schedule.data()[0].target.ends_with("/broken"));
}
