//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end against an in-memory store.

use krill::config::{Config, CrawlSettings, CrawlerConfig};
use krill::crawler::{run_crawl, Coordinator};
use krill::output::dump_done;
use krill::storage::{load_settings, publish_settings, MemoryStorage, Storage};
use krill::{KrillError, Namespace};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration
fn create_test_config(workers: usize) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers,
            staging_capacity: workers * 2,
            enqueue_interval_ms: 5,
            stats_interval: 0,
            timeout: 5,
            ..CrawlerConfig::default()
        },
        ..Config::default()
    }
}

async fn mount_page(server: &MockServer, p: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, p: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn new_store() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new())
}

async fn crawl(
    config: &Config,
    store: Arc<dyn Storage>,
    settings: CrawlSettings,
) -> Result<krill::output::CrawlStatistics, KrillError> {
    tokio::time::timeout(
        Duration::from_secs(20),
        run_crawl(config, store, settings, &[]),
    )
    .await
    .expect("crawl did not finish in time")
}

#[tokio::test]
async fn test_crawl_follows_in_scope_links_only() {
    let server = MockServer::start().await;
    let base = format!("{}/", server.uri());

    mount_page(
        &server,
        "/",
        r#"<html><body>
            <a href="/a">A</a>
            <a href="/b">B</a>
            <a href="http://elsewhere.test/x">Out</a>
        </body></html>"#,
    )
    .await;
    mount_page(&server, "/a", "<p>a</p>").await;
    mount_page(&server, "/b", "<p>b</p>").await;

    let store = new_store();
    let stats = crawl(&create_test_config(2), store.clone(), CrawlSettings::new(&base))
        .await
        .unwrap();

    assert_eq!(stats.done, 3);
    assert_eq!(stats.todo, 0);
    assert_eq!(stats.doing, 0);
    assert_eq!(stats.trash, 0);

    let mut done = store.enumerate(Namespace::Done).await.unwrap();
    done.sort();
    assert_eq!(
        done,
        vec![base.clone(), format!("{}a", base), format!("{}b", base)]
    );
    assert_eq!(
        store.namespace_of("http://elsewhere.test/x").await.unwrap(),
        None
    );

    server.verify().await;
}

#[tokio::test]
async fn test_not_found_ends_in_trash() {
    let server = MockServer::start().await;
    let base = format!("{}/", server.uri());

    mount_page(&server, "/", r#"<a href="/missing">gone</a>"#).await;
    mount_status(&server, "/missing", 404).await;

    let store = new_store();
    let stats = crawl(&create_test_config(2), store.clone(), CrawlSettings::new(&base))
        .await
        .unwrap();

    assert_eq!(stats.done, 1);
    assert_eq!(stats.trash, 1);
    assert_eq!(
        store
            .namespace_of(&format!("{}missing", base))
            .await
            .unwrap(),
        Some(Namespace::Trash)
    );
}

#[tokio::test]
async fn test_flaky_page_is_retried_then_trashed() {
    let server = MockServer::start().await;
    let base = format!("{}/", server.uri());

    mount_page(&server, "/", r#"<a href="/flaky">flaky</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(1);
    config.crawler.max_attempts = 3;

    let store = new_store();
    let stats = crawl(&config, store.clone(), CrawlSettings::new(&base))
        .await
        .unwrap();

    assert_eq!(stats.trash, 1);
    assert_eq!(stats.todo, 0);
    server.verify().await;
}

#[tokio::test]
async fn test_soft_rejections_abort_without_losing_urls() {
    let server = MockServer::start().await;
    let base = format!("{}/", server.uri());

    mount_page(
        &server,
        "/",
        r#"<a href="/p1">1</a><a href="/p2">2</a><a href="/p3">3</a><a href="/p4">4</a>"#,
    )
    .await;
    for p in ["/p1", "/p2", "/p3", "/p4"] {
        mount_status(&server, p, 403).await;
    }

    let mut config = create_test_config(2);
    config.crawler.max_errors = 2;
    config.crawler.max_attempts = 100;

    let store = new_store();
    let err = crawl(&config, store.clone(), CrawlSettings::new(&base))
        .await
        .unwrap_err();

    assert!(matches!(err, KrillError::TooManyErrors { max: 2, .. }));
    assert_eq!(store.size(Namespace::Doing).await.unwrap(), 0);
    assert_eq!(store.size(Namespace::Done).await.unwrap(), 1);
    assert_eq!(store.size(Namespace::Todo).await.unwrap(), 4);
}

#[tokio::test]
async fn test_redo_returns_doing_and_trash_to_todo() {
    let store = new_store();
    let (u1, u2) = ("http://example.com/1", "http://example.com/2");

    store.insert_todo(u1, false).await.unwrap();
    store.insert_todo(u2, false).await.unwrap();
    store.claim_batch(2).await.unwrap();
    store.mark_trash(u2).await.unwrap();

    assert_eq!(store.recover_all().await.unwrap(), 2);

    let mut todo = store.enumerate(Namespace::Todo).await.unwrap();
    todo.sort();
    assert_eq!(todo, vec![u1.to_string(), u2.to_string()]);
    assert_eq!(store.size(Namespace::Doing).await.unwrap(), 0);
    assert_eq!(store.size(Namespace::Trash).await.unwrap(), 0);
}

#[tokio::test]
async fn test_published_settings_drive_extraction() {
    let server = MockServer::start().await;
    let base = format!("{}/", server.uri());

    mount_page(
        &server,
        "/",
        r#"<h1>Home</h1><a href="/article">read</a><a href="/about">about</a>"#,
    )
    .await;
    mount_page(&server, "/article", "<h1>Story</h1>").await;

    let mut settings = CrawlSettings::new(&base);
    settings.keywords_to_exclude = vec!["about".to_string()];
    settings.extraction_rules = Some(
        "[[rule]]\nname = \"title\"\nactivators = [\"<h1>\"]\ndeactivator = \"</h1>\"\n"
            .to_string(),
    );

    let store = new_store();
    publish_settings(store.as_ref(), &settings).await.unwrap();
    let record = load_settings(store.as_ref()).await.unwrap().unwrap();
    assert_eq!(record.settings, settings);

    crawl(&create_test_config(2), store.clone(), record.settings)
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("done.json");
    assert_eq!(dump_done(store.as_ref(), &out).await.unwrap(), 2);

    let map: std::collections::BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(map[&base], r#"{"title":"Home"}"#);
    assert_eq!(map[&format!("{}article", base)], r#"{"title":"Story"}"#);

    server.verify().await;
}

#[tokio::test]
async fn test_cooperating_processes_fetch_each_page_once() {
    let server = MockServer::start().await;
    let base = format!("{}/", server.uri());

    let links: String = (0..12)
        .map(|i| format!(r#"<a href="/p{}">{}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", &links).await;
    for i in 0..12 {
        mount_page(&server, &format!("/p{}", i), "leaf").await;
    }

    let store = new_store();
    let config = create_test_config(3);
    let first = Coordinator::new(&config, store.clone(), CrawlSettings::new(&base)).unwrap();
    let second = Coordinator::new(&config, store.clone(), CrawlSettings::new(&base)).unwrap();
    first.seed(&[]).await.unwrap();

    let (a, b) = tokio::time::timeout(Duration::from_secs(20), async {
        tokio::join!(first.run(), second.run())
    })
    .await
    .unwrap();
    a.unwrap();
    b.unwrap();

    assert_eq!(store.size(Namespace::Done).await.unwrap(), 13);
    assert_eq!(store.size(Namespace::Todo).await.unwrap(), 0);
    assert_eq!(store.size(Namespace::Doing).await.unwrap(), 0);
    server.verify().await;
}
