//! End-to-end tests: HTTP client, SQLite cache and budget wired together
//! against a mock NewsAPI server.

use chrono::TimeDelta;
use newscache::budget::BudgetTracker;
use newscache::news::NewsClient;
use newscache::storage::{ArticleStore, Database};
use newscache::sync::{ArticleSync, FeedCursor, RateLimitOrigin, SyncError, SyncSettings};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Service = ArticleSync<Database, NewsClient, Database>;

fn body(slugs: &[&str]) -> serde_json::Value {
    let articles: Vec<_> = slugs
        .iter()
        .enumerate()
        .map(|(i, slug)| {
            json!({
                "source": {"id": null, "name": "Mock Wire"},
                "author": null,
                "title": format!("Story {slug}"),
                "description": "Summary",
                "url": format!("https://news.example.com/{slug}"),
                "urlToImage": null,
                "publishedAt": format!("2024-03-01T10:{:02}:00Z", 59 - i),
                "content": null
            })
        })
        .collect();
    json!({"status": "ok", "totalResults": slugs.len(), "articles": articles})
}

fn id(slug: &str) -> String {
    format!("https://news.example.com/{slug}")
}

async fn setup(server: &MockServer, max_daily: u32, settings: SyncSettings) -> (Database, Service) {
    let db = Database::open(":memory:").await.unwrap();
    let client = NewsClient::new(
        reqwest::Client::new(),
        &server.uri(),
        &SecretString::from("integration-key"),
    )
    .unwrap();
    let budget = BudgetTracker::new(db.clone(), max_daily);
    let sync = ArticleSync::new(db.clone(), client, budget, settings);
    (db, sync)
}

/// Settings under which every cached row counts as expired.
fn always_stale() -> SyncSettings {
    SyncSettings {
        cache_duration: TimeDelta::hours(-1),
        ..SyncSettings::default()
    }
}

#[tokio::test]
async fn test_second_feed_load_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(header("X-Api-Key", "integration-key"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(&["a", "b"])))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, sync) = setup(&server, 80, SyncSettings::default()).await;

    let first = sync.load_feed(1).await.unwrap();
    let second = sync.load_feed(1).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 2);
    assert_eq!(sync.remaining_requests().await.unwrap(), 79);
}

#[tokio::test]
async fn test_stale_refresh_keeps_favorites() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(&["a", "b"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(&["c"])))
        .mount(&server)
        .await;

    let (db, sync) = setup(&server, 80, always_stale()).await;

    sync.load_feed(1).await.unwrap();
    assert!(sync.set_favorite(&id("b"), true).await.unwrap());

    let refreshed = sync.load_feed(1).await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].id, id("c"));

    assert!(db.get_article(&id("a")).await.unwrap().is_none());
    let favorites = sync.favorites().await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, id("b"));
    assert_eq!(sync.remaining_requests().await.unwrap(), 78);
}

#[tokio::test]
async fn test_upstream_429_is_reported_and_free() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let (_db, sync) = setup(&server, 80, SyncSettings::default()).await;

    let err = sync.load_feed(1).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::RateLimited(RateLimitOrigin::Upstream)
    ));
    assert_eq!(sync.remaining_requests().await.unwrap(), 80);
}

#[tokio::test]
async fn test_unauthorized_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (_db, sync) = setup(&server, 80, SyncSettings::default()).await;

    assert!(matches!(
        sync.search("rust", 1).await,
        Err(SyncError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_budget_exhaustion_stops_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(&["s"])))
        .expect(2)
        .mount(&server)
        .await;

    let (_db, sync) = setup(&server, 2, SyncSettings::default()).await;

    sync.search("rust", 1).await.unwrap();
    sync.search("rust", 2).await.unwrap();
    let err = sync.search("rust", 3).await.unwrap_err();

    assert!(matches!(err, SyncError::RateLimited(RateLimitOrigin::Local)));
    assert!(sync.is_rate_limited().await.unwrap());

    sync.reset_rate_limit().await.unwrap();
    assert_eq!(sync.remaining_requests().await.unwrap(), 2);
}

#[tokio::test]
async fn test_malformed_body_is_a_decoding_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\": \"ok\""))
        .mount(&server)
        .await;

    let (db, sync) = setup(&server, 80, SyncSettings::default()).await;

    assert!(matches!(
        sync.load_feed(1).await,
        Err(SyncError::Decoding(_))
    ));
    assert_eq!(sync.remaining_requests().await.unwrap(), 80);
    assert!(db.favorites().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_paging_until_empty() {
    let server = MockServer::start().await;
    for (page, slugs) in [("1", vec!["a", "b"]), ("2", vec!["c"]), ("3", vec![])] {
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(&slugs)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (_db, sync) = setup(&server, 80, SyncSettings::default()).await;
    let mut cursor = FeedCursor::new();

    let mut seen = Vec::new();
    loop {
        let page = sync.load_next(&mut cursor).await.unwrap();
        if page.is_empty() {
            break;
        }
        seen.extend(page.into_iter().map(|a| a.id));
    }

    assert_eq!(seen, vec![id("a"), id("b"), id("c")]);
    assert!(cursor.is_exhausted());
    assert_eq!(sync.remaining_requests().await.unwrap(), 77);
}
