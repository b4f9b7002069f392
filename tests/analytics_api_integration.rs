//! Integration tests for the owner-facing API
//!
//! These tests drive the HTTP surface: bearer authentication, ownership
//! checks, link management and query parameter parsing for the series and
//! value-count endpoints.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use forklink::analytics::{AnalyticsService, EventRecorder, WindowedCache};
use forklink::api;
use forklink::auth::{AuthService, Claims};
use forklink::cache::MemoryListCache;
use forklink::links::LinkManager;
use forklink::models::{RuleInput, Variable, VisitorSnapshot};
use forklink::storage::{SqliteStorage, Storage};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn token(username: &str) -> String {
    let claims = Claims {
        username: username.to_string(),
        exp: chrono::Utc::now().timestamp() as u64 + 3600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Router plus a link `stats` owned by alice with a few recorded redirects
async fn setup() -> Router {
    let storage = create_test_storage().await;
    let backend = MemoryListCache::new(100, Duration::from_secs(60));
    let cache = Arc::new(WindowedCache::new(Some(Arc::new(backend)), 8));

    let rules: Vec<RuleInput> = serde_json::from_value(json!([
        { "url": "https://example.com", "combinator": "AND", "conditions": [] }
    ]))
    .unwrap();
    let links = Arc::new(LinkManager::new(Arc::clone(&storage), Arc::clone(&cache)));
    let link = links.create("stats", &rules, Some("alice")).await.unwrap();

    let recorder = EventRecorder::new(Arc::clone(&storage));
    for (browser, minute) in [("Firefox", 60), ("Firefox", 61), ("Chrome", 125)] {
        let snapshot = VisitorSnapshot::new().with(Variable::Browser, browser);
        recorder.record(&link.uid, 0, &snapshot, minute).await;
    }

    let analytics = Arc::new(AnalyticsService::new(storage, cache));
    api::create_api_router(analytics, links, Arc::new(AuthService::new(Some(SECRET))))
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: Router, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
    send(app, Method::GET, uri, user, None).await
}

#[tokio::test]
async fn test_series_endpoint() {
    let app = setup().await;

    let (status, body) = get(
        app.clone(),
        "/api/links/stats/series?span=hour&start=0&limit=3",
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data_points"], json!([0, 2, 1]));
    assert_eq!(body["span"], 60);
    assert_eq!(body["start"], 0);
    assert_eq!(body["from_cache"], false);

    let (_, body) = get(
        app,
        "/api/links/stats/series?span=hour&start=0&limit=3",
        Some("alice"),
    )
    .await;
    assert_eq!(body["from_cache"], true);
    assert_eq!(body["data_points"], json!([0, 2, 1]));
}

#[tokio::test]
async fn test_series_negative_rule_means_all() {
    let app = setup().await;

    let (status, body) = get(
        app,
        "/api/links/stats/series?span=60&start=60&limit=1&selected_rule=-1",
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data_points"], json!([2]));
}

#[tokio::test]
async fn test_value_counts_endpoint() {
    let app = setup().await;

    let (status, body) = get(
        app,
        "/api/links/stats/values?variable=Browser&sort=Decreasing&page_size=3",
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page_count"], 1);
    assert_eq!(
        body["counts"],
        json!([
            { "key": "Firefox", "count": "2" },
            { "key": "Chrome", "count": "1" },
            { "key": "-", "count": "-" }
        ])
    );
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let app = setup().await;

    let (status, body) = get(app.clone(), "/api/links/stats/series", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");

    let (status, _) = send(
        app.clone(),
        Method::DELETE,
        "/api/links/stats",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/links/stats/values?variable=Browser")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_owner_is_403() {
    let app = setup().await;

    let (status, _) = get(
        app.clone(),
        "/api/links/stats/values?variable=Browser",
        Some("mallory"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(app, "/api/links/stats/series", Some("mallory")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_link_is_404() {
    let app = setup().await;
    let (status, _) = get(app, "/api/links/ghost/series", Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_query_is_400() {
    let app = setup().await;

    for uri in [
        "/api/links/stats/values?variable=Shoe%20Size",
        "/api/links/stats/values?variable=Browser&sort=sideways",
        "/api/links/stats/values?variable=Browser&page_size=0",
        "/api/links/stats/values?variable=Browser&selected_rule=4",
        "/api/links/stats/series?span=fortnight",
        "/api/links/stats/series?span=-5",
        "/api/links/stats/series?limit=0",
        "/api/links/stats/series?span=2305843009213693951",
        "/api/links/stats/series?span=hour&start=9223372036854775797",
        "/api/links/stats/series?start=-9223372036854775808",
        "/api/links/stats/values?variable=Browser&page=18446744073709551615",
    ] {
        let (status, body) = get(app.clone(), uri, Some("alice")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = setup().await;
    let (status, body) = get(app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn test_link_details() {
    let app = setup().await;

    let (status, body) = get(app.clone(), "/api/links/STATS", Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "stats");
    assert_eq!(body["counters"], json!([3]));
    assert_eq!(body["first_event_minute"], 60);
    assert_eq!(body["rules"][0]["url"], "https://example.com");
    assert!(body.get("uid").is_none());

    let (status, _) = get(app.clone(), "/api/links/stats", Some("mallory")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(app, "/api/links/ghost", Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_and_redefine_link() {
    let app = setup().await;
    let rules = json!([
        { "url": "https://one.example.com", "combinator": "AND", "conditions": [] }
    ]);

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/links",
        Some("bob"),
        Some(json!({ "id": "Fresh", "rules": rules })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "fresh");
    assert_eq!(body["counters"], json!([0]));
    assert_eq!(body["first_event_minute"], Value::Null);

    let (status, _) = send(
        app.clone(),
        Method::POST,
        "/api/links",
        Some("bob"),
        Some(json!({ "id": "stats", "rules": rules })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        app.clone(),
        Method::PUT,
        "/api/links/stats",
        Some("bob"),
        Some(json!({ "rules": rules })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the series is cached before the rules change
    let (_, body) = get(
        app.clone(),
        "/api/links/stats/series?span=hour&start=0&limit=3",
        Some("alice"),
    )
    .await;
    assert_eq!(body["data_points"], json!([0, 2, 1]));

    let (status, body) = send(
        app.clone(),
        Method::PUT,
        "/api/links/stats",
        Some("alice"),
        Some(json!({ "rules": rules })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counters"], json!([0]));

    let (_, body) = get(
        app,
        "/api/links/stats/series?span=hour&start=0&limit=3",
        Some("alice"),
    )
    .await;
    assert_eq!(body["from_cache"], false);
    assert_eq!(body["data_points"], json!([0, 0, 0]));
}

#[tokio::test]
async fn test_delete_drops_cached_analytics() {
    let app = setup().await;

    let uri = "/api/links/stats/series?span=hour&start=0&limit=3";
    get(app.clone(), uri, Some("alice")).await;
    let (_, body) = get(app.clone(), uri, Some("alice")).await;
    assert_eq!(body["from_cache"], true);

    let (status, _) = send(
        app.clone(),
        Method::DELETE,
        "/api/links/stats",
        Some("mallory"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app.clone(),
        Method::DELETE,
        "/api/links/stats",
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(app.clone(), uri, Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(app, "/api/links/stats", Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rename_moves_analytics() {
    let app = setup().await;

    let uri = "/api/links/stats/series?span=hour&start=0&limit=3";
    get(app.clone(), uri, Some("alice")).await;

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/api/links/stats/rename",
        Some("alice"),
        Some(json!({ "new_id": "Numbers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "numbers");
    assert_eq!(body["counters"], json!([3]));

    let (status, _) = get(app.clone(), uri, Some("alice")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(
        app.clone(),
        "/api/links/numbers/series?span=hour&start=0&limit=3",
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data_points"], json!([0, 2, 1]));

    let (status, _) = send(
        app,
        Method::POST,
        "/api/links/numbers/rename",
        Some("alice"),
        Some(json!({ "new_id": "not valid" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
