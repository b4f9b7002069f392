//! Concurrency tests
//!
//! Link creation races must leave exactly one winner, and concurrent
//! redirects must not lose counter increments.

use forklink::analytics::{AnalyticsService, Granularity, ValueCountRequest, WindowedCache};
use forklink::links::LinkManager;
use forklink::models::{RuleInput, Variable, VisitorSnapshot};
use forklink::redirect::RedirectService;
use forklink::storage::{SqliteStorage, Storage};
use forklink::ServiceError;
use rand::RngExt;
use serde_json::json;
use std::sync::Arc;

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn browser_rules() -> Vec<RuleInput> {
    serde_json::from_value(json!([
        {
            "url": "https://firefox.example.com",
            "combinator": "AND",
            "conditions": [{ "variable": "Browser", "operator": "=", "value": "Firefox" }]
        },
        { "url": "https://example.com", "combinator": "AND", "conditions": [] }
    ]))
    .unwrap()
}

#[tokio::test]
async fn test_concurrent_creation_of_same_id() {
    let storage = create_test_storage().await;
    let links = Arc::new(LinkManager::new(
        storage,
        Arc::new(WindowedCache::disabled()),
    ));

    let mut handles = vec![];
    for i in 0..10 {
        let links = Arc::clone(&links);
        let owner = format!("user{i}");
        handles.push(tokio::spawn(async move {
            links.create("contested", &browser_rules(), Some(owner.as_str())).await
        }));
    }

    let mut success_count = 0;
    let mut conflict_count = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => success_count += 1,
            Err(ServiceError::Conflict(_)) => conflict_count += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(success_count, 1, "Exactly one creation should succeed");
    assert_eq!(conflict_count, 9, "All others should conflict");
}

#[tokio::test]
async fn test_concurrent_creation_of_different_ids() {
    let storage = create_test_storage().await;
    let links = Arc::new(LinkManager::new(
        Arc::clone(&storage),
        Arc::new(WindowedCache::disabled()),
    ));

    let mut handles = vec![];
    for i in 0..10 {
        let links = Arc::clone(&links);
        handles.push(tokio::spawn(async move {
            links
                .create(&format!("link{i:03}"), &browser_rules(), None)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for i in 0..10 {
        assert!(storage
            .get_link(&format!("link{i:03}"))
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn test_concurrent_redirects_count_every_visit() {
    let storage = create_test_storage().await;
    let cache = Arc::new(WindowedCache::disabled());
    let link = LinkManager::new(Arc::clone(&storage), Arc::clone(&cache))
        .create("busy", &browser_rules(), Some("alice"))
        .await
        .unwrap();
    let redirects = Arc::new(RedirectService::new(Arc::clone(&storage)));

    let visits = 40;
    let mut handles = vec![];
    for i in 0..visits {
        let redirects = Arc::clone(&redirects);
        let browser = if i % 4 == 0 { "Firefox" } else { "Chrome" };
        handles.push(tokio::spawn(async move {
            let delay = rand::rng().random_range(0..250);
            tokio::time::sleep(tokio::time::Duration::from_micros(delay)).await;

            let snapshot = VisitorSnapshot::new().with(Variable::Browser, browser);
            redirects.resolve_redirect("busy", &snapshot).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = storage.get_link("busy").await.unwrap().unwrap();
    assert_eq!(stored.counters, vec![10, 30]);
    assert!(stored.first_event_minute.is_some());
    assert_eq!(storage.events(&link.uid).await.unwrap().len(), visits);

    let days = storage
        .time_series(&link.uid, Granularity::Day, None)
        .await
        .unwrap();
    assert_eq!(days.iter().map(|(_, count)| count).sum::<i64>(), 40);

    let analytics = AnalyticsService::new(storage, cache);
    let counts = analytics
        .get_value_counts("busy", &ValueCountRequest::new(Variable::Browser), "alice")
        .await
        .unwrap();
    assert_eq!(counts.payload.page_count, 1);
    assert_eq!(counts.payload.counts[0].key, "Firefox");
    assert_eq!(counts.payload.counts[0].count, "10");
    assert_eq!(counts.payload.counts[1].key, "Chrome");
    assert_eq!(counts.payload.counts[1].count, "30");
}
