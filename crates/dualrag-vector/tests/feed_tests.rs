use std::time::Duration;

use axum::{routing::get, Json, Router};
use dualrag_core::traits::DocumentFeed;
use dualrag_core::types::{Scalar, SourceRecord};
use dualrag_core::Error;
use dualrag_vector::feed::write_dataset;
use dualrag_vector::{HttpFeed, JsonFileFeed, TextDirFeed};
use serde_json::json;

#[tokio::test]
async fn http_feed_reads_wrapped_events() {
    let router = Router::new().route(
        "/events",
        get(|| async {
            Json(json!({"events": [
                {"id": "e1", "title": "Open mic", "isFree": true, "category": "Music",
                 "startDateTime": "2026-11-05T20:00:00Z", "tags": ["acoustic"]}
            ]}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let feed = HttpFeed::new(format!("http://{addr}/events"), Duration::from_secs(2)).unwrap();
    let records = feed.fetch().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata["category"], Scalar::from("music"));
    assert_eq!(records[0].metadata["tags"], Scalar::from("acoustic"));
}

#[tokio::test]
async fn http_feed_error_status_is_a_feed_error() {
    let router = Router::new().route("/events", get(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let feed = HttpFeed::new(format!("http://{addr}/events"), Duration::from_secs(2)).unwrap();
    assert!(matches!(feed.fetch().await, Err(Error::Feed(_))));
}

#[tokio::test]
async fn written_dataset_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/bundle.json");
    let records = vec![
        SourceRecord::new("faq:0", "Submit events through the form").with_meta("category", "faq"),
        SourceRecord::new("faq:1", "Listings are reviewed within a day").with_meta("category", "faq"),
    ];
    write_dataset(&path, &records).unwrap();
    let loaded = JsonFileFeed::new(&path).fetch().await.unwrap();
    assert_eq!(loaded, records);
}

#[tokio::test]
async fn text_dir_feed_chunks_guidance_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("policies")).unwrap();
    std::fs::write(dir.path().join("policies/refunds.txt"), "Refunds are issued within 7 days.").unwrap();
    std::fs::write(dir.path().join("welcome.txt"), "Welcome to the events hub.").unwrap();

    let mut records = TextDirFeed::new(dir.path()).fetch().await.unwrap();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["policies/refunds:0", "welcome:0"]);
    assert_eq!(records[0].metadata["category"], Scalar::from("policies"));
}

#[tokio::test]
async fn missing_guidance_dir_is_a_feed_error() {
    let feed = TextDirFeed::new("/definitely/not/here");
    assert!(matches!(feed.fetch().await, Err(Error::Feed(_))));
}
