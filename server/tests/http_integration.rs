#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use futures::StreamExt;
use rest_store::{MemoryTransport, Transport};
use serde_json::json;
use server::http::router;
use shared_types::{WatchEventType, WireEvent};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn create_test_app() -> (Router, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let app = router(transport.clone());
    (app, transport)
}

fn parse_lines(chunk: &[u8]) -> Vec<WireEvent> {
    chunk
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}

async fn open_watch(app: &Router, uri: &str) -> axum::body::BodyDataStream {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-ndjson"
    );
    response.into_body().into_data_stream()
}

async fn collect_events(body: axum::body::BodyDataStream) -> Vec<WireEvent> {
    let chunks: Vec<_> = tokio::time::timeout(Duration::from_secs(5), body.collect::<Vec<_>>())
        .await
        .expect("watch stream did not end");
    chunks
        .into_iter()
        .flat_map(|chunk| parse_lines(&chunk.unwrap()))
        .collect()
}

#[tokio::test]
async fn test_watch_collection_streams_mutations() {
    let (app, transport) = create_test_app();
    let body = open_watch(&app, "/watch/namespaces/default/brokers").await;

    let object = json!({"spec": {"URL": "http://x"}}).to_string();
    transport
        .create("brokers", "default", "b1", object.into())
        .await
        .unwrap();
    let update = json!({"metadata": {"resourceVersion": "1"}, "spec": {"URL": "http://y"}});
    transport
        .update("brokers", "default", "b1", update.to_string().into())
        .await
        .unwrap();
    transport.delete("brokers", "default", "b1").await.unwrap();
    transport.close_watchers().await;

    let events = collect_events(body).await;
    let types: Vec<WatchEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            WatchEventType::Added,
            WatchEventType::Modified,
            WatchEventType::Deleted
        ]
    );
    assert_eq!(events[1].object["spec"]["URL"], "http://y");
    assert_eq!(events[1].object["metadata"]["resourceVersion"], "2");
}

#[tokio::test]
async fn test_watch_object_filters_by_name() {
    let (app, transport) = create_test_app();
    let body = open_watch(&app, "/watch/namespaces/team-a/serviceinstances/db").await;

    for name in ["cache", "db"] {
        transport
            .create("serviceinstances", "team-a", name, "{}".into())
            .await
            .unwrap();
    }
    transport.close_watchers().await;

    let events = collect_events(body).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].object["metadata"]["name"], "db");
}

#[tokio::test]
async fn test_watch_label_selector() {
    let (app, transport) = create_test_app();
    let body = open_watch(
        &app,
        "/watch/namespaces/team-a/serviceinstances?labelSelector=tier%3Dgold",
    )
    .await;

    for (name, tier) in [("a", "silver"), ("b", "gold")] {
        let object = json!({"metadata": {"labels": {"tier": tier}}}).to_string();
        transport
            .create("serviceinstances", "team-a", name, object.into())
            .await
            .unwrap();
    }
    transport.close_watchers().await;

    let events = collect_events(body).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].object["metadata"]["name"], "b");
}

#[tokio::test]
async fn test_lagging_watch_ends_with_error_line() {
    let transport = Arc::new(MemoryTransport::with_capacity(1));
    let app = router(transport.clone());
    let body = open_watch(&app, "/watch/namespaces/default/brokers").await;

    // Nobody reads the body while these are published
    for name in ["b1", "b2", "b3"] {
        transport
            .create("brokers", "default", name, "{}".into())
            .await
            .unwrap();
    }
    transport.close_watchers().await;

    let events = collect_events(body).await;
    let last = events.last().unwrap();
    assert_eq!(last.event_type, WatchEventType::Error);
    assert_eq!(last.object["code"], 500);
    assert!(last.object["message"].as_str().unwrap().contains("fell behind"));
}
