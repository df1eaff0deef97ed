#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use client::RestTransport;
use futures::StreamExt;
use mockito::Matcher;
use reqwest::StatusCode;
use rest_store::{ListOptions, Transport, TransportError};
use serde_json::json;
use shared_types::WatchEventType;

#[tokio::test]
async fn test_health_check() {
    let mut server = mockito::Server::new_async().await;

    let _m = server
        .mock("GET", "/health")
        .with_status(200)
        .with_body(r#"{"status":"healthy"}"#)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();
    assert!(transport.health_check().await.unwrap());
}

#[tokio::test]
async fn test_create_sends_json_body() {
    let mut server = mockito::Server::new_async().await;

    let m = server
        .mock("POST", "/namespaces/default/brokers/b1")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"spec": {"URL": "http://x"}})))
        .with_status(201)
        .with_body(r#"{"metadata":{"name":"b1","resourceVersion":"1"}}"#)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();
    let body = json!({"spec": {"URL": "http://x"}}).to_string();
    let response = transport
        .create("brokers", "default", "b1", body.into())
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(response.status, StatusCode::CREATED);
    let object: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(object["metadata"]["resourceVersion"], "1");
}

#[tokio::test]
async fn test_error_statuses_are_responses() {
    let mut server = mockito::Server::new_async().await;

    let _m = server
        .mock("GET", "/namespaces/default/brokers/missing")
        .with_status(404)
        .with_body(r#"{"code":404,"reason":"Not Found","message":"brokers default/missing not found"}"#)
        .create_async()
        .await;
    let _u = server
        .mock("PUT", "/namespaces/default/brokers/b1")
        .with_status(400)
        .with_body(r#"{"code":400,"reason":"Bad Request","message":"stale resourceVersion"}"#)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();

    let missing = transport.get("brokers", "default", "missing").await.unwrap();
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.message(), "brokers default/missing not found");

    let stale = transport
        .update("brokers", "default", "b1", "{}".into())
        .await
        .unwrap();
    assert_eq!(stale.status, StatusCode::BAD_REQUEST);
    assert_eq!(stale.message(), "stale resourceVersion");
}

#[tokio::test]
async fn test_delete() {
    let mut server = mockito::Server::new_async().await;

    let m = server
        .mock("DELETE", "/namespaces/team-a/serviceinstances/db")
        .with_status(200)
        .with_body(r#"{"metadata":{"name":"db"}}"#)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();
    let response = transport
        .delete("serviceinstances", "team-a", "db")
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_forwards_options() {
    let mut server = mockito::Server::new_async().await;

    let m = server
        .mock("GET", "/namespaces/team-a/serviceinstances")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("labelSelector".into(), "tier=gold".into()),
            Matcher::UrlEncoded("resourceVersion".into(), "12".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"metadata":{},"items":[{"metadata":{"name":"a"}}]}"#)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();
    let options = ListOptions {
        label_selector: Some("tier=gold".to_string()),
        resource_version: Some("12".to_string()),
    };
    let response = transport
        .list("serviceinstances", "team-a", &options)
        .await
        .unwrap();

    m.assert_async().await;
    let list: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(list["items"][0]["metadata"]["name"], "a");
}

#[tokio::test]
async fn test_watch_decodes_ndjson() {
    let mut server = mockito::Server::new_async().await;

    let body = [
        r#"{"type":"ADDED","object":{"metadata":{"name":"b1","resourceVersion":"1"}}}"#,
        r#"{"type":"MODIFIED","object":{"metadata":{"name":"b1","resourceVersion":"2"}}}"#,
        r#"{"type":"DELETED","object":{"metadata":{"name":"b1","resourceVersion":"2"}}}"#,
    ]
    .join("\n");

    let _m = server
        .mock("GET", "/watch/namespaces/default/brokers/b1")
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(body)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();
    let events: Vec<_> = transport
        .watch("brokers", "default", Some("b1"), &ListOptions::default())
        .await
        .unwrap()
        .collect()
        .await;

    let types: Vec<WatchEventType> = events
        .iter()
        .map(|event| event.as_ref().unwrap().event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            WatchEventType::Added,
            WatchEventType::Modified,
            WatchEventType::Deleted
        ]
    );
}

#[tokio::test]
async fn test_watch_rejected() {
    let mut server = mockito::Server::new_async().await;

    let _m = server
        .mock("GET", "/watch/namespaces/default/brokers")
        .with_status(400)
        .with_body(r#"{"code":400,"reason":"Bad Request","message":"invalid label selector"}"#)
        .create_async()
        .await;

    let transport = RestTransport::new(server.url()).unwrap();
    let result = transport
        .watch("brokers", "default", None, &ListOptions::default())
        .await;

    match result {
        Err(TransportError::Stream(message)) => {
            assert!(message.contains("400"));
            assert!(message.contains("invalid label selector"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("watch should have been rejected"),
    }
}

#[tokio::test]
async fn test_unreachable_backend() {
    // Nothing listens on the discard port
    let transport = RestTransport::new("http://127.0.0.1:9").unwrap();

    let err = transport.get("brokers", "default", "b1").await.unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));
}
