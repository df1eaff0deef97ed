use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use http::StatusCode;
use shared_types::{ApiStatus, WatchEventType};

use crate::error::TransportError;

/// Status and body of one round trip to the backend.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn from_status(status: &ApiStatus) -> Self {
        let code = StatusCode::from_u16(status.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(status).unwrap_or_default();
        Self::new(code, body)
    }

    /// Human readable description of a failed response
    pub fn message(&self) -> String {
        match serde_json::from_slice::<ApiStatus>(&self.body) {
            Ok(status) => status.message,
            Err(_) => String::from_utf8_lossy(&self.body).into_owned(),
        }
    }
}

/// One undecoded event from a watch subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event_type: WatchEventType,
    pub object: Bytes,
}

/// Filtering hints forwarded to the backend with list and watch calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub resource_version: Option<String>,
}

pub type EventStream = BoxStream<'static, Result<RawEvent, TransportError>>;

/// REST-like backend addressed by kind, namespace and name.
///
/// Implementations report backend outcomes through the response status;
/// `Err` is reserved for failing to get a response at all. Dropping an
/// [`EventStream`] disconnects the subscription.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn create(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError>;

    async fn get(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<TransportResponse, TransportError>;

    /// The body carries the resource version the write is based on; a
    /// mismatch is answered with `400` (`"0"` always matches).
    async fn update(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError>;

    async fn delete(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<TransportResponse, TransportError>;

    async fn list(
        &self,
        kind: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<TransportResponse, TransportError>;

    async fn watch(
        &self,
        kind: &str,
        namespace: &str,
        name: Option<&str>,
        options: &ListOptions,
    ) -> Result<EventStream, TransportError>;
}
