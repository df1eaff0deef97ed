use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::stream;
use http::StatusCode;
use serde_json::json;
use shared_types::{ApiStatus, WatchEventType};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::selector::LabelSelector;
use crate::transport::{EventStream, ListOptions, RawEvent, Transport, TransportResponse};
use crate::unstructured::Unstructured;

const DEFAULT_BUS_CAPACITY: usize = 1024;

type ObjectKey = (String, String, String);

#[derive(Debug, Clone)]
struct BusEvent {
    kind: String,
    namespace: String,
    /// Empty for payloads that carry no object
    name: String,
    labels: BTreeMap<String, String>,
    raw: RawEvent,
}

/// Subscription filter of one watch.
struct Interest {
    kind: String,
    namespace: String,
    name: Option<String>,
    selector: LabelSelector,
}

impl Interest {
    fn wants(&self, event: &BusEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }
        if !self.namespace.is_empty() && event.namespace != self.namespace {
            return false;
        }
        // Payloads without an object (errors, garbage) reach every watcher in scope
        if event.name.is_empty() {
            return true;
        }
        if self.name.as_deref().is_some_and(|name| name != event.name) {
            return false;
        }
        self.selector.matches(&event.labels)
    }
}

/// In-memory backend speaking the [`Transport`] contract.
///
/// Objects are keyed by kind, namespace and name. Every mutation is published
/// on an event bus while the map is still locked, so watchers observe events
/// in write order.
pub struct MemoryTransport {
    objects: RwLock<BTreeMap<ObjectKey, Unstructured>>,
    bus: RwLock<broadcast::Sender<BusEvent>>,
    capacity: usize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// `capacity` bounds how far a watcher may fall behind before its
    /// subscription fails.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (bus, _) = broadcast::channel(capacity);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            bus: RwLock::new(bus),
            capacity,
        }
    }

    /// Number of stored objects of `kind` across all namespaces.
    pub async fn len(&self, kind: &str) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(k, _, _)| k == kind)
            .count()
    }

    pub async fn is_empty(&self, kind: &str) -> bool {
        self.len(kind).await == 0
    }

    /// Number of open watch subscriptions.
    pub async fn watcher_count(&self) -> usize {
        self.bus.read().await.receiver_count()
    }

    /// Publishes an arbitrary event to the watchers of `kind` in `namespace`.
    pub async fn emit(
        &self,
        kind: &str,
        namespace: &str,
        event_type: WatchEventType,
        object: impl Into<Bytes>,
    ) {
        let object = object.into();
        let parsed = serde_json::from_slice::<Unstructured>(&object).ok();
        let event = BusEvent {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: parsed
                .as_ref()
                .map(|o| o.name().to_string())
                .unwrap_or_default(),
            labels: parsed.map(|o| o.labels()).unwrap_or_default(),
            raw: RawEvent { event_type, object },
        };
        self.publish(&*self.bus.read().await, event);
    }

    /// Ends every open subscription after it drains what was already sent.
    pub async fn close_watchers(&self) {
        let mut bus = self.bus.write().await;
        *bus = broadcast::channel(self.capacity).0;
        info!("Closed all watch subscriptions");
    }

    fn publish(&self, bus: &broadcast::Sender<BusEvent>, event: BusEvent) {
        // No receivers is not an error
        let receivers = bus.send(event).unwrap_or(0);
        debug!(receivers, "published event");
    }

    async fn notify(&self, kind: &str, event_type: WatchEventType, object: &Unstructured) {
        let raw = match serde_json::to_vec(object) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(kind, name = object.name(), error = %err, "dropping unencodable watch event");
                return;
            }
        };
        let event = BusEvent {
            kind: kind.to_string(),
            namespace: object.namespace().to_string(),
            name: object.name().to_string(),
            labels: object.labels(),
            raw: RawEvent {
                event_type,
                object: raw.into(),
            },
        };
        self.publish(&*self.bus.read().await, event);
    }
}

fn key(kind: &str, namespace: &str, name: &str) -> ObjectKey {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn status(code: StatusCode, message: String) -> TransportResponse {
    TransportResponse::from_status(&ApiStatus::new(
        code.as_u16(),
        code.canonical_reason().unwrap_or_default(),
        message,
    ))
}

fn object_response(code: StatusCode, object: &Unstructured) -> TransportResponse {
    match serde_json::to_vec(object) {
        Ok(body) => TransportResponse::new(code, body),
        Err(err) => status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn parse_body(body: &[u8]) -> Result<Unstructured, TransportResponse> {
    serde_json::from_slice::<serde_json::Value>(body)
        .map_err(|err| err.to_string())
        .and_then(|value| Unstructured::from_value(value).map_err(|err| err.to_string()))
        .map_err(|message| status(StatusCode::BAD_REQUEST, format!("invalid object: {message}")))
}

fn parse_selector(options: &ListOptions) -> Result<LabelSelector, String> {
    options
        .label_selector
        .as_deref()
        .map(LabelSelector::parse)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(|err| err.to_string())
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn create(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        let mut object = match parse_body(&body) {
            Ok(object) => object,
            Err(response) => return Ok(response),
        };

        let mut objects = self.objects.write().await;
        let id = key(kind, namespace, name);
        if objects.contains_key(&id) {
            return Ok(status(
                StatusCode::CONFLICT,
                format!("{kind} {namespace}/{name} already exists"),
            ));
        }

        object.set_name(name);
        object.set_namespace(namespace);
        object.set_resource_version("1");
        if object.uid().is_empty() {
            object.set_metadata_str("uid", &Uuid::new_v4().to_string());
        }
        object.set_metadata_str(
            "creationTimestamp",
            &Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        self.notify(kind, WatchEventType::Added, &object).await;
        let response = object_response(StatusCode::CREATED, &object);
        objects.insert(id, object);
        Ok(response)
    }

    async fn get(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<TransportResponse, TransportError> {
        let objects = self.objects.read().await;
        Ok(match objects.get(&key(kind, namespace, name)) {
            Some(object) => object_response(StatusCode::OK, object),
            None => status(
                StatusCode::NOT_FOUND,
                format!("{kind} {namespace}/{name} not found"),
            ),
        })
    }

    async fn update(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        let mut object = match parse_body(&body) {
            Ok(object) => object,
            Err(response) => return Ok(response),
        };

        let mut objects = self.objects.write().await;
        let id = key(kind, namespace, name);
        let Some(current) = objects.get(&id) else {
            return Ok(status(
                StatusCode::NOT_FOUND,
                format!("{kind} {namespace}/{name} not found"),
            ));
        };

        let expected = current.resource_version();
        let offered = object.resource_version();
        if offered != "0" && offered != expected {
            return Ok(status(
                StatusCode::BAD_REQUEST,
                format!("resourceVersion {offered:?} does not match current {expected:?}"),
            ));
        }
        let next = match expected.parse::<u64>() {
            Ok(version) => version + 1,
            Err(_) => {
                return Ok(status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("stored resourceVersion {expected:?} is not a number"),
                ))
            }
        };

        object.set_name(name);
        object.set_namespace(namespace);
        object.set_metadata_str("uid", current.uid());
        let created = current
            .as_map()
            .get("metadata")
            .and_then(|meta| meta.get("creationTimestamp"))
            .and_then(|ts| ts.as_str())
            .unwrap_or_default()
            .to_string();
        object.set_metadata_str("creationTimestamp", &created);
        object.set_resource_version(&next.to_string());

        self.notify(kind, WatchEventType::Modified, &object).await;
        let response = object_response(StatusCode::OK, &object);
        objects.insert(id, object);
        Ok(response)
    }

    async fn delete(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<TransportResponse, TransportError> {
        let mut objects = self.objects.write().await;
        Ok(match objects.remove(&key(kind, namespace, name)) {
            Some(object) => {
                self.notify(kind, WatchEventType::Deleted, &object).await;
                object_response(StatusCode::OK, &object)
            }
            None => status(
                StatusCode::NOT_FOUND,
                format!("{kind} {namespace}/{name} not found"),
            ),
        })
    }

    async fn list(
        &self,
        kind: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<TransportResponse, TransportError> {
        let selector = match parse_selector(options) {
            Ok(selector) => selector,
            Err(message) => return Ok(status(StatusCode::BAD_REQUEST, message)),
        };

        let objects = self.objects.read().await;
        let items: Vec<&Unstructured> = objects
            .iter()
            .filter(|((k, ns, _), _)| k == kind && (namespace.is_empty() || ns == namespace))
            .map(|(_, object)| object)
            .filter(|object| selector.matches(&object.labels()))
            .collect();

        let body = json!({ "metadata": {}, "items": items });
        Ok(TransportResponse::new(StatusCode::OK, body.to_string()))
    }

    async fn watch(
        &self,
        kind: &str,
        namespace: &str,
        name: Option<&str>,
        options: &ListOptions,
    ) -> Result<EventStream, TransportError> {
        let selector = parse_selector(options).map_err(TransportError::Stream)?;
        let interest = Interest {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.map(str::to_string),
            selector,
        };
        let receiver = self.bus.read().await.subscribe();
        debug!(kind, namespace, ?name, "opened watch subscription");

        let events = stream::unfold((receiver, interest), |(mut receiver, interest)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if interest.wants(&event) => {
                        return Some((Ok(event.raw), (receiver, interest)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        let message = format!("watcher fell behind by {missed} events");
                        let err = TransportError::Stream(message);
                        return Some((Err(err), (receiver, interest)));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(events))
    }
}
