//! Newline-delimited JSON encoding of watch streams.
//!
//! Each line is one [`WireEvent`]. A failing upstream ends the stream with a
//! single `ERROR` line carrying an [`ApiStatus`](shared_types::ApiStatus).

use std::convert::Infallible;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use rest_store::{EventStream, RawEvent, TransportError};
use serde_json::Value;
use shared_types::{WatchEventType, WireEvent};
use tracing::{debug, warn};

use super::error::api_status;

pub fn encode_event(event: &RawEvent) -> Bytes {
    // Payloads the backend could not render as JSON are relayed verbatim as a string
    let object = serde_json::from_slice(&event.object)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&event.object).into_owned()));
    encode_line(event.event_type, object)
}

pub fn encode_error(err: &TransportError) -> Bytes {
    let status = api_status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    encode_line(
        WatchEventType::Error,
        serde_json::to_value(status).unwrap_or_default(),
    )
}

fn encode_line(event_type: WatchEventType, object: Value) -> Bytes {
    let mut line = serde_json::to_vec(&WireEvent { event_type, object }).unwrap_or_default();
    line.push(b'\n');
    Bytes::from(line)
}

/// Renders a transport event stream as NDJSON lines.
pub fn lines(events: EventStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    stream::unfold(Some(events), |events| async move {
        let mut events = events?;
        match events.next().await {
            Some(Ok(event)) => Some((Ok(encode_event(&event)), Some(events))),
            Some(Err(err)) => {
                warn!("Watch stream failed: {}", err);
                Some((Ok(encode_error(&err)), None))
            }
            None => {
                debug!("watch stream finished");
                None
            }
        }
    })
}
