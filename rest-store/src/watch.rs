use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use http::StatusCode;
use shared_types::{Resource, ResourceList, WatchEventType};
use tokio::sync::{mpsc, watch as signal};
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::descriptor::ResourceDescriptor;
use crate::error::{Result, StoreError, TransportError};
use crate::transport::{EventStream, RawEvent, TransportResponse};

/// Typed event delivered to watch consumers.
#[derive(Debug)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// Always the last event of a watch
    Error(StoreError),
}

impl<T> WatchEvent<T> {
    pub fn event_type(&self) -> WatchEventType {
        match self {
            WatchEvent::Added(_) => WatchEventType::Added,
            WatchEvent::Modified(_) => WatchEventType::Modified,
            WatchEvent::Deleted(_) => WatchEventType::Deleted,
            WatchEvent::Error(_) => WatchEventType::Error,
        }
    }

    pub fn object(&self) -> Option<&T> {
        match self {
            WatchEvent::Added(object)
            | WatchEvent::Modified(object)
            | WatchEvent::Deleted(object) => Some(object),
            WatchEvent::Error(_) => None,
        }
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            WatchEvent::Added(object)
            | WatchEvent::Modified(object)
            | WatchEvent::Deleted(object) => Some(object),
            WatchEvent::Error(_) => None,
        }
    }

    /// `None` for [`WatchEventType::Error`], which carries a status rather than an object.
    fn typed(event_type: WatchEventType, object: T) -> Option<Self> {
        match event_type {
            WatchEventType::Added => Some(WatchEvent::Added(object)),
            WatchEventType::Modified => Some(WatchEvent::Modified(object)),
            WatchEventType::Deleted => Some(WatchEvent::Deleted(object)),
            WatchEventType::Error => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchTarget {
    Object,
    List,
}

/// Turns raw transport events into typed ones.
pub(crate) struct EventDecoder<T, L> {
    codec: Arc<dyn Codec>,
    descriptor: ResourceDescriptor<T, L>,
    target: WatchTarget,
}

impl<T, L> EventDecoder<T, L>
where
    T: Resource,
    L: ResourceList<Item = T>,
{
    pub(crate) fn new(
        codec: Arc<dyn Codec>,
        descriptor: ResourceDescriptor<T, L>,
        target: WatchTarget,
    ) -> Self {
        Self {
            codec,
            descriptor,
            target,
        }
    }

    /// A list payload on a list watch expands into one event per item, in order.
    fn decode(&self, raw: RawEvent) -> Result<Vec<WatchEvent<T>>> {
        if raw.event_type == WatchEventType::Error {
            let message = TransportResponse::new(StatusCode::OK, raw.object).message();
            return Err(TransportError::Stream(message).into());
        }

        let event_type = raw.event_type;
        let typed = |object: T| {
            WatchEvent::typed(event_type, object).ok_or_else(|| {
                StoreError::from(TransportError::Stream(format!(
                    "{event_type:?} event carries no object"
                )))
            })
        };

        let generic = self.codec.decode(&raw.object)?;
        if self.target == WatchTarget::List && generic.is_list() {
            let mut list = self.descriptor.decode_list(generic)?;
            return std::mem::take(list.items_mut())
                .into_iter()
                .map(typed)
                .collect();
        }

        let object = self.descriptor.decode_object(generic)?;
        Ok(vec![typed(object)?])
    }
}

/// Starts the pipeline task that feeds a [`WatchHandle`].
pub(crate) fn spawn<T, L>(
    upstream: EventStream,
    decoder: EventDecoder<T, L>,
    buffer: usize,
) -> WatchHandle<T>
where
    T: Resource,
    L: ResourceList<Item = T>,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (stop_tx, stop_rx) = signal::channel(false);
    tokio::spawn(pump(upstream, decoder, tx, stop_rx));
    WatchHandle {
        rx,
        stop: WatchStopper(Arc::new(stop_tx)),
    }
}

async fn pump<T, L>(
    mut upstream: EventStream,
    decoder: EventDecoder<T, L>,
    tx: mpsc::Sender<WatchEvent<T>>,
    mut stop: signal::Receiver<bool>,
) where
    T: Resource,
    L: ResourceList<Item = T>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            next = upstream.next() => next,
        };

        let events = match next {
            Some(Ok(raw)) => decoder.decode(raw),
            Some(Err(err)) => Err(err.into()),
            None => {
                debug!("watch upstream closed");
                break;
            }
        };

        match events {
            Ok(events) => {
                for event in events {
                    if !forward(&tx, &mut stop, event).await {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "watch terminated");
                forward(&tx, &mut stop, WatchEvent::Error(err)).await;
                break;
            }
        }
    }
    // Dropping `upstream` here releases the backend subscription
}

/// Delivers one event; false when the consumer is gone or stopped.
async fn forward<T>(
    tx: &mpsc::Sender<WatchEvent<T>>,
    stop: &mut signal::Receiver<bool>,
    event: WatchEvent<T>,
) -> bool {
    tokio::select! {
        biased;
        _ = stopped(stop) => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

async fn stopped(stop: &mut signal::Receiver<bool>) {
    // A dropped sender counts as a stop
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Cloneable handle that stops a watch from anywhere.
#[derive(Debug, Clone)]
pub struct WatchStopper(Arc<signal::Sender<bool>>);

impl WatchStopper {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Consumer side of a watch.
///
/// Events arrive in backend order. Once [`stop`](Self::stop) is called no
/// further events are handed out, including ones already buffered. Dropping
/// the handle stops the watch.
#[derive(Debug)]
pub struct WatchHandle<T> {
    rx: mpsc::Receiver<WatchEvent<T>>,
    stop: WatchStopper,
}

impl<T> WatchHandle<T> {
    /// Next event, or `None` once the watch is stopped or has ended.
    pub async fn recv(&mut self) -> Option<WatchEvent<T>> {
        if self.stop.is_stopped() {
            return None;
        }
        let event = self.rx.recv().await;
        if self.stop.is_stopped() {
            return None;
        }
        event
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stopper(&self) -> WatchStopper {
        self.stop.clone()
    }
}

impl<T> Drop for WatchHandle<T> {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

impl<T> Stream for WatchHandle<T> {
    type Item = WatchEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.stop.is_stopped() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}
