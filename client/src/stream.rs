//! Decoding of newline-delimited JSON watch responses.

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use rest_store::{EventStream, RawEvent, TransportError};
use shared_types::{ApiStatus, WatchEventType, WireEvent};
use std::fmt::Display;
use tracing::debug;

/// Largest watch line accepted by [`decode_events`].
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

struct LineReader {
    body: BoxStream<'static, Result<Bytes, String>>,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    max_line_length: usize,
    eof: bool,
    failed: bool,
}

impl LineReader {
    /// Next complete line, or the unterminated tail once the body has ended.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        if let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            self.scanned = 0;
            return Some(line);
        }
        self.scanned = self.buffer.len();
        if self.eof && !self.buffer.is_empty() {
            self.scanned = 0;
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    fn overflowing(&self) -> bool {
        self.buffer.len() > self.max_line_length
    }

    fn too_long(&mut self) -> TransportError {
        self.failed = true;
        TransportError::Stream(format!("watch line exceeds {} bytes", self.max_line_length))
    }
}

fn parse_line(line: &[u8]) -> Result<RawEvent, TransportError> {
    let wire: WireEvent = serde_json::from_slice(line)
        .map_err(|err| TransportError::Stream(format!("malformed watch line: {err}")))?;

    if wire.event_type == WatchEventType::Error {
        let message = match serde_json::from_value::<ApiStatus>(wire.object.clone()) {
            Ok(status) => status.message,
            Err(_) => wire.object.to_string(),
        };
        return Err(TransportError::Stream(message));
    }

    let object = serde_json::to_vec(&wire.object)
        .map_err(|err| TransportError::Stream(err.to_string()))?;
    Ok(RawEvent {
        event_type: wire.event_type,
        object: Bytes::from(object),
    })
}

/// Turns a chunked NDJSON body into raw watch events.
///
/// An `ERROR` line, a malformed line or a failing body ends the stream with
/// one [`TransportError::Stream`].
pub fn decode_events<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    decode_events_with_limit(body, DEFAULT_MAX_LINE_LENGTH)
}

/// Same as [`decode_events`], failing the stream once a single line grows
/// past `max_line_length` bytes.
pub fn decode_events_with_limit<S, E>(body: S, max_line_length: usize) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let reader = LineReader {
        body: body.map(|chunk| chunk.map_err(|err| err.to_string())).boxed(),
        buffer: Vec::new(),
        scanned: 0,
        max_line_length,
        eof: false,
        failed: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if reader.failed {
                return None;
            }
            if let Some(line) = reader.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if line.len() > reader.max_line_length {
                    return Some((Err(reader.too_long()), reader));
                }
                let event = parse_line(&line);
                reader.failed = event.is_err();
                return Some((event, reader));
            }
            if reader.eof {
                debug!("watch body ended");
                return None;
            }
            if reader.overflowing() {
                return Some((Err(reader.too_long()), reader));
            }
            match reader.body.next().await {
                Some(Ok(chunk)) => reader.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    reader.failed = true;
                    return Some((Err(TransportError::Stream(err)), reader));
                }
                None => reader.eof = true,
            }
        }
    })
    .boxed()
}
