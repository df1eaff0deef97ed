#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod keyer;
pub mod lifecycle;
pub mod memory;
pub mod selector;
pub mod store;
pub mod transport;
pub mod unstructured;
pub mod watch;


pub use codec::{Codec, JsonCodec};
pub use config::{RetryPolicy, StoreConfig};
pub use descriptor::{ResourceDescriptor, Scope};
pub use error::{Result, StoreError, TransportError};
pub use keyer::Keyer;
pub use lifecycle::{DeleteOutcome, Lifecycle, Preconditions};
pub use memory::MemoryTransport;
pub use selector::{LabelSelector, SelectionPredicate};
pub use store::Store;
pub use transport::{EventStream, ListOptions, RawEvent, Transport, TransportResponse};
pub use unstructured::{from_generic, to_generic, Unstructured};
pub use watch::{WatchEvent, WatchHandle, WatchStopper};
