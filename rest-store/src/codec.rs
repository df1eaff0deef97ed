use std::fmt;

use bytes::Bytes;

use crate::error::Result;
use crate::unstructured::Unstructured;

/// Turns generic objects into wire bytes and back.
pub trait Codec: Send + Sync + fmt::Debug {
    fn content_type(&self) -> &'static str;

    fn encode(&self, object: &Unstructured) -> Result<Bytes>;

    fn decode(&self, data: &[u8]) -> Result<Unstructured>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, object: &Unstructured) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(object)?))
    }

    fn decode(&self, data: &[u8]) -> Result<Unstructured> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        Unstructured::from_value(value)
    }
}
