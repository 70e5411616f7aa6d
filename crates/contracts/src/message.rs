//! RawMessage - Ingestion output
//!
//! Opaque payload paired with the topic it arrived on.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Topic;

/// Raw broker message
///
/// The payload is believed to be a JSON document but is not inspected until
/// the dispatcher decodes it against the expected shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Topic the message arrived on
    pub topic: Topic,

    /// Message body (zero-copy)
    pub payload: Bytes,
}

impl RawMessage {
    /// Create a new raw message
    pub fn new(topic: Topic, payload: impl Into<Bytes>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
