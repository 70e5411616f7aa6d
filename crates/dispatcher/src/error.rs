//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Payload did not decode into the expected shape
    #[error("invalid {shape} payload: {source}")]
    Decode {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DispatcherError {
    /// Create a decode error for the given shape name
    pub fn decode(shape: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { shape, source }
    }
}
