//! DeadLetter - structured report for messages that were not handled
//!
//! Every place that drops a message or swallows a listener failure produces
//! one `DeadLetter` and hands it to a [`DeadLetterCallback`].

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::Topic;

/// Dead letter callback type
///
/// Invoked synchronously from the dispatch path or a delivery worker, so it
/// must return quickly. Uses `Arc` so one callback can be shared by all workers.
pub type DeadLetterCallback = Arc<dyn Fn(DeadLetter) + Send + Sync>;

/// Report of one message (or one delivery) that was dropped
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Topic the message arrived on
    pub topic: Topic,

    /// Listener involved, `None` for failures before fan-out
    pub listener: Option<String>,

    /// Original payload, kept only when the message never decoded
    pub payload: Option<Bytes>,

    /// Why the message was dropped
    pub reason: DeadLetterReason,
}

impl DeadLetter {
    /// Dead letter for a payload that failed to decode
    pub fn decode(topic: Topic, payload: Bytes, message: impl Into<String>) -> Self {
        Self {
            topic,
            listener: None,
            payload: Some(payload),
            reason: DeadLetterReason::Decode {
                message: message.into(),
            },
        }
    }

    /// Dead letter for a delivery to a specific listener
    pub fn delivery(topic: Topic, listener: impl Into<String>, reason: DeadLetterReason) -> Self {
        Self {
            topic,
            listener: Some(listener.into()),
            payload: None,
            reason,
        }
    }
}

/// Dead letter cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// Payload was not valid JSON for the expected shape
    Decode { message: String },

    /// Listener queue was full, delivery dropped for that listener only
    QueueFull,

    /// Listener worker is no longer running
    WorkerClosed,

    /// Listener returned an error
    ListenerFailed { message: String },

    /// Listener did not finish within the delivery timeout
    TimedOut { timeout_ms: u64 },

    /// Listener panicked while handling the event
    Panicked { message: String },

    /// Event type did not match the type the listener was registered for
    ShapeMismatch { expected: &'static str },
}

impl DeadLetterReason {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::QueueFull => "queue_full",
            Self::WorkerClosed => "worker_closed",
            Self::ListenerFailed { .. } => "listener_failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Panicked { .. } => "panicked",
            Self::ShapeMismatch { .. } => "shape_mismatch",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { message } => write!(f, "decode failed: {message}"),
            Self::QueueFull => write!(f, "listener queue full"),
            Self::WorkerClosed => write!(f, "listener worker closed"),
            Self::ListenerFailed { message } => write!(f, "listener failed: {message}"),
            Self::TimedOut { timeout_ms } => write!(f, "listener timed out after {timeout_ms}ms"),
            Self::Panicked { message } => write!(f, "listener panicked: {message}"),
            Self::ShapeMismatch { expected } => write!(f, "event is not a {expected}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dead_letter_keeps_payload() {
        let topic = Topic::new("orders").unwrap();
        let letter = DeadLetter::decode(topic, Bytes::from_static(b"{oops"), "EOF");
        assert!(letter.listener.is_none());
        assert_eq!(letter.payload.as_deref(), Some(&b"{oops"[..]));
        assert_eq!(letter.reason.label(), "decode");
    }

    #[test]
    fn test_reason_display() {
        let reason = DeadLetterReason::TimedOut { timeout_ms: 250 };
        assert_eq!(reason.to_string(), "listener timed out after 250ms");
        assert_eq!(DeadLetterReason::QueueFull.label(), "queue_full");
    }
}
