//! Dead letter reporting
//!
//! Wraps the application's [`DeadLetterCallback`] so every report is also
//! counted in the metrics registry.

use contracts::{DeadLetter, DeadLetterCallback};
use tracing::warn;

/// Shared reporter handed to the dispatch path and every listener worker
#[derive(Clone, Default)]
pub struct DeadLetterReporter {
    callback: Option<DeadLetterCallback>,
}

impl DeadLetterReporter {
    /// Reporter that forwards to `callback`
    pub fn new(callback: DeadLetterCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// Reporter that only logs
    pub fn logging() -> Self {
        Self::default()
    }

    /// Record and forward one dead letter
    pub fn report(&self, letter: DeadLetter) {
        observability::record_dead_letter(&letter);
        match &self.callback {
            Some(callback) => callback(letter),
            None => warn!(
                topic = %letter.topic,
                listener = ?letter.listener,
                reason = %letter.reason,
                "Dead letter"
            ),
        }
    }
}

impl std::fmt::Debug for DeadLetterReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
