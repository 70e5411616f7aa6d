//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Input record could not be parsed
    #[error("Invalid input at line {line}: {message}")]
    InvalidInput { line: usize, message: String },

    /// Input record names a topic with no subscription
    #[error("Input line {line} targets unsubscribed topic '{topic}'")]
    UnknownTopic { line: usize, topic: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn invalid_input(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            line,
            message: message.into(),
        }
    }

    pub fn unknown_topic(line: usize, topic: impl Into<String>) -> Self {
        Self::UnknownTopic {
            line,
            topic: topic.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
