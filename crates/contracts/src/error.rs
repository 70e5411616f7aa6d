//! Layered error definitions
//!
//! Categorized by source: setup input or listener

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Required identifier was empty (topic, consumer tag, connection url)
    #[error("'{field}' not allowed to be empty")]
    EmptyIdentifier { field: String },

    // ===== Listener Errors =====
    /// Listener returned an error while handling an event
    #[error("listener '{listener}' failed: {message}")]
    ListenerFailed { listener: String, message: String },

    /// Config file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create empty identifier error
    pub fn empty_identifier(field: impl Into<String>) -> Self {
        Self::EmptyIdentifier {
            field: field.into(),
        }
    }

    /// Create listener failure error
    pub fn listener_failed(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ListenerFailed {
            listener: listener.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised while validating setup input
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } | Self::EmptyIdentifier { .. }
        )
    }
}
