//! LogListener - logs every event via tracing

use std::fmt::Debug;

use contracts::{ContractError, Listener};
use tracing::{info, instrument};

/// Listener that logs events for debugging
pub struct LogListener {
    name: String,
}

impl LogListener {
    /// Create a new LogListener with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<E: Debug + Sync> Listener<E> for LogListener {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_listener_on_event", skip(self, event), fields(listener = %self.name))]
    async fn on_event(&self, event: &E) -> Result<(), ContractError> {
        info!(listener = %self.name, event = ?event, "Event received");
        Ok(())
    }
}
