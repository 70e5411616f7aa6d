//! Listener trait - Dispatcher output interface
//!
//! Defines the abstract interface for event handlers.

use crate::ContractError;

/// Event handler trait
///
/// Implemented by the embedding application, once per kind of handler. The
/// dispatcher owns one delivery worker per registered listener and calls
/// [`on_event`](LocalListener::on_event) with a shared, read-only reference
/// to the decoded event. The same event instance is seen by every listener
/// registered on the topic, so handlers must not rely on exclusive access.
#[trait_variant::make(Listener: Send)]
pub trait LocalListener<E> {
    /// Listener name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Handle one decoded event
    ///
    /// # Errors
    /// Returned errors are recorded and reported as dead letters; they never
    /// reach the ingestion path.
    async fn on_event(&self, event: &E) -> Result<(), ContractError>;
}
