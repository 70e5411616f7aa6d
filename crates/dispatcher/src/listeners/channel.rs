//! ChannelListener - forwards a copy of every event into a channel
//!
//! Bridges the listener model to code that prefers to pull events from a
//! receiver. The send waits for channel capacity, so a receiver that stops
//! reading is eventually cut off by the delivery timeout.

use contracts::{ContractError, Listener};
use tokio::sync::mpsc;

/// Listener that clones each event into an mpsc channel
pub struct ChannelListener<E> {
    name: String,
    tx: mpsc::Sender<E>,
}

impl<E> ChannelListener<E> {
    /// Create a listener and the receiver its events arrive on
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl<E: Clone + Send + Sync> Listener<E> for ChannelListener<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: &E) -> Result<(), ContractError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| ContractError::listener_failed(&self.name, "receiver dropped"))
    }
}
