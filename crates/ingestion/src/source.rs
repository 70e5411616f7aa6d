//! MessageSource - where consumers pull payloads from

use async_channel::Receiver;
use bytes::Bytes;
use contracts::Topic;

use crate::error::Result;

/// A broker connection able to open consumer streams
///
/// `subscribe` returns a stream that yields payloads until the source closes.
/// Consumers on the same topic compete: each payload reaches exactly one of
/// them.
pub trait MessageSource: Send + Sync + 'static {
    /// Open a consumer stream on `topic` identified by `consumer_tag`
    fn subscribe(&self, topic: &Topic, consumer_tag: &str) -> Result<Receiver<Bytes>>;

    /// Release `consumer_tag` on `topic` once its stream is no longer read
    fn unsubscribe(&self, topic: &Topic, consumer_tag: &str);
}
