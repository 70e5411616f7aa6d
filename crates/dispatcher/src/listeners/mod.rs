//! Listener implementations
//!
//! Contains LogListener and ChannelListener.

mod channel;
mod log;

pub use self::channel::ChannelListener;
pub use self::log::LogListener;
