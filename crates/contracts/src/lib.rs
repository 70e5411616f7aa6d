//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend only on this crate, never on each other in reverse.
//!
//! ## Message Model
//! - A [`Topic`] names a logical message stream (a broker queue)
//! - Payloads travel as opaque bytes until the dispatcher decodes them
//! - Decoded events are handed to [`Listener`]s by shared reference

mod blueprint;
mod dead_letter;
mod error;
mod listener;
mod message;
mod topic;

pub use blueprint::*;
pub use dead_letter::*;
pub use error::*;
pub use listener::{Listener, LocalListener};
pub use message::RawMessage;
pub use topic::Topic;
