//! Relay orchestration module.

mod input;
mod orchestrator;
mod stats;

pub use input::{read_input, InputRecord};
pub use orchestrator::{Relay, RelayConfig};
pub use stats::RelayStats;
