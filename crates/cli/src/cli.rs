//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use observability::LogFormat;
use std::path::PathBuf;

/// Event Relay - topic-based event dispatch from a message broker
#[derive(Parser, Debug)]
#[command(
    name = "event-relay",
    author,
    version,
    about = "Topic-based event relay",
    long_about = "Consumes JSON messages from broker queues, decodes them and fans \n\
                  each one out to every listener registered for its topic."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENT_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (json, pretty or compact)
    #[arg(
        long,
        default_value = "pretty",
        global = true,
        env = "EVENT_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay, replaying messages from an input file
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "relay.toml", env = "EVENT_RELAY_CONFIG")]
    pub config: PathBuf,

    /// JSON-lines file of `{"topic": ..., "payload": ...}` records to publish
    #[arg(short, long, env = "EVENT_RELAY_INPUT", required_unless_present = "dry_run")]
    pub input: Option<PathBuf>,

    /// How long to wait for listeners to drain after the input is consumed (ms)
    #[arg(long, default_value = "5000", env = "EVENT_RELAY_DRAIN_MS")]
    pub drain_ms: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "EVENT_RELAY_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}
