//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{read_input, Relay, RelayConfig};

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        url = %blueprint.broker.url,
        queue_capacity = blueprint.delivery.queue_capacity,
        delivery_timeout_ms = blueprint.delivery.delivery_timeout_ms,
        subscriptions = blueprint.subscriptions.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let input_path = args.input.as_deref().context("--input is required")?;
    let input = read_input(input_path)
        .with_context(|| format!("Failed to read input from {}", input_path.display()))?;
    info!(records = input.len(), input = %input_path.display(), "Input loaded");

    let relay = Relay::new(RelayConfig {
        blueprint,
        input,
        drain: Duration::from_millis(args.drain_ms),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    let shutdown_signal = setup_shutdown_signal();

    info!("Starting relay...");

    tokio::select! {
        result = relay.run() => {
            match result {
                Ok(stats) => {
                    info!(
                        consumed = stats.consumed,
                        skipped = stats.skipped,
                        duration_secs = stats.duration.as_secs_f64(),
                        throughput = format!("{:.2}", stats.throughput()),
                        "Relay completed successfully"
                    );
                    stats.print_summary();
                }
                Err(e) => {
                    return Err(e).context("Relay execution failed");
                }
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping relay...");
        }
    }

    info!("Event relay finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::BrokerBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Broker:");
    println!("  URL: {}", blueprint.broker.url);
    println!("  Prefetch: {}", blueprint.broker.prefetch);
    println!("\nDelivery:");
    println!("  Queue capacity: {}", blueprint.delivery.queue_capacity);
    println!("  Timeout: {}ms", blueprint.delivery.delivery_timeout_ms);
    println!("\nSubscriptions ({}):", blueprint.subscriptions.len());
    for sub in &blueprint.subscriptions {
        println!("  - {} <- {}", sub.topic, sub.consumer_tag);
    }
    println!();
}
