//! `validate` command implementation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    url: String,
    topic_count: usize,
    subscription_count: usize,
    queue_capacity: usize,
    delivery_timeout_ms: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let topic_count = blueprint
                .subscriptions
                .iter()
                .map(|s| s.topic.as_str())
                .collect::<HashSet<_>>()
                .len();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    url: blueprint.broker.url.clone(),
                    topic_count,
                    subscription_count: blueprint.subscriptions.len(),
                    queue_capacity: blueprint.delivery.queue_capacity,
                    delivery_timeout_ms: blueprint.delivery.delivery_timeout_ms,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &contracts::BrokerBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.subscriptions.is_empty() {
        warnings.push("No subscriptions configured - nothing will be consumed".to_string());
    }

    if blueprint.delivery.queue_capacity < 8 {
        warnings.push(format!(
            "delivery.queue_capacity is {} - bursts will be dropped quickly",
            blueprint.delivery.queue_capacity
        ));
    }

    if !blueprint.broker.url.starts_with("memory://") {
        warnings.push(format!(
            "broker.url '{}' is not a memory:// URL - only the in-process broker is available",
            blueprint.broker.url
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Broker: {}", summary.url);
            println!("  Topics: {}", summary.topic_count);
            println!("  Subscriptions: {}", summary.subscription_count);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Delivery timeout: {}ms", summary.delivery_timeout_ms);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
