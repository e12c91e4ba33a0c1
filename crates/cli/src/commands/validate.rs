//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{BackpressurePolicy, RigBlueprint, SinkType, Source};

use crate::cli::ValidateArgs;

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
    warmup_batches: u64,
    queue_capacity: usize,
    read_period_ms: u64,
    sink_count: usize,
}

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
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    warmup_batches: blueprint.merger.warmup_batches,
                    queue_capacity: blueprint.queue.capacity,
                    read_period_ms: blueprint.acquisition.read_period_ms,
                    sink_count: blueprint.sinks.len(),
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

/// Non-fatal configuration issues
fn collect_warnings(blueprint: &RigBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - merged halves will be dropped".to_string());
    }

    for sink in &blueprint.sinks {
        if sink.sink_type == SinkType::File
            && !sink.params.contains_key("path")
            && !sink.params.contains_key("dir")
        {
            warnings.push(format!(
                "File sink '{}' has no path or dir - writing under ./output",
                sink.name
            ));
        }
    }

    if blueprint.queue.policy == BackpressurePolicy::Warn {
        warnings.push(
            "queue.policy = warn - a merger that falls behind is only logged".to_string(),
        );
    }

    if blueprint.merger.large_batch_warning >= blueprint.acquisition.max_records_per_read {
        warnings.push(format!(
            "merger.large_batch_warning ({}) can never trigger with max_records_per_read = {}",
            blueprint.merger.large_batch_warning, blueprint.acquisition.max_records_per_read
        ));
    }

    if let (Some(left), Some(right)) = (
        blueprint.sensor(Source::Left),
        blueprint.sensor(Source::Right),
    ) {
        if left.odr_hz == right.odr_hz && left.drift_ppm == right.drift_ppm {
            warnings.push(
                "Both IMUs run the same clock - reference selection is decided by noise"
                    .to_string(),
            );
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Warm-up batches: {}", summary.warmup_batches);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Read period: {} ms", summary.read_period_ms);
            println!("  Sinks: {}", summary.sink_count);
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
