//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::RigBlueprint;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig, StopReason};

pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        warmup_batches = blueprint.merger.warmup_batches,
        queue_capacity = blueprint.queue.capacity,
        read_period_ms = blueprint.acquisition.read_period_ms,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        duration: (args.duration_secs > 0).then(|| Duration::from_secs(args.duration_secs)),
        max_halves: (args.max_halves > 0).then_some(args.max_halves),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    if stats.stop_reason == StopReason::Signal {
        warn!("Received shutdown signal, pipeline stopped");
    }
    info!(
        halves = stats.merger.window.halves_flushed,
        forced_flushes = stats.merger.window.forced_flushes,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("IMU merger finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &RigBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Merger:");
    println!(
        "  Warm-up: {} batches (reference after {})",
        blueprint.merger.warmup_batches, blueprint.merger.reference_after_batches
    );
    println!(
        "  Fitter: alpha {}, recenter every {}",
        blueprint.merger.decay_alpha, blueprint.merger.recenter_interval
    );
    println!(
        "\nQueue: capacity {}, backlog threshold {} ({:?})",
        blueprint.queue.capacity, blueprint.queue.backlog_threshold, blueprint.queue.policy
    );
    println!(
        "Acquisition: every {} ms, up to {} records",
        blueprint.acquisition.read_period_ms, blueprint.acquisition.max_records_per_read
    );

    println!("\nIMUs ({}):", blueprint.sensors.len());
    for sensor in &blueprint.sensors {
        println!(
            "  - {}: {} Hz, {:+} ppm{}",
            sensor.source,
            sensor.odr_hz,
            sensor.drift_ppm,
            if sensor.gyro_enabled { ", gyro" } else { "" }
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
