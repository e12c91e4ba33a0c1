//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{MergerConfig, RigBlueprint};

use crate::cli::InfoArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    merger: MergerConfig,
    queue: QueueInfo,
    acquisition: AcquisitionInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct QueueInfo {
    capacity: usize,
    backlog_threshold: usize,
    sustain: u32,
    policy: String,
}

#[derive(Serialize)]
struct AcquisitionInfo {
    read_period_ms: u64,
    max_records_per_read: usize,
    settle_threshold: usize,
}

#[derive(Serialize)]
struct SensorInfo {
    source: String,
    odr_hz: f64,
    drift_ppm: f64,
    nominal_period_us: f64,
    gyro_enabled: bool,
    fifo_capacity: usize,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &RigBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sensors = if args.sensors {
        blueprint
            .sensors
            .iter()
            .map(|s| SensorInfo {
                source: s.source.to_string(),
                odr_hz: s.odr_hz,
                drift_ppm: s.drift_ppm,
                nominal_period_us: s.nominal_period_us(),
                gyro_enabled: s.gyro_enabled,
                fifo_capacity: s.fifo_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        merger: blueprint.merger.clone(),
        queue: QueueInfo {
            capacity: blueprint.queue.capacity,
            backlog_threshold: blueprint.queue.backlog_threshold,
            sustain: blueprint.queue.sustain,
            policy: format!("{:?}", blueprint.queue.policy),
        },
        acquisition: AcquisitionInfo {
            read_period_ms: blueprint.acquisition.read_period_ms,
            max_records_per_read: blueprint.acquisition.max_records_per_read,
            settle_threshold: blueprint.acquisition.settle_threshold,
        },
        sensors,
        sinks,
    }
}

fn print_config_info(blueprint: &RigBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 IMU Merger Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let merger = &blueprint.merger;
    println!("🔀 Merger");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Decay alpha: {}", merger.decay_alpha);
    println!("   ├─ Recenter interval: {}", merger.recenter_interval);
    println!(
        "   ├─ Warm-up: {} batches (reference after {})",
        merger.warmup_batches, merger.reference_after_batches
    );
    println!("   └─ Large batch warning: > {}", merger.large_batch_warning);

    let queue = &blueprint.queue;
    println!("\n📥 Queue");
    println!("   ├─ Capacity: {}", queue.capacity);
    println!(
        "   ├─ Backlog threshold: {} (sustain {})",
        queue.backlog_threshold, queue.sustain
    );
    println!("   └─ Policy: {:?}", queue.policy);

    let acquisition = &blueprint.acquisition;
    println!("\n📡 Acquisition");
    println!("   ├─ Read period: {} ms", acquisition.read_period_ms);
    println!("   ├─ Max records per read: {}", acquisition.max_records_per_read);
    println!("   └─ Settle threshold: {}", acquisition.settle_threshold);

    println!("\n🧭 IMUs ({})", blueprint.sensors.len());
    for (i, sensor) in blueprint.sensors.iter().enumerate() {
        let is_last = i == blueprint.sensors.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} ({} Hz, {:+} ppm)",
            prefix, sensor.source, sensor.odr_hz, sensor.drift_ppm
        );
        if args.sensors {
            println!(
                "   {}  ├─ Period: {:.3} us",
                child_prefix,
                sensor.nominal_period_us()
            );
            println!(
                "   {}  ├─ Signal: {} counts at {} Hz, noise {}",
                child_prefix, sensor.amplitude, sensor.signal_hz, sensor.noise
            );
            println!("   {}  ├─ Gyro: {}", child_prefix, sensor.gyro_enabled);
            println!("   {}  └─ FIFO: {} records", child_prefix, sensor.fifo_capacity);
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let prefix = if i == blueprint.sinks.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            if args.sinks && !sink.params.is_empty() {
                println!(
                    "   {} {} ({:?}) {:?}",
                    prefix, sink.name, sink.sink_type, sink.params
                );
            } else {
                println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);
            }
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    const RIG_TOML: &str = r#"
[[sensors]]
source = "left"
odr_hz = 1920.0

[[sensors]]
source = "right"
odr_hz = 2000.0

[[sinks]]
name = "log"
sink_type = "log"
params = { every = "10" }
"#;

    #[test]
    fn test_build_config_info() {
        let blueprint = ConfigLoader::load_from_str(RIG_TOML, ConfigFormat::Toml).unwrap();
        let args = InfoArgs {
            config: "rig.toml".into(),
            json: true,
            sensors: true,
            sinks: false,
        };

        let info = build_config_info(&blueprint, &args);
        assert_eq!(info.sensors.len(), 2);
        assert!((info.sensors[1].nominal_period_us - 500.0).abs() < 1e-9);
        assert!(info.sinks.is_empty());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["queue"]["policy"], "Abort");
        assert_eq!(json["merger"]["warmup_batches"], 10);
        assert!(json.get("sinks").is_none());
    }
}
