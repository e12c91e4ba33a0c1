//! Blueprint validation
//!
//! Rules:
//! - exactly one left and one right sensor, sane rate and drift
//! - merger tuning inside its working range
//! - queue and acquisition limits consistent
//! - sink names present and unique

use std::collections::HashSet;

use contracts::{ContractError, RigBlueprint, Source, MAX_BATCH_RECORDS};

/// Largest clock error accepted for a simulated IMU
const MAX_DRIFT_PPM: f64 = 10_000.0;

/// Validate a RigBlueprint.
///
/// Returns the first error encountered.
pub fn validate(blueprint: &RigBlueprint) -> Result<(), ContractError> {
    validate_sensors(blueprint)?;
    validate_merger(blueprint)?;
    validate_queue(blueprint)?;
    validate_acquisition(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

fn validate_sensors(blueprint: &RigBlueprint) -> Result<(), ContractError> {
    for source in Source::BOTH {
        let count = blueprint
            .sensors
            .iter()
            .filter(|sensor| sensor.source == source)
            .count();
        if count != 1 {
            return Err(ContractError::config_validation(
                "sensors",
                format!("expected exactly one {source} sensor, found {count}"),
            ));
        }
    }

    for sensor in &blueprint.sensors {
        if !(sensor.odr_hz > 0.0) {
            return Err(ContractError::config_validation(
                format!("sensors[{}].odr_hz", sensor.source),
                format!("odr_hz must be > 0, got {}", sensor.odr_hz),
            ));
        }
        if !(sensor.drift_ppm.abs() < MAX_DRIFT_PPM) {
            return Err(ContractError::config_validation(
                format!("sensors[{}].drift_ppm", sensor.source),
                format!(
                    "drift_ppm must be within +/-{MAX_DRIFT_PPM}, got {}",
                    sensor.drift_ppm
                ),
            ));
        }
    }
    Ok(())
}

fn validate_merger(blueprint: &RigBlueprint) -> Result<(), ContractError> {
    let merger = &blueprint.merger;

    if !(merger.decay_alpha > 0.0 && merger.decay_alpha < 1.0) {
        return Err(ContractError::config_validation(
            "merger.decay_alpha",
            format!("decay_alpha must be in (0, 1), got {}", merger.decay_alpha),
        ));
    }
    if merger.recenter_interval < 1 {
        return Err(ContractError::config_validation(
            "merger.recenter_interval",
            "recenter_interval must be >= 1",
        ));
    }
    // A fit needs at least two observations
    if merger.reference_after_batches < 2 {
        return Err(ContractError::config_validation(
            "merger.reference_after_batches",
            format!(
                "reference_after_batches must be >= 2, got {}",
                merger.reference_after_batches
            ),
        ));
    }
    if merger.warmup_batches <= merger.reference_after_batches {
        return Err(ContractError::config_validation(
            "merger.warmup_batches / merger.reference_after_batches",
            format!(
                "warmup_batches ({}) must be > reference_after_batches ({})",
                merger.warmup_batches, merger.reference_after_batches
            ),
        ));
    }
    Ok(())
}

fn validate_queue(blueprint: &RigBlueprint) -> Result<(), ContractError> {
    let queue = &blueprint.queue;

    if queue.capacity == 0 {
        return Err(ContractError::config_validation(
            "queue.capacity",
            "capacity must be > 0",
        ));
    }
    if queue.backlog_threshold >= queue.capacity {
        return Err(ContractError::config_validation(
            "queue.backlog_threshold",
            format!(
                "backlog_threshold ({}) must be < capacity ({})",
                queue.backlog_threshold, queue.capacity
            ),
        ));
    }
    if queue.sustain < 1 {
        return Err(ContractError::config_validation(
            "queue.sustain",
            "sustain must be >= 1",
        ));
    }
    Ok(())
}

fn validate_acquisition(blueprint: &RigBlueprint) -> Result<(), ContractError> {
    let acquisition = &blueprint.acquisition;

    if acquisition.read_period_ms == 0 {
        return Err(ContractError::config_validation(
            "acquisition.read_period_ms",
            "read_period_ms must be > 0",
        ));
    }
    if !(1..=MAX_BATCH_RECORDS).contains(&acquisition.max_records_per_read) {
        return Err(ContractError::config_validation(
            "acquisition.max_records_per_read",
            format!(
                "max_records_per_read must be in 1..={MAX_BATCH_RECORDS}, got {}",
                acquisition.max_records_per_read
            ),
        ));
    }
    Ok(())
}

fn validate_sinks(blueprint: &RigBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}
