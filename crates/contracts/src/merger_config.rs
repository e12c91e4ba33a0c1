//! Merger configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};

/// Merger tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// Fitter decay rate per observation (effective window ~1/alpha batches)
    pub decay_alpha: f64,

    /// Fitter observations between origin shifts
    pub recenter_interval: u32,

    /// Batches each side must have seen before merging starts
    pub warmup_batches: u64,

    /// Batches each side must exceed before the reference is evaluated
    pub reference_after_batches: u64,

    /// Batch size above which a warning is logged
    pub large_batch_warning: usize,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            decay_alpha: 0.001,
            recenter_interval: 100,
            warmup_batches: 10,
            reference_after_batches: 5,
            large_batch_warning: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_merger_config_uses_defaults() {
        let config: MergerConfig = serde_json::from_str(r#"{ "warmup_batches": 12 }"#).unwrap();
        assert_eq!(config.warmup_batches, 12);
        assert_eq!(config.reference_after_batches, 5);
        assert_eq!(config.decay_alpha, 0.001);
    }
}
