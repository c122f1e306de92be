//! Expiration sweeper configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::SweeperConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperSettings {
    /// Candidates read per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Optional cap on batches per sweep
    #[serde(default)]
    pub max_batches: Option<u32>,

    /// Seconds between sweeps of the background loop
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Window of the expiring listing when the caller gives none
    #[serde(default = "default_expiring_days")]
    pub default_expiring_days: u32,
}

impl SweeperSettings {
    pub fn to_sweeper_config(&self) -> SweeperConfig {
        let mut config = SweeperConfig::default()
            .with_batch_size(self.batch_size)
            .with_max_batches(self.max_batches)
            .with_interval(Duration::from_secs(self.interval_secs));
        config.default_expiring_days = self.default_expiring_days;
        config
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.max_batches == Some(0) {
            return Err(ValidationError::InvalidMaxBatches);
        }
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batches: None,
            interval_secs: default_interval(),
            default_expiring_days: default_expiring_days(),
        }
    }
}

fn default_batch_size() -> u32 {
    100
}

fn default_interval() -> u64 {
    3600
}

fn default_expiring_days() -> u32 {
    7
}
