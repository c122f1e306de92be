//! Ledger configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::LedgerConfig;

/// Deadline and retry policy of ledger commands.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Upper bound on one ledger operation, retries included
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Extra attempts after a concurrent modification
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base pause between attempts, multiplied by the attempt number
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl LedgerSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn to_ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_operation_timeout(self.operation_timeout())
            .with_max_retries(self.max_retries)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.operation_timeout_ms == 0 || self.operation_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidOperationTimeout);
        }
        if self.max_retries > 10 {
            return Err(ValidationError::TooManyRetries);
        }
        Ok(())
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_operation_timeout() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ledger_defaults() {
        let config = LedgerSettings::default().to_ledger_config();
        let expected = LedgerConfig::default();
        assert_eq!(config.operation_timeout, expected.operation_timeout);
        assert_eq!(config.max_retries, expected.max_retries);
        assert_eq!(config.retry_backoff, expected.retry_backoff);
    }

    #[test]
    fn test_conversion_uses_milliseconds() {
        let settings = LedgerSettings {
            operation_timeout_ms: 1500,
            max_retries: 5,
            retry_backoff_ms: 10,
        };
        let config = settings.to_ledger_config();
        assert_eq!(config.operation_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_validation() {
        assert!(LedgerSettings::default().validate().is_ok());

        let zero_timeout = LedgerSettings {
            operation_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());

        let too_many = LedgerSettings {
            max_retries: 50,
            ..Default::default()
        };
        assert!(too_many.validate().is_err());
    }
}
