//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid log filter directive: {0}")]
    InvalidLogFilter(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Request timeout must exceed the ledger operation timeout")]
    RequestTimeoutBelowOperationTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Ledger operation timeout must be between 1ms and 60s")]
    InvalidOperationTimeout,

    #[error("Ledger max_retries exceeds maximum allowed (10)")]
    TooManyRetries,

    #[error("Sweeper batch_size must be between 1 and 10000")]
    InvalidBatchSize,

    #[error("Sweeper max_batches must be at least 1 when set")]
    InvalidMaxBatches,

    #[error("Sweeper interval must be at least one second")]
    InvalidSweepInterval,
}
