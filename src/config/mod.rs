//! Application configuration module
//!
//! Configuration is read from environment variables with the `PLAN_LEDGER`
//! prefix using the `config` and `dotenvy` crates. Nested values are
//! separated by a double underscore.
//!
//! # Example
//!
//! ```no_run
//! use plan_ledger::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod ledger;
mod server;
mod sweeper;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use ledger::LedgerSettings;
pub use server::{Environment, ServerConfig};
pub use sweeper::SweeperSettings;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Host, port, environment and log filter
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL pool; unused by the in-memory store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Deadline and retry policy of ledger commands
    #[serde(default)]
    pub ledger: LedgerSettings,

    /// Batch and schedule of the expiration sweeper
    #[serde(default)]
    pub sweeper: SweeperSettings,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `PLAN_LEDGER__*` variables:
    ///
    /// - `PLAN_LEDGER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `PLAN_LEDGER__DATABASE__URL=...` -> `database.url = ...`
    /// - `PLAN_LEDGER__SWEEPER__BATCH_SIZE=500` -> `sweeper.batch_size = 500`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PLAN_LEDGER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate every section, the database included.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_without_database()?;
        self.database.validate()
    }

    /// Validate every section except the database, for the in-memory store.
    pub fn validate_without_database(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.ledger.validate()?;
        self.sweeper.validate()?;
        if self.server.request_timeout() <= self.ledger.operation_timeout() {
            return Err(ValidationError::RequestTimeoutBelowOperationTimeout);
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
