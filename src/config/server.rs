//! HTTP listener and process settings

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use super::error::ValidationError;

/// Longest HTTP request deadline accepted.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Listener address, runtime environment and request deadline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub environment: Environment,

    /// `EnvFilter` directive used when neither `RUST_LOG` nor `--log-level` is set
    pub log_level: String,

    /// Outer deadline applied by the HTTP layer
    pub request_timeout_secs: u64,
}

/// Deployment environment. Production switches logs to JSON.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev")]
    Development,
    Staging,
    #[serde(alias = "prod")]
    Production,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Builds the log filter from `directive`, falling back to `log_level`.
    pub fn log_filter(&self, directive: Option<&str>) -> Result<EnvFilter, ValidationError> {
        let directive = directive.unwrap_or(&self.log_level);
        EnvFilter::try_new(directive)
            .map_err(|e| ValidationError::InvalidLogFilter(format!("{directive}: {e}")))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(ValidationError::InvalidTimeout);
        }
        self.log_filter(None)?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            environment: Environment::Development,
            log_level: "info,plan_ledger=debug,sqlx=warn".to_string(),
            request_timeout_secs: 30,
        }
    }
}
