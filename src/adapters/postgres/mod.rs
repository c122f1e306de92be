//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresPlanRepository` - Plan lookup and activation toggle
//! - `PostgresSubscriptionStore` - Unit of work over subscriptions and history
//! - `PostgresSubscriptionReader` - Non-locking queries
//!
//! Schema lives in `migrations/` and is embedded with `sqlx::migrate!`.

mod plan_repository;
mod rows;
mod subscription_reader;
mod subscription_store;

pub use plan_repository::PostgresPlanRepository;
pub use subscription_reader::PostgresSubscriptionReader;
pub use subscription_store::{PgTransaction, PostgresSubscriptionStore};

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::domain::foundation::DomainError;

/// Opens a connection pool sized and timed by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    tracing::info!(
        url = %config.redacted_url(),
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::database(format!("Failed to connect: {}", e)))?;

    if config.run_migrations {
        migrate(&pool).await?;
    }
    Ok(pool)
}

/// Applies the embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))?;
    tracing::info!("database migrations applied");
    Ok(())
}
