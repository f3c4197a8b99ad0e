//! PostgreSQL storage backend using sqlx.
//!
//! Split into modular files by concern. Every identifier interpolated into SQL
//! has passed `dbshift_core::validate_identifier` before it reaches this
//! module; values always travel as bind parameters.

mod denormalize;
mod identifiers;
mod schema;

use dbshift_core::{PG_POOL_ACQUIRE_TIMEOUT_SECS, PG_POOL_IDLE_TIMEOUT_SECS, PG_POOL_MAX_CONNECTIONS};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::StorageError;

#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect with a single-connection pool: a migration run never has more
    /// than one statement in flight.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(PG_POOL_MAX_CONNECTIONS)
            .acquire_timeout(std::time::Duration::from_secs(PG_POOL_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(std::time::Duration::from_secs(PG_POOL_IDLE_TIMEOUT_SECS))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        tracing::info!("PgStorage initialized");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `alias.a IS NULL AND alias.b IS NULL ...`
pub(crate) fn all_null<'a>(alias: &str, columns: impl Iterator<Item = &'a str>) -> String {
    columns.map(|c| format!("{alias}.{c} IS NULL")).collect::<Vec<_>>().join(" AND ")
}

/// Double-quote a catalog-supplied name for use as an identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
