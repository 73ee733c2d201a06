#![forbid(unsafe_code)]

//! **dosar-store** – PostgreSQL persistence driver for Dosar.
//!
//! This crate owns every table the system writes: source files, upload
//! sessions, ingest jobs, raw-block metadata, the dictionary intern tables,
//! the range-partitioned `event` table, unknown-signature aggregates, and
//! report packs. The schema is bootstrapped at startup by [`Store::migrate`]
//! with idempotent DDL, so a fresh database becomes usable without an
//! external migration step.
//!
//! Design constraints carried by this layer:
//! - event insertion is replay-safe: a unique-violation on the dedupe hash is
//!   swallowed, never surfaced;
//! - monthly partition provisioning is idempotent and tolerates concurrent
//!   creation attempts by other workers;
//! - dictionary interning gives all concurrent callers the same id via a
//!   unique constraint and a single retry read.

use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod dict;
pub mod events;
pub mod jobs;
pub mod reports;
pub mod schema;
pub mod sources;

pub use dict::DictCache;
pub use events::{dedupe_key, month_partition, EventFilter, MonthPartition, NewEvent};

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A persisted value could not be mapped back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Shared handle over the connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to the database at `database_url` and bootstrap the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, bootstrapping the schema.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// The underlying pool, for callers that need raw queries (tests).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// True when `err` is a Postgres unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

/// True when `err` reports an object that already exists (SQLSTATE 42P07),
/// which concurrent `CREATE TABLE IF NOT EXISTS` races can still produce.
pub(crate) fn is_duplicate_object(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "42P07" || code == "23505")
        .unwrap_or(false)
}
