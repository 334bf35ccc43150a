//! `PostgreSQL` durable store for the flash sale engine.
//!
//! This crate owns the authoritative truths (`items.sold` and
//! `sales.items_sold`) behind the capability traits from `flashsale-core`:
//!
//! - [`PgSaleStore`]: sales and items, plus [`PgSaleTx`], a serializable
//!   transaction whose conditional `mark_item_sold` update is the sole
//!   per-item sold transition.
//! - [`PgCheckoutStore`]: checkout attempt rows and their items, with the
//!   unique `(attempt, item)` constraint resolving concurrent duplicate adds.
//!
//! Connection pooling uses sqlx's `PgPool`; migrations are plain SQL files
//! run at startup from a configured directory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod checkout_store;
mod sale_store;

use std::path::Path;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use flashsale_core::{Result, SaleError};

pub use checkout_store::PgCheckoutStore;
pub use sale_store::{PgSaleStore, PgSaleTx};

/// Open a connection pool sized for the purchase workload: wide enough for
/// the request concurrency, with bounded connection lifetimes.
///
/// # Errors
///
/// Returns [`SaleError::Database`] if the pool cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(100)
        .min_connections(50)
        .max_lifetime(Duration::from_secs(3600))
        .idle_timeout(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .map_err(|e| SaleError::Database(format!("failed to connect to postgres: {e}")))
}

/// Run all pending SQL migrations from `migrations_path`.
///
/// Idempotent: already-applied migrations are tracked in sqlx's migrations
/// table and skipped.
///
/// # Errors
///
/// Returns [`SaleError::Database`] if the directory cannot be read or a
/// migration fails to apply.
pub async fn run_migrations(pool: &PgPool, migrations_path: &str) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(Path::new(migrations_path))
        .await
        .map_err(|e| SaleError::Database(format!("failed to load migrations: {e}")))?;

    migrator
        .run(pool)
        .await
        .map_err(|e| SaleError::Database(format!("failed to run migrations: {e}")))?;

    tracing::info!(path = migrations_path, "Database migrations applied");
    Ok(())
}

/// Map a sqlx error onto the domain taxonomy. Serialization conflicts
/// (SQLSTATE 40001) become [`SaleError::TransactionFailed`] so the purchase
/// retry loop picks them up; everything else is an opaque database error.
pub(crate) fn map_db_error(error: sqlx::Error) -> SaleError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some("40001") {
            return SaleError::TransactionFailed;
        }
    }
    SaleError::Database(error.to_string())
}

/// Whether a sqlx error is a unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some("23505"))
}
