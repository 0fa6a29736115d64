//! # Database Migrations
//!
//! Embedded SQL migrations for the catalog and BOM schema.
//!
//! ## Schema Files
//! ```text
//! migrations/sqlite/
//! ├── 001_catalog.sql     products, attributes, templates, links, variants
//! └── 002_materials.sql   raw materials and the three BOM layers
//! ```
//!
//! Applied migrations are tracked in `_sqlx_migrations`; existing files are
//! never edited, new changes get the next sequence number.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Migrations embedded at compile time by `sqlx::migrate!`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending migrations in filename order, each in its own
/// transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(
        embedded = MIGRATOR.migrations.len(),
        "Checking for pending migrations"
    );

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(embedded, applied)` migration counts, for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((total, usize::try_from(applied).unwrap_or_default()))
}
