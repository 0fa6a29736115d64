//! # Database Pool Management
//!
//! Connection pool creation and the [`Database`] handle that hands out
//! repositories and engine services.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  EngineConfig::db_config() / DbConfig::new(path)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← pool + migrations                       │
//! │       │                                                                 │
//! │       ├── products() attributes() templates() variants()               │
//! │       │   materials() bom_rules()                    (repositories)    │
//! │       │                                                                 │
//! │       └── resolver() generator() bom() pricing()     (engine services) │
//! │                 │                                                       │
//! │                 └── generation_lock(product_id)                         │
//! │                     one tokio Mutex per product, shared by all clones  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLite Settings
//! - WAL journal: readers never block the generation transaction
//! - Foreign keys ON: BOM rules cannot point at missing materials
//! - `:memory:` databases use a single connection

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::engine::{AttributeResolver, BomService, VariantGenerator, VariantPricing};
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::attribute::AttributeRepository;
use crate::repository::bom::BomRepository;
use crate::repository::material::MaterialRepository;
use crate::repository::product::ProductRepository;
use crate::repository::template::TemplateRepository;
use crate::repository::variant::VariantRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/atelier/atelier.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a free connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for a database file, created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// An isolated in-memory database, for tests and the demo.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// is pinned to one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

type GenerationLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Main database handle providing repository and service access.
///
/// Cloning is cheap; clones share the pool and the generation locks.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    generation_locks: GenerationLocks,
}

impl Database {
    /// Opens the pool and applies pending migrations.
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use handle
    /// * `Err(DbError::ConnectionFailed)` - Bad path or unreachable file
    /// * `Err(DbError::MigrationFailed)` - Embedded migrations failed
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite ships with foreign keys off
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            generation_locks: GenerationLocks::default(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// The underlying pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn attributes(&self) -> AttributeRepository {
        AttributeRepository::new(self.pool.clone())
    }

    pub fn templates(&self) -> TemplateRepository {
        TemplateRepository::new(self.pool.clone())
    }

    pub fn variants(&self) -> VariantRepository {
        VariantRepository::new(self.pool.clone())
    }

    pub fn materials(&self) -> MaterialRepository {
        MaterialRepository::new(self.pool.clone())
    }

    pub fn bom_rules(&self) -> BomRepository {
        BomRepository::new(self.pool.clone())
    }

    // =========================================================================
    // Engine Services
    // =========================================================================

    /// Resolves a product's axes.
    pub fn resolver(&self) -> AttributeResolver {
        AttributeResolver::new(self.clone())
    }

    /// Generates missing variants with the default SKU format.
    ///
    /// Use [`VariantGenerator::with_format`] to apply a configured format.
    pub fn generator(&self) -> VariantGenerator {
        VariantGenerator::new(self.clone())
    }

    /// Resolves variant BOMs and producibility.
    pub fn bom(&self) -> BomService {
        BomService::new(self.clone())
    }

    /// Computes effective variant prices and weights.
    pub fn pricing(&self) -> VariantPricing {
        VariantPricing::new(self.clone())
    }

    /// Waits for exclusive generation rights on a product.
    ///
    /// The guard is held for the whole generation run, so two runs on the
    /// same product never interleave inside this process.
    ///
    /// Locks nobody holds or waits on are dropped from the map on each call.
    pub(crate) async fn generation_lock(&self, product_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.generation_locks.lock().await;
            // Holders and waiters keep a clone, so a count of one means idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(product_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Closes the pool. Later repository calls fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks that the database answers queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/atelier.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(config.run_migrations);
    }

    #[tokio::test]
    async fn test_generation_lock_is_per_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let bag = db.generation_lock("bag").await;
        // A different product is not blocked
        let _wallet = db.generation_lock("wallet").await;

        // The same product is, even through a clone
        let clone = db.clone();
        assert!(tokio::time::timeout(
            Duration::from_millis(50),
            clone.generation_lock("bag")
        )
        .await
        .is_err());

        drop(bag);
        let _again = clone.generation_lock("bag").await;
    }

    #[tokio::test]
    async fn test_idle_generation_locks_are_dropped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        for product in ["bag", "wallet", "belt"] {
            let guard = db.generation_lock(product).await;
            drop(guard);
        }
        let held = db.generation_lock("tote").await;
        assert_eq!(db.generation_locks.lock().await.len(), 1);

        // A held lock survives pruning
        let _other = db.generation_lock("bag").await;
        let locks = db.generation_locks.lock().await;
        assert_eq!(locks.len(), 2);
        assert!(locks.contains_key("tote"));
        drop(locks);
        drop(held);
    }
}
