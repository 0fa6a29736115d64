//! # Database & Engine Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← Adds context and categorization                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError ← Also carries CoreError / BomError from atelier-core     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Admin layer renders the message                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use atelier_core::{BomError, CoreError, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and administrator feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate variant SKU within a product
    /// - Duplicate option combination within a product
    /// - Duplicate role name on one product
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A stored value could not be decoded (decimal TEXT, JSON column).
    #[error("Invalid stored {column}: {reason}")]
    InvalidData { column: String, reason: String },

    /// Input rejected before reaching the database.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an InvalidData error.
    pub fn invalid(column: impl Into<String>, reason: impl ToString) -> Self {
        DbError::InvalidData {
            column: column.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::ColumnDecode   → DbError::InvalidData
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>, ..."
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::ColumnDecode { index, source } => DbError::InvalidData {
                column: index,
                reason: source.to_string(),
            },

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Engine Error
// =============================================================================

/// The single error surfaced by engine services.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Catalog precondition failed (no eligible attributes, missing product).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// BOM configuration is inconsistent for the variant being resolved.
    #[error(transparent)]
    Bom(#[from] BomError),

    /// Storage failure outside a generation run.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Engine configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A generation run failed and was rolled back. Safe to retry.
    #[error("Variant generation for product {product_id} rolled back: {source}")]
    Generation {
        product_id: String,
        #[source]
        source: DbError,
    },
}

impl EngineError {
    pub(crate) fn generation(product_id: &str, source: impl Into<DbError>) -> Self {
        EngineError::Generation {
            product_id: product_id.to_string(),
            source: source.into(),
        }
    }

    /// Whether re-running the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Generation { .. } | EngineError::Db(DbError::PoolExhausted)
        )
    }
}

/// Result type for engine services.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_names_product() {
        let err = EngineError::generation("bag", DbError::QueryFailed("disk I/O error".into()));
        assert_eq!(
            err.to_string(),
            "Variant generation for product bag rolled back: Query failed: disk I/O error"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_core_error_passes_through() {
        let err: EngineError = CoreError::NoAttributes {
            product_id: "bag".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::Core(CoreError::NoAttributes { .. })));
        assert!(!err.is_retryable());
    }
}
