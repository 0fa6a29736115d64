//! # Material Repository
//!
//! Raw materials and their stock levels.
//!
//! Stock changes are deltas. Quantities are decimal TEXT, so the delta is
//! added in Rust between a read and a write of the same transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use atelier_core::validation::{validate_name, validate_quantity};
use atelier_core::{RawMaterial, StockSnapshot, ValidationError};

use super::{new_id, parse_decimal};
use crate::error::{DbError, DbResult};

/// Input for [`MaterialRepository::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRawMaterial {
    pub name: String,
    pub unit: String,
    pub stock_quantity: Decimal,
}

#[derive(Debug, FromRow)]
struct MaterialRow {
    id: String,
    name: String,
    unit: String,
    stock_quantity: String,
    is_active: bool,
}

impl TryFrom<MaterialRow> for RawMaterial {
    type Error = DbError;

    fn try_from(row: MaterialRow) -> DbResult<Self> {
        Ok(RawMaterial {
            stock_quantity: parse_decimal("raw_materials.stock_quantity", &row.stock_quantity)?,
            id: row.id,
            name: row.name,
            unit: row.unit,
            is_active: row.is_active,
        })
    }
}

/// Repository for raw materials.
#[derive(Debug, Clone)]
pub struct MaterialRepository {
    pool: SqlitePool,
}

impl MaterialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MaterialRepository { pool }
    }

    pub async fn create(&self, input: &NewRawMaterial) -> DbResult<RawMaterial> {
        validate_name("name", &input.name)?;
        validate_name("unit", &input.unit)?;
        validate_quantity("stock_quantity", input.stock_quantity)?;

        let material = RawMaterial {
            id: new_id(),
            name: input.name.trim().to_string(),
            unit: input.unit.trim().to_string(),
            stock_quantity: input.stock_quantity.normalize(),
            is_active: true,
        };

        debug!(id = %material.id, name = %material.name, "Creating raw material");

        sqlx::query(
            r#"
            INSERT INTO raw_materials (id, name, unit, stock_quantity, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&material.id)
        .bind(&material.name)
        .bind(&material.unit)
        .bind(material.stock_quantity.to_string())
        .bind(material.is_active)
        .execute(&self.pool)
        .await?;

        Ok(material)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<RawMaterial>> {
        let row: Option<MaterialRow> = sqlx::query_as(
            "SELECT id, name, unit, stock_quantity, is_active FROM raw_materials WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RawMaterial::try_from).transpose()
    }

    /// Every material, active or not, sorted by name.
    pub async fn list(&self) -> DbResult<Vec<RawMaterial>> {
        let rows: Vec<MaterialRow> = sqlx::query_as(
            "SELECT id, name, unit, stock_quantity, is_active FROM raw_materials ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RawMaterial::try_from).collect()
    }

    /// Adds `delta` to a material's stock and returns the new level.
    ///
    /// Stock may not go below zero.
    pub async fn adjust_stock(&self, id: &str, delta: Decimal) -> DbResult<Decimal> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT stock_quantity FROM raw_materials WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| DbError::not_found("RawMaterial", id))?;
        let updated = parse_decimal("raw_materials.stock_quantity", &current)? + delta;

        if updated < Decimal::ZERO {
            return Err(ValidationError::MustNotBeNegative {
                field: "stock_quantity".to_string(),
            }
            .into());
        }

        sqlx::query("UPDATE raw_materials SET stock_quantity = ?2 WHERE id = ?1")
            .bind(id)
            .bind(updated.normalize().to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(id = %id, %delta, stock = %updated, "Adjusted raw material stock");
        Ok(updated.normalize())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE raw_materials SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("RawMaterial", id));
        }
        Ok(())
    }

    /// Current stock of every material, for producibility.
    pub async fn stock_snapshot(&self) -> DbResult<StockSnapshot> {
        let materials = self.list().await?;
        Ok(materials.iter().collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_adjust_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.materials();
        let leather = repo
            .create(&NewRawMaterial {
                name: "Leather".to_string(),
                unit: "m".to_string(),
                stock_quantity: Decimal::new(10, 0),
            })
            .await
            .unwrap();

        let level = repo.adjust_stock(&leather.id, Decimal::new(-25, 1)).await.unwrap();
        assert_eq!(level, Decimal::new(75, 1));

        let err = repo.adjust_stock(&leather.id, Decimal::new(-8, 0)).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        let stored = repo.get(&leather.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, Decimal::new(75, 1));
    }

    #[tokio::test]
    async fn test_stock_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.materials();
        let thread = repo
            .create(&NewRawMaterial {
                name: "Thread".to_string(),
                unit: "m".to_string(),
                stock_quantity: Decimal::new(120, 0),
            })
            .await
            .unwrap();

        let snapshot = repo.stock_snapshot().await.unwrap();
        assert_eq!(snapshot.available(&thread.id), Decimal::new(120, 0));
        assert_eq!(snapshot.available("missing"), Decimal::ZERO);
    }
}
