//! # Product Repository
//!
//! Database operations for configurable products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use atelier_core::validation::{validate_name, validate_price_cents, validate_quantity, validate_sku_prefix};
use atelier_core::Product;

use super::{new_id, parse_decimal};
use crate::error::{DbError, DbResult};

/// Input for [`ProductRepository::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku_prefix: String,
    pub base_price_cents: i64,
    pub base_weight: Decimal,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    sku_prefix: String,
    base_price_cents: i64,
    base_weight: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> DbResult<Self> {
        Ok(Product {
            base_weight: parse_decimal("products.base_weight", &row.base_weight)?,
            id: row.id,
            name: row.name,
            sku_prefix: row.sku_prefix,
            base_price_cents: row.base_price_cents,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PRODUCT_COLUMNS: &str = r#"
    id, name, sku_prefix, base_price_cents, base_weight,
    is_active, created_at, updated_at
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product with generated ID and timestamps
    /// * `Err(DbError::Validation)` - Name, prefix, price or weight rejected
    pub async fn create(&self, input: &NewProduct) -> DbResult<Product> {
        validate_name("name", &input.name)?;
        validate_sku_prefix(&input.sku_prefix)?;
        validate_price_cents(input.base_price_cents)?;
        validate_quantity("base_weight", input.base_weight)?;

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            name: input.name.trim().to_string(),
            sku_prefix: input.sku_prefix.trim().to_string(),
            base_price_cents: input.base_price_cents,
            base_weight: input.base_weight,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, sku_prefix = %product.sku_prefix, "Creating product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku_prefix, base_price_cents, base_weight,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku_prefix)
        .bind(product.base_price_cents)
        .bind(product.base_weight.to_string())
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Product::try_from).transpose()
    }

    /// Like [`get_by_id`](Self::get_by_id), failing with `NotFound`.
    pub async fn require(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Updates name, prefix, base price and base weight.
    ///
    /// Existing variant SKUs are left as they are; only future generation
    /// uses the new prefix.
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        validate_name("name", &product.name)?;
        validate_sku_prefix(&product.sku_prefix)?;
        validate_price_cents(product.base_price_cents)?;
        validate_quantity("base_weight", product.base_weight)?;

        debug!(id = %product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                sku_prefix = ?3,
                base_price_cents = ?4,
                base_weight = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku_prefix)
        .bind(product.base_price_cents)
        .bind(product.base_weight.to_string())
        .bind(product.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Variants and their BOMs stay readable for the production module.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
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
    async fn test_create_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let product = repo
            .create(&NewProduct {
                name: "Leather Bag".to_string(),
                sku_prefix: "BAG".to_string(),
                base_price_cents: 4990,
                base_weight: Decimal::new(12, 1),
            })
            .await
            .unwrap();

        let loaded = repo.require(&product.id).await.unwrap();
        assert_eq!(loaded.name, "Leather Bag");
        assert_eq!(loaded.base_weight, Decimal::new(12, 1));
        assert_eq!(loaded.base_price().cents(), 4990);
    }

    #[tokio::test]
    async fn test_invalid_prefix_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let err = db
            .products()
            .create(&NewProduct {
                name: "Bag".to_string(),
                sku_prefix: "BAG 1".to_string(),
                ..NewProduct::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        let product = repo
            .create(&NewProduct {
                name: "Bag".to_string(),
                sku_prefix: "BAG".to_string(),
                ..NewProduct::default()
            })
            .await
            .unwrap();

        repo.soft_delete(&product.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(!repo.require(&product.id).await.unwrap().is_active);
        assert!(matches!(
            repo.soft_delete("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
