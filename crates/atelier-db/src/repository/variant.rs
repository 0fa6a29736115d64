//! # Variant Repository
//!
//! Variants, their option junctions and the administrator edits made on them.
//!
//! ## Junctions
//! ```text
//! variants ──┬── variant_options         (variant_id, attribute_option_id)
//!            └── variant_global_options  (variant_id, link_id, global_option_id)
//!
//! combination_key = sorted tokens of both junctions, joined by '|'
//! UNIQUE (product_id, combination_key)
//! UNIQUE (product_id, sku)
//! ```
//!
//! The generator inserts through [`VariantRepository::insert_generated`] inside
//! its own transaction; everything else goes through the pool.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use atelier_core::combination::{combination_key, ExistingVariants};
use atelier_core::validation::{validate_quantity, validate_sku};
use atelier_core::{OptionRef, PlannedVariant, ValidationError, Variant};

use super::{new_id, parse_decimal_opt};
use crate::error::{DbError, DbResult};

/// Input for [`VariantRepository::create_manual`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVariant {
    pub product_id: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub price_cents: Option<i64>,
    pub weight: Option<Decimal>,
    pub stock_quantity: i64,
    /// One option per axis.
    pub options: Vec<OptionRef>,
}

#[derive(Debug, FromRow)]
struct VariantRow {
    id: String,
    product_id: String,
    sku: String,
    barcode: Option<String>,
    price_cents: Option<i64>,
    weight: Option<String>,
    stock_quantity: i64,
    position: i64,
    is_active: bool,
    combination_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VariantRow> for Variant {
    type Error = DbError;

    fn try_from(row: VariantRow) -> DbResult<Self> {
        Ok(Variant {
            weight: parse_decimal_opt("variants.weight", row.weight.as_deref())?,
            id: row.id,
            product_id: row.product_id,
            sku: row.sku,
            barcode: row.barcode,
            price_cents: row.price_cents,
            stock_quantity: row.stock_quantity,
            position: row.position,
            is_active: row.is_active,
            combination_key: row.combination_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const VARIANT_COLUMNS: &str = r#"
    id, product_id, sku, barcode, price_cents, weight, stock_quantity,
    position, is_active, combination_key, created_at, updated_at
"#;

/// Repository for variant database operations.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All variants of a product, active or not, in position order.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Variant>> {
        let rows: Vec<VariantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM variants WHERE product_id = ?1 ORDER BY position, id",
            VARIANT_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Variant::try_from).collect()
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Variant>> {
        let row: Option<VariantRow> =
            sqlx::query_as(&format!("SELECT {} FROM variants WHERE id = ?1", VARIANT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Variant::try_from).transpose()
    }

    pub async fn require(&self, id: &str) -> DbResult<Variant> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", id))
    }

    pub async fn count_for_product(&self, product_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants WHERE product_id = ?1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Keys, SKUs and highest position of the product's variants.
    ///
    /// Inactive variants count too: their combination stays taken.
    pub async fn existing(&self, product_id: &str) -> DbResult<ExistingVariants> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT combination_key, sku, position FROM variants WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut existing = ExistingVariants::default();
        for (key, sku, position) in rows {
            existing.keys.insert(key);
            existing.skus.insert(sku);
            existing.max_position = Some(existing.max_position.map_or(position, |p| p.max(position)));
        }
        Ok(existing)
    }

    /// The options a variant was built from.
    pub async fn selections(&self, variant_id: &str) -> DbResult<Vec<OptionRef>> {
        let custom: Vec<(String,)> = sqlx::query_as(
            "SELECT attribute_option_id FROM variant_options WHERE variant_id = ?1",
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        let global: Vec<(String, String)> = sqlx::query_as(
            "SELECT link_id, global_option_id FROM variant_global_options WHERE variant_id = ?1",
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(custom
            .into_iter()
            .map(|(option_id,)| OptionRef::custom(option_id))
            .chain(
                global
                    .into_iter()
                    .map(|(link_id, option_id)| OptionRef::global(link_id, option_id)),
            )
            .collect())
    }

    /// Selections of every variant of a product, by variant ID.
    pub async fn selections_for_product(
        &self,
        product_id: &str,
    ) -> DbResult<HashMap<String, Vec<OptionRef>>> {
        let custom: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT vo.variant_id, vo.attribute_option_id
            FROM variant_options vo
            INNER JOIN variants v ON v.id = vo.variant_id
            WHERE v.product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let global: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT vg.variant_id, vg.link_id, vg.global_option_id
            FROM variant_global_options vg
            INNER JOIN variants v ON v.id = vg.variant_id
            WHERE v.product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_variant: HashMap<String, Vec<OptionRef>> = HashMap::new();
        for (variant_id, option_id) in custom {
            by_variant
                .entry(variant_id)
                .or_default()
                .push(OptionRef::custom(option_id));
        }
        for (variant_id, link_id, option_id) in global {
            by_variant
                .entry(variant_id)
                .or_default()
                .push(OptionRef::global(link_id, option_id));
        }
        Ok(by_variant)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a variant by hand.
    ///
    /// Every option must belong to the product, with at most one option per
    /// attribute or link. The variant is appended after the highest position.
    ///
    /// ## Errors
    /// * `Validation` - bad SKU, foreign or conflicting options
    /// * `UniqueViolation` - the combination or SKU already exists
    pub async fn create_manual(&self, input: &NewVariant) -> DbResult<Variant> {
        validate_sku(&input.sku)?;
        if let Some(weight) = input.weight {
            validate_quantity("weight", weight)?;
        }
        if input.options.is_empty() {
            return Err(ValidationError::Required {
                field: "options".to_string(),
            }
            .into());
        }
        self.check_options(&input.product_id, &input.options).await?;

        let key = combination_key(&input.options);
        let existing = self.existing(&input.product_id).await?;
        if existing.keys.contains(&key) {
            return Err(DbError::duplicate("combination_key", key));
        }
        if existing.skus.contains(input.sku.trim()) {
            return Err(DbError::duplicate("sku", input.sku.trim()));
        }

        let now = Utc::now();
        let variant = Variant {
            id: new_id(),
            product_id: input.product_id.clone(),
            sku: input.sku.trim().to_string(),
            barcode: input.barcode.clone(),
            price_cents: input.price_cents,
            weight: input.weight,
            stock_quantity: input.stock_quantity,
            position: existing.max_position.map_or(0, |p| p + 1),
            is_active: true,
            combination_key: key,
            created_at: now,
            updated_at: now,
        };

        debug!(product_id = %variant.product_id, sku = %variant.sku, "Creating manual variant");

        let mut tx = self.pool.begin().await?;
        insert_variant_row(&mut *tx, &variant, false).await?;
        insert_junctions(&mut *tx, &variant.id, &input.options).await?;
        tx.commit().await?;

        Ok(variant)
    }

    /// Inserts one planned variant and its junction rows on `conn`.
    ///
    /// Returns `None` when the combination was created in the meantime. A SKU
    /// taken in the meantime is a `UniqueViolation`.
    pub(crate) async fn insert_generated(
        conn: &mut SqliteConnection,
        product_id: &str,
        planned: &PlannedVariant,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Variant>> {
        let variant = Variant {
            id: new_id(),
            product_id: product_id.to_string(),
            sku: planned.sku.clone(),
            barcode: None,
            price_cents: None,
            weight: None,
            stock_quantity: 0,
            position: planned.position,
            is_active: true,
            combination_key: planned.combination_key.clone(),
            created_at: now,
            updated_at: now,
        };

        if !insert_variant_row(conn, &variant, true).await? {
            warn!(
                product_id = %product_id,
                key = %variant.combination_key,
                sku = %variant.sku,
                "Variant already exists, skipping"
            );
            return Ok(None);
        }

        let options: Vec<OptionRef> = planned.options.iter().map(|o| o.option.clone()).collect();
        insert_junctions(conn, &variant.id, &options).await?;

        Ok(Some(variant))
    }

    async fn check_options(&self, product_id: &str, options: &[OptionRef]) -> DbResult<()> {
        let mut axes = HashSet::new();

        for option in options {
            let axis: Option<String> = match option {
                OptionRef::Custom { option_id } => {
                    sqlx::query_scalar(
                        r#"
                        SELECT a.id FROM attribute_options o
                        INNER JOIN attributes a ON a.id = o.attribute_id
                        WHERE o.id = ?1 AND a.product_id = ?2
                        "#,
                    )
                    .bind(option_id)
                    .bind(product_id)
                    .fetch_optional(&self.pool)
                    .await?
                }
                OptionRef::Global { link_id, option_id } => {
                    sqlx::query_scalar(
                        r#"
                        SELECT l.id FROM global_attribute_links l
                        INNER JOIN global_options o ON o.global_attribute_id = l.global_attribute_id
                        WHERE l.id = ?1 AND o.id = ?2 AND l.product_id = ?3
                        "#,
                    )
                    .bind(link_id)
                    .bind(option_id)
                    .bind(product_id)
                    .fetch_optional(&self.pool)
                    .await?
                }
            };

            let axis = axis.ok_or_else(|| ValidationError::InvalidFormat {
                field: "options".to_string(),
                reason: format!("{} is not an option of product {}", option, product_id),
            })?;
            if !axes.insert(axis.clone()) {
                return Err(ValidationError::Duplicate {
                    field: "options.axis".to_string(),
                    value: axis,
                }
                .into());
            }
        }

        Ok(())
    }

    // =========================================================================
    // Administrator Edits
    // =========================================================================

    /// Sets or clears the price override. `None` falls back to the computed
    /// price.
    pub async fn set_price_override(&self, id: &str, price_cents: Option<i64>) -> DbResult<()> {
        if let Some(cents) = price_cents {
            atelier_core::validation::validate_price_cents(cents)?;
        }
        self.update_column(id, "price_cents = ?2", price_cents).await
    }

    /// Sets or clears the weight override.
    pub async fn set_weight_override(&self, id: &str, weight: Option<Decimal>) -> DbResult<()> {
        if let Some(weight) = weight {
            validate_quantity("weight", weight)?;
        }
        self.update_column(id, "weight = ?2", weight.map(|w| w.to_string()))
            .await
    }

    pub async fn set_sku(&self, id: &str, sku: &str) -> DbResult<()> {
        validate_sku(sku)?;
        let sku = sku.trim().to_string();
        self.update_column(id, "sku = ?2", sku.clone())
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { field, .. } => DbError::UniqueViolation { field, value: sku },
                other => other,
            })
    }

    pub async fn set_barcode(&self, id: &str, barcode: Option<String>) -> DbResult<()> {
        self.update_column(id, "barcode = ?2", barcode).await
    }

    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        self.update_column(id, "is_active = ?2", active).await
    }

    /// Adds `delta` units to a variant's finished-goods stock.
    pub async fn adjust_stock(&self, id: &str, delta: i64) -> DbResult<i64> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE variants
            SET stock_quantity = stock_quantity + ?2, updated_at = ?3
            WHERE id = ?1 AND stock_quantity + ?2 >= 0
            RETURNING stock_quantity
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(stock) => Ok(stock),
            None => {
                self.require(id).await?;
                Err(ValidationError::MustNotBeNegative {
                    field: "stock_quantity".to_string(),
                }
                .into())
            }
        }
    }

    async fn update_column<T>(&self, id: &str, assignment: &str, value: T) -> DbResult<()>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send,
    {
        debug!(id = %id, assignment, "Updating variant");

        let result = sqlx::query(&format!(
            "UPDATE variants SET {}, updated_at = ?3 WHERE id = ?1",
            assignment
        ))
        .bind(id)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", id));
        }
        Ok(())
    }
}

/// Inserts a variant row; with `skip_conflicts`, returns `false` instead of
/// failing when a unique constraint is hit.
async fn insert_variant_row(
    conn: &mut SqliteConnection,
    variant: &Variant,
    skip_conflicts: bool,
) -> DbResult<bool> {
    // Only a taken combination is skipped; a taken SKU still fails
    let conflict = if skip_conflicts {
        "ON CONFLICT(product_id, combination_key) DO NOTHING"
    } else {
        ""
    };

    let result = sqlx::query(&format!(
        r#"
        INSERT INTO variants (
            id, product_id, sku, barcode, price_cents, weight, stock_quantity,
            position, is_active, combination_key, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        {}
        "#,
        conflict
    ))
    .bind(&variant.id)
    .bind(&variant.product_id)
    .bind(&variant.sku)
    .bind(&variant.barcode)
    .bind(variant.price_cents)
    .bind(variant.weight.map(|w| w.to_string()))
    .bind(variant.stock_quantity)
    .bind(variant.position)
    .bind(variant.is_active)
    .bind(&variant.combination_key)
    .bind(variant.created_at)
    .bind(variant.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn insert_junctions(
    conn: &mut SqliteConnection,
    variant_id: &str,
    options: &[OptionRef],
) -> DbResult<()> {
    for option in options {
        match option {
            OptionRef::Custom { option_id } => {
                sqlx::query(
                    "INSERT INTO variant_options (variant_id, attribute_option_id) VALUES (?1, ?2)",
                )
                .bind(variant_id)
                .bind(option_id)
                .execute(&mut *conn)
                .await?;
            }
            OptionRef::Global { link_id, option_id } => {
                sqlx::query(
                    r#"
                    INSERT INTO variant_global_options (variant_id, link_id, global_option_id)
                    VALUES (?1, ?2, ?3)
                    "#,
                )
                .bind(variant_id)
                .bind(link_id)
                .bind(option_id)
                .execute(&mut *conn)
                .await?;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::attribute::{NewAttribute, NewAttributeOption};
    use crate::repository::product::NewProduct;

    async fn setup() -> (Database, String, Vec<String>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Bag".to_string(),
                sku_prefix: "BAG".to_string(),
                base_price_cents: 5000,
                ..NewProduct::default()
            })
            .await
            .unwrap();
        let size = db
            .attributes()
            .create(&NewAttribute {
                product_id: product.id.clone(),
                name: "size".to_string(),
                display_name: "Size".to_string(),
                position: 0,
            })
            .await
            .unwrap();

        let mut option_ids = Vec::new();
        for value in ["Small", "Large"] {
            let option = db
                .attributes()
                .add_option(&NewAttributeOption {
                    attribute_id: size.id.clone(),
                    value: value.to_lowercase(),
                    display_value: value.to_string(),
                    ..NewAttributeOption::default()
                })
                .await
                .unwrap();
            option_ids.push(option.id);
        }
        (db, product.id, option_ids)
    }

    #[tokio::test]
    async fn test_create_manual_and_read_selections() {
        let (db, product_id, options) = setup().await;
        let repo = db.variants();

        let variant = repo
            .create_manual(&NewVariant {
                product_id: product_id.clone(),
                sku: "BAG-SMA".to_string(),
                options: vec![OptionRef::custom(&options[0])],
                ..NewVariant::default()
            })
            .await
            .unwrap();

        assert_eq!(variant.position, 0);
        assert_eq!(variant.combination_key, format!("c:{}", options[0]));
        assert_eq!(
            repo.selections(&variant.id).await.unwrap(),
            vec![OptionRef::custom(&options[0])]
        );

        let existing = repo.existing(&product_id).await.unwrap();
        assert!(existing.keys.contains(&variant.combination_key));
        assert!(existing.skus.contains("BAG-SMA"));
        assert_eq!(existing.max_position, Some(0));
    }

    #[tokio::test]
    async fn test_duplicate_combination_rejected() {
        let (db, product_id, options) = setup().await;
        let repo = db.variants();
        let input = NewVariant {
            product_id,
            sku: "BAG-SMA".to_string(),
            options: vec![OptionRef::custom(&options[0])],
            ..NewVariant::default()
        };
        repo.create_manual(&input).await.unwrap();

        let err = repo
            .create_manual(&NewVariant {
                sku: "BAG-OTHER".to_string(),
                ..input
            })
            .await
            .unwrap_err();
        match err {
            DbError::UniqueViolation { field, .. } => assert_eq!(field, "combination_key"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_two_options_of_one_axis_rejected() {
        let (db, product_id, options) = setup().await;
        let err = db
            .variants()
            .create_manual(&NewVariant {
                product_id,
                sku: "BAG-X".to_string(),
                options: options.iter().map(OptionRef::custom).collect(),
                ..NewVariant::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_administrator_edits() {
        let (db, product_id, options) = setup().await;
        let repo = db.variants();
        let variant = repo
            .create_manual(&NewVariant {
                product_id,
                sku: "BAG-LAR".to_string(),
                options: vec![OptionRef::custom(&options[1])],
                ..NewVariant::default()
            })
            .await
            .unwrap();

        repo.set_price_override(&variant.id, Some(7500)).await.unwrap();
        repo.set_weight_override(&variant.id, Some(Decimal::new(15, 1)))
            .await
            .unwrap();
        repo.set_sku(&variant.id, "BAG-LARGE").await.unwrap();
        assert_eq!(repo.adjust_stock(&variant.id, 4).await.unwrap(), 4);
        assert!(repo.adjust_stock(&variant.id, -5).await.is_err());

        let stored = repo.require(&variant.id).await.unwrap();
        assert_eq!(stored.price_cents, Some(7500));
        assert_eq!(stored.weight, Some(Decimal::new(15, 1)));
        assert_eq!(stored.sku, "BAG-LARGE");
        assert_eq!(stored.stock_quantity, 4);

        repo.set_price_override(&variant.id, None).await.unwrap();
        assert_eq!(repo.require(&variant.id).await.unwrap().price_cents, None);
    }
}
