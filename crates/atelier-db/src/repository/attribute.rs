//! # Attribute Repository
//!
//! Product-specific attributes and their options.
//!
//! Deactivating an option only removes it from future generation; variants
//! already built on it keep their junction rows and BOMs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use atelier_core::validation::{validate_name, validate_role_name};
use atelier_core::{Attribute, AttributeOption};

use super::{new_id, parse_decimal};
use crate::error::{DbError, DbResult};

/// Input for [`AttributeRepository::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAttribute {
    pub product_id: String,
    /// Machine name, snake_case (e.g. "size").
    pub name: String,
    pub display_name: String,
    pub position: i64,
}

/// Input for [`AttributeRepository::add_option`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAttributeOption {
    pub attribute_id: String,
    pub value: String,
    pub display_value: String,
    pub price_modifier_cents: i64,
    pub weight_modifier: Decimal,
    pub position: i64,
}

#[derive(Debug, FromRow)]
struct OptionRow {
    id: String,
    attribute_id: String,
    value: String,
    display_value: String,
    price_modifier_cents: i64,
    weight_modifier: String,
    position: i64,
    is_active: bool,
}

impl TryFrom<OptionRow> for AttributeOption {
    type Error = DbError;

    fn try_from(row: OptionRow) -> DbResult<Self> {
        Ok(AttributeOption {
            weight_modifier: parse_decimal("attribute_options.weight_modifier", &row.weight_modifier)?,
            id: row.id,
            attribute_id: row.attribute_id,
            value: row.value,
            display_value: row.display_value,
            price_modifier_cents: row.price_modifier_cents,
            position: row.position,
            is_active: row.is_active,
        })
    }
}

/// Repository for product-specific attributes.
#[derive(Debug, Clone)]
pub struct AttributeRepository {
    pool: SqlitePool,
}

impl AttributeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AttributeRepository { pool }
    }

    /// Creates an attribute on a product.
    pub async fn create(&self, input: &NewAttribute) -> DbResult<Attribute> {
        validate_role_name(&input.name)?;
        validate_name("display_name", &input.display_name)?;

        let attribute = Attribute {
            id: new_id(),
            product_id: input.product_id.clone(),
            name: input.name.clone(),
            display_name: input.display_name.trim().to_string(),
            position: input.position,
            is_active: true,
        };

        debug!(product_id = %attribute.product_id, name = %attribute.name, "Creating attribute");

        sqlx::query(
            r#"
            INSERT INTO attributes (id, product_id, name, display_name, position, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&attribute.id)
        .bind(&attribute.product_id)
        .bind(&attribute.name)
        .bind(&attribute.display_name)
        .bind(attribute.position)
        .bind(attribute.is_active)
        .execute(&self.pool)
        .await?;

        Ok(attribute)
    }

    /// Adds an option to an attribute.
    pub async fn add_option(&self, input: &NewAttributeOption) -> DbResult<AttributeOption> {
        validate_name("value", &input.value)?;
        validate_name("display_value", &input.display_value)?;

        let option = AttributeOption {
            id: new_id(),
            attribute_id: input.attribute_id.clone(),
            value: input.value.trim().to_string(),
            display_value: input.display_value.trim().to_string(),
            price_modifier_cents: input.price_modifier_cents,
            weight_modifier: input.weight_modifier,
            position: input.position,
            is_active: true,
        };

        debug!(attribute_id = %option.attribute_id, value = %option.value, "Adding attribute option");

        sqlx::query(
            r#"
            INSERT INTO attribute_options (
                id, attribute_id, value, display_value,
                price_modifier_cents, weight_modifier, position, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&option.id)
        .bind(&option.attribute_id)
        .bind(&option.value)
        .bind(&option.display_value)
        .bind(option.price_modifier_cents)
        .bind(option.weight_modifier.to_string())
        .bind(option.position)
        .bind(option.is_active)
        .execute(&self.pool)
        .await?;

        Ok(option)
    }

    /// All attributes of a product, active or not, in position order.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Attribute>> {
        let attributes: Vec<Attribute> = sqlx::query_as::<_, (String, String, String, String, i64, bool)>(
            r#"
            SELECT id, product_id, name, display_name, position, is_active
            FROM attributes
            WHERE product_id = ?1
            ORDER BY position, id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, product_id, name, display_name, position, is_active)| Attribute {
            id,
            product_id,
            name,
            display_name,
            position,
            is_active,
        })
        .collect();

        Ok(attributes)
    }

    /// All options of the product's attributes, active or not.
    pub async fn options_for_product(&self, product_id: &str) -> DbResult<Vec<AttributeOption>> {
        let rows: Vec<OptionRow> = sqlx::query_as(
            r#"
            SELECT o.id, o.attribute_id, o.value, o.display_value,
                   o.price_modifier_cents, o.weight_modifier, o.position, o.is_active
            FROM attribute_options o
            INNER JOIN attributes a ON a.id = o.attribute_id
            WHERE a.product_id = ?1
            ORDER BY o.position, o.id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AttributeOption::try_from).collect()
    }

    /// Options by ID, regardless of activation (existing variants keep theirs).
    pub async fn options_by_ids(&self, ids: &[String]) -> DbResult<Vec<AttributeOption>> {
        let mut options = Vec::with_capacity(ids.len());
        for id in ids {
            let row: Option<OptionRow> = sqlx::query_as(
                r#"
                SELECT id, attribute_id, value, display_value,
                       price_modifier_cents, weight_modifier, position, is_active
                FROM attribute_options
                WHERE id = ?1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                options.push(AttributeOption::try_from(row)?);
            }
        }
        Ok(options)
    }

    /// Activates or deactivates an attribute.
    pub async fn set_attribute_active(&self, id: &str, active: bool) -> DbResult<()> {
        debug!(id = %id, active, "Setting attribute activation");

        let result = sqlx::query("UPDATE attributes SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Attribute", id));
        }
        Ok(())
    }

    /// Activates or deactivates an option.
    pub async fn set_option_active(&self, id: &str, active: bool) -> DbResult<()> {
        debug!(id = %id, active, "Setting attribute option activation");

        let result = sqlx::query("UPDATE attribute_options SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("AttributeOption", id));
        }
        Ok(())
    }

    /// Changes an option's price and weight modifiers.
    ///
    /// Affects effective prices of variants without a price override at read
    /// time; nothing is rewritten on the variants.
    pub async fn update_option_modifiers(
        &self,
        id: &str,
        price_modifier_cents: i64,
        weight_modifier: Decimal,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE attribute_options SET price_modifier_cents = ?2, weight_modifier = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(price_modifier_cents)
        .bind(weight_modifier.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("AttributeOption", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
