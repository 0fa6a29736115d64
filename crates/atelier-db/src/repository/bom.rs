//! # BOM Rule Repository
//!
//! Storage for the three BOM layers:
//!
//! | Layer | Table               | Keyed by                 |
//! |-------|---------------------|--------------------------|
//! | 1     | `product_materials` | product                  |
//! | 2a    | `option_materials`  | option trigger           |
//! | 2b    | `option_modifiers`  | option trigger           |
//! | 3     | `variant_overrides` | variant                  |
//!
//! Layer-2 rules come back in `(position, id)` order; resolution applies them
//! in that order within one selection.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

use atelier_core::validation::{validate_modifier, validate_quantity};
use atelier_core::{
    ModifierOp, OptionMaterial, OptionModifier, OptionRef, OverrideType, ProductMaterial,
    RuleTrigger, ValidationError, VariantOverride,
};

use super::{decode_trigger, encode_trigger, new_id, parse_decimal, parse_decimal_opt};
use crate::error::{DbError, DbResult};

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProductMaterial {
    pub product_id: String,
    pub raw_material_id: String,
    pub quantity: Decimal,
    pub is_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOptionMaterial {
    pub trigger: RuleTrigger,
    pub raw_material_id: String,
    pub quantity: Decimal,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOptionModifier {
    pub trigger: RuleTrigger,
    pub product_material_id: String,
    pub op: ModifierOp,
    pub value: Decimal,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariantOverride {
    pub variant_id: String,
    pub override_type: OverrideType,
    pub raw_material_id: String,
    pub replacement_material_id: Option<String>,
    pub quantity: Option<Decimal>,
    pub position: i64,
}

/// Layer-2 rules that may fire for a set of selections.
#[derive(Debug, Clone, Default)]
pub struct OptionRules {
    pub additions: Vec<OptionMaterial>,
    pub modifiers: Vec<OptionModifier>,
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct ProductMaterialRow {
    id: String,
    product_id: String,
    raw_material_id: String,
    quantity: String,
    is_required: bool,
}

impl TryFrom<ProductMaterialRow> for ProductMaterial {
    type Error = DbError;

    fn try_from(row: ProductMaterialRow) -> DbResult<Self> {
        Ok(ProductMaterial {
            quantity: parse_decimal("product_materials.quantity", &row.quantity)?,
            id: row.id,
            product_id: row.product_id,
            raw_material_id: row.raw_material_id,
            is_required: row.is_required,
        })
    }
}

#[derive(Debug, FromRow)]
struct OptionMaterialRow {
    id: String,
    attribute_option_id: Option<String>,
    global_option_id: Option<String>,
    link_id: Option<String>,
    raw_material_id: String,
    quantity: String,
}

impl TryFrom<OptionMaterialRow> for OptionMaterial {
    type Error = DbError;

    fn try_from(row: OptionMaterialRow) -> DbResult<Self> {
        Ok(OptionMaterial {
            trigger: decode_trigger(
                &row.id,
                row.attribute_option_id,
                row.global_option_id,
                row.link_id,
            )?,
            quantity: parse_decimal("option_materials.quantity", &row.quantity)?,
            id: row.id,
            raw_material_id: row.raw_material_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct OptionModifierRow {
    id: String,
    attribute_option_id: Option<String>,
    global_option_id: Option<String>,
    link_id: Option<String>,
    product_material_id: String,
    op: ModifierOp,
    value: String,
}

impl TryFrom<OptionModifierRow> for OptionModifier {
    type Error = DbError;

    fn try_from(row: OptionModifierRow) -> DbResult<Self> {
        Ok(OptionModifier {
            trigger: decode_trigger(
                &row.id,
                row.attribute_option_id,
                row.global_option_id,
                row.link_id,
            )?,
            value: parse_decimal("option_modifiers.value", &row.value)?,
            id: row.id,
            product_material_id: row.product_material_id,
            op: row.op,
        })
    }
}

#[derive(Debug, FromRow)]
struct OverrideRow {
    id: String,
    variant_id: String,
    override_type: OverrideType,
    raw_material_id: String,
    replacement_material_id: Option<String>,
    quantity: Option<String>,
    position: i64,
}

impl TryFrom<OverrideRow> for VariantOverride {
    type Error = DbError;

    fn try_from(row: OverrideRow) -> DbResult<Self> {
        Ok(VariantOverride {
            quantity: parse_decimal_opt("variant_overrides.quantity", row.quantity.as_deref())?,
            id: row.id,
            variant_id: row.variant_id,
            override_type: row.override_type,
            raw_material_id: row.raw_material_id,
            replacement_material_id: row.replacement_material_id,
            position: row.position,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for BOM rules.
#[derive(Debug, Clone)]
pub struct BomRepository {
    pool: SqlitePool,
}

impl BomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BomRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Layer 1
    // -------------------------------------------------------------------------

    pub async fn add_base(&self, input: &NewProductMaterial) -> DbResult<ProductMaterial> {
        validate_quantity("quantity", input.quantity)?;

        let entry = ProductMaterial {
            id: new_id(),
            product_id: input.product_id.clone(),
            raw_material_id: input.raw_material_id.clone(),
            quantity: input.quantity,
            is_required: input.is_required,
        };

        debug!(product_id = %entry.product_id, material = %entry.raw_material_id, "Adding base material");

        sqlx::query(
            r#"
            INSERT INTO product_materials (id, product_id, raw_material_id, quantity, is_required)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(&entry.raw_material_id)
        .bind(entry.quantity.to_string())
        .bind(entry.is_required)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    pub async fn base_for_product(&self, product_id: &str) -> DbResult<Vec<ProductMaterial>> {
        let rows: Vec<ProductMaterialRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, raw_material_id, quantity, is_required
            FROM product_materials
            WHERE product_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProductMaterial::try_from).collect()
    }

    pub async fn remove_base(&self, id: &str) -> DbResult<()> {
        self.delete("product_materials", "ProductMaterial", id).await
    }

    // -------------------------------------------------------------------------
    // Layer 2
    // -------------------------------------------------------------------------

    pub async fn add_option_material(&self, input: &NewOptionMaterial) -> DbResult<OptionMaterial> {
        validate_quantity("quantity", input.quantity)?;

        let rule = OptionMaterial {
            id: new_id(),
            trigger: input.trigger.clone(),
            raw_material_id: input.raw_material_id.clone(),
            quantity: input.quantity,
        };
        let (attribute_option_id, global_option_id, link_id) = encode_trigger(&rule.trigger);

        debug!(id = %rule.id, material = %rule.raw_material_id, "Adding option material");

        sqlx::query(
            r#"
            INSERT INTO option_materials (
                id, attribute_option_id, global_option_id, link_id,
                raw_material_id, quantity, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&rule.id)
        .bind(attribute_option_id)
        .bind(global_option_id)
        .bind(link_id)
        .bind(&rule.raw_material_id)
        .bind(rule.quantity.to_string())
        .bind(input.position)
        .execute(&self.pool)
        .await?;

        Ok(rule)
    }

    /// Adds a Layer-2b modifier on a base entry.
    ///
    /// ## Errors
    /// * `Validation` - bad value, or a product-specific / link-scoped
    ///   trigger that belongs to another product than the target entry
    /// * `NotFound` - unknown target entry
    pub async fn add_option_modifier(&self, input: &NewOptionModifier) -> DbResult<OptionModifier> {
        validate_modifier(input.op, input.value)?;
        self.check_modifier_scope(&input.trigger, &input.product_material_id).await?;

        let rule = OptionModifier {
            id: new_id(),
            trigger: input.trigger.clone(),
            product_material_id: input.product_material_id.clone(),
            op: input.op,
            value: input.value,
        };
        let (attribute_option_id, global_option_id, link_id) = encode_trigger(&rule.trigger);

        debug!(id = %rule.id, target = %rule.product_material_id, op = %rule.op, "Adding option modifier");

        sqlx::query(
            r#"
            INSERT INTO option_modifiers (
                id, attribute_option_id, global_option_id, link_id,
                product_material_id, op, value, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&rule.id)
        .bind(attribute_option_id)
        .bind(global_option_id)
        .bind(link_id)
        .bind(&rule.product_material_id)
        .bind(rule.op)
        .bind(rule.value.to_string())
        .bind(input.position)
        .execute(&self.pool)
        .await?;

        Ok(rule)
    }

    /// Loads every Layer-2 rule of `product_id` whose trigger may fire for
    /// `selections`.
    ///
    /// Modifiers on a shared template option only come back when they target
    /// a base entry of `product_id`. Each rule appears once even when several
    /// selections match it; which selections actually fire it is decided
    /// during resolution.
    pub async fn rules_for_selections(
        &self,
        product_id: &str,
        selections: &[OptionRef],
    ) -> DbResult<OptionRules> {
        let mut rules = OptionRules::default();
        let mut seen_additions = HashSet::new();
        let mut seen_modifiers = HashSet::new();

        for selection in selections {
            let (attribute_option_id, global_option_id) = match selection {
                OptionRef::Custom { option_id } => (Some(option_id.as_str()), None),
                OptionRef::Global { option_id, .. } => (None, Some(option_id.as_str())),
            };

            let additions: Vec<OptionMaterialRow> = sqlx::query_as(
                r#"
                SELECT id, attribute_option_id, global_option_id, link_id, raw_material_id, quantity
                FROM option_materials
                WHERE attribute_option_id = ?1 OR global_option_id = ?2
                ORDER BY position, id
                "#,
            )
            .bind(attribute_option_id)
            .bind(global_option_id)
            .fetch_all(&self.pool)
            .await?;

            for row in additions {
                if seen_additions.insert(row.id.clone()) {
                    rules.additions.push(OptionMaterial::try_from(row)?);
                }
            }

            let modifiers: Vec<OptionModifierRow> = sqlx::query_as(
                r#"
                SELECT m.id, m.attribute_option_id, m.global_option_id, m.link_id,
                       m.product_material_id, m.op, m.value
                FROM option_modifiers m
                INNER JOIN product_materials pm ON pm.id = m.product_material_id
                WHERE (m.attribute_option_id = ?1 OR m.global_option_id = ?2)
                  AND pm.product_id = ?3
                ORDER BY m.position, m.id
                "#,
            )
            .bind(attribute_option_id)
            .bind(global_option_id)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

            for row in modifiers {
                if seen_modifiers.insert(row.id.clone()) {
                    rules.modifiers.push(OptionModifier::try_from(row)?);
                }
            }
        }

        Ok(rules)
    }

    pub async fn remove_option_material(&self, id: &str) -> DbResult<()> {
        self.delete("option_materials", "OptionMaterial", id).await
    }

    pub async fn remove_option_modifier(&self, id: &str) -> DbResult<()> {
        self.delete("option_modifiers", "OptionModifier", id).await
    }

    // -------------------------------------------------------------------------
    // Layer 3
    // -------------------------------------------------------------------------

    /// Adds a per-variant override.
    ///
    /// ## Errors
    /// * `Validation` - replace without a replacement material, add or
    ///   set_quantity without a quantity, or a negative quantity
    pub async fn add_override(&self, input: &NewVariantOverride) -> DbResult<VariantOverride> {
        match input.override_type {
            OverrideType::Replace if input.replacement_material_id.is_none() => {
                return Err(ValidationError::Required {
                    field: "replacement_material_id".to_string(),
                }
                .into());
            }
            OverrideType::Add | OverrideType::SetQuantity if input.quantity.is_none() => {
                return Err(ValidationError::Required {
                    field: "quantity".to_string(),
                }
                .into());
            }
            _ => {}
        }
        if let Some(quantity) = input.quantity {
            validate_quantity("quantity", quantity)?;
        }

        let ov = VariantOverride {
            id: new_id(),
            variant_id: input.variant_id.clone(),
            override_type: input.override_type,
            raw_material_id: input.raw_material_id.clone(),
            replacement_material_id: input.replacement_material_id.clone(),
            quantity: input.quantity,
            position: input.position,
        };

        debug!(variant_id = %ov.variant_id, kind = %ov.override_type, "Adding variant override");

        sqlx::query(
            r#"
            INSERT INTO variant_overrides (
                id, variant_id, override_type, raw_material_id,
                replacement_material_id, quantity, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&ov.id)
        .bind(&ov.variant_id)
        .bind(ov.override_type)
        .bind(&ov.raw_material_id)
        .bind(&ov.replacement_material_id)
        .bind(ov.quantity.map(|q| q.to_string()))
        .bind(ov.position)
        .execute(&self.pool)
        .await?;

        Ok(ov)
    }

    pub async fn overrides_for_variant(&self, variant_id: &str) -> DbResult<Vec<VariantOverride>> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT id, variant_id, override_type, raw_material_id,
                   replacement_material_id, quantity, position
            FROM variant_overrides
            WHERE variant_id = ?1
            ORDER BY position, id
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VariantOverride::try_from).collect()
    }

    pub async fn remove_override(&self, id: &str) -> DbResult<()> {
        self.delete("variant_overrides", "VariantOverride", id).await
    }

    /// A modifier's trigger must be usable by the product owning its target.
    ///
    /// An unscoped template trigger is accepted; it only fires for products
    /// whose base holds the target entry.
    async fn check_modifier_scope(
        &self,
        trigger: &RuleTrigger,
        product_material_id: &str,
    ) -> DbResult<()> {
        let target_product: Option<String> =
            sqlx::query_scalar("SELECT product_id FROM product_materials WHERE id = ?1")
                .bind(product_material_id)
                .fetch_optional(&self.pool)
                .await?;
        let target_product =
            target_product.ok_or_else(|| DbError::not_found("ProductMaterial", product_material_id))?;

        let trigger_product: Option<String> = match trigger {
            RuleTrigger::Custom { option_id } => {
                sqlx::query_scalar(
                    r#"
                    SELECT a.product_id FROM attribute_options o
                    INNER JOIN attributes a ON a.id = o.attribute_id
                    WHERE o.id = ?1
                    "#,
                )
                .bind(option_id)
                .fetch_optional(&self.pool)
                .await?
            }
            RuleTrigger::Global {
                link_id: Some(link_id),
                ..
            } => {
                sqlx::query_scalar("SELECT product_id FROM global_attribute_links WHERE id = ?1")
                    .bind(link_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            RuleTrigger::Global { link_id: None, .. } => return Ok(()),
        };

        match trigger_product {
            Some(product_id) if product_id != target_product => Err(ValidationError::InvalidFormat {
                field: "product_material_id".to_string(),
                reason: format!(
                    "base entry {} belongs to product {}, but the trigger belongs to product {}",
                    product_material_id, target_product, product_id
                ),
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn delete(&self, table: &str, entity: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", table))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(entity, id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::attribute::{NewAttribute, NewAttributeOption};
    use crate::repository::material::NewRawMaterial;
    use crate::repository::product::NewProduct;

    async fn setup() -> (Database, String, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Bag".to_string(),
                sku_prefix: "BAG".to_string(),
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
        let large = db
            .attributes()
            .add_option(&NewAttributeOption {
                attribute_id: size.id,
                value: "large".to_string(),
                display_value: "Large".to_string(),
                ..NewAttributeOption::default()
            })
            .await
            .unwrap();
        let leather = db
            .materials()
            .create(&NewRawMaterial {
                name: "Leather".to_string(),
                unit: "m".to_string(),
                stock_quantity: Decimal::new(10, 0),
            })
            .await
            .unwrap();
        (db, product.id, large.id, leather.id)
    }

    #[tokio::test]
    async fn test_rules_loaded_for_selection() {
        let (db, product_id, large_id, leather_id) = setup().await;
        let repo = db.bom_rules();

        let base = repo
            .add_base(&NewProductMaterial {
                product_id: product_id.clone(),
                raw_material_id: leather_id.clone(),
                quantity: Decimal::new(2, 0),
                is_required: true,
            })
            .await
            .unwrap();
        let modifier = repo
            .add_option_modifier(&NewOptionModifier {
                trigger: RuleTrigger::Custom {
                    option_id: large_id.clone(),
                },
                product_material_id: base.id.clone(),
                op: ModifierOp::Multiply,
                value: Decimal::new(14, 1),
                position: 0,
            })
            .await
            .unwrap();

        let rules = repo
            .rules_for_selections(&product_id, &[OptionRef::custom(&large_id)])
            .await
            .unwrap();
        assert!(rules.additions.is_empty());
        assert_eq!(rules.modifiers.len(), 1);
        assert_eq!(rules.modifiers[0].id, modifier.id);
        assert_eq!(rules.modifiers[0].op, ModifierOp::Multiply);
        assert_eq!(rules.modifiers[0].value, Decimal::new(14, 1));

        let loaded = repo.base_for_product(&product_id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].quantity, Decimal::new(2, 0));
    }

    #[tokio::test]
    async fn test_zero_multiplier_rejected() {
        let (db, product_id, large_id, leather_id) = setup().await;
        let base = db
            .bom_rules()
            .add_base(&NewProductMaterial {
                product_id,
                raw_material_id: leather_id,
                quantity: Decimal::new(2, 0),
                is_required: true,
            })
            .await
            .unwrap();

        let err = db
            .bom_rules()
            .add_option_modifier(&NewOptionModifier {
                trigger: RuleTrigger::Custom { option_id: large_id },
                product_material_id: base.id,
                op: ModifierOp::Multiply,
                value: Decimal::ZERO,
                position: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_replace_override_needs_replacement() {
        let (db, _, _, leather_id) = setup().await;
        let err = db
            .bom_rules()
            .add_override(&NewVariantOverride {
                variant_id: "v1".to_string(),
                override_type: OverrideType::Replace,
                raw_material_id: leather_id,
                replacement_material_id: None,
                quantity: None,
                position: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Validation(ValidationError::Required { .. })
        ));
    }
}
