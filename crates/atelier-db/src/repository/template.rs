//! # Template Repository
//!
//! Global attribute templates, their shared options, and the links that turn
//! a template into an axis of one product.
//!
//! ## Links
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Template "color" ── [Black, Brown, Tan, Red, ...]                      │
//! │       │                                                                 │
//! │       ├── link(bag, role "base_color")      selections: Black,Brown,Tan │
//! │       └── link(bag, role "interior_color")  selections: (none) → all    │
//! │                                                                         │
//! │  UNIQUE (product_id, role_name): one axis per role                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use atelier_core::validation::{validate_name, validate_option_metadata, validate_role_name};
use atelier_core::{
    GlobalAttribute, GlobalAttributeLink, GlobalOption, LinkOptionSelection, MetadataField,
    MetadataFieldType, OptionMetadata, ValidationError,
};

use super::{new_id, parse_decimal_opt, parse_json, to_json};
use crate::error::{DbError, DbResult};

/// Input for [`TemplateRepository::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGlobalAttribute {
    pub name: String,
    pub display_name: String,
    pub schema: Vec<MetadataField>,
}

/// Input for [`TemplateRepository::add_option`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGlobalOption {
    pub global_attribute_id: String,
    pub value: String,
    pub display_value: String,
    pub metadata: OptionMetadata,
    pub position: i64,
}

/// Input for [`TemplateRepository::link`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLink {
    pub product_id: String,
    pub global_attribute_id: String,
    pub role_name: String,
    pub role_display_name: String,
    pub position: i64,
    pub affects_pricing: bool,
    pub affects_shipping: bool,
    pub price_modifier_field: Option<String>,
    pub weight_modifier_field: Option<String>,
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    display_name: String,
    schema: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for GlobalAttribute {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> DbResult<Self> {
        Ok(GlobalAttribute {
            schema: parse_json("global_attributes.schema", &row.schema)?,
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct GlobalOptionRow {
    id: String,
    global_attribute_id: String,
    value: String,
    display_value: String,
    metadata: String,
    position: i64,
    is_active: bool,
}

impl TryFrom<GlobalOptionRow> for GlobalOption {
    type Error = DbError;

    fn try_from(row: GlobalOptionRow) -> DbResult<Self> {
        Ok(GlobalOption {
            metadata: parse_json("global_options.metadata", &row.metadata)?,
            id: row.id,
            global_attribute_id: row.global_attribute_id,
            value: row.value,
            display_value: row.display_value,
            position: row.position,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    id: String,
    product_id: String,
    global_attribute_id: String,
    role_name: String,
    role_display_name: String,
    position: i64,
    affects_pricing: bool,
    affects_shipping: bool,
    price_modifier_field: Option<String>,
    weight_modifier_field: Option<String>,
    is_active: bool,
}

impl From<LinkRow> for GlobalAttributeLink {
    fn from(row: LinkRow) -> Self {
        GlobalAttributeLink {
            id: row.id,
            product_id: row.product_id,
            global_attribute_id: row.global_attribute_id,
            role_name: row.role_name,
            role_display_name: row.role_display_name,
            position: row.position,
            affects_pricing: row.affects_pricing,
            affects_shipping: row.affects_shipping,
            price_modifier_field: row.price_modifier_field,
            weight_modifier_field: row.weight_modifier_field,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
struct SelectionRow {
    link_id: String,
    global_option_id: String,
    price_modifier_override_cents: Option<i64>,
    weight_modifier_override: Option<String>,
    position: i64,
}

impl TryFrom<SelectionRow> for LinkOptionSelection {
    type Error = DbError;

    fn try_from(row: SelectionRow) -> DbResult<Self> {
        Ok(LinkOptionSelection {
            weight_modifier_override: parse_decimal_opt(
                "link_option_selections.weight_modifier_override",
                row.weight_modifier_override.as_deref(),
            )?,
            link_id: row.link_id,
            global_option_id: row.global_option_id,
            price_modifier_override_cents: row.price_modifier_override_cents,
            position: row.position,
        })
    }
}

const TEMPLATE_COLUMNS: &str =
    "id, name, display_name, schema, is_active, created_at, updated_at";
const OPTION_COLUMNS: &str =
    "id, global_attribute_id, value, display_value, metadata, position, is_active";
const LINK_COLUMNS: &str = r#"
    id, product_id, global_attribute_id, role_name, role_display_name, position,
    affects_pricing, affects_shipping, price_modifier_field, weight_modifier_field, is_active
"#;

/// Repository for templates, template options, links and link selections.
#[derive(Debug, Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TemplateRepository { pool }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// Creates a template with its metadata schema.
    pub async fn create(&self, input: &NewGlobalAttribute) -> DbResult<GlobalAttribute> {
        validate_role_name(&input.name)?;
        validate_name("display_name", &input.display_name)?;
        for (i, field) in input.schema.iter().enumerate() {
            validate_role_name(&field.key)?;
            if input.schema[..i].iter().any(|f| f.key == field.key) {
                return Err(ValidationError::Duplicate {
                    field: "schema.key".to_string(),
                    value: field.key.clone(),
                }
                .into());
            }
        }

        let now = Utc::now();
        let template = GlobalAttribute {
            id: new_id(),
            name: input.name.clone(),
            display_name: input.display_name.trim().to_string(),
            schema: input.schema.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %template.id, name = %template.name, "Creating template");

        sqlx::query(
            r#"
            INSERT INTO global_attributes (
                id, name, display_name, schema, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.display_name)
        .bind(to_json("global_attributes.schema", &template.schema)?)
        .bind(template.is_active)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(template)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<GlobalAttribute>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM global_attributes WHERE id = ?1",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GlobalAttribute::try_from).transpose()
    }

    pub async fn require(&self, id: &str) -> DbResult<GlobalAttribute> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("GlobalAttribute", id))
    }

    /// Activates or deactivates a template; links to an inactive template
    /// yield no axis.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE global_attributes SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("GlobalAttribute", id));
        }
        Ok(())
    }

    // =========================================================================
    // Template Options
    // =========================================================================

    /// Adds a shared option, checking its metadata against the template schema.
    pub async fn add_option(&self, input: &NewGlobalOption) -> DbResult<GlobalOption> {
        validate_name("value", &input.value)?;
        validate_name("display_value", &input.display_value)?;

        let template = self.require(&input.global_attribute_id).await?;
        validate_option_metadata(&template.schema, &input.metadata)?;

        let option = GlobalOption {
            id: new_id(),
            global_attribute_id: template.id,
            value: input.value.trim().to_string(),
            display_value: input.display_value.trim().to_string(),
            metadata: input.metadata.clone(),
            position: input.position,
            is_active: true,
        };

        debug!(template_id = %option.global_attribute_id, value = %option.value, "Adding template option");

        sqlx::query(
            r#"
            INSERT INTO global_options (
                id, global_attribute_id, value, display_value, metadata, position, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&option.id)
        .bind(&option.global_attribute_id)
        .bind(&option.value)
        .bind(&option.display_value)
        .bind(to_json("global_options.metadata", &option.metadata)?)
        .bind(option.position)
        .bind(option.is_active)
        .execute(&self.pool)
        .await?;

        Ok(option)
    }

    /// All options of a template, active or not, in position order.
    pub async fn options(&self, template_id: &str) -> DbResult<Vec<GlobalOption>> {
        let rows: Vec<GlobalOptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM global_options WHERE global_attribute_id = ?1 ORDER BY position, id",
            OPTION_COLUMNS
        ))
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GlobalOption::try_from).collect()
    }

    /// A template option by ID, regardless of activation.
    pub async fn option(&self, id: &str) -> DbResult<Option<GlobalOption>> {
        let row: Option<GlobalOptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM global_options WHERE id = ?1",
            OPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GlobalOption::try_from).transpose()
    }

    /// Replaces an option's metadata after validating it.
    pub async fn update_option_metadata(&self, id: &str, metadata: &OptionMetadata) -> DbResult<()> {
        let option = self
            .option(id)
            .await?
            .ok_or_else(|| DbError::not_found("GlobalOption", id))?;
        let template = self.require(&option.global_attribute_id).await?;
        validate_option_metadata(&template.schema, metadata)?;

        sqlx::query("UPDATE global_options SET metadata = ?2 WHERE id = ?1")
            .bind(id)
            .bind(to_json("global_options.metadata", metadata)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_option_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE global_options SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("GlobalOption", id));
        }
        Ok(())
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Links a template to a product under a role.
    ///
    /// ## Errors
    /// * `Validation` - bad role name, or a modifier field that is not a
    ///   number field of the template schema
    /// * `UniqueViolation` - the role name is already used on the product
    pub async fn link(&self, input: &NewLink) -> DbResult<GlobalAttributeLink> {
        validate_role_name(&input.role_name)?;
        validate_name("role_display_name", &input.role_display_name)?;

        let template = self.require(&input.global_attribute_id).await?;
        for field in [&input.price_modifier_field, &input.weight_modifier_field]
            .into_iter()
            .flatten()
        {
            let is_number = template
                .field(field)
                .is_some_and(|f| f.field_type == MetadataFieldType::Number);
            if !is_number {
                return Err(ValidationError::InvalidFormat {
                    field: field.clone(),
                    reason: format!("not a number field of template {}", template.name),
                }
                .into());
            }
        }

        let link = GlobalAttributeLink {
            id: new_id(),
            product_id: input.product_id.clone(),
            global_attribute_id: template.id,
            role_name: input.role_name.clone(),
            role_display_name: input.role_display_name.trim().to_string(),
            position: input.position,
            affects_pricing: input.affects_pricing,
            affects_shipping: input.affects_shipping,
            price_modifier_field: input.price_modifier_field.clone(),
            weight_modifier_field: input.weight_modifier_field.clone(),
            is_active: true,
        };

        debug!(product_id = %link.product_id, role = %link.role_name, "Linking template");

        sqlx::query(
            r#"
            INSERT INTO global_attribute_links (
                id, product_id, global_attribute_id, role_name, role_display_name, position,
                affects_pricing, affects_shipping, price_modifier_field, weight_modifier_field,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&link.id)
        .bind(&link.product_id)
        .bind(&link.global_attribute_id)
        .bind(&link.role_name)
        .bind(&link.role_display_name)
        .bind(link.position)
        .bind(link.affects_pricing)
        .bind(link.affects_shipping)
        .bind(&link.price_modifier_field)
        .bind(&link.weight_modifier_field)
        .bind(link.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: link.role_name.clone(),
            },
            other => other,
        })?;

        Ok(link)
    }

    /// All links of a product, active or not, in position order.
    pub async fn links_for_product(&self, product_id: &str) -> DbResult<Vec<GlobalAttributeLink>> {
        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            "SELECT {} FROM global_attribute_links WHERE product_id = ?1 ORDER BY position, id",
            LINK_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GlobalAttributeLink::from).collect())
    }

    pub async fn get_link(&self, id: &str) -> DbResult<Option<GlobalAttributeLink>> {
        let row: Option<LinkRow> = sqlx::query_as(&format!(
            "SELECT {} FROM global_attribute_links WHERE id = ?1",
            LINK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(GlobalAttributeLink::from))
    }

    pub async fn set_link_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE global_attribute_links SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("GlobalAttributeLink", id));
        }
        Ok(())
    }

    // =========================================================================
    // Link Selections
    // =========================================================================

    /// Restricts a link to an option, optionally overriding its modifiers.
    ///
    /// Selecting the same option again replaces the overrides.
    pub async fn select_option(&self, selection: &LinkOptionSelection) -> DbResult<()> {
        let link = self
            .get_link(&selection.link_id)
            .await?
            .ok_or_else(|| DbError::not_found("GlobalAttributeLink", &selection.link_id))?;
        let option = self
            .option(&selection.global_option_id)
            .await?
            .ok_or_else(|| DbError::not_found("GlobalOption", &selection.global_option_id))?;

        if option.global_attribute_id != link.global_attribute_id {
            return Err(ValidationError::InvalidFormat {
                field: "global_option_id".to_string(),
                reason: format!(
                    "option {} does not belong to the linked template",
                    option.id
                ),
            }
            .into());
        }

        debug!(link_id = %link.id, option_id = %option.id, "Selecting option for link");

        sqlx::query(
            r#"
            INSERT INTO link_option_selections (
                link_id, global_option_id, price_modifier_override_cents,
                weight_modifier_override, position
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (link_id, global_option_id) DO UPDATE SET
                price_modifier_override_cents = excluded.price_modifier_override_cents,
                weight_modifier_override = excluded.weight_modifier_override,
                position = excluded.position
            "#,
        )
        .bind(&selection.link_id)
        .bind(&selection.global_option_id)
        .bind(selection.price_modifier_override_cents)
        .bind(selection.weight_modifier_override.map(|w: Decimal| w.to_string()))
        .bind(selection.position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes an option from a link's selection. Removing the last one
    /// makes the link use every active template option again.
    pub async fn deselect_option(&self, link_id: &str, global_option_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM link_option_selections WHERE link_id = ?1 AND global_option_id = ?2")
            .bind(link_id)
            .bind(global_option_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn selections(&self, link_id: &str) -> DbResult<Vec<LinkOptionSelection>> {
        let rows: Vec<SelectionRow> = sqlx::query_as(
            r#"
            SELECT link_id, global_option_id, price_modifier_override_cents,
                   weight_modifier_override, position
            FROM link_option_selections
            WHERE link_id = ?1
            ORDER BY position, global_option_id
            "#,
        )
        .bind(link_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LinkOptionSelection::try_from).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use serde_json::json;

    fn color_schema() -> Vec<MetadataField> {
        vec![
            MetadataField {
                key: "hex".to_string(),
                label: "Hex".to_string(),
                field_type: MetadataFieldType::Color,
                required: true,
                default_value: None,
            },
            MetadataField {
                key: "surcharge".to_string(),
                label: "Surcharge".to_string(),
                field_type: MetadataFieldType::Number,
                required: false,
                default_value: Some(json!(0)),
            },
        ]
    }

    async fn setup() -> (Database, String, GlobalAttribute) {
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
        let template = db
            .templates()
            .create(&NewGlobalAttribute {
                name: "color".to_string(),
                display_name: "Color".to_string(),
                schema: color_schema(),
            })
            .await
            .unwrap();
        (db, product.id, template)
    }

    #[tokio::test]
    async fn test_option_metadata_checked_against_schema() {
        let (db, _, template) = setup().await;
        let repo = db.templates();

        let mut metadata = OptionMetadata::new();
        metadata.insert("surcharge".to_string(), json!("2.50"));
        let err = repo
            .add_option(&NewGlobalOption {
                global_attribute_id: template.id.clone(),
                value: "black".to_string(),
                display_value: "Black".to_string(),
                metadata: metadata.clone(),
                position: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::Required { .. })));

        metadata.insert("hex".to_string(), json!("#000000"));
        let option = repo
            .add_option(&NewGlobalOption {
                global_attribute_id: template.id.clone(),
                value: "black".to_string(),
                display_value: "Black".to_string(),
                metadata,
                position: 0,
            })
            .await
            .unwrap();

        let stored = repo.option(&option.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.get("hex"), Some(&json!("#000000")));
    }

    #[tokio::test]
    async fn test_role_name_unique_per_product() {
        let (db, product_id, template) = setup().await;
        let input = NewLink {
            product_id,
            global_attribute_id: template.id,
            role_name: "base_color".to_string(),
            role_display_name: "Base Color".to_string(),
            affects_pricing: true,
            price_modifier_field: Some("surcharge".to_string()),
            ..NewLink::default()
        };

        db.templates().link(&input).await.unwrap();
        let err = db.templates().link(&input).await.unwrap_err();
        match err {
            DbError::UniqueViolation { value, .. } => assert_eq!(value, "base_color"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_modifier_field_must_be_number() {
        let (db, product_id, template) = setup().await;
        let err = db
            .templates()
            .link(&NewLink {
                product_id,
                global_attribute_id: template.id,
                role_name: "base_color".to_string(),
                role_display_name: "Base Color".to_string(),
                price_modifier_field: Some("hex".to_string()),
                ..NewLink::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}
