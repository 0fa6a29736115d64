//! # Variant Generator
//!
//! Creates the missing variants of a product in one transaction.
//!
//! ## Generation Run
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  generate(product_id, prefix)                                           │
//! │       │                                                                 │
//! │       ├── 1. generation_lock(product_id)      (held until return)       │
//! │       ├── 2. ProductCatalog::load → axes      NoAttributes? abort       │
//! │       ├── 3. ∏ kᵢ > MAX_GENERATED_COMBINATIONS? abort                  │
//! │       ├── 4. existing keys / SKUs / max position                       │
//! │       ├── 5. plan_generation: skip existing keys, build SKUs           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │    INSERT variant ... ON CONFLICT(key) DO NOTHING  (lost race → skip)   │
//! │                       SKU taken meanwhile → UniqueViolation, retryable  │
//! │    INSERT junction rows                                                │
//! │  COMMIT            any error → dropped transaction rolls back          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Re-running is idempotent: every combination already present is skipped
//! and manual edits on existing variants are never touched.

use chrono::Utc;
use tracing::{debug, info};

use atelier_core::combination::{combination_count, plan_generation};
use atelier_core::validation::validate_sku_prefix;
use atelier_core::{
    CoreError, GenerationPlan, SkuFormat, Variant, MAX_GENERATED_COMBINATIONS,
};

use super::resolver::ProductCatalog;
use crate::error::{DbResult, EngineError, EngineResult};
use crate::pool::Database;
use crate::repository::variant::VariantRepository;

/// Generates variants for every missing option combination.
#[derive(Debug, Clone)]
pub struct VariantGenerator {
    db: Database,
    format: SkuFormat,
}

impl VariantGenerator {
    pub fn new(db: Database) -> Self {
        VariantGenerator {
            db,
            format: SkuFormat::default(),
        }
    }

    /// Uses a different SKU format (e.g. from [`crate::config::EngineConfig::sku_format`]).
    pub fn with_format(mut self, format: SkuFormat) -> Self {
        self.format = format;
        self
    }

    /// Computes what [`generate`](Self::generate) would create, without
    /// writing anything.
    pub async fn preview(
        &self,
        product_id: &str,
        sku_prefix: Option<&str>,
    ) -> EngineResult<GenerationPlan> {
        let catalog = ProductCatalog::load(&self.db, product_id).await?;
        self.plan(&catalog, sku_prefix).await
    }

    /// Creates every missing variant of a product.
    ///
    /// `sku_prefix` defaults to the product's stored prefix.
    ///
    /// ## Returns
    /// The variants created by this run, in position order. Empty when every
    /// combination already exists.
    ///
    /// ## Errors
    /// * `Core(NoAttributes)` / `Core(TooManyCombinations)` - nothing written
    /// * `Generation` - the transaction failed and was rolled back
    pub async fn generate(
        &self,
        product_id: &str,
        sku_prefix: Option<&str>,
    ) -> EngineResult<Vec<Variant>> {
        let _guard = self.db.generation_lock(product_id).await;
        debug!(product_id = %product_id, "Acquired generation lock");

        let catalog = ProductCatalog::load(&self.db, product_id).await?;
        let plan = self.plan(&catalog, sku_prefix).await?;

        if plan.planned.is_empty() {
            info!(
                product_id = %product_id,
                combinations = plan.total_combinations,
                "All combinations already exist, nothing to generate"
            );
            return Ok(Vec::new());
        }

        let created = self
            .persist(product_id, &plan)
            .await
            .map_err(|e| EngineError::generation(product_id, e))?;

        info!(
            product_id = %product_id,
            combinations = plan.total_combinations,
            skipped = plan.skipped_existing,
            created = created.len(),
            "Variant generation complete"
        );

        Ok(created)
    }

    async fn plan(
        &self,
        catalog: &ProductCatalog,
        sku_prefix: Option<&str>,
    ) -> EngineResult<GenerationPlan> {
        let product_id = catalog.product.id.as_str();
        let axes = catalog.axes()?;

        let combinations = combination_count(&axes);
        if combinations > MAX_GENERATED_COMBINATIONS {
            return Err(CoreError::TooManyCombinations {
                product_id: product_id.to_string(),
                combinations,
                limit: MAX_GENERATED_COMBINATIONS,
            }
            .into());
        }

        let prefix = match sku_prefix {
            Some(prefix) => {
                validate_sku_prefix(prefix).map_err(CoreError::from)?;
                prefix.trim()
            }
            None => catalog.product.sku_prefix.as_str(),
        };

        let existing = self.db.variants().existing(product_id).await?;
        let plan = plan_generation(&axes, &existing, prefix, &self.format);

        debug!(
            product_id = %product_id,
            axes = axes.len(),
            combinations = plan.total_combinations,
            planned = plan.planned.len(),
            "Planned variant generation"
        );

        Ok(plan)
    }

    async fn persist(&self, product_id: &str, plan: &GenerationPlan) -> DbResult<Vec<Variant>> {
        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        let mut created = Vec::with_capacity(plan.planned.len());
        for planned in &plan.planned {
            if let Some(variant) =
                VariantRepository::insert_generated(&mut *tx, product_id, planned, now).await?
            {
                created.push(variant);
            }
        }

        tx.commit().await?;
        Ok(created)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::seed_leather_bag;
    use crate::error::DbError;
    use crate::pool::DbConfig;
    use crate::repository::product::NewProduct;
    use crate::repository::template::{NewGlobalAttribute, NewGlobalOption, NewLink};
    use atelier_core::combination::combination_key;
    use atelier_core::{LinkOptionSelection, OptionMetadata};
    use rust_decimal::Decimal;
    use std::collections::HashSet;

    async fn bag_db() -> (Database, crate::demo::DemoCatalog) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bag = seed_leather_bag(&db).await.unwrap();
        (db, bag)
    }

    #[tokio::test]
    async fn test_generates_every_combination() {
        let (db, bag) = bag_db().await;

        let created = db.generator().generate(&bag.product.id, None).await.unwrap();
        assert_eq!(created.len(), 6);

        let skus: Vec<_> = created.iter().map(|v| v.sku.as_str()).collect();
        assert_eq!(
            skus,
            vec!["BAG-BLA-SMA", "BAG-BLA-LAR", "BAG-BRO-SMA", "BAG-BRO-LAR", "BAG-TAN-SMA", "BAG-TAN-LAR"]
        );
        let positions: Vec<_> = created.iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
        assert!(created.iter().all(|v| v.price_cents.is_none() && v.weight.is_none()));

        let black_large = &created[1];
        assert_eq!(
            black_large.combination_key,
            combination_key(&bag.selection(&bag.black, &bag.large))
        );
        let selections = db.variants().selections(&black_large.id).await.unwrap();
        assert_eq!(selections.len(), 2);
    }

    #[tokio::test]
    async fn test_generation_is_idempotent() {
        let (db, bag) = bag_db().await;
        let generator = db.generator();

        generator.generate(&bag.product.id, None).await.unwrap();
        let second = generator.generate(&bag.product.id, None).await.unwrap();

        assert!(second.is_empty());
        assert_eq!(db.variants().count_for_product(&bag.product.id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_regeneration_preserves_manual_edits() {
        let (db, bag) = bag_db().await;
        let generator = db.generator();
        let created = generator.generate(&bag.product.id, None).await.unwrap();
        let edited = &created[0];

        db.variants().set_price_override(&edited.id, Some(9_900)).await.unwrap();
        db.variants().adjust_stock(&edited.id, 7).await.unwrap();
        db.variants().set_sku(&edited.id, "BAG-SPECIAL").await.unwrap();
        db.variants()
            .set_barcode(&edited.id, Some("4006381333931".to_string()))
            .await
            .unwrap();

        // A new option adds exactly the missing combinations
        let medium = db
            .attributes()
            .add_option(&crate::repository::attribute::NewAttributeOption {
                attribute_id: bag.size.id.clone(),
                value: "medium".to_string(),
                display_value: "Medium".to_string(),
                position: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        let added = generator.generate(&bag.product.id, None).await.unwrap();
        assert_eq!(added.len(), 3);
        assert!(added.iter().all(|v| v.position >= 6));
        assert!(added.iter().all(|v| v.combination_key.contains(&medium.id)));

        let stored = db.variants().require(&edited.id).await.unwrap();
        assert_eq!(stored.price_cents, Some(9_900));
        assert_eq!(stored.stock_quantity, 7);
        assert_eq!(stored.sku, "BAG-SPECIAL");
        assert_eq!(stored.barcode.as_deref(), Some("4006381333931"));
    }

    #[tokio::test]
    async fn test_prefix_override_and_configured_format() {
        let (db, bag) = bag_db().await;
        let created = db
            .generator()
            .with_format(SkuFormat {
                separator: "_".to_string(),
                abbreviation_len: 2,
            })
            .generate(&bag.product.id, Some("TOTE"))
            .await
            .unwrap();
        assert_eq!(created[0].sku, "TOTE_BL_SM");
    }

    #[tokio::test]
    async fn test_manual_variant_is_not_duplicated() {
        let (db, bag) = bag_db().await;
        db.variants()
            .create_manual(&crate::repository::variant::NewVariant {
                product_id: bag.product.id.clone(),
                sku: "BAG-BLA-LAR".to_string(),
                options: vec![
                    atelier_core::OptionRef::custom(&bag.large.id),
                    atelier_core::OptionRef::custom(&bag.black.id),
                ],
                ..Default::default()
            })
            .await
            .unwrap();

        let created = db.generator().generate(&bag.product.id, None).await.unwrap();
        assert_eq!(created.len(), 5);
        assert!(created.iter().all(|v| v.sku != "BAG-BLA-LAR"));
        assert!(created.iter().all(|v| v.position >= 1));
    }

    #[tokio::test]
    async fn test_sku_collision_gets_suffix() {
        let (db, bag) = bag_db().await;
        db.generator().generate(&bag.product.id, None).await.unwrap();

        // "Blank" abbreviates like "Black"
        let blank = db
            .attributes()
            .add_option(&crate::repository::attribute::NewAttributeOption {
                attribute_id: bag.color.id.clone(),
                value: "blank".to_string(),
                display_value: "Blank".to_string(),
                position: 3,
                ..Default::default()
            })
            .await
            .unwrap();

        let more = db.generator().generate(&bag.product.id, None).await.unwrap();
        assert_eq!(more.len(), 2);
        assert!(more.iter().all(|v| v.combination_key.contains(&blank.id)));
        let skus: Vec<_> = more.iter().map(|v| v.sku.as_str()).collect();
        assert_eq!(skus, vec!["BAG-BLA-SMA-2", "BAG-BLA-LAR-2"]);
    }

    #[tokio::test]
    async fn test_no_attributes_writes_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Plain Wallet".to_string(),
                sku_prefix: "WAL".to_string(),
                ..NewProduct::default()
            })
            .await
            .unwrap();

        let err = db.generator().generate(&product.id, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::NoAttributes { .. })));
        assert_eq!(db.variants().count_for_product(&product.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_run_rolls_back() {
        let (db, bag) = bag_db().await;

        sqlx::query(
            r#"
            CREATE TRIGGER reject_tan BEFORE INSERT ON variants
            WHEN NEW.sku LIKE 'BAG-TAN-%'
            BEGIN
                SELECT RAISE(ABORT, 'simulated storage failure');
            END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.generator().generate(&bag.product.id, None).await.unwrap_err();
        match &err {
            EngineError::Generation { product_id, .. } => assert_eq!(product_id, &bag.product.id),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_retryable());
        assert_eq!(db.variants().count_for_product(&bag.product.id).await.unwrap(), 0);

        sqlx::query("DROP TRIGGER reject_tan")
            .execute(db.pool())
            .await
            .unwrap();
        let created = db.generator().generate(&bag.product.id, None).await.unwrap();
        assert_eq!(created.len(), 6);
    }

    #[tokio::test]
    async fn test_insert_of_existing_combination_is_skipped() {
        let (db, bag) = bag_db().await;
        let plan = db.generator().preview(&bag.product.id, None).await.unwrap();
        let planned = &plan.planned[0];

        let mut conn = db.pool().acquire().await.unwrap();
        let now = Utc::now();
        let first = VariantRepository::insert_generated(&mut *conn, &bag.product.id, planned, now)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = VariantRepository::insert_generated(&mut *conn, &bag.product.id, planned, now)
            .await
            .unwrap();
        assert!(second.is_none());
        drop(conn);

        assert_eq!(db.variants().count_for_product(&bag.product.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sku_taken_after_planning_fails_the_run() {
        let (db, bag) = bag_db().await;
        let generator = db.generator();
        let created = generator.generate(&bag.product.id, None).await.unwrap();

        db.attributes()
            .add_option(&crate::repository::attribute::NewAttributeOption {
                attribute_id: bag.size.id.clone(),
                value: "xl".to_string(),
                display_value: "XL".to_string(),
                position: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        let plan = generator.preview(&bag.product.id, None).await.unwrap();
        assert_eq!(plan.planned.len(), 3);

        // An administrator renames a variant to the planned SKU before the insert
        db.variants()
            .set_sku(&created[0].id, &plan.planned[0].sku)
            .await
            .unwrap();

        let err = generator.persist(&bag.product.id, &plan).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert!(EngineError::generation(&bag.product.id, err).is_retryable());
        assert_eq!(db.variants().count_for_product(&bag.product.id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_runs_create_each_variant_once() {
        let (db, bag) = bag_db().await;
        let first = db.generator();
        let second = db.clone().generator();

        let (a, b) = tokio::join!(
            first.generate(&bag.product.id, None),
            second.generate(&bag.product.id, None)
        );
        let total = a.unwrap().len() + b.unwrap().len();

        assert_eq!(total, 6);
        assert_eq!(db.variants().count_for_product(&bag.product.id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_template_linked_twice_multiplies() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Tote".to_string(),
                sku_prefix: "TOT".to_string(),
                base_price_cents: 8_000,
                base_weight: Decimal::ONE,
            })
            .await
            .unwrap();

        let templates = db.templates();
        let color = templates
            .create(&NewGlobalAttribute {
                name: "color".to_string(),
                display_name: "Color".to_string(),
                schema: Vec::new(),
            })
            .await
            .unwrap();
        let mut options = Vec::new();
        for (position, value) in ["Black", "Brown", "Tan", "Red", "Navy", "Olive", "Cream"]
            .iter()
            .enumerate()
        {
            let option = templates
                .add_option(&NewGlobalOption {
                    global_attribute_id: color.id.clone(),
                    value: value.to_lowercase(),
                    display_value: value.to_string(),
                    metadata: OptionMetadata::new(),
                    position: position as i64,
                })
                .await
                .unwrap();
            options.push(option);
        }

        let base = templates
            .link(&NewLink {
                product_id: product.id.clone(),
                global_attribute_id: color.id.clone(),
                role_name: "base_color".to_string(),
                role_display_name: "Base Color".to_string(),
                position: 0,
                ..NewLink::default()
            })
            .await
            .unwrap();
        for (position, option) in options.iter().take(3).enumerate() {
            templates
                .select_option(&LinkOptionSelection {
                    link_id: base.id.clone(),
                    global_option_id: option.id.clone(),
                    price_modifier_override_cents: None,
                    weight_modifier_override: None,
                    position: position as i64,
                })
                .await
                .unwrap();
        }
        templates
            .link(&NewLink {
                product_id: product.id.clone(),
                global_attribute_id: color.id.clone(),
                role_name: "interior_color".to_string(),
                role_display_name: "Interior Color".to_string(),
                position: 1,
                ..NewLink::default()
            })
            .await
            .unwrap();

        let created = db.generator().generate(&product.id, None).await.unwrap();
        assert_eq!(created.len(), 21);

        let keys: HashSet<_> = created.iter().map(|v| v.combination_key.as_str()).collect();
        assert_eq!(keys.len(), 21);

        // Black/Black is one variant, with two distinct selections
        let black_black = created.iter().find(|v| v.sku == "TOT-BLA-BLA").unwrap();
        let selections = db.variants().selections(&black_black.id).await.unwrap();
        assert_eq!(selections.len(), 2);
        assert_ne!(selections[0], selections[1]);
    }
}
