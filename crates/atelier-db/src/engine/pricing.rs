//! Effective variant price and weight.
//!
//! A variant without an override is priced as the product base plus the
//! modifiers of its selected options; see [`atelier_core::pricing`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::pricing::{effective_price, effective_weight};
use atelier_core::{CoreError, Money};

use super::resolver::ProductCatalog;
use crate::error::EngineResult;
use crate::pool::Database;

/// Price and weight a variant sells and ships with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePricing {
    pub variant_id: String,
    pub price: Money,
    pub weight: Decimal,
    /// Whether the price comes from a manual override.
    pub price_overridden: bool,
    pub weight_overridden: bool,
}

/// Computes effective variant prices and weights.
#[derive(Debug, Clone)]
pub struct VariantPricing {
    db: Database,
}

impl VariantPricing {
    pub fn new(db: Database) -> Self {
        VariantPricing { db }
    }

    pub async fn effective(&self, variant_id: &str) -> EngineResult<EffectivePricing> {
        let variant = self
            .db
            .variants()
            .get_by_id(variant_id)
            .await?
            .ok_or_else(|| CoreError::VariantNotFound(variant_id.to_string()))?;
        let catalog = ProductCatalog::load(&self.db, &variant.product_id).await?;
        let selections = self.db.variants().selections(variant_id).await?;
        let selected = catalog.selected_options(&selections)?;

        let product = &catalog.product;
        Ok(EffectivePricing {
            variant_id: variant.id,
            price: effective_price(product.base_price(), variant.price_cents, &selected),
            weight: effective_weight(product.base_weight, variant.weight, &selected),
            price_overridden: variant.price_cents.is_some(),
            weight_overridden: variant.weight.is_some(),
        })
    }

    pub async fn effective_price(&self, variant_id: &str) -> EngineResult<Money> {
        Ok(self.effective(variant_id).await?.price)
    }

    pub async fn effective_weight(&self, variant_id: &str) -> EngineResult<Decimal> {
        Ok(self.effective(variant_id).await?.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::seed_leather_bag;
    use crate::pool::DbConfig;
    use crate::repository::product::NewProduct;
    use crate::repository::template::{NewGlobalAttribute, NewGlobalOption, NewLink};
    use atelier_core::combination::combination_key;
    use atelier_core::{LinkOptionSelection, MetadataField, MetadataFieldType, OptionMetadata};
    use serde_json::json;

    #[tokio::test]
    async fn test_computed_price_and_weight() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bag = seed_leather_bag(&db).await.unwrap();
        let variants = db.generator().generate(&bag.product.id, None).await.unwrap();
        let key = combination_key(&bag.selection(&bag.tan, &bag.large));
        let tan_large = variants.iter().find(|v| v.combination_key == key).unwrap();

        let pricing = db.pricing().effective(&tan_large.id).await.unwrap();
        assert_eq!(pricing.price, Money::from_cents(12_000 + 500 + 2_000));
        assert_eq!(pricing.weight, Decimal::new(15, 1));
        assert!(!pricing.price_overridden);
    }

    #[tokio::test]
    async fn test_override_wins() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bag = seed_leather_bag(&db).await.unwrap();
        let variants = db.generator().generate(&bag.product.id, None).await.unwrap();
        let variant = &variants[0];

        db.variants().set_price_override(&variant.id, Some(9_900)).await.unwrap();
        db.variants()
            .set_weight_override(&variant.id, Some(Decimal::new(2, 0)))
            .await
            .unwrap();

        let pricing = db.pricing();
        assert_eq!(pricing.effective_price(&variant.id).await.unwrap(), Money::from_cents(9_900));
        assert_eq!(pricing.effective_weight(&variant.id).await.unwrap(), Decimal::new(2, 0));

        db.variants().set_price_override(&variant.id, None).await.unwrap();
        assert_eq!(
            pricing.effective_price(&variant.id).await.unwrap(),
            Money::from_cents(12_000)
        );
    }

    #[tokio::test]
    async fn test_global_modifiers_follow_link_flags() {
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
        let hardware = templates
            .create(&NewGlobalAttribute {
                name: "hardware".to_string(),
                display_name: "Hardware".to_string(),
                schema: vec![
                    MetadataField {
                        key: "price".to_string(),
                        label: "Price".to_string(),
                        field_type: MetadataFieldType::Number,
                        required: false,
                        default_value: Some(json!(0)),
                    },
                    MetadataField {
                        key: "weight".to_string(),
                        label: "Weight".to_string(),
                        field_type: MetadataFieldType::Number,
                        required: false,
                        default_value: None,
                    },
                ],
            })
            .await
            .unwrap();
        let mut metadata = OptionMetadata::new();
        metadata.insert("price".to_string(), json!(12.5));
        metadata.insert("weight".to_string(), json!("0.05"));
        let gold = templates
            .add_option(&NewGlobalOption {
                global_attribute_id: hardware.id.clone(),
                value: "gold".to_string(),
                display_value: "Gold".to_string(),
                metadata,
                position: 0,
            })
            .await
            .unwrap();

        let priced = templates
            .link(&NewLink {
                product_id: product.id.clone(),
                global_attribute_id: hardware.id.clone(),
                role_name: "zipper".to_string(),
                role_display_name: "Zipper".to_string(),
                position: 0,
                affects_pricing: true,
                affects_shipping: true,
                price_modifier_field: Some("price".to_string()),
                weight_modifier_field: Some("weight".to_string()),
            })
            .await
            .unwrap();
        templates
            .link(&NewLink {
                product_id: product.id.clone(),
                global_attribute_id: hardware.id.clone(),
                role_name: "clasp".to_string(),
                role_display_name: "Clasp".to_string(),
                position: 1,
                ..NewLink::default()
            })
            .await
            .unwrap();

        let variants = db.generator().generate(&product.id, None).await.unwrap();
        assert_eq!(variants.len(), 1);
        let pricing = db.pricing().effective(&variants[0].id).await.unwrap();
        // only the pricing link contributes
        assert_eq!(pricing.price, Money::from_cents(8_000 + 1_250));
        assert_eq!(pricing.weight, Decimal::new(105, 2));

        // A per-link override replaces the metadata value
        templates
            .select_option(&LinkOptionSelection {
                link_id: priced.id.clone(),
                global_option_id: gold.id.clone(),
                price_modifier_override_cents: Some(300),
                weight_modifier_override: None,
                position: 0,
            })
            .await
            .unwrap();
        let pricing = db.pricing().effective(&variants[0].id).await.unwrap();
        assert_eq!(pricing.price, Money::from_cents(8_300));
    }
}
