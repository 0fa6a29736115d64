//! # Effective Price & Weight
//!
//! Read-path computation of a variant's price and weight when no override is
//! stored on the variant.
//!
//! ```text
//! effective price  = variant.price  ?? product.base_price  + Σ option price modifiers
//! effective weight = variant.weight ?? product.base_weight + Σ option weight modifiers
//! ```
//!
//! ## Where Modifiers Come From
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product-specific option   → AttributeOption.price_modifier_cents       │
//! │                                                                         │
//! │  Global option (via link)  → link does not affect pricing?  → 0         │
//! │                              LinkOptionSelection override?  → override  │
//! │                              link.price_modifier_field set? → metadata  │
//! │                                 (schema default if missing)             │
//! │                              otherwise                      → 0         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Weight follows the same chain with `affects_shipping` and
//! `weight_modifier_field`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;

use crate::axis::SelectedOption;
use crate::money::Money;
use crate::types::{
    AttributeOption, GlobalAttribute, GlobalAttributeLink, GlobalOption, LinkOptionSelection,
};

/// Price and weight contribution of one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Modifiers {
    pub price: Money,
    #[ts(as = "String")]
    pub weight: Decimal,
}

/// Modifiers of a product-specific option.
pub fn custom_option_modifiers(option: &AttributeOption) -> Modifiers {
    Modifiers {
        price: Money::from_cents(option.price_modifier_cents),
        weight: option.weight_modifier,
    }
}

/// Modifiers of a template option selected through a link.
pub fn global_option_modifiers(
    link: &GlobalAttributeLink,
    template: &GlobalAttribute,
    option: &GlobalOption,
    selection: Option<&LinkOptionSelection>,
) -> Modifiers {
    let price = if link.affects_pricing {
        selection
            .and_then(|s| s.price_modifier_override_cents)
            .map(Money::from_cents)
            .or_else(|| {
                link.price_modifier_field
                    .as_deref()
                    .and_then(|field| metadata_decimal(template, option, field))
                    .and_then(Money::from_major_decimal)
            })
            .unwrap_or_default()
    } else {
        Money::zero()
    };

    let weight = if link.affects_shipping {
        selection
            .and_then(|s| s.weight_modifier_override)
            .or_else(|| {
                link.weight_modifier_field
                    .as_deref()
                    .and_then(|field| metadata_decimal(template, option, field))
            })
            .unwrap_or_default()
    } else {
        Decimal::ZERO
    };

    Modifiers { price, weight }
}

/// Reads a numeric metadata field of an option, falling back to the
/// template's schema default. Non-numeric values read as `None`.
pub fn metadata_decimal(
    template: &GlobalAttribute,
    option: &GlobalOption,
    field: &str,
) -> Option<Decimal> {
    let value = option
        .metadata
        .get(field)
        .filter(|v| !v.is_null())
        .or_else(|| template.field(field).and_then(|f| f.default_value.as_ref()))?;

    json_decimal(value)
}

/// Interprets a JSON number or numeric string as a decimal.
pub fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Effective price of a variant.
pub fn effective_price(
    base_price: Money,
    price_override_cents: Option<i64>,
    selections: &[SelectedOption],
) -> Money {
    match price_override_cents {
        Some(cents) => Money::from_cents(cents),
        None => base_price + selections.iter().map(|s| s.modifiers.price).sum::<Money>(),
    }
}

/// Effective weight of a variant.
pub fn effective_weight(
    base_weight: Decimal,
    weight_override: Option<Decimal>,
    selections: &[SelectedOption],
) -> Decimal {
    match weight_override {
        Some(weight) => weight,
        None => selections
            .iter()
            .fold(base_weight, |acc, s| acc + s.modifiers.weight),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisRank;
    use crate::types::{MetadataField, MetadataFieldType, OptionRef};
    use chrono::Utc;
    use serde_json::json;

    fn template() -> GlobalAttribute {
        GlobalAttribute {
            id: "color".to_string(),
            name: "color".to_string(),
            display_name: "Color".to_string(),
            schema: vec![
                MetadataField {
                    key: "price".to_string(),
                    label: "Surcharge".to_string(),
                    field_type: MetadataFieldType::Number,
                    required: false,
                    default_value: Some(json!(1)),
                },
                MetadataField {
                    key: "weight".to_string(),
                    label: "Extra weight".to_string(),
                    field_type: MetadataFieldType::Number,
                    required: false,
                    default_value: None,
                },
            ],
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn option(metadata: serde_json::Value) -> GlobalOption {
        GlobalOption {
            id: "black".to_string(),
            global_attribute_id: "color".to_string(),
            value: "black".to_string(),
            display_value: "Black".to_string(),
            metadata: serde_json::from_value(metadata).unwrap(),
            position: 0,
            is_active: true,
        }
    }

    fn link(affects_pricing: bool) -> GlobalAttributeLink {
        GlobalAttributeLink {
            id: "base".to_string(),
            product_id: "bag".to_string(),
            global_attribute_id: "color".to_string(),
            role_name: "base_color".to_string(),
            role_display_name: "Base Color".to_string(),
            position: 0,
            affects_pricing,
            affects_shipping: true,
            price_modifier_field: Some("price".to_string()),
            weight_modifier_field: Some("weight".to_string()),
            is_active: true,
        }
    }

    #[test]
    fn test_metadata_field_supplies_price_in_major_units() {
        let m = global_option_modifiers(
            &link(true),
            &template(),
            &option(json!({"price": "12.50", "weight": 0.2})),
            None,
        );
        assert_eq!(m.price.cents(), 1250);
        assert_eq!(m.weight, Decimal::new(2, 1));
    }

    #[test]
    fn test_selection_override_wins_over_metadata() {
        let selection = LinkOptionSelection {
            link_id: "base".to_string(),
            global_option_id: "black".to_string(),
            price_modifier_override_cents: Some(300),
            weight_modifier_override: None,
            position: 0,
        };
        let m = global_option_modifiers(
            &link(true),
            &template(),
            &option(json!({"price": 12.5})),
            Some(&selection),
        );
        assert_eq!(m.price.cents(), 300);
    }

    #[test]
    fn test_schema_default_used_when_metadata_missing() {
        let m = global_option_modifiers(&link(true), &template(), &option(json!({})), None);
        assert_eq!(m.price.cents(), 100);
        assert_eq!(m.weight, Decimal::ZERO);
    }

    #[test]
    fn test_link_not_affecting_pricing_contributes_nothing() {
        let m = global_option_modifiers(
            &link(false),
            &template(),
            &option(json!({"price": 12.5})),
            None,
        );
        assert!(m.price.is_zero());
    }

    #[test]
    fn test_effective_price_and_weight() {
        let selections = vec![
            SelectedOption {
                option: OptionRef::custom("large"),
                rank: AxisRank::custom(0, "size"),
                display_value: "Large".to_string(),
                modifiers: Modifiers {
                    price: Money::from_cents(1000),
                    weight: Decimal::new(3, 1),
                },
            },
            SelectedOption {
                option: OptionRef::global("base", "black"),
                rank: AxisRank::link(0, "base"),
                display_value: "Black".to_string(),
                modifiers: Modifiers {
                    price: Money::from_cents(250),
                    weight: Decimal::ZERO,
                },
            },
        ];

        let price = effective_price(Money::from_cents(4990), None, &selections);
        assert_eq!(price.cents(), 6240);

        let weight = effective_weight(Decimal::new(12, 1), None, &selections);
        assert_eq!(weight, Decimal::new(15, 1));

        // Manual override is returned untouched
        assert_eq!(
            effective_price(Money::from_cents(4990), Some(9900), &selections).cents(),
            9900
        );
    }
}
