//! # Repository Module
//!
//! Database repository implementations for Atelier.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Engine service / admin layer                                          │
//! │       │                                                                 │
//! │       │  db.variants().list_for_product("bag")                         │
//! │       ▼                                                                 │
//! │  VariantRepository                                                     │
//! │  ├── list_for_product(&self, product_id)                               │
//! │  ├── create_manual(&self, input)                                       │
//! │  └── set_price_override(&self, id, cents)                              │
//! │       │                                                                 │
//! │       │  Row struct (FromRow) → domain type (decimal / JSON decoding)   │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Conventions
//! - Quantities and weights: decimal TEXT, decoded with `rust_decimal`
//! - Template schema and option metadata: JSON TEXT
//! - Rule triggers: `attribute_option_id` XOR `global_option_id`, plus an
//!   optional `link_id` scoping a global trigger to one role
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products
//! - [`AttributeRepository`](attribute::AttributeRepository) - Product-specific attributes/options
//! - [`TemplateRepository`](template::TemplateRepository) - Templates, template options, links, selections
//! - [`VariantRepository`](variant::VariantRepository) - Variants and their option junctions
//! - [`MaterialRepository`](material::MaterialRepository) - Raw materials and stock
//! - [`BomRepository`](bom::BomRepository) - The three BOM layers

pub mod attribute;
pub mod bom;
pub mod material;
pub mod product;
pub mod template;
pub mod variant;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use uuid::Uuid;

use atelier_core::RuleTrigger;

use crate::error::{DbError, DbResult};

/// Generates a new entity ID.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| DbError::invalid(column, e))
}

pub(crate) fn parse_decimal_opt(column: &str, raw: Option<&str>) -> DbResult<Option<Decimal>> {
    raw.map(|r| parse_decimal(column, r)).transpose()
}

pub(crate) fn parse_json<T: DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::invalid(column, e))
}

pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::invalid(column, e))
}

/// Decodes the trigger columns shared by option materials and modifiers.
pub(crate) fn decode_trigger(
    rule_id: &str,
    attribute_option_id: Option<String>,
    global_option_id: Option<String>,
    link_id: Option<String>,
) -> DbResult<RuleTrigger> {
    match (attribute_option_id, global_option_id) {
        (Some(option_id), None) => Ok(RuleTrigger::Custom { option_id }),
        (None, Some(option_id)) => Ok(RuleTrigger::Global { option_id, link_id }),
        _ => Err(DbError::invalid(
            "trigger",
            format!("rule {} must reference exactly one option", rule_id),
        )),
    }
}

/// Splits a trigger into (attribute_option_id, global_option_id, link_id).
pub(crate) fn encode_trigger(
    trigger: &RuleTrigger,
) -> (Option<&str>, Option<&str>, Option<&str>) {
    match trigger {
        RuleTrigger::Custom { option_id } => (Some(option_id.as_str()), None, None),
        RuleTrigger::Global { option_id, link_id } => {
            (None, Some(option_id.as_str()), link_id.as_deref())
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
