//! # Domain Types
//!
//! Catalog, inventory and BOM entities shared by every engine component.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Product ──┬── Attribute ──── AttributeOption        (product-specific) │
//! │            │                                                            │
//! │            └── GlobalAttributeLink (role) ──┐                           │
//! │                     │                       ▼                           │
//! │                     │              GlobalAttribute ── GlobalOption      │
//! │                     └── LinkOptionSelection (filter + overrides)        │
//! │                                                                         │
//! │  Variant ── one OptionRef per axis, canonical combination_key          │
//! │                                                                         │
//! │  RawMaterial ◄── ProductMaterial   (Layer 1:  base)                     │
//! │              ◄── OptionMaterial    (Layer 2a: addition)                 │
//! │              ◄── OptionModifier    (Layer 2b: transform of Layer 1)     │
//! │              ◄── VariantOverride   (Layer 3:  per-variant)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Link vs Template
//! A [`GlobalAttribute`] is only a shared option vocabulary. The axis instance
//! is the [`GlobalAttributeLink`]: the same template linked twice (roles
//! "Base Color" and "Interior Color") yields two independent axes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A configurable product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Prefix used for generated variant SKUs (e.g. "BAG").
    pub sku_prefix: String,

    /// Base price in cents.
    pub base_price_cents: i64,

    /// Base weight in kilograms.
    #[ts(as = "String")]
    pub base_weight: Decimal,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the base price as a Money type.
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }
}

// =============================================================================
// Product-Specific Attributes
// =============================================================================

/// An attribute owned exclusively by one product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Attribute {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub display_name: String,
    /// Axis position among the product-specific attributes.
    pub position: i64,
    pub is_active: bool,
}

/// A selectable value of a product-specific attribute.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AttributeOption {
    pub id: String,
    pub attribute_id: String,
    pub value: String,
    pub display_value: String,
    /// Price modifier in cents (may be negative).
    pub price_modifier_cents: i64,
    /// Weight modifier in kilograms (may be negative).
    #[ts(as = "String")]
    pub weight_modifier: Decimal,
    pub position: i64,
    pub is_active: bool,
}

// =============================================================================
// Global Attribute Templates
// =============================================================================

/// Type of a structured metadata field on a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFieldType {
    Text,
    /// Numeric value; stored as a JSON number or a numeric string.
    Number,
    Boolean,
    /// Hex colour such as `#1a1a1a`.
    Color,
}

impl fmt::Display for MetadataFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataFieldType::Text => "text",
            MetadataFieldType::Number => "number",
            MetadataFieldType::Boolean => "boolean",
            MetadataFieldType::Color => "color",
        };
        f.write_str(name)
    }
}

/// One field of a template's metadata schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MetadataField {
    pub key: String,
    pub label: String,
    pub field_type: MetadataFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

/// Structured metadata of a global option, keyed by schema field.
pub type OptionMetadata = BTreeMap<String, serde_json::Value>;

/// A reusable attribute template (shared option vocabulary).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GlobalAttribute {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub schema: Vec<MetadataField>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl GlobalAttribute {
    /// Looks up a schema field by key.
    pub fn field(&self, key: &str) -> Option<&MetadataField> {
        self.schema.iter().find(|f| f.key == key)
    }
}

/// An option in a template's shared vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GlobalOption {
    pub id: String,
    pub global_attribute_id: String,
    pub value: String,
    pub display_value: String,
    pub metadata: OptionMetadata,
    pub position: i64,
    pub is_active: bool,
}

/// A template linked to a product under a named role: the axis instance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GlobalAttributeLink {
    pub id: String,
    pub product_id: String,
    pub global_attribute_id: String,
    /// Role name, unique per product (e.g. "base_color").
    pub role_name: String,
    /// Role label for display (e.g. "Base Color").
    pub role_display_name: String,
    /// Axis position among the product's links.
    pub position: i64,
    pub affects_pricing: bool,
    pub affects_shipping: bool,
    /// Metadata field that supplies the price modifier (major units).
    pub price_modifier_field: Option<String>,
    /// Metadata field that supplies the weight modifier (kilograms).
    pub weight_modifier_field: Option<String>,
    pub is_active: bool,
}

/// An explicitly selected template option for one link.
///
/// A link without any selection uses every active template option.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinkOptionSelection {
    pub link_id: String,
    pub global_option_id: String,
    /// Overrides the metadata-sourced price modifier (cents).
    pub price_modifier_override_cents: Option<i64>,
    /// Overrides the metadata-sourced weight modifier (kilograms).
    #[ts(as = "Option<String>")]
    pub weight_modifier_override: Option<Decimal>,
    pub position: i64,
}

// =============================================================================
// Option Identity
// =============================================================================

/// Identity of a selected option, qualified by its axis source.
///
/// Global options are qualified by link so that one shared option chosen
/// under two roles is two different selections.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptionRef {
    /// Option of a product-specific attribute.
    Custom { option_id: String },
    /// Template option selected through a link.
    Global { link_id: String, option_id: String },
}

impl OptionRef {
    pub fn custom(option_id: impl Into<String>) -> Self {
        OptionRef::Custom {
            option_id: option_id.into(),
        }
    }

    pub fn global(link_id: impl Into<String>, option_id: impl Into<String>) -> Self {
        OptionRef::Global {
            link_id: link_id.into(),
            option_id: option_id.into(),
        }
    }

    /// The option's own ID (attribute option or global option).
    pub fn option_id(&self) -> &str {
        match self {
            OptionRef::Custom { option_id } | OptionRef::Global { option_id, .. } => option_id,
        }
    }

    /// Token used inside canonical combination keys.
    pub fn token(&self) -> String {
        match self {
            OptionRef::Custom { option_id } => format!("c:{}", option_id),
            OptionRef::Global { link_id, option_id } => format!("g:{}:{}", link_id, option_id),
        }
    }
}

impl fmt::Display for OptionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

// =============================================================================
// Variant
// =============================================================================

/// One purchasable combination of options.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Variant {
    pub id: String,
    pub product_id: String,
    pub sku: String,
    pub barcode: Option<String>,
    /// Price override in cents; `None` means computed from modifiers.
    pub price_cents: Option<i64>,
    /// Weight override in kilograms; `None` means computed from modifiers.
    #[ts(as = "Option<String>")]
    pub weight: Option<Decimal>,
    pub stock_quantity: i64,
    pub position: i64,
    pub is_active: bool,
    /// Canonical, order-independent key of the selected options.
    pub combination_key: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Raw Materials
// =============================================================================

/// An inventory unit consumed by production.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RawMaterial {
    pub id: String,
    pub name: String,
    /// Unit of measure (e.g. "m", "pcs", "g").
    pub unit: String,
    #[ts(as = "String")]
    pub stock_quantity: Decimal,
    pub is_active: bool,
}

// =============================================================================
// BOM Layers
// =============================================================================

/// Layer 1: a base material common to every variant of a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductMaterial {
    pub id: String,
    pub product_id: String,
    pub raw_material_id: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Optional materials do not gate producibility.
    pub is_required: bool,
}

/// Which selected option fires a Layer-2 rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleTrigger {
    /// A product-specific option.
    Custom { option_id: String },
    /// A template option; `link_id = None` fires under any role.
    Global {
        option_id: String,
        link_id: Option<String>,
    },
}

impl RuleTrigger {
    /// Checks whether this trigger fires for the given selection.
    pub fn matches(&self, selection: &OptionRef) -> bool {
        match (self, selection) {
            (RuleTrigger::Custom { option_id }, OptionRef::Custom { option_id: selected }) => {
                option_id == selected
            }
            (
                RuleTrigger::Global { option_id, link_id },
                OptionRef::Global {
                    link_id: selected_link,
                    option_id: selected,
                },
            ) => option_id == selected && link_id.as_ref().map_or(true, |l| l == selected_link),
            _ => false,
        }
    }
}

/// Layer 2a: material added when an option is selected.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OptionMaterial {
    pub id: String,
    pub trigger: RuleTrigger,
    pub raw_material_id: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
}

/// Transform applied by a Layer-2b modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ModifierOp {
    /// `M[target] *= value`
    Multiply,
    /// `M[target] += value`
    Add,
    /// `M[target] = value`
    Set,
}

impl fmt::Display for ModifierOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModifierOp::Multiply => "multiply",
            ModifierOp::Add => "add",
            ModifierOp::Set => "set",
        };
        f.write_str(name)
    }
}

/// Layer 2b: option-driven transform of one Layer-1 entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OptionModifier {
    pub id: String,
    pub trigger: RuleTrigger,
    /// The targeted `ProductMaterial` entry.
    pub product_material_id: String,
    pub op: ModifierOp,
    #[ts(as = "String")]
    pub value: Decimal,
}

/// Kind of a Layer-3 variant override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    /// Remove `raw_material_id`, set `replacement_material_id` to `quantity`.
    Replace,
    /// Increment (or insert) `raw_material_id` by `quantity`.
    Add,
    /// Delete `raw_material_id` entirely.
    Remove,
    /// Force `raw_material_id` to `quantity`.
    SetQuantity,
}

impl fmt::Display for OverrideType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverrideType::Replace => "replace",
            OverrideType::Add => "add",
            OverrideType::Remove => "remove",
            OverrideType::SetQuantity => "set_quantity",
        };
        f.write_str(name)
    }
}

/// Layer 3: a BOM transform for one exact variant.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantOverride {
    pub id: String,
    pub variant_id: String,
    pub override_type: OverrideType,
    pub raw_material_id: String,
    pub replacement_material_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub quantity: Option<Decimal>,
    /// Definition order; overrides apply in ascending position.
    pub position: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
