//! # Validation Module
//!
//! Input validation for catalog and BOM configuration.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin UI                                                     │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repositories (atelier-db)                                    │
//! │  └── THIS MODULE: business rule validation before insert/update        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (product_id, combination_key), (product_id, sku)           │
//! │  ├── UNIQUE (product_id, role_name)                                    │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use atelier_core::validation::{validate_sku, validate_sku_prefix};
//!
//! validate_sku_prefix("BAG").unwrap();
//! validate_sku("BAG-BLA-LAR").unwrap();
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::pricing::json_decimal;
use crate::types::{MetadataField, MetadataFieldType, ModifierOp, OptionMetadata};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_SKU_LEN: usize = 64;
const MAX_SKU_PREFIX_LEN: usize = 16;
const MAX_NAME_LEN: usize = 200;
const MAX_ROLE_NAME_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, numbers, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use atelier_core::validation::validate_sku;
///
/// assert!(validate_sku("BAG-BLA-LAR").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("BAG BLA").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    validate_code("sku", sku, MAX_SKU_LEN)
}

/// Validates a product SKU prefix. Same character rules as a SKU, shorter.
pub fn validate_sku_prefix(prefix: &str) -> ValidationResult<()> {
    validate_code("sku_prefix", prefix, MAX_SKU_PREFIX_LEN)
}

fn validate_code(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name (product, attribute, option, material).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates the role name of a template link (`base_color`, `interior_color`).
///
/// ## Rules
/// - Must not be empty, at most 64 characters
/// - Lowercase ASCII letters, digits and underscores, starting with a letter
pub fn validate_role_name(role: &str) -> ValidationResult<()> {
    if role.is_empty() {
        return Err(ValidationError::Required {
            field: "role_name".to_string(),
        });
    }

    if role.len() > MAX_ROLE_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "role_name".to_string(),
            max: MAX_ROLE_NAME_LEN,
        });
    }

    let starts_with_letter = role.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_chars = role
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !starts_with_letter || !valid_chars {
        return Err(ValidationError::InvalidFormat {
            field: "role_name".to_string(),
            reason: "must be snake_case starting with a letter".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a BOM or stock quantity.
///
/// ## Example
/// ```rust
/// use atelier_core::validation::validate_quantity;
/// use rust_decimal::Decimal;
///
/// assert!(validate_quantity("quantity", Decimal::new(28, 1)).is_ok());
/// assert!(validate_quantity("quantity", Decimal::ZERO).is_ok());
/// assert!(validate_quantity("quantity", Decimal::new(-1, 0)).is_err());
/// ```
pub fn validate_quantity(field: &str, quantity: Decimal) -> ValidationResult<()> {
    if quantity < Decimal::ZERO {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates the value of a Layer-2b modifier.
///
/// ## Rules
/// - `multiply`: strictly positive factor
/// - `set`: non-negative quantity
/// - `add`: any value; negative deltas are caught at resolution time
pub fn validate_modifier(op: ModifierOp, value: Decimal) -> ValidationResult<()> {
    match op {
        ModifierOp::Multiply if value <= Decimal::ZERO => Err(ValidationError::MustBePositive {
            field: "multiplier".to_string(),
        }),
        ModifierOp::Set => validate_quantity("quantity", value),
        _ => Ok(()),
    }
}

/// Validates a base price in cents.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Metadata Validators
// =============================================================================

/// Validates a template option's metadata against the template schema.
///
/// ## Rules
/// - Required fields must be present (a schema default satisfies the rule)
/// - Values must match the declared field type
/// - Keys outside the schema are allowed and left untouched
///
/// ## Example
/// ```rust
/// use atelier_core::types::{MetadataField, MetadataFieldType, OptionMetadata};
/// use atelier_core::validation::validate_option_metadata;
/// use serde_json::json;
///
/// let schema = vec![MetadataField {
///     key: "hex".to_string(),
///     label: "Hex".to_string(),
///     field_type: MetadataFieldType::Color,
///     required: true,
///     default_value: None,
/// }];
/// let mut metadata = OptionMetadata::new();
/// metadata.insert("hex".to_string(), json!("#000000"));
/// assert!(validate_option_metadata(&schema, &metadata).is_ok());
/// ```
pub fn validate_option_metadata(
    schema: &[MetadataField],
    metadata: &OptionMetadata,
) -> ValidationResult<()> {
    for field in schema {
        let value = metadata.get(&field.key).filter(|v| !v.is_null());

        let value = match value {
            Some(v) => v,
            None if field.required && field.default_value.is_none() => {
                return Err(ValidationError::Required {
                    field: field.key.clone(),
                });
            }
            None => continue,
        };

        let type_ok = match field.field_type {
            MetadataFieldType::Text => value.is_string(),
            MetadataFieldType::Number => json_decimal(value).is_some(),
            MetadataFieldType::Boolean => value.is_boolean(),
            MetadataFieldType::Color => value.as_str().is_some_and(is_hex_color),
        };

        if !type_ok {
            return Err(ValidationError::WrongType {
                field: field.key.clone(),
                expected: field.field_type.to_string(),
            });
        }
    }

    Ok(())
}

fn is_hex_color(s: &str) -> bool {
    s.strip_prefix('#').is_some_and(|hex| {
        matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use atelier_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
