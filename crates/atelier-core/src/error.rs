//! # Error Types
//!
//! Domain-specific error types for atelier-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  atelier-core errors (this file)                                       │
//! │  ├── CoreError        - Catalog / generation preconditions             │
//! │  ├── BomError         - BOM resolution data-integrity failures         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  atelier-db errors (separate crate)                                    │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - What engine callers see                        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │        BomError ────────────────────┼──► EngineError → admin layer     │
//! │        DbError ─────────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, material, override IDs)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a message an administrator can act on

use rust_decimal::Decimal;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Catalog and generation errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No attribute axis of the product has any active option.
    ///
    /// ## When This Occurs
    /// - Product has no attributes and no global links
    /// - Every attribute/link is inactive
    /// - Every option of every axis is inactive or filtered out
    ///
    /// Generation is refused wholesale; nothing is written.
    #[error("Product {product_id} has no eligible attributes for variant generation")]
    NoAttributes { product_id: String },

    /// The Cartesian product is larger than the engine accepts in one run.
    #[error("Product {product_id} would generate {combinations} combinations (limit {limit})")]
    TooManyCombinations {
        product_id: String,
        combinations: usize,
        limit: usize,
    },

    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Variant cannot be found.
    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// BOM Error
// =============================================================================

/// BOM resolution errors.
///
/// Every variant names the offending material and the rule that referenced it,
/// so an administrator can correct the configuration before production.
#[derive(Debug, Error)]
pub enum BomError {
    /// A BOM rule references a raw material that does not exist.
    #[error("Unknown raw material {material_id} referenced by {origin}")]
    UnknownMaterial { material_id: String, origin: String },

    /// An option modifier targets an entry that is not part of the product base BOM.
    #[error("Modifier {modifier_id} targets base entry {entry_id}, which is not in the product base BOM")]
    UnknownBaseEntry {
        modifier_id: String,
        entry_id: String,
    },

    /// A step drove a material quantity below zero.
    #[error("Quantity of {material_id} became negative ({quantity}) after {origin}")]
    NegativeQuantity {
        material_id: String,
        quantity: Decimal,
        origin: String,
    },

    /// A step pushed a material quantity past the decimal range.
    #[error("Quantity of {material_id} overflowed after {origin}")]
    QuantityOverflow { material_id: String, origin: String },

    /// An override is missing data required by its type.
    #[error("Variant override {override_id} is invalid: {reason}")]
    InvalidOverride { override_id: String, reason: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when administrator input doesn't meet requirements.
/// Used for early validation before anything is persisted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Metadata value does not match the template schema type.
    #[error("{field} must be of type {expected}")]
    WrongType { field: String, expected: String },

    /// Duplicate value (e.g., duplicate role name on one product).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Convenience type alias for Results with BomError.
pub type BomResult<T> = Result<T, BomError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_attributes_message_names_precondition() {
        let err = CoreError::NoAttributes {
            product_id: "p-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Product p-1 has no eligible attributes for variant generation"
        );
    }

    #[test]
    fn test_bom_error_names_material_and_origin() {
        let err = BomError::UnknownMaterial {
            material_id: "leather".to_string(),
            origin: "option addition oa-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown raw material leather referenced by option addition oa-1"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
