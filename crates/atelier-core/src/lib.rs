//! # atelier-core: Pure Configuration & Manufacturing Logic
//!
//! Turns a product's attribute graph into purchasable variants and resolves,
//! per variant, the bill of materials and how many units stock allows.
//! Everything here is a pure function over data handed in by `atelier-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Atelier Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Admin layer / production module (external)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     atelier-db: repositories + engine services (SQLite)         │   │
//! │  │  AttributeResolver  VariantGenerator  BomService                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ atelier-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌─────────────┐  ┌──────────┐  ┌────────────┐  │   │
//! │  │   │   axis   │─►│ combination │  │   bom    │─►│producibil- │  │   │
//! │  │   │ resolver │  │  generator  │  │ resolver │  │    ity     │  │   │
//! │  │   └──────────┘  └─────────────┘  └──────────┘  └────────────┘  │   │
//! │  │   types • money • pricing • validation • error                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Catalog, inventory and BOM entities
//! - [`axis`] - Attribute axes in position order
//! - [`combination`] - Cartesian product, combination keys, SKUs
//! - [`bom`] - Layered BOM resolution
//! - [`producibility`] - Units buildable from stock
//! - [`pricing`] - Option modifiers, effective price and weight
//! - [`money`] - Integer-cents money
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use atelier_core::combination::{combination_key, SkuFormat};
//! use atelier_core::OptionRef;
//!
//! let key = combination_key(&[OptionRef::custom("large"), OptionRef::custom("black")]);
//! assert_eq!(key, "c:black|c:large");
//!
//! let sku = SkuFormat::default().build("BAG", ["Black", "Large"]);
//! assert_eq!(sku, "BAG-BLA-LAR");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod axis;
pub mod bom;
pub mod combination;
pub mod error;
pub mod money;
pub mod pricing;
pub mod producibility;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use axis::{Axis, AxisOption, AxisRank, AxisSource, SelectedOption};
pub use bom::{BomInputs, BomLine, BomStep, ResolvedBom};
pub use combination::{GenerationPlan, PlannedVariant, SkuFormat};
pub use error::{BomError, CoreError, ValidationError};
pub use money::Money;
pub use producibility::{Producibility, StockSnapshot};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Characters of each option's display value used in a generated SKU.
pub const DEFAULT_SKU_ABBREVIATION_LEN: usize = 3;

/// Joins the SKU prefix and option abbreviations.
pub const DEFAULT_SKU_SEPARATOR: &str = "-";

/// Largest Cartesian product generated in one run.
///
/// ## Business Reason
/// A mis-configured template link (hundreds of colours under several roles)
/// would otherwise insert an unusable number of variants in one transaction.
pub const MAX_GENERATED_COMBINATIONS: usize = 10_000;
