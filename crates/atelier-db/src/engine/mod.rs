//! # Engine Services
//!
//! Database-backed services that feed stored catalog data through the pure
//! logic in `atelier-core`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database ──► ProductCatalog (one read of a product's definition)       │
//! │                    │                                                    │
//! │     ┌──────────────┼─────────────────┬─────────────────────┐            │
//! │     ▼              ▼                 ▼                     ▼            │
//! │  AttributeResolver VariantGenerator  BomService            VariantPricing│
//! │  axes              missing variants  BOM + producibility   price/weight │
//! │                    (one transaction)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services are cheap handles obtained from [`Database`](crate::Database).

pub mod bom;
pub mod generator;
pub mod pricing;
pub mod resolver;

pub use bom::{BomService, VariantProducibility};
pub use generator::VariantGenerator;
pub use pricing::{EffectivePricing, VariantPricing};
pub use resolver::AttributeResolver;
