//! # atelier-db: Persistence & Engine Services for Atelier
//!
//! Stores the product catalog, variants, raw materials and BOM rules in
//! SQLite (via sqlx) and runs the configuration engine against them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Atelier Data Flow                                │
//! │                                                                         │
//! │  Admin layer / production module                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    atelier-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │    Engine     │    │ Repositories │  │   │
//! │  │   │   (pool.rs)   │    │  (engine/)    │    │(repository/) │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │───►│ Resolver      │───►│ Product      │  │   │
//! │  │   │ Gen. locks    │    │ Generator     │    │ Attribute    │  │   │
//! │  │   │ Migrations    │    │ BOM / Pricing │    │ Template ... │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                               │   │
//! │  └────────────────────────────────┼───────────────────────────────┘   │
//! │                                   ▼                                     │
//! │                     atelier-core (pure axis, SKU, BOM logic)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the [`Database`] handle
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - `atelier.toml` loading and tracing setup
//! - [`error`] - [`DbError`] and the engine-level [`EngineError`]
//! - [`repository`] - Catalog, variant, material and BOM rule storage
//! - [`engine`] - Attribute resolver, variant generator, BOM and pricing
//! - [`demo`] - The leather bag catalog used by the seed binary
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atelier_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("atelier.db")).await?;
//!
//! let created = db.generator().generate(&product_id, None).await?;
//! for variant in &created {
//!     let bom = db.bom().resolve_variant(&variant.id).await?;
//!     let units = db.bom().producibility(&variant.id).await?;
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{init_tracing, ConfigError, EngineConfig};
pub use error::{DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig};

// Engine services
pub use engine::{
    AttributeResolver, BomService, EffectivePricing, VariantGenerator, VariantPricing,
    VariantProducibility,
};

// Repository re-exports for convenience
pub use repository::attribute::AttributeRepository;
pub use repository::bom::BomRepository;
pub use repository::material::MaterialRepository;
pub use repository::product::ProductRepository;
pub use repository::template::TemplateRepository;
pub use repository::variant::VariantRepository;
