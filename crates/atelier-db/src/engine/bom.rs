//! # BOM Service
//!
//! Gathers the three BOM layers of a variant from the database and hands
//! them to [`atelier_core::bom::resolve`]; derives producibility from the
//! result and the current raw-material stock.
//!
//! ```text
//! variant ──► selections (axis position order)
//!    │            │
//!    │            ├── product_materials        Layer 1
//!    │            ├── option_materials         Layer 2a
//!    │            └── option_modifiers         Layer 2b
//!    └── variant_overrides                     Layer 3
//!                 │
//!                 ▼
//!          ResolvedBom ──► producibility(stock snapshot)
//! ```
//!
//! Everything here is read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use atelier_core::bom::resolve;
use atelier_core::producibility::{limiting_material, producibility};
use atelier_core::{
    BomInputs, CoreError, OptionRef, Producibility, ProductMaterial, RawMaterial, ResolvedBom,
    StockSnapshot, Variant,
};

use super::resolver::ProductCatalog;
use crate::error::EngineResult;
use crate::pool::Database;

/// Producibility of one variant, as listed for the admin layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantProducibility {
    pub variant_id: String,
    pub sku: String,
    pub producibility: Producibility,
    /// Required material that caps production; `None` when unbounded.
    pub limiting_material_id: Option<String>,
}

/// Inputs shared by every variant of one product.
struct ProductBomContext {
    catalog: ProductCatalog,
    base: Vec<ProductMaterial>,
    materials: HashMap<String, RawMaterial>,
}

impl ProductBomContext {
    async fn load(db: &Database, product_id: &str) -> EngineResult<Self> {
        let catalog = ProductCatalog::load(db, product_id).await?;
        let base = db.bom_rules().base_for_product(product_id).await?;
        let materials = db
            .materials()
            .list()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        Ok(ProductBomContext {
            catalog,
            base,
            materials,
        })
    }

    async fn resolve(
        &self,
        db: &Database,
        variant_id: &str,
        selections: &[OptionRef],
    ) -> EngineResult<ResolvedBom> {
        let ordered: Vec<OptionRef> = self
            .catalog
            .selected_options(selections)?
            .into_iter()
            .map(|s| s.option)
            .collect();

        let rules = db
            .bom_rules()
            .rules_for_selections(&self.catalog.product.id, &ordered)
            .await?;
        let overrides = db.bom_rules().overrides_for_variant(variant_id).await?;

        let bom = resolve(&BomInputs {
            base: &self.base,
            selections: &ordered,
            additions: &rules.additions,
            modifiers: &rules.modifiers,
            overrides: &overrides,
            materials: &self.materials,
        })?;

        debug!(
            variant_id = %variant_id,
            lines = bom.lines.len(),
            steps = bom.steps.len(),
            "Resolved variant BOM"
        );
        Ok(bom)
    }
}

/// Resolves variant BOMs and producibility.
#[derive(Debug, Clone)]
pub struct BomService {
    db: Database,
}

impl BomService {
    pub fn new(db: Database) -> Self {
        BomService { db }
    }

    /// Raw materials needed to build one unit of a variant.
    ///
    /// ## Errors
    /// * `Core(VariantNotFound)` - unknown variant
    /// * `Bom(..)` - inconsistent rules; the error names the material and step
    pub async fn resolve_variant(&self, variant_id: &str) -> EngineResult<ResolvedBom> {
        let variant = self.require_variant(variant_id).await?;
        let context = ProductBomContext::load(&self.db, &variant.product_id).await?;
        let selections = self.db.variants().selections(variant_id).await?;

        context.resolve(&self.db, variant_id, &selections).await
    }

    /// Units of a variant buildable from current stock.
    pub async fn producibility(&self, variant_id: &str) -> EngineResult<Producibility> {
        let bom = self.resolve_variant(variant_id).await?;
        let stock = self.db.materials().stock_snapshot().await?;
        Ok(producibility(&bom, &stock))
    }

    /// Producibility of every variant of a product, in position order.
    ///
    /// Stock is read once, so all variants are judged against the same
    /// snapshot. Units are not shared: each figure assumes the whole stock
    /// goes to that variant.
    pub async fn product_producibility(
        &self,
        product_id: &str,
    ) -> EngineResult<Vec<VariantProducibility>> {
        let context = ProductBomContext::load(&self.db, product_id).await?;
        let variants = self.db.variants().list_for_product(product_id).await?;
        let selections = self.db.variants().selections_for_product(product_id).await?;
        let stock: StockSnapshot = self.db.materials().stock_snapshot().await?;

        let mut report = Vec::with_capacity(variants.len());
        for variant in variants {
            let chosen = selections.get(&variant.id).map(Vec::as_slice).unwrap_or_default();
            let bom = context.resolve(&self.db, &variant.id, chosen).await?;

            report.push(VariantProducibility {
                producibility: producibility(&bom, &stock),
                limiting_material_id: limiting_material(&bom, &stock)
                    .map(|line| line.raw_material_id.clone()),
                variant_id: variant.id,
                sku: variant.sku,
            });
        }

        debug!(product_id = %product_id, variants = report.len(), "Computed product producibility");
        Ok(report)
    }

    async fn require_variant(&self, variant_id: &str) -> EngineResult<Variant> {
        Ok(self
            .db
            .variants()
            .get_by_id(variant_id)
            .await?
            .ok_or_else(|| CoreError::VariantNotFound(variant_id.to_string()))?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
