//! # Demo Catalog
//!
//! The leather bag used by the `seed` binary and the engine tests.
//!
//! ```text
//! Leather Bag (BAG), 120.00, 1.2 kg
//! ├── color  (position 0): Black | Brown | Tan
//! └── size   (position 1): Small | Large (+20.00, +0.3 kg)
//!
//! Base BOM:   leather 2 m, thread 3 m, brass buckle 1 pcs
//! Large:      leather × 1.4
//! Stock:      leather 10 m, thread 9 m, brass buckle 20 pcs,
//!             antique brass buckle 5 pcs
//! ```

use rust_decimal::Decimal;
use tracing::info;

use atelier_core::{
    Attribute, AttributeOption, ModifierOp, OptionRef, Product, ProductMaterial, RawMaterial,
    RuleTrigger,
};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::attribute::{NewAttribute, NewAttributeOption};
use crate::repository::bom::{NewOptionModifier, NewProductMaterial};
use crate::repository::material::NewRawMaterial;
use crate::repository::product::NewProduct;

/// IDs of everything [`seed_leather_bag`] created.
#[derive(Debug, Clone)]
pub struct DemoCatalog {
    pub product: Product,
    pub color: Attribute,
    pub size: Attribute,
    pub black: AttributeOption,
    pub brown: AttributeOption,
    pub tan: AttributeOption,
    pub small: AttributeOption,
    pub large: AttributeOption,
    pub leather: RawMaterial,
    pub thread: RawMaterial,
    pub brass_buckle: RawMaterial,
    pub antique_brass_buckle: RawMaterial,
    pub leather_base: ProductMaterial,
}

impl DemoCatalog {
    /// Selection of a color and a size option.
    pub fn selection(&self, color: &AttributeOption, size: &AttributeOption) -> [OptionRef; 2] {
        [OptionRef::custom(&color.id), OptionRef::custom(&size.id)]
    }
}

/// Creates the leather bag catalog, its materials and BOM rules.
///
/// Variants are not generated; call the generator afterwards.
pub async fn seed_leather_bag(db: &Database) -> DbResult<DemoCatalog> {
    let product = db
        .products()
        .create(&NewProduct {
            name: "Leather Bag".to_string(),
            sku_prefix: "BAG".to_string(),
            base_price_cents: 12_000,
            base_weight: Decimal::new(12, 1),
        })
        .await?;

    let attributes = db.attributes();
    let color = attributes
        .create(&NewAttribute {
            product_id: product.id.clone(),
            name: "color".to_string(),
            display_name: "Color".to_string(),
            position: 0,
        })
        .await?;
    let size = attributes
        .create(&NewAttribute {
            product_id: product.id.clone(),
            name: "size".to_string(),
            display_name: "Size".to_string(),
            position: 1,
        })
        .await?;

    let option = |attribute: &Attribute, display: &str, position: i64, price: i64, weight: Decimal| {
        NewAttributeOption {
            attribute_id: attribute.id.clone(),
            value: display.to_lowercase(),
            display_value: display.to_string(),
            price_modifier_cents: price,
            weight_modifier: weight,
            position,
        }
    };

    let black = attributes.add_option(&option(&color, "Black", 0, 0, Decimal::ZERO)).await?;
    let brown = attributes.add_option(&option(&color, "Brown", 1, 0, Decimal::ZERO)).await?;
    let tan = attributes.add_option(&option(&color, "Tan", 2, 500, Decimal::ZERO)).await?;
    let small = attributes.add_option(&option(&size, "Small", 0, 0, Decimal::ZERO)).await?;
    let large = attributes
        .add_option(&option(&size, "Large", 1, 2_000, Decimal::new(3, 1)))
        .await?;

    let materials = db.materials();
    let material = |name: &str, unit: &str, stock: i64| NewRawMaterial {
        name: name.to_string(),
        unit: unit.to_string(),
        stock_quantity: Decimal::from(stock),
    };
    let leather = materials.create(&material("Leather", "m", 10)).await?;
    let thread = materials.create(&material("Thread", "m", 9)).await?;
    let brass_buckle = materials.create(&material("Brass Buckle", "pcs", 20)).await?;
    let antique_brass_buckle = materials
        .create(&material("Antique Brass Buckle", "pcs", 5))
        .await?;

    let rules = db.bom_rules();
    let base = |material: &RawMaterial, quantity: i64| NewProductMaterial {
        product_id: product.id.clone(),
        raw_material_id: material.id.clone(),
        quantity: Decimal::from(quantity),
        is_required: true,
    };
    let leather_base = rules.add_base(&base(&leather, 2)).await?;
    rules.add_base(&base(&thread, 3)).await?;
    rules.add_base(&base(&brass_buckle, 1)).await?;

    rules
        .add_option_modifier(&NewOptionModifier {
            trigger: RuleTrigger::Custom {
                option_id: large.id.clone(),
            },
            product_material_id: leather_base.id.clone(),
            op: ModifierOp::Multiply,
            value: Decimal::new(14, 1),
            position: 0,
        })
        .await?;

    info!(product_id = %product.id, "Seeded leather bag catalog");

    Ok(DemoCatalog {
        product,
        color,
        size,
        black,
        brown,
        tan,
        small,
        large,
        leather,
        thread,
        brass_buckle,
        antique_brass_buckle,
        leather_base,
    })
}
