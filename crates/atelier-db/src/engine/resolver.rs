//! # Attribute Resolver
//!
//! Loads a product's catalog definition and turns it into axes.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ProductCatalog::load(product_id)                                       │
//! │       │   attributes + options                                          │
//! │       │   links + templates + template options + link selections        │
//! │       ▼                                                                 │
//! │  atelier_core::axis::build_axes  ─► Vec<Axis>  (axis position order)    │
//! │                                                                         │
//! │  ProductCatalog::selected_options(variant selections)                   │
//! │       └─► Vec<SelectedOption>  (rank + modifiers, activation ignored)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Activation flags only shape the axes used for generation. An existing
//! variant keeps pricing and resolving its BOM through options that were
//! deactivated after it was created.

use std::collections::HashMap;
use tracing::debug;

use atelier_core::axis::{build_axes, order_selections, CustomAxisInput, LinkAxisInput};
use atelier_core::pricing::{custom_option_modifiers, global_option_modifiers};
use atelier_core::error::CoreResult;
use atelier_core::{
    Attribute, AttributeOption, Axis, AxisRank, CoreError, GlobalAttribute,
    GlobalAttributeLink, GlobalOption, LinkOptionSelection, OptionRef, Product, SelectedOption,
};

use crate::error::{DbError, DbResult, EngineResult};
use crate::pool::Database;

// =============================================================================
// Product Catalog Snapshot
// =============================================================================

/// Everything that defines a product's axes, read once.
#[derive(Debug, Clone)]
pub(crate) struct ProductCatalog {
    pub product: Product,
    attributes: Vec<Attribute>,
    attribute_options: Vec<AttributeOption>,
    links: Vec<GlobalAttributeLink>,
    templates: HashMap<String, GlobalAttribute>,
    template_options: HashMap<String, Vec<GlobalOption>>,
    link_selections: HashMap<String, Vec<LinkOptionSelection>>,
}

impl ProductCatalog {
    /// Reads the product and its attribute definitions.
    ///
    /// A template linked under several roles is read once.
    pub async fn load(db: &Database, product_id: &str) -> EngineResult<Self> {
        let product = db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let attributes = db.attributes().list_for_product(product_id).await?;
        let attribute_options = db.attributes().options_for_product(product_id).await?;

        let templates_repo = db.templates();
        let links = templates_repo.links_for_product(product_id).await?;

        let mut templates = HashMap::new();
        let mut template_options = HashMap::new();
        let mut link_selections = HashMap::new();
        for link in &links {
            if !templates.contains_key(&link.global_attribute_id) {
                let template = templates_repo.require(&link.global_attribute_id).await?;
                let options = templates_repo.options(&template.id).await?;
                template_options.insert(template.id.clone(), options);
                templates.insert(template.id.clone(), template);
            }
            let selections = templates_repo.selections(&link.id).await?;
            link_selections.insert(link.id.clone(), selections);
        }

        debug!(
            product_id = %product_id,
            attributes = attributes.len(),
            links = links.len(),
            templates = templates.len(),
            "Loaded product catalog"
        );

        Ok(ProductCatalog {
            product,
            attributes,
            attribute_options,
            links,
            templates,
            template_options,
            link_selections,
        })
    }

    /// The product's axes in axis position order.
    pub fn axes(&self) -> CoreResult<Vec<Axis>> {
        let custom = self
            .attributes
            .iter()
            .map(|attribute| CustomAxisInput {
                attribute: attribute.clone(),
                options: self
                    .attribute_options
                    .iter()
                    .filter(|o| o.attribute_id == attribute.id)
                    .cloned()
                    .collect(),
            })
            .collect();

        let links = self
            .links
            .iter()
            .filter_map(|link| {
                let template = self.templates.get(&link.global_attribute_id)?;
                Some(LinkAxisInput {
                    link: link.clone(),
                    template: template.clone(),
                    options: self
                        .template_options
                        .get(&template.id)
                        .cloned()
                        .unwrap_or_default(),
                    selections: self
                        .link_selections
                        .get(&link.id)
                        .cloned()
                        .unwrap_or_default(),
                })
            })
            .collect();

        build_axes(&self.product.id, custom, links)
    }

    /// Describes a variant's stored selections in axis position order.
    pub fn selected_options(&self, selections: &[OptionRef]) -> DbResult<Vec<SelectedOption>> {
        let mut selected = selections
            .iter()
            .map(|option| self.describe(option))
            .collect::<DbResult<Vec<_>>>()?;
        order_selections(&mut selected);
        Ok(selected)
    }

    fn describe(&self, option: &OptionRef) -> DbResult<SelectedOption> {
        match option {
            OptionRef::Custom { option_id } => {
                let attr_option = self
                    .attribute_options
                    .iter()
                    .find(|o| &o.id == option_id)
                    .ok_or_else(|| DbError::not_found("AttributeOption", option_id))?;
                let attribute = self
                    .attributes
                    .iter()
                    .find(|a| a.id == attr_option.attribute_id)
                    .ok_or_else(|| DbError::not_found("Attribute", &attr_option.attribute_id))?;

                Ok(SelectedOption {
                    option: option.clone(),
                    rank: AxisRank::custom(attribute.position, &attribute.id),
                    display_value: attr_option.display_value.clone(),
                    modifiers: custom_option_modifiers(attr_option),
                })
            }
            OptionRef::Global { link_id, option_id } => {
                let link = self
                    .links
                    .iter()
                    .find(|l| &l.id == link_id)
                    .ok_or_else(|| DbError::not_found("GlobalAttributeLink", link_id))?;
                let template = self
                    .templates
                    .get(&link.global_attribute_id)
                    .ok_or_else(|| DbError::not_found("GlobalAttribute", &link.global_attribute_id))?;
                let global_option = self
                    .template_options
                    .get(&template.id)
                    .and_then(|options| options.iter().find(|o| &o.id == option_id))
                    .ok_or_else(|| DbError::not_found("GlobalOption", option_id))?;
                let selection = self
                    .link_selections
                    .get(link_id)
                    .and_then(|s| s.iter().find(|s| &s.global_option_id == option_id));

                Ok(SelectedOption {
                    option: option.clone(),
                    rank: AxisRank::link(link.position, &link.id),
                    display_value: global_option.display_value.clone(),
                    modifiers: global_option_modifiers(link, template, global_option, selection),
                })
            }
        }
    }
}

// =============================================================================
// Attribute Resolver
// =============================================================================

/// Resolves the effective axes of a product.
#[derive(Debug, Clone)]
pub struct AttributeResolver {
    db: Database,
}

impl AttributeResolver {
    pub fn new(db: Database) -> Self {
        AttributeResolver { db }
    }

    /// Axes of a product in axis position order, active options only.
    ///
    /// ## Errors
    /// * `Core(ProductNotFound)` - unknown product
    /// * `Core(NoAttributes)` - no axis has an active option
    pub async fn resolve(&self, product_id: &str) -> EngineResult<Vec<Axis>> {
        let catalog = ProductCatalog::load(&self.db, product_id).await?;
        let axes = catalog.axes()?;

        debug!(
            product_id = %product_id,
            axes = axes.len(),
            "Resolved attribute axes"
        );
        Ok(axes)
    }

    /// A variant's selections in axis position order, with their modifiers.
    pub async fn selected_options(&self, variant_id: &str) -> EngineResult<Vec<SelectedOption>> {
        let variant = self
            .db
            .variants()
            .get_by_id(variant_id)
            .await?
            .ok_or_else(|| CoreError::VariantNotFound(variant_id.to_string()))?;
        let catalog = ProductCatalog::load(&self.db, &variant.product_id).await?;
        let selections = self.db.variants().selections(variant_id).await?;

        Ok(catalog.selected_options(&selections)?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::seed_leather_bag;
    use crate::error::EngineError;
    use crate::pool::DbConfig;
    use crate::repository::product::NewProduct;
    use crate::repository::template::{NewGlobalAttribute, NewGlobalOption, NewLink};
    use atelier_core::{AxisSource, LinkOptionSelection, OptionMetadata};

    #[tokio::test]
    async fn test_custom_axes_in_position_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bag = seed_leather_bag(&db).await.unwrap();

        let axes = db.resolver().resolve(&bag.product.id).await.unwrap();
        let names: Vec<_> = axes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["color", "size"]);
        assert_eq!(axes[0].options.len(), 3);
        assert_eq!(axes[1].options[1].display_value, "Large");
    }

    #[tokio::test]
    async fn test_deactivated_option_leaves_axis() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bag = seed_leather_bag(&db).await.unwrap();

        db.attributes()
            .set_option_active(&bag.tan.id, false)
            .await
            .unwrap();

        let axes = db.resolver().resolve(&bag.product.id).await.unwrap();
        let colors: Vec<_> = axes[0].options.iter().map(|o| o.display_value.as_str()).collect();
        assert_eq!(colors, vec!["Black", "Brown"]);
    }

    #[tokio::test]
    async fn test_no_attributes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Plain Wallet".to_string(),
                sku_prefix: "WAL".to_string(),
                ..NewProduct::default()
            })
            .await
            .unwrap();

        let err = db.resolver().resolve(&product.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::NoAttributes { .. })));

        let err = db.resolver().resolve("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_link_without_selection_uses_all_active_options() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Tote".to_string(),
                sku_prefix: "TOT".to_string(),
                ..NewProduct::default()
            })
            .await
            .unwrap();
        let templates = db.templates();
        let color = templates
            .create(&NewGlobalAttribute {
                name: "color".to_string(),
                display_name: "Color".to_string(),
                schema: Vec::new(),
            })
            .await
            .unwrap();
        let mut option_ids = Vec::new();
        for (position, value) in ["Black", "Navy", "Olive"].iter().enumerate() {
            let option = templates
                .add_option(&NewGlobalOption {
                    global_attribute_id: color.id.clone(),
                    value: value.to_lowercase(),
                    display_value: value.to_string(),
                    metadata: OptionMetadata::new(),
                    position: position as i64,
                })
                .await
                .unwrap();
            option_ids.push(option.id);
        }

        let base = templates
            .link(&NewLink {
                product_id: product.id.clone(),
                global_attribute_id: color.id.clone(),
                role_name: "base_color".to_string(),
                role_display_name: "Base Color".to_string(),
                position: 0,
                ..NewLink::default()
            })
            .await
            .unwrap();
        let interior = templates
            .link(&NewLink {
                product_id: product.id.clone(),
                global_attribute_id: color.id.clone(),
                role_name: "interior_color".to_string(),
                role_display_name: "Interior Color".to_string(),
                position: 1,
                ..NewLink::default()
            })
            .await
            .unwrap();
        templates
            .select_option(&LinkOptionSelection {
                link_id: base.id.clone(),
                global_option_id: option_ids[2].clone(),
                price_modifier_override_cents: None,
                weight_modifier_override: None,
                position: 0,
            })
            .await
            .unwrap();
        templates.set_option_active(&option_ids[1], false).await.unwrap();

        let axes = db.resolver().resolve(&product.id).await.unwrap();
        assert_eq!(axes.len(), 2);
        assert!(matches!(&axes[0].source, AxisSource::Link { link_id, .. } if *link_id == base.id));
        assert_eq!(axes[0].options.len(), 1);
        assert_eq!(axes[0].options[0].display_value, "Olive");

        let interior_values: Vec<_> = axes[1]
            .options
            .iter()
            .map(|o| o.display_value.as_str())
            .collect();
        assert_eq!(interior_values, vec!["Black", "Olive"]);
        assert_eq!(
            axes[1].options[0].option,
            OptionRef::global(&interior.id, &option_ids[0])
        );
    }
}
