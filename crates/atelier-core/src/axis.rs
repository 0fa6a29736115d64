//! # Attribute Axes
//!
//! Turns a product's attribute definitions into the ordered list of axes that
//! define its variants.
//!
//! ## Axis Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     build_axes(custom, links)                           │
//! │                                                                         │
//! │  1. Product-specific attributes, by attribute.position                 │
//! │  2. Global links,                by link.position                      │
//! │       (this is the AXIS POSITION ORDER used for SKUs, BOM, pricing)    │
//! │                                                                         │
//! │  Per axis:                                                              │
//! │    inactive attribute / link / template  → no axis                     │
//! │    link with no selections               → all ACTIVE template options │
//! │    link with selections                  → selected ∩ active           │
//! │    product-specific                      → active options              │
//! │                                                                         │
//! │  Axis with zero options → DROPPED (does not zero the whole product)    │
//! │  Zero axes left         → CoreError::NoAttributes                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The "all options when nothing is selected" rule is evaluated here, at read
//! time, and never stored.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::pricing::{custom_option_modifiers, global_option_modifiers, Modifiers};
use crate::types::{
    Attribute, AttributeOption, GlobalAttribute, GlobalAttributeLink, GlobalOption,
    LinkOptionSelection, OptionRef,
};

// =============================================================================
// Axis Ordering
// =============================================================================

/// Position of an axis in axis position order.
///
/// Product-specific axes sort before link axes; ties on position are broken
/// by ID so the order is total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxisRank {
    Custom { position: i64, attribute_id: String },
    Link { position: i64, link_id: String },
}

impl AxisRank {
    pub fn custom(position: i64, attribute_id: impl Into<String>) -> Self {
        AxisRank::Custom {
            position,
            attribute_id: attribute_id.into(),
        }
    }

    pub fn link(position: i64, link_id: impl Into<String>) -> Self {
        AxisRank::Link {
            position,
            link_id: link_id.into(),
        }
    }
}

// =============================================================================
// Axis
// =============================================================================

/// Where an axis comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxisSource {
    Custom {
        attribute_id: String,
    },
    Link {
        link_id: String,
        global_attribute_id: String,
        role_name: String,
    },
}

/// An active option on an axis, with its resolved modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AxisOption {
    pub option: OptionRef,
    pub value: String,
    pub display_value: String,
    pub modifiers: Modifiers,
}

/// One dimension of variation with its ordered, active-only options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Axis {
    pub rank: AxisRank,
    pub source: AxisSource,
    pub name: String,
    pub display_name: String,
    pub options: Vec<AxisOption>,
}

/// An option selected by an existing variant, tagged with its axis rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SelectedOption {
    pub option: OptionRef,
    pub rank: AxisRank,
    pub display_value: String,
    pub modifiers: Modifiers,
}

/// Sorts a variant's selections into axis position order.
pub fn order_selections(selections: &mut [SelectedOption]) {
    selections.sort_by(|a, b| match a.rank.cmp(&b.rank) {
        Ordering::Equal => a.option.cmp(&b.option),
        other => other,
    });
}

// =============================================================================
// Axis Construction
// =============================================================================

/// A product-specific attribute with all of its options (active or not).
#[derive(Debug, Clone)]
pub struct CustomAxisInput {
    pub attribute: Attribute,
    pub options: Vec<AttributeOption>,
}

/// A link with its template, the template's options and the link's selections.
#[derive(Debug, Clone)]
pub struct LinkAxisInput {
    pub link: GlobalAttributeLink,
    pub template: GlobalAttribute,
    pub options: Vec<GlobalOption>,
    pub selections: Vec<LinkOptionSelection>,
}

/// Builds the ordered axis list of a product.
///
/// ## Errors
/// `CoreError::NoAttributes` when no axis has any active option.
pub fn build_axes(
    product_id: &str,
    custom: Vec<CustomAxisInput>,
    links: Vec<LinkAxisInput>,
) -> CoreResult<Vec<Axis>> {
    let mut axes: Vec<Axis> = custom
        .into_iter()
        .filter_map(custom_axis)
        .chain(links.into_iter().filter_map(link_axis))
        .filter(|axis| !axis.options.is_empty())
        .collect();

    axes.sort_by(|a, b| a.rank.cmp(&b.rank));

    if axes.is_empty() {
        return Err(CoreError::NoAttributes {
            product_id: product_id.to_string(),
        });
    }

    Ok(axes)
}

fn custom_axis(input: CustomAxisInput) -> Option<Axis> {
    let CustomAxisInput {
        attribute,
        mut options,
    } = input;

    if !attribute.is_active {
        return None;
    }

    options.retain(|o| o.is_active && o.attribute_id == attribute.id);
    options.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

    let options = options
        .iter()
        .map(|o| AxisOption {
            option: OptionRef::custom(&o.id),
            value: o.value.clone(),
            display_value: o.display_value.clone(),
            modifiers: custom_option_modifiers(o),
        })
        .collect();

    Some(Axis {
        rank: AxisRank::custom(attribute.position, &attribute.id),
        source: AxisSource::Custom {
            attribute_id: attribute.id,
        },
        name: attribute.name,
        display_name: attribute.display_name,
        options,
    })
}

fn link_axis(input: LinkAxisInput) -> Option<Axis> {
    let LinkAxisInput {
        link,
        template,
        mut options,
        mut selections,
    } = input;

    if !link.is_active || !template.is_active {
        return None;
    }

    options.retain(|o| o.is_active && o.global_attribute_id == template.id);
    options.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

    let to_axis_option = |option: &GlobalOption, selection: Option<&LinkOptionSelection>| {
        AxisOption {
            option: OptionRef::global(&link.id, &option.id),
            value: option.value.clone(),
            display_value: option.display_value.clone(),
            modifiers: global_option_modifiers(&link, &template, option, selection),
        }
    };

    let axis_options: Vec<AxisOption> = if selections.is_empty() {
        options.iter().map(|o| to_axis_option(o, None)).collect()
    } else {
        selections.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.global_option_id.cmp(&b.global_option_id))
        });
        selections
            .iter()
            .filter(|s| s.link_id == link.id)
            .filter_map(|s| {
                options
                    .iter()
                    .find(|o| o.id == s.global_option_id)
                    .map(|o| to_axis_option(o, Some(s)))
            })
            .collect()
    };

    Some(Axis {
        rank: AxisRank::link(link.position, &link.id),
        source: AxisSource::Link {
            link_id: link.id.clone(),
            global_attribute_id: template.id.clone(),
            role_name: link.role_name.clone(),
        },
        name: link.role_name.clone(),
        display_name: link.role_display_name.clone(),
        options: axis_options,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
