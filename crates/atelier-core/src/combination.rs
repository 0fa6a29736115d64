//! # Variant Combinations
//!
//! Cartesian product of axis options, canonical combination keys, SKU
//! synthesis and the diff against existing variants.
//!
//! ## Generation Plan
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  axes: Size[Small, Large] × Color[Black, Brown]                         │
//! │       │                                                                 │
//! │       ▼ cartesian()                                                     │
//! │  [Small,Black] [Small,Brown] [Large,Black] [Large,Brown]   (∏ kᵢ = 4)  │
//! │       │                                                                 │
//! │       ▼ combination_key()  (sorted tokens, order-independent)           │
//! │  "c:black|c:small"  ...                                                 │
//! │       │                                                                 │
//! │       ├── key already exists? → skip, existing variant untouched        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PlannedVariant { sku: "BAG-SMA-BLA", position: max + 1, ... }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::axis::{Axis, AxisOption};
use crate::types::OptionRef;
use crate::{DEFAULT_SKU_ABBREVIATION_LEN, DEFAULT_SKU_SEPARATOR};

/// Separator between tokens of a canonical combination key.
pub const KEY_SEPARATOR: char = '|';

// =============================================================================
// Cartesian Product
// =============================================================================

/// Cartesian product of the given option lists.
///
/// Produces exactly ∏ kᵢ combinations, each holding one element per list in
/// list order. An empty list anywhere yields zero combinations; callers drop
/// empty axes before combining (see [`crate::axis::build_axes`]).
pub fn cartesian<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut combo = prefix.clone();
                    combo.push(item.clone());
                    combo
                })
            })
            .collect()
    })
}

/// Number of combinations the given axes produce.
pub fn combination_count(axes: &[Axis]) -> usize {
    axes.iter()
        .map(|a| a.options.len())
        .fold(1usize, |acc, k| acc.saturating_mul(k))
}

// =============================================================================
// Canonical Combination Key
// =============================================================================

/// Canonical, order-independent key of a set of selected options.
///
/// ## Example
/// ```rust
/// use atelier_core::combination::combination_key;
/// use atelier_core::OptionRef;
///
/// let a = [OptionRef::custom("large"), OptionRef::custom("black")];
/// let b = [OptionRef::custom("black"), OptionRef::custom("large")];
/// assert_eq!(combination_key(&a), combination_key(&b));
/// ```
pub fn combination_key<'a>(options: impl IntoIterator<Item = &'a OptionRef>) -> String {
    let mut tokens: Vec<String> = options.into_iter().map(OptionRef::token).collect();
    tokens.sort();
    tokens.join(&KEY_SEPARATOR.to_string())
}

// =============================================================================
// SKU Synthesis
// =============================================================================

/// How generated SKUs are assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuFormat {
    /// Joins the prefix and each abbreviation.
    pub separator: String,
    /// Characters taken from each option's display value.
    pub abbreviation_len: usize,
}

impl Default for SkuFormat {
    fn default() -> Self {
        SkuFormat {
            separator: DEFAULT_SKU_SEPARATOR.to_string(),
            abbreviation_len: DEFAULT_SKU_ABBREVIATION_LEN,
        }
    }
}

impl SkuFormat {
    /// Abbreviates a display value: first `abbreviation_len` characters,
    /// upper-cased. Whitespace is skipped so "Dark Brown" becomes "DAR".
    pub fn abbreviate(&self, display_value: &str) -> String {
        display_value
            .chars()
            .filter(|c| !c.is_whitespace())
            .take(self.abbreviation_len)
            .flat_map(char::to_uppercase)
            .collect()
    }

    /// Builds a SKU from a prefix and the options in axis position order.
    ///
    /// ## Example
    /// ```rust
    /// use atelier_core::combination::SkuFormat;
    ///
    /// let sku = SkuFormat::default().build("BAG", ["Black", "Large"]);
    /// assert_eq!(sku, "BAG-BLA-LAR");
    /// ```
    pub fn build<'a>(&self, prefix: &str, display_values: impl IntoIterator<Item = &'a str>) -> String {
        let prefix = prefix.trim();
        let parts = display_values
            .into_iter()
            .map(|v| self.abbreviate(v))
            .filter(|a| !a.is_empty());

        if prefix.is_empty() {
            parts.collect::<Vec<_>>().join(&self.separator)
        } else {
            std::iter::once(prefix.to_string())
                .chain(parts)
                .collect::<Vec<_>>()
                .join(&self.separator)
        }
    }
}

// =============================================================================
// Generation Plan
// =============================================================================

/// A variant the generator is about to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlannedVariant {
    pub sku: String,
    pub combination_key: String,
    pub position: i64,
    /// One option per axis, in axis position order.
    pub options: Vec<AxisOption>,
}

/// Result of diffing the generated combinations against existing variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GenerationPlan {
    pub planned: Vec<PlannedVariant>,
    /// ∏ kᵢ over the resolved axes.
    pub total_combinations: usize,
    /// Combinations whose key already belongs to a variant.
    pub skipped_existing: usize,
}

/// What the generator knows about the product's existing variants.
#[derive(Debug, Clone, Default)]
pub struct ExistingVariants {
    pub keys: HashSet<String>,
    pub skus: HashSet<String>,
    pub max_position: Option<i64>,
}

/// Plans the creation of every missing combination.
///
/// Existing keys are skipped. Positions continue after the highest existing
/// position. A SKU that collides with an existing or already planned SKU gets
/// a numeric suffix (`BAG-BLA-LAR-2`).
pub fn plan_generation(
    axes: &[Axis],
    existing: &ExistingVariants,
    sku_prefix: &str,
    format: &SkuFormat,
) -> GenerationPlan {
    let option_lists: Vec<Vec<AxisOption>> = axes.iter().map(|a| a.options.clone()).collect();
    let combinations = cartesian(&option_lists);

    let mut plan = GenerationPlan {
        total_combinations: combinations.len(),
        ..GenerationPlan::default()
    };
    let mut taken_skus = existing.skus.clone();
    let mut seen_keys = existing.keys.clone();
    let mut next_position = existing.max_position.map_or(0, |p| p + 1);

    for options in combinations {
        let key = combination_key(options.iter().map(|o| &o.option));
        if !seen_keys.insert(key.clone()) {
            plan.skipped_existing += 1;
            continue;
        }

        let base_sku = format.build(sku_prefix, options.iter().map(|o| o.display_value.as_str()));
        let sku = unique_sku(&base_sku, &format.separator, &taken_skus);
        taken_skus.insert(sku.clone());

        plan.planned.push(PlannedVariant {
            sku,
            combination_key: key,
            position: next_position,
            options,
        });
        next_position += 1;
    }

    plan
}

fn unique_sku(base: &str, separator: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }

    (2..)
        .map(|n| format!("{}{}{}", base, separator, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisRank, AxisSource};
    use crate::pricing::Modifiers;

    fn axis(name: &str, position: i64, values: &[&str]) -> Axis {
        Axis {
            rank: AxisRank::custom(position, name),
            source: AxisSource::Custom {
                attribute_id: name.to_string(),
            },
            name: name.to_string(),
            display_name: name.to_string(),
            options: values
                .iter()
                .map(|v| AxisOption {
                    option: OptionRef::custom(v.to_lowercase()),
                    value: v.to_lowercase(),
                    display_value: v.to_string(),
                    modifiers: Modifiers::default(),
                })
                .collect(),
        }
    }

    fn role_axis(link_id: &str, position: i64, count: usize) -> Axis {
        Axis {
            rank: AxisRank::link(position, link_id),
            source: AxisSource::Link {
                link_id: link_id.to_string(),
                global_attribute_id: "color".to_string(),
                role_name: link_id.to_string(),
            },
            name: link_id.to_string(),
            display_name: link_id.to_string(),
            options: (0..count)
                .map(|i| AxisOption {
                    option: OptionRef::global(link_id, format!("color-{}", i)),
                    value: format!("color-{}", i),
                    display_value: format!("Color {}", i),
                    modifiers: Modifiers::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_cartesian_cardinality() {
        let lists = vec![vec![1, 2], vec![10, 20, 30], vec![100, 200]];
        let combos = cartesian(&lists);
        assert_eq!(combos.len(), 12);
        assert_eq!(combos[0], vec![1, 10, 100]);
        assert_eq!(combos[11], vec![2, 30, 200]);
    }

    #[test]
    fn test_cartesian_with_empty_list_is_empty() {
        let lists: Vec<Vec<i32>> = vec![vec![1, 2], vec![]];
        assert!(cartesian(&lists).is_empty());
    }

    #[test]
    fn test_combination_key_is_order_independent() {
        let a = [OptionRef::custom("x"), OptionRef::global("l", "y")];
        let b = [OptionRef::global("l", "y"), OptionRef::custom("x")];
        assert_eq!(combination_key(&a), combination_key(&b));
        assert_eq!(combination_key(&a), "c:x|g:l:y");
    }

    #[test]
    fn test_shared_option_under_two_roles_keys_differently() {
        let a = [OptionRef::global("base", "black"), OptionRef::global("interior", "red")];
        let b = [OptionRef::global("base", "red"), OptionRef::global("interior", "black")];
        assert_ne!(combination_key(&a), combination_key(&b));
    }

    #[test]
    fn test_sku_determinism() {
        let format = SkuFormat::default();
        assert_eq!(format.build("BAG", ["Black", "Large"]), "BAG-BLA-LAR");
        assert_eq!(format.build("BAG", ["Dark Brown", "XL"]), "BAG-DAR-XL");
        assert_eq!(format.build("", ["Black", "Large"]), "BLA-LAR");
    }

    #[test]
    fn test_abbreviation_skips_whitespace_and_blank_values() {
        let format = SkuFormat::default();
        assert_eq!(format.abbreviate("A Bag"), "ABA");
        assert_eq!(format.build("BAG", ["Black", "  ", "Large"]), "BAG-BLA-LAR");
    }

    #[test]
    fn test_abbreviation_counts_characters_not_bytes() {
        let format = SkuFormat::default();
        assert_eq!(format.abbreviate("écru"), "ÉCR");
    }

    #[test]
    fn test_plan_uses_axis_order_for_sku() {
        let axes = vec![axis("color", 0, &["Black"]), axis("size", 1, &["Large"])];
        let plan = plan_generation(&axes, &ExistingVariants::default(), "BAG", &SkuFormat::default());
        assert_eq!(plan.planned.len(), 1);
        assert_eq!(plan.planned[0].sku, "BAG-BLA-LAR");
        assert_eq!(plan.planned[0].position, 0);
    }

    #[test]
    fn test_plan_skips_existing_and_continues_positions() {
        let axes = vec![
            axis("color", 0, &["Black", "Brown"]),
            axis("size", 1, &["Small", "Large"]),
        ];
        let mut existing = ExistingVariants::default();
        existing.keys.insert(combination_key(&[
            OptionRef::custom("black"),
            OptionRef::custom("large"),
        ]));
        existing.skus.insert("BAG-BLA-LAR".to_string());
        existing.max_position = Some(7);

        let plan = plan_generation(&axes, &existing, "BAG", &SkuFormat::default());
        assert_eq!(plan.total_combinations, 4);
        assert_eq!(plan.skipped_existing, 1);
        assert_eq!(plan.planned.len(), 3);
        let positions: Vec<_> = plan.planned.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![8, 9, 10]);
        assert!(plan.planned.iter().all(|p| p.sku != "BAG-BLA-LAR"));
    }

    #[test]
    fn test_plan_is_idempotent_against_its_own_output() {
        let axes = vec![axis("color", 0, &["Black", "Brown"]), axis("size", 1, &["Large"])];
        let first = plan_generation(&axes, &ExistingVariants::default(), "BAG", &SkuFormat::default());

        let existing = ExistingVariants {
            keys: first.planned.iter().map(|p| p.combination_key.clone()).collect(),
            skus: first.planned.iter().map(|p| p.sku.clone()).collect(),
            max_position: first.planned.iter().map(|p| p.position).max(),
        };
        let second = plan_generation(&axes, &existing, "BAG", &SkuFormat::default());
        assert!(second.planned.is_empty());
        assert_eq!(second.skipped_existing, 2);
    }

    #[test]
    fn test_colliding_abbreviations_get_suffixes() {
        let axes = vec![axis("color", 0, &["Black", "Blackberry"])];
        let plan = plan_generation(&axes, &ExistingVariants::default(), "BAG", &SkuFormat::default());
        let skus: Vec<_> = plan.planned.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(skus, vec!["BAG-BLA", "BAG-BLA-2"]);
    }

    #[test]
    fn test_shared_template_twice_multiplies() {
        let axes = vec![role_axis("base", 0, 3), role_axis("interior", 1, 7)];
        assert_eq!(combination_count(&axes), 21);

        let plan = plan_generation(&axes, &ExistingVariants::default(), "BAG", &SkuFormat::default());
        assert_eq!(plan.planned.len(), 21);
        let keys: HashSet<_> = plan.planned.iter().map(|p| p.combination_key.clone()).collect();
        assert_eq!(keys.len(), 21);
    }
}
