//! # BOM Resolution
//!
//! Computes the exact raw-material list needed to build one unit of a variant.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1   ProductMaterial     seed M from the product base             │
//! │     │                                                                   │
//! │     ▼   for each selected option, in axis position order:               │
//! │  Layer 2a  OptionMaterial      M[m] += q            (insert if absent)  │
//! │  Layer 2b  OptionModifier      M[m] *= v | += v | = v                   │
//! │     │                                                                   │
//! │     ▼   in definition order:                                            │
//! │  Layer 3   VariantOverride     replace | add | remove | set_quantity    │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  drop quantity == 0  →  ResolvedBom                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution happens in two phases. [`plan`] checks every reference and turns
//! the rules into a flat list of [`BomStep`]s; [`apply`] folds those steps left
//! to right over an empty map. Later steps always see the result of earlier
//! ones, so a multiplier on a later axis scales what an earlier axis added.
//!
//! ## Example
//! ```text
//! base:      leather 2 m
//! Large:     leather × 1.4       → 2.8 m
//! Gold:      + gold zipper 1 pcs
//! override:  replace black thread → red thread
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use ts_rs::TS;

use crate::error::{BomError, BomResult};
use crate::types::{
    ModifierOp, OptionMaterial, OptionModifier, OptionRef, OverrideType, ProductMaterial,
    RawMaterial, VariantOverride,
};

// =============================================================================
// Steps
// =============================================================================

/// Which layer produced a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BomLayer {
    Base,
    OptionAddition,
    OptionModifier,
    VariantOverride,
}

impl fmt::Display for BomLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BomLayer::Base => "base material",
            BomLayer::OptionAddition => "option addition",
            BomLayer::OptionModifier => "option modifier",
            BomLayer::VariantOverride => "variant override",
        };
        f.write_str(name)
    }
}

/// The rule a step came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StepSource {
    pub layer: BomLayer,
    /// ID of the ProductMaterial, OptionMaterial, OptionModifier or VariantOverride.
    pub rule_id: String,
    /// The selection that triggered a Layer-2 rule.
    pub option: Option<OptionRef>,
}

impl fmt::Display for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.option {
            Some(option) => write!(f, "{} {} (option {})", self.layer, self.rule_id, option),
            None => write!(f, "{} {}", self.layer, self.rule_id),
        }
    }
}

/// Operation a step performs on the material map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BomOp {
    /// Layer 1 seed: `M[m] += quantity`, marking the entry required or optional.
    Seed {
        #[ts(as = "String")]
        quantity: Decimal,
        required: bool,
    },
    /// `M[m] += quantity`, inserting a required entry if absent.
    Increment {
        #[ts(as = "String")]
        quantity: Decimal,
    },
    /// `M[m] *= factor`
    Scale {
        #[ts(as = "String")]
        factor: Decimal,
    },
    /// `M[m] += delta` on an existing base entry.
    Offset {
        #[ts(as = "String")]
        delta: Decimal,
    },
    /// `M[m] = quantity`
    Assign {
        #[ts(as = "String")]
        quantity: Decimal,
    },
    /// Delete `M[m]`, then `M[to] = quantity` (or the removed quantity).
    Replace {
        to: String,
        #[ts(as = "Option<String>")]
        quantity: Option<Decimal>,
    },
    /// Delete `M[m]`.
    Remove,
}

/// One typed step of a resolution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BomStep {
    pub source: StepSource,
    pub raw_material_id: String,
    pub op: BomOp,
}

/// A step as applied, with the quantity of the material it touched afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppliedStep {
    pub step: BomStep,
    /// Material whose quantity changed (the destination of a replace).
    pub touched_material_id: String,
    #[ts(as = "String")]
    pub quantity_after: Decimal,
}

// =============================================================================
// Inputs & Output
// =============================================================================

/// Everything BOM resolution reads for one variant.
#[derive(Debug, Clone, Copy)]
pub struct BomInputs<'a> {
    /// Layer 1 entries of the product.
    pub base: &'a [ProductMaterial],
    /// The variant's selections in axis position order.
    pub selections: &'a [OptionRef],
    /// Layer 2a rules; only those triggered by a selection apply.
    pub additions: &'a [OptionMaterial],
    /// Layer 2b rules; only those triggered by a selection apply.
    pub modifiers: &'a [OptionModifier],
    /// Layer 3 rules of the variant.
    pub overrides: &'a [VariantOverride],
    /// Raw materials by ID.
    pub materials: &'a HashMap<String, RawMaterial>,
}

/// One line of a resolved BOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BomLine {
    pub raw_material_id: String,
    pub material_name: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub unit: String,
    /// Optional lines never gate producibility.
    pub required: bool,
}

/// Material list for one unit of a variant, plus the trace that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolvedBom {
    /// Lines with non-zero quantity, ordered by material ID.
    pub lines: Vec<BomLine>,
    pub steps: Vec<AppliedStep>,
}

impl ResolvedBom {
    /// Returns the line for a material, if present.
    pub fn get(&self, raw_material_id: &str) -> Option<&BomLine> {
        self.lines.iter().find(|l| l.raw_material_id == raw_material_id)
    }

    /// Quantity per material.
    pub fn to_quantity_map(&self) -> HashMap<String, Decimal> {
        self.lines
            .iter()
            .map(|l| (l.raw_material_id.clone(), l.quantity))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Validates references and lays out the ordered step list.
pub fn plan(inputs: &BomInputs<'_>) -> BomResult<Vec<BomStep>> {
    let mut steps = Vec::new();

    // Layer 1
    let mut base_entries: HashMap<&str, &ProductMaterial> = HashMap::new();
    for entry in inputs.base {
        let source = StepSource {
            layer: BomLayer::Base,
            rule_id: entry.id.clone(),
            option: None,
        };
        require_material(inputs.materials, &entry.raw_material_id, &source)?;
        base_entries.insert(entry.id.as_str(), entry);
        steps.push(BomStep {
            source,
            raw_material_id: entry.raw_material_id.clone(),
            op: BomOp::Seed {
                quantity: entry.quantity,
                required: entry.is_required,
            },
        });
    }

    // Layer 2, one selection at a time
    for selection in inputs.selections {
        for addition in inputs.additions.iter().filter(|a| a.trigger.matches(selection)) {
            let source = StepSource {
                layer: BomLayer::OptionAddition,
                rule_id: addition.id.clone(),
                option: Some(selection.clone()),
            };
            require_material(inputs.materials, &addition.raw_material_id, &source)?;
            steps.push(BomStep {
                source,
                raw_material_id: addition.raw_material_id.clone(),
                op: BomOp::Increment {
                    quantity: addition.quantity,
                },
            });
        }

        for modifier in inputs.modifiers.iter().filter(|m| m.trigger.matches(selection)) {
            let target = base_entries
                .get(modifier.product_material_id.as_str())
                .ok_or_else(|| BomError::UnknownBaseEntry {
                    modifier_id: modifier.id.clone(),
                    entry_id: modifier.product_material_id.clone(),
                })?;
            let op = match modifier.op {
                ModifierOp::Multiply => BomOp::Scale {
                    factor: modifier.value,
                },
                ModifierOp::Add => BomOp::Offset {
                    delta: modifier.value,
                },
                ModifierOp::Set => BomOp::Assign {
                    quantity: modifier.value,
                },
            };
            steps.push(BomStep {
                source: StepSource {
                    layer: BomLayer::OptionModifier,
                    rule_id: modifier.id.clone(),
                    option: Some(selection.clone()),
                },
                raw_material_id: target.raw_material_id.clone(),
                op,
            });
        }
    }

    // Layer 3
    let mut overrides: Vec<&VariantOverride> = inputs.overrides.iter().collect();
    overrides.sort_by_key(|o| o.position);
    for ov in overrides {
        steps.push(override_step(inputs.materials, ov)?);
    }

    Ok(steps)
}

fn override_step(
    materials: &HashMap<String, RawMaterial>,
    ov: &VariantOverride,
) -> BomResult<BomStep> {
    let source = StepSource {
        layer: BomLayer::VariantOverride,
        rule_id: ov.id.clone(),
        option: None,
    };
    require_material(materials, &ov.raw_material_id, &source)?;

    let quantity = || {
        ov.quantity.ok_or_else(|| BomError::InvalidOverride {
            override_id: ov.id.clone(),
            reason: format!("{} requires a quantity", ov.override_type),
        })
    };

    let op = match ov.override_type {
        OverrideType::Replace => {
            let to = ov
                .replacement_material_id
                .clone()
                .ok_or_else(|| BomError::InvalidOverride {
                    override_id: ov.id.clone(),
                    reason: "replace requires a replacement material".to_string(),
                })?;
            require_material(materials, &to, &source)?;
            BomOp::Replace {
                to,
                quantity: ov.quantity,
            }
        }
        OverrideType::Add => BomOp::Increment {
            quantity: quantity()?,
        },
        OverrideType::SetQuantity => BomOp::Assign {
            quantity: quantity()?,
        },
        OverrideType::Remove => BomOp::Remove,
    };

    Ok(BomStep {
        source,
        raw_material_id: ov.raw_material_id.clone(),
        op,
    })
}

fn require_material(
    materials: &HashMap<String, RawMaterial>,
    material_id: &str,
    source: &StepSource,
) -> BomResult<()> {
    if materials.contains_key(material_id) {
        Ok(())
    } else {
        Err(BomError::UnknownMaterial {
            material_id: material_id.to_string(),
            origin: source.to_string(),
        })
    }
}

// =============================================================================
// Folding
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Entry {
    quantity: Decimal,
    required: bool,
}

impl Entry {
    fn required(quantity: Decimal) -> Self {
        Entry {
            quantity,
            required: true,
        }
    }
}

/// Folds a step plan left to right, failing on the first negative or
/// overflowing quantity.
pub fn apply(
    steps: Vec<BomStep>,
    materials: &HashMap<String, RawMaterial>,
) -> BomResult<ResolvedBom> {
    let mut map: BTreeMap<String, Entry> = BTreeMap::new();
    let mut applied = Vec::with_capacity(steps.len());

    for step in steps {
        let id = step.raw_material_id.clone();
        let overflow = || BomError::QuantityOverflow {
            material_id: step.raw_material_id.clone(),
            origin: step.source.to_string(),
        };
        let touched = match &step.op {
            BomOp::Seed { quantity, required } => {
                let entry = map.entry(id.clone()).or_insert(Entry {
                    quantity: Decimal::ZERO,
                    required: false,
                });
                entry.quantity = entry.quantity.checked_add(*quantity).ok_or_else(overflow)?;
                entry.required |= *required;
                id
            }
            BomOp::Increment { quantity } | BomOp::Offset { delta: quantity } => {
                let entry = map.entry(id.clone()).or_insert(Entry::required(Decimal::ZERO));
                entry.quantity = entry.quantity.checked_add(*quantity).ok_or_else(overflow)?;
                id
            }
            BomOp::Scale { factor } => {
                let entry = map.entry(id.clone()).or_insert(Entry::required(Decimal::ZERO));
                entry.quantity = entry.quantity.checked_mul(*factor).ok_or_else(overflow)?;
                id
            }
            BomOp::Assign { quantity } => {
                map.entry(id.clone())
                    .or_insert(Entry::required(Decimal::ZERO))
                    .quantity = *quantity;
                id
            }
            BomOp::Replace { to, quantity } => {
                let removed = map.remove(&id);
                let quantity = quantity
                    .or(removed.map(|e| e.quantity))
                    .ok_or_else(|| BomError::InvalidOverride {
                        override_id: step.source.rule_id.clone(),
                        reason: format!(
                            "replace without quantity needs {} in the BOM, but it is absent",
                            id
                        ),
                    })?;
                let required = removed.map_or(true, |e| e.required);
                map.insert(to.clone(), Entry { quantity, required });
                to.clone()
            }
            BomOp::Remove => {
                map.remove(&id);
                id
            }
        };

        let quantity_after = map.get(&touched).map_or(Decimal::ZERO, |e| e.quantity);
        if quantity_after < Decimal::ZERO {
            return Err(BomError::NegativeQuantity {
                material_id: touched,
                quantity: quantity_after,
                origin: step.source.to_string(),
            });
        }

        applied.push(AppliedStep {
            step,
            touched_material_id: touched,
            quantity_after,
        });
    }

    let lines = map
        .into_iter()
        .filter(|(_, e)| !e.quantity.is_zero())
        .map(|(id, e)| {
            let (name, unit) = materials
                .get(&id)
                .map(|m| (m.name.clone(), m.unit.clone()))
                .unwrap_or_else(|| (id.clone(), String::new()));
            BomLine {
                raw_material_id: id,
                material_name: name,
                quantity: e.quantity.normalize(),
                unit,
                required: e.required,
            }
        })
        .collect();

    Ok(ResolvedBom {
        lines,
        steps: applied,
    })
}

/// Resolves the BOM of one variant.
///
/// Pure: the same inputs always yield the same BOM.
pub fn resolve(inputs: &BomInputs<'_>) -> BomResult<ResolvedBom> {
    let steps = plan(inputs)?;
    apply(steps, inputs.materials)
}

// =============================================================================
// Unit Tests
// =============================================================================
