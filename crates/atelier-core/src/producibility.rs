//! # Producibility
//!
//! How many complete units of a variant current raw-material stock allows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  units = min over required lines with q > 0 of  floor(stock / q)       │
//! │                                                                         │
//! │  leather  10 m  / 2.8 m  = 3.57 → 3                                    │
//! │  zipper    9 pcs / 3 pcs = 3    → 3                                    │
//! │                                   ─── min = 3                           │
//! │                                                                         │
//! │  no required lines          → Unbounded                                 │
//! │  missing / negative stock   → counted as 0                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use ts_rs::TS;

use crate::bom::{BomLine, ResolvedBom};
use crate::types::RawMaterial;

/// Units buildable from current stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Producibility {
    /// At most `units` complete units.
    Limited { units: u64 },
    /// Nothing required limits production.
    Unbounded,
}

impl Producibility {
    /// Unit count, `None` when unbounded.
    pub fn units(&self) -> Option<u64> {
        match self {
            Producibility::Limited { units } => Some(*units),
            Producibility::Unbounded => None,
        }
    }

    pub fn is_producible(&self) -> bool {
        !matches!(self, Producibility::Limited { units: 0 })
    }
}

impl fmt::Display for Producibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producibility::Limited { units } => write!(f, "{}", units),
            Producibility::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Point-in-time stock levels keyed by raw material ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockSnapshot {
    levels: HashMap<String, Decimal>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, raw_material_id: impl Into<String>, quantity: Decimal) -> Self {
        self.set(raw_material_id, quantity);
        self
    }

    pub fn set(&mut self, raw_material_id: impl Into<String>, quantity: Decimal) {
        self.levels.insert(raw_material_id.into(), quantity);
    }

    /// Stock of a material; missing and negative levels read as zero.
    pub fn available(&self, raw_material_id: &str) -> Decimal {
        self.levels
            .get(raw_material_id)
            .copied()
            .filter(|q| *q > Decimal::ZERO)
            .unwrap_or(Decimal::ZERO)
    }
}

impl<'a> FromIterator<&'a RawMaterial> for StockSnapshot {
    fn from_iter<I: IntoIterator<Item = &'a RawMaterial>>(iter: I) -> Self {
        StockSnapshot {
            levels: iter
                .into_iter()
                .map(|m| (m.id.clone(), m.stock_quantity))
                .collect(),
        }
    }
}

fn gating_lines(bom: &ResolvedBom) -> impl Iterator<Item = &BomLine> {
    bom.lines
        .iter()
        .filter(|l| l.required && l.quantity > Decimal::ZERO)
}

fn units_for(line: &BomLine, stock: &StockSnapshot) -> u64 {
    (stock.available(&line.raw_material_id) / line.quantity)
        .floor()
        .to_u64()
        .unwrap_or(u64::MAX)
}

/// Units of a variant buildable from the given stock.
pub fn producibility(bom: &ResolvedBom, stock: &StockSnapshot) -> Producibility {
    gating_lines(bom)
        .map(|line| units_for(line, stock))
        .min()
        .map_or(Producibility::Unbounded, |units| Producibility::Limited { units })
}

/// The required line that caps production, if any.
pub fn limiting_material<'a>(bom: &'a ResolvedBom, stock: &StockSnapshot) -> Option<&'a BomLine> {
    gating_lines(bom).min_by_key(|line| units_for(line, stock))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, quantity: &str, required: bool) -> BomLine {
        BomLine {
            raw_material_id: id.to_string(),
            material_name: id.to_string(),
            quantity: quantity.parse().unwrap(),
            unit: "m".to_string(),
            required,
        }
    }

    fn bom(lines: Vec<BomLine>) -> ResolvedBom {
        ResolvedBom {
            lines,
            steps: Vec::new(),
        }
    }

    #[test]
    fn test_minimum_over_required_lines() {
        let bom = bom(vec![line("leather", "2.8", true), line("zipper", "3", true)]);
        let stock = StockSnapshot::new()
            .with("leather", Decimal::new(10, 0))
            .with("zipper", Decimal::new(9, 0));

        assert_eq!(producibility(&bom, &stock), Producibility::Limited { units: 3 });
    }

    #[test]
    fn test_optional_lines_do_not_gate() {
        let bom = bom(vec![line("leather", "2", true), line("charm", "1", false)]);
        let stock = StockSnapshot::new().with("leather", Decimal::new(10, 0));

        assert_eq!(producibility(&bom, &stock), Producibility::Limited { units: 5 });
    }

    #[test]
    fn test_missing_or_negative_stock_is_zero() {
        let bom = bom(vec![line("leather", "2", true), line("thread", "1", true)]);
        let stock = StockSnapshot::new().with("leather", Decimal::new(-4, 0));

        let result = producibility(&bom, &stock);
        assert_eq!(result, Producibility::Limited { units: 0 });
        assert!(!result.is_producible());
    }

    #[test]
    fn test_no_required_lines_is_unbounded() {
        let bom = bom(vec![line("charm", "1", false)]);
        assert_eq!(
            producibility(&bom, &StockSnapshot::new()),
            Producibility::Unbounded
        );
        assert_eq!(producibility(&ResolvedBom::default(), &StockSnapshot::new()).units(), None);
    }

    #[test]
    fn test_limiting_material() {
        let bom = bom(vec![line("leather", "2.8", true), line("zipper", "1", true)]);
        let stock = StockSnapshot::new()
            .with("leather", Decimal::new(10, 0))
            .with("zipper", Decimal::new(50, 0));

        let limiting = limiting_material(&bom, &stock).unwrap();
        assert_eq!(limiting.raw_material_id, "leather");
    }
}
