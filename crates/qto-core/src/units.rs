// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unit classes and quantity rounding.
//!
//! Extracted quantities are rounded according to the class of their unit:
//! counts are whole numbers, volumes carry three decimals, areas and
//! lengths two.

use serde::{Deserialize, Serialize};

/// Broad class of a measurement unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    /// Discrete pieces: `pcs`, `nr`, `ea`, ...
    Count,
    /// Linear measure: `m`, `mm`, `lm`, ...
    Length,
    /// Surface measure: `m2`, `m²`.
    Area,
    /// Volume measure: `m3`, `m³`.
    Volume,
    /// Anything else (kg, t, hours, lump sums).
    Other,
}

impl UnitClass {
    /// Classify a free-form unit string.
    pub fn classify(unit: &str) -> Self {
        match unit.trim().to_ascii_lowercase().as_str() {
            "pcs" | "pc" | "nr" | "no" | "ea" | "each" | "st" | "u" | "item" => Self::Count,
            "m" | "lm" | "mm" | "cm" | "km" | "ft" => Self::Length,
            "m2" | "m²" | "sqm" | "sq.m" => Self::Area,
            "m3" | "m³" | "cum" | "cu.m" => Self::Volume,
            _ => Self::Other,
        }
    }

    /// Number of decimal places quantities of this class are rounded to.
    pub fn decimals(self) -> u32 {
        match self {
            Self::Count => 0,
            Self::Volume => 3,
            Self::Length | Self::Area | Self::Other => 2,
        }
    }
}

/// Round `qty` according to the class of `unit`.
pub fn round_qty(unit: &str, qty: f64) -> f64 {
    let decimals = UnitClass::classify(unit).decimals();
    let factor = 10f64.powi(decimals as i32);
    (qty * factor).round() / factor
}
