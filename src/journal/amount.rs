//! Minimal commodity/amount value type.
//!
//! Only what balancing needs lives here; pricing and conversion belong to
//! the surrounding arithmetic layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a commodity nets to zero.
pub const BALANCE_EPSILON: f64 = 1e-6;

/// A quantity of a single commodity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub commodity: String,
    pub quantity: f64,
}

impl Amount {
    pub fn new(commodity: impl Into<String>, quantity: f64) -> Self {
        Self {
            commodity: commodity.into(),
            quantity,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.quantity.abs() < BALANCE_EPSILON
    }

    pub fn negated(&self) -> Self {
        Self::new(self.commodity.clone(), -self.quantity)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.commodity.clone(), self.quantity * factor)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.quantity, self.commodity)
    }
}

/// Running per-commodity totals.
#[derive(Debug, Clone, Default)]
pub struct Balance {
    totals: BTreeMap<String, f64>,
}

impl Balance {
    pub fn add(&mut self, amount: &Amount) {
        *self.totals.entry(amount.commodity.clone()).or_insert(0.0) += amount.quantity;
    }

    pub fn total(&self, commodity: &str) -> f64 {
        self.totals.get(commodity).copied().unwrap_or(0.0)
    }

    /// Commodities whose totals do not net to zero, with their residuals.
    pub fn residuals(&self) -> Vec<Amount> {
        self.totals
            .iter()
            .filter(|(_, total)| total.abs() >= BALANCE_EPSILON)
            .map(|(commodity, total)| Amount::new(commodity.clone(), *total))
            .collect()
    }

    pub fn is_zero(&self) -> bool {
        self.residuals().is_empty()
    }
}
