//! Structural comparison of expected and observed values.
//!
//! Values are `serde_json::Value`, the closed variant that crosses the
//! sandbox boundary. Comparison dispatches on that variant:
//!
//! - booleans, strings and integer pairs compare exactly
//! - if either number is a float: `abs(actual - expected) <= atol + rtol * abs(expected)`
//! - arrays: same length, element-wise, in order
//! - objects: same key set, value-wise
//! - any other pairing is a mismatch, never an error

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Floating-point tolerance. Defaults follow the usual `isclose` constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-8,
        }
    }
}

impl Tolerance {
    pub fn exact() -> Self {
        Self { rtol: 0.0, atol: 0.0 }
    }

    /// Whether the tolerances are finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.rtol.is_finite() && self.atol.is_finite() && self.rtol >= 0.0 && self.atol >= 0.0
    }

    fn close(&self, expected: f64, actual: f64) -> bool {
        if expected == actual {
            return true;
        }
        if !expected.is_finite() || !actual.is_finite() {
            return false;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

/// Decides whether observed values match expected ones.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Comparator {
    tolerance: Tolerance,
}

impl Comparator {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn matches(&self, expected: &Value, actual: &Value) -> bool {
        match (expected, actual) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(e), Value::Bool(a)) => e == a,
            (Value::String(e), Value::String(a)) => e == a,
            (Value::Number(e), Value::Number(a)) => self.numbers_match(e, a),
            (Value::Array(e), Value::Array(a)) => {
                e.len() == a.len() && e.iter().zip(a).all(|(e, a)| self.matches(e, a))
            }
            (Value::Object(e), Value::Object(a)) => {
                e.len() == a.len()
                    && e.iter()
                        .all(|(key, ev)| a.get(key).is_some_and(|av| self.matches(ev, av)))
            }
            _ => false,
        }
    }

    fn numbers_match(&self, expected: &Number, actual: &Number) -> bool {
        if let (Some(e), Some(a)) = (integral(expected), integral(actual)) {
            return e == a;
        }
        match (expected.as_f64(), actual.as_f64()) {
            (Some(e), Some(a)) => self.tolerance.close(e, a),
            _ => false,
        }
    }
}

fn integral(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Compare with the default tolerance.
pub fn matches(expected: &Value, actual: &Value) -> bool {
    Comparator::default().matches(expected, actual)
}
