//! Canonical cell forms so cosmetic differences compare equal.
//!
//! Text is trimmed and the placeholders a store or spreadsheet leaves behind
//! (`nan`, `None`, blank) become null. Floats are rounded to a fixed number of
//! decimals before equality is checked; this is a representation fix, not a
//! tolerance, so two values on either side of a rounding boundary stay
//! different.

use crate::data::{Dataset, Value};

pub const FLOAT_DECIMALS: i32 = 4;

const NULL_LITERALS: &[&str] = &["nan", "None"];

pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || NULL_LITERALS.contains(&trimmed) {
                Value::Null
            } else if trimmed.len() == text.len() {
                Value::Text(text)
            } else {
                Value::Text(trimmed.to_string())
            }
        }
        Value::Float(f) if f.is_nan() => Value::Null,
        // `+ 0.0` folds a rounded `-0.0` into `0.0`.
        Value::Float(f) => Value::Float(round_half_even(f, FLOAT_DECIMALS) + 0.0),
        other => other,
    }
}

/// Rounds to `decimals` places, ties to even, the way array libraries do.
pub fn round_half_even(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / factor
}

/// Normalizes every cell of `dataset` in place.
pub fn normalize_dataset(dataset: &mut Dataset) {
    for row in dataset.rows_mut() {
        for cell in row.iter_mut() {
            let value = std::mem::replace(cell, Value::Null);
            *cell = normalize_value(value);
        }
    }
}
