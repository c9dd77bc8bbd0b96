//! Cost functions over estimated cardinalities.
//!
//! Implementations must be monotonic non-decreasing in both arguments and
//! never negative.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::codec::DecoderTable;
use crate::error::{Error, Result};

pub trait CostFunction: Send + Sync + fmt::Debug {
    fn cost(&self, input_cardinality: u64, output_cardinality: u64) -> f64;
}

pub type SharedCostFunction = Arc<dyn CostFunction>;

/// Clamp NaN and negatives to zero and infinities to `f64::MAX`.
pub fn sanitize(c: f64) -> f64 {
    if c.is_nan() || c < 0.0 {
        0.0
    } else if c.is_infinite() {
        f64::MAX
    } else {
        c
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConstantCost {
    pub value: f64,
}

impl ConstantCost {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl CostFunction for ConstantCost {
    fn cost(&self, _: u64, _: u64) -> f64 {
        self.value
    }
}

/// `fixed + per_input * in + per_output * out`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct LinearCost {
    #[serde(default)]
    pub fixed: f64,
    #[serde(default)]
    pub per_input: f64,
    #[serde(default)]
    pub per_output: f64,
}

impl LinearCost {
    pub fn new(fixed: f64, per_input: f64, per_output: f64) -> Self {
        Self {
            fixed,
            per_input,
            per_output,
        }
    }
}

impl CostFunction for LinearCost {
    fn cost(&self, i: u64, o: u64) -> f64 {
        self.fixed + self.per_input * i as f64 + self.per_output * o as f64
    }
}

/// `fixed + factor * n * log2(n)` with `n = max(in, 2)`, for sort-like work.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NLogNCost {
    #[serde(default)]
    pub fixed: f64,
    pub factor: f64,
}

impl CostFunction for NLogNCost {
    fn cost(&self, i: u64, _: u64) -> f64 {
        let n = i.max(2) as f64;
        self.fixed + self.factor * n * n.log2()
    }
}

fn non_negative(what: &str, values: &[f64]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::Codec(format!(
            "{what} coefficients must be finite and non-negative"
        )));
    }
    Ok(())
}

fn decode_constant(v: &Value) -> Result<SharedCostFunction> {
    let c: ConstantCost = serde_json::from_value(v.clone())?;
    non_negative("constant", &[c.value])?;
    Ok(Arc::new(c))
}

fn decode_linear(v: &Value) -> Result<SharedCostFunction> {
    let c: LinearCost = serde_json::from_value(v.clone())?;
    non_negative("linear", &[c.fixed, c.per_input, c.per_output])?;
    Ok(Arc::new(c))
}

fn decode_nlogn(v: &Value) -> Result<SharedCostFunction> {
    let c: NLogNCost = serde_json::from_value(v.clone())?;
    non_negative("nlogn", &[c.fixed, c.factor])?;
    Ok(Arc::new(c))
}

/// Built-in cost function kinds: `constant`, `linear`, `nlogn`.
pub fn cost_function_decoders() -> DecoderTable<SharedCostFunction> {
    DecoderTable::new()
        .with("constant", decode_constant)
        .with("linear", decode_linear)
        .with("nlogn", decode_nlogn)
}
