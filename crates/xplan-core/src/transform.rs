//! Opaque user transformation descriptors.
//!
//! The optimizer only carries these around; platform executors turn them
//! into callables through a `TransformCompiler`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDescriptor {
    pub name: String,
    pub input_arity: usize,
    pub output_arity: usize,
    /// Platform-interpreted payload (expression, class name, script, ...).
    #[serde(default)]
    pub body: serde_json::Value,
}

impl TransformDescriptor {
    pub fn new(name: impl Into<String>, input_arity: usize, output_arity: usize) -> Self {
        Self {
            name: name.into(),
            input_arity,
            output_arity,
            body: serde_json::Value::Null,
        }
    }

    /// One input, one output.
    pub fn unary(name: impl Into<String>) -> Self {
        Self::new(name, 1, 1)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }
}

/// Compiles descriptors into executable callables of the declared arity.
pub trait TransformCompiler {
    type Callable;

    fn compile(&self, descriptor: &TransformDescriptor) -> Result<Self::Callable>;
}

/// Reject a descriptor whose arity differs from what the caller needs.
pub fn check_arity(d: &TransformDescriptor, inputs: usize, outputs: usize) -> Result<()> {
    if d.input_arity != inputs || d.output_arity != outputs {
        return Err(Error::Config(format!(
            "transform '{}' has arity {}->{}, expected {}->{}",
            d.name, d.input_arity, d.output_arity, inputs, outputs
        )));
    }
    Ok(())
}
