//! Registered channel conversions.

use std::sync::Arc;

use xplan_core::cost::{sanitize, CostFunction, SharedCostFunction};
use xplan_core::prelude::*;

use crate::descriptor::ChannelDescriptor;

#[derive(Debug, Clone)]
pub struct ChannelConversion {
    pub name: String,
    pub source: ChannelDescriptor,
    pub target: ChannelDescriptor,
    /// Platform that executes the conversion.
    pub platform: PlatformId,
    cost: SharedCostFunction,
}

impl ChannelConversion {
    /// Executed on the source platform unless overridden.
    pub fn new(
        name: impl Into<String>,
        source: ChannelDescriptor,
        target: ChannelDescriptor,
        cost: impl CostFunction + 'static,
    ) -> Self {
        Self::with_shared_cost(name, source, target, Arc::new(cost))
    }

    pub fn with_shared_cost(
        name: impl Into<String>,
        source: ChannelDescriptor,
        target: ChannelDescriptor,
        cost: SharedCostFunction,
    ) -> Self {
        Self {
            name: name.into(),
            platform: source.platform.clone(),
            source,
            target,
            cost,
        }
    }

    pub fn executed_on(mut self, platform: impl Into<PlatformId>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Cost of moving `cardinality` elements through this conversion.
    pub fn cost(&self, cardinality: u64) -> f64 {
        sanitize(self.cost.cost(cardinality, cardinality))
    }

    /// Usable only if every platform it touches is selectable.
    pub fn is_usable(&self, constraints: &ConstraintSet) -> bool {
        constraints.is_selectable(&self.platform)
            && constraints.is_selectable(&self.source.platform)
            && constraints.is_selectable(&self.target.platform)
    }
}
