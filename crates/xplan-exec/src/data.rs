//! Opaque data handed between stages.
//!
//! The engine never looks inside: whatever one platform executor writes to
//! a cross-stage channel is handed verbatim to the consuming executor.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use xplan_core::prelude::*;
use xplan_planner::{ExecChannel, ExecutionPlan, Stage};
use xplan_mapping::ExecutionOperator;

#[derive(Clone)]
pub struct DataHandle(Arc<dyn Any + Send + Sync>);

impl DataHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for DataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataHandle(..)")
    }
}

/// Data on each incoming cross-stage channel.
pub type StageInputs = BTreeMap<ExecChannelId, DataHandle>;

/// Data on each outgoing cross-stage channel. Must cover all of them.
pub type StageOutputs = BTreeMap<ExecChannelId, DataHandle>;

/// One stage together with the plan it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct StageView<'a> {
    plan: &'a ExecutionPlan,
    stage: &'a Stage,
}

impl<'a> StageView<'a> {
    pub fn new(plan: &'a ExecutionPlan, stage: &'a Stage) -> Self {
        Self { plan, stage }
    }

    pub fn stage(&self) -> &'a Stage {
        self.stage
    }

    pub fn id(&self) -> StageId {
        self.stage.id
    }

    pub fn platform(&self) -> &'a PlatformId {
        &self.stage.platform
    }

    pub fn plan(&self) -> &'a ExecutionPlan {
        self.plan
    }

    /// Stage operators in topological order.
    pub fn operators(&self) -> impl Iterator<Item = (ExecOpId, &'a ExecutionOperator)> + 'a {
        let plan = self.plan;
        self.stage
            .operators
            .iter()
            .filter_map(move |id| plan.operator(*id).map(|op| (*id, op)))
    }

    pub fn input_channels(&self) -> impl Iterator<Item = &'a ExecChannel> + 'a {
        let plan = self.plan;
        self.stage.inputs.iter().filter_map(move |id| plan.channel(*id))
    }

    pub fn output_channels(&self) -> impl Iterator<Item = &'a ExecChannel> + 'a {
        let plan = self.plan;
        self.stage.outputs.iter().filter_map(move |id| plan.channel(*id))
    }

    pub fn internal_channels(&self) -> impl Iterator<Item = &'a ExecChannel> + 'a {
        let plan = self.plan;
        self.stage
            .internal_channels
            .iter()
            .filter_map(move |id| plan.channel(*id))
    }

    /// Optimized body of a loop operator in this stage.
    pub fn loop_body(&self, op: ExecOpId) -> Option<&'a ExecutionPlan> {
        self.plan.loop_body(op)
    }
}
