//! Optimizer entry points.

use std::collections::BTreeMap;
use std::sync::Arc;

use xplan_core::config::Configuration;
use xplan_core::prelude::*;
use xplan_mapping::{CandidateSet, MappingEngine};

use crate::context::OptimizerContext;
use crate::enumerate::Enumerator;
use crate::physical::ExecutionPlan;

/// Pure, single-threaded search over an immutable context. Cheap to clone
/// and safe to use from several jobs at once.
#[derive(Debug, Clone)]
pub struct Optimizer {
    ctx: Arc<OptimizerContext>,
}

impl Optimizer {
    pub fn new(ctx: Arc<OptimizerContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<OptimizerContext> {
        &self.ctx
    }

    /// Structural and mapping checks without enumeration. Mapping failures
    /// are reported as `Error::NoApplicableMapping`.
    pub fn validate(&self, plan: &Plan, config: &Configuration) -> Result<CandidateSet> {
        plan.validate()?;
        let constraints = self.ctx.constraints(&config.platforms);
        let candidates = MappingEngine::map(plan, self.ctx.catalog(), self.ctx.registry(), &constraints)?;
        Ok(candidates)
    }

    /// Minimum-cost execution plan for `plan` under `config`.
    pub fn optimize(&self, plan: &Plan, config: &Configuration) -> Result<ExecutionPlan> {
        let constraints = self.ctx.constraints(&config.platforms);
        let exec = optimize_in(plan, &self.ctx, config, &constraints, &BTreeMap::new())?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            cost = exec.total_cost(),
            operators = exec.operators().count(),
            conversions = exec.conversion_count(),
            stages = exec.stages().len(),
            strategy = ?exec.strategy(),
            "optimized plan"
        );

        Ok(exec)
    }
}

/// Optimize under an explicit constraint set, with some operators'
/// cardinalities fixed. Loop bodies recurse through here.
pub(crate) fn optimize_in(
    plan: &Plan,
    ctx: &OptimizerContext,
    config: &Configuration,
    constraints: &ConstraintSet,
    fixed: &BTreeMap<OperatorId, u64>,
) -> Result<ExecutionPlan> {
    plan.validate()?;
    let est = ctx.estimator().estimate_with(plan, &config.cost, fixed);
    let candidates = MappingEngine::map(plan, ctx.catalog(), ctx.registry(), constraints)
        .map_err(UnsatisfiablePlanError::from)?;
    let selection = Enumerator::new(plan, ctx, config, constraints, &est, &candidates).run()?;
    ExecutionPlan::assemble(selection, ctx.conversions())
}
