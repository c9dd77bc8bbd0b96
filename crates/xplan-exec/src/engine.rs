use std::sync::Arc;

use xplan_core::config::Configuration;
use xplan_core::manifest::JobManifest;
use xplan_core::prelude::*;
use xplan_planner::{ExecutionPlan, Optimizer, OptimizerContext};

use crate::error::Result;
use crate::executor::ExecutorRegistry;
use crate::job::Job;

/// Owns the optimizer context, the platform executors and the current
/// configuration. Each job takes its own snapshot of the latter.
#[derive(Debug, Clone)]
pub struct Engine {
    optimizer: Optimizer,
    executors: Arc<ExecutorRegistry>,
    config: Configuration,
}

impl Engine {
    pub fn new(ctx: Arc<OptimizerContext>, executors: ExecutorRegistry, config: Configuration) -> Self {
        Self {
            optimizer: Optimizer::new(ctx),
            executors: Arc::new(executors),
            config,
        }
    }

    /// Start from the configuration the context's plugins contribute.
    pub fn with_plugin_defaults(ctx: Arc<OptimizerContext>, executors: ExecutorRegistry) -> Self {
        let config = ctx.default_configuration();
        Self::new(ctx, executors, config)
    }

    pub fn context(&self) -> &Arc<OptimizerContext> {
        self.optimizer.context()
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Affects jobs created afterwards only.
    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    pub fn create_job(&self, plan: Plan) -> Job {
        Job::new(plan, &self.config, self.optimizer.clone(), Arc::clone(&self.executors))
    }

    /// Optimize only, under the current configuration.
    pub fn optimize(&self, plan: &Plan) -> Result<ExecutionPlan> {
        Ok(self.optimizer.optimize(plan, &self.config)?)
    }

    /// Create a job for `plan` and run it to completion.
    pub fn execute(&self, plan: Plan) -> Result<JobManifest> {
        self.create_job(plan).run()
    }
}
