//! Job lifecycle: one logical plan, one configuration snapshot, at most one
//! execution.
//!
//! ```text
//! Created -> Optimizing -> Optimized -> Executing -> Succeeded
//!                 |                         |
//!                 +--------> Failed <-------+
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xplan_core::config::{ConfigSnapshot, Configuration};
use xplan_core::manifest::{now_ms, JobManifest};
use xplan_core::prelude::*;
use xplan_planner::{ExecutionPlan, Optimizer};

use crate::cancel::CancellationToken;
use crate::error::{ExecError, Result};
use crate::executor::ExecutorRegistry;
use crate::fail_point;
use crate::scheduler::{check_executors, run_stages, ScheduleOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Optimizing,
    Optimized,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Created => "created",
            JobState::Optimizing => "optimizing",
            JobState::Optimized => "optimized",
            JobState::Executing => "executing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct Job {
    id: JobId,
    plan: Plan,
    config: ConfigSnapshot,
    optimizer: Optimizer,
    executors: Arc<ExecutorRegistry>,
    state: JobState,
    execution_plan: Option<Arc<ExecutionPlan>>,
    manifest: Option<JobManifest>,
    cancel: CancellationToken,
}

impl Job {
    /// The configuration is copied; later changes to `config` do not reach
    /// this job.
    pub fn new(
        plan: Plan,
        config: &Configuration,
        optimizer: Optimizer,
        executors: Arc<ExecutorRegistry>,
    ) -> Self {
        Self {
            id: JobId::new_v4(),
            plan,
            config: config.snapshot(),
            optimizer,
            executors,
            state: JobState::Created,
            execution_plan: None,
            manifest: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn execution_plan(&self) -> Option<&ExecutionPlan> {
        self.execution_plan.as_deref()
    }

    pub fn manifest(&self) -> Option<&JobManifest> {
        self.manifest.as_ref()
    }

    /// Cancelling stops dispatch of further stages and is visible to
    /// executors of in-flight ones.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&mut self, to: JobState) {
        #[cfg(feature = "tracing")]
        tracing::info!(job = %self.id, from = %self.state, to = %to, "job transition");
        self.state = to;
    }

    fn expect_state(&self, expected: JobState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(ExecError::InvalidState(format!(
                "cannot {action} {} in state {}, expected {expected}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Search for the cheapest execution plan. Only valid once, from `Created`.
    pub fn optimize(&mut self) -> Result<&ExecutionPlan> {
        self.expect_state(JobState::Created, "optimize")?;
        self.transition(JobState::Optimizing);

        let optimized = fail_point!("job::optimize")
            .and_then(|()| Ok(self.optimizer.optimize(&self.plan, &self.config)?));
        match optimized {
            Ok(plan) => {
                self.execution_plan = Some(Arc::new(plan));
                self.transition(JobState::Optimized);
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(job = %self.id, error = %e, "optimization failed");
                self.transition(JobState::Failed);
                return Err(e);
            }
        }
        self.execution_plan
            .as_deref()
            .ok_or_else(|| ExecError::InvalidState("optimized job without a plan".into()))
    }

    fn begin_execution(&mut self) -> Result<(Arc<ExecutionPlan>, JobManifest)> {
        self.expect_state(JobState::Optimized, "execute")?;
        let plan = self
            .execution_plan
            .clone()
            .ok_or_else(|| ExecError::InvalidState("optimized job without a plan".into()))?;

        self.transition(JobState::Executing);
        if let Err(e) = check_executors(&plan, &self.executors) {
            self.transition(JobState::Failed);
            return Err(e);
        }
        let fingerprint = match plan.fingerprint() {
            Ok(h) => h,
            Err(e) => {
                self.transition(JobState::Failed);
                return Err(e.into());
            }
        };
        #[cfg(feature = "tracing")]
        tracing::info!(
            job = %self.id,
            plan = %fingerprint.short(),
            stages = plan.stages().len(),
            "executing plan"
        );
        let manifest = JobManifest::new(self.id, fingerprint, plan.total_cost(), now_ms());
        Ok((plan, manifest))
    }

    fn end_execution(&mut self, mut manifest: JobManifest, outcome: ScheduleOutcome) -> Result<JobManifest> {
        for report in outcome.reports {
            manifest.record(report);
        }
        let manifest = manifest.finish(now_ms());
        self.manifest = Some(manifest.clone());
        match outcome.result {
            Ok(()) => {
                self.transition(JobState::Succeeded);
                Ok(manifest)
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(job = %self.id, error = %e, "execution failed");
                self.transition(JobState::Failed);
                Err(e)
            }
        }
    }

    /// Run all stages. Only valid once, from `Optimized`.
    pub fn execute(&mut self) -> Result<JobManifest> {
        let (plan, manifest) = self.begin_execution()?;
        let outcome = run_stages(
            &plan,
            &self.executors,
            self.config.execution.max_parallel_stages,
            &self.cancel,
        );
        self.end_execution(manifest, outcome)
    }

    /// `execute` on the tokio scheduler.
    #[cfg(feature = "async-scheduler")]
    pub async fn execute_async(&mut self) -> Result<JobManifest> {
        let (plan, manifest) = self.begin_execution()?;
        let outcome = crate::scheduler::run_stages_async(
            plan,
            Arc::clone(&self.executors),
            self.config.execution.max_parallel_stages,
            self.cancel.clone(),
        )
        .await;
        self.end_execution(manifest, outcome)
    }

    /// Optimize, then execute.
    pub fn run(&mut self) -> Result<JobManifest> {
        self.optimize()?;
        self.execute()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("operators", &self.plan.len())
            .finish()
    }
}
