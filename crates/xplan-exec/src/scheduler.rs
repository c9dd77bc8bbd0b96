//! Stage scheduler.
//!
//! A stage becomes ready once every stage it depends on has succeeded.
//! Ready stages are dispatched smallest id first, at most
//! `max_parallel_stages` at a time. The first failure stops dispatch and
//! cancels whatever is still in flight; the scheduler then waits for those
//! stages before returning. A cancel of the job token from outside is
//! noticed within `CANCEL_POLL` and forwarded to the in-flight stages'
//! executors the same way.
//!
//! The default scheduler runs stages on scoped OS threads. With the
//! `async-scheduler` feature, `run_stages_async` drives the same dispatch
//! state from a tokio `JoinSet` of blocking tasks.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use xplan_core::manifest::{now_ms, StageOutcome, StageReport};
use xplan_core::prelude::*;
use xplan_planner::{ExecutionPlan, Stage};

use crate::cancel::CancellationToken;
use crate::data::{DataHandle, StageInputs, StageOutputs, StageView};
use crate::error::{ExecError, PlatformExecutionError};
use crate::executor::{ExecutorRegistry, PlatformExecutor};
use crate::fail_point;
use crate::metrics::{self, StageEvent};

type StageResult = std::result::Result<StageOutputs, PlatformExecutionError>;

/// How long the scheduler waits for a completion before checking the token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// What a finished schedule leaves behind.
#[derive(Debug)]
pub struct ScheduleOutcome {
    /// In completion order.
    pub reports: Vec<StageReport>,
    /// Data on every cross-stage channel that was produced.
    pub channels: BTreeMap<ExecChannelId, DataHandle>,
    pub result: crate::Result<()>,
}

/// Fail before any dispatch if some stage's platform has no executor.
pub fn check_executors(plan: &ExecutionPlan, executors: &ExecutorRegistry) -> crate::Result<()> {
    match plan.stages().iter().find(|s| !executors.contains(&s.platform)) {
        Some(stage) => Err(ExecError::MissingExecutor(stage.platform.clone())),
        None => Ok(()),
    }
}

struct Dispatch<'a> {
    stages: BTreeMap<StageId, &'a Stage>,
    waiting_on: BTreeMap<StageId, usize>,
    dependents: BTreeMap<StageId, Vec<StageId>>,
    ready: BTreeSet<StageId>,
    in_flight: BTreeSet<StageId>,
    channels: BTreeMap<ExecChannelId, DataHandle>,
    reports: Vec<StageReport>,
    failure: Option<ExecError>,
    cancel_forwarded: bool,
    max_parallel: usize,
}

impl<'a> Dispatch<'a> {
    fn new(plan: &'a ExecutionPlan, max_parallel: usize) -> Self {
        let mut stages = BTreeMap::new();
        let mut waiting_on = BTreeMap::new();
        let mut dependents: BTreeMap<StageId, Vec<StageId>> = BTreeMap::new();
        let mut ready = BTreeSet::new();
        for s in plan.stages() {
            stages.insert(s.id, s);
            waiting_on.insert(s.id, s.depends_on.len());
            for d in &s.depends_on {
                dependents.entry(*d).or_default().push(s.id);
            }
            if s.depends_on.is_empty() {
                ready.insert(s.id);
            }
        }
        Self {
            stages,
            waiting_on,
            dependents,
            ready,
            in_flight: BTreeSet::new(),
            channels: BTreeMap::new(),
            reports: Vec::new(),
            failure: None,
            cancel_forwarded: false,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Next stage to start with its inputs, if dispatch may continue.
    fn next(&mut self, executors: &ExecutorRegistry, cancel: &CancellationToken) -> Option<(&'a Stage, StageInputs)> {
        if self.failure.is_some() || cancel.is_cancelled() || self.in_flight.len() >= self.max_parallel {
            return None;
        }
        let id = self.ready.pop_first()?;
        if let Err(e) = fail_point!("scheduler::dispatch") {
            self.fail(e, executors, cancel);
            return None;
        }
        let stage = self.stages.get(&id).copied()?;

        let mut inputs = StageInputs::new();
        for ch in &stage.inputs {
            match self.channels.get(ch) {
                Some(h) => {
                    inputs.insert(*ch, h.clone());
                }
                None => {
                    let e = Error::Invariant(format!("{id} became ready without data on {ch}"));
                    self.fail(e.into(), executors, cancel);
                    return None;
                }
            }
        }
        self.in_flight.insert(id);

        #[cfg(feature = "tracing")]
        tracing::debug!(stage = %id, platform = %stage.platform, inputs = inputs.len(), "dispatching stage");
        metrics::record(StageEvent::Dispatched {
            stage: id,
            platform: &stage.platform,
            inputs: inputs.len(),
        });

        Some((stage, inputs))
    }

    fn complete(
        &mut self,
        id: StageId,
        started_ms: u64,
        result: StageResult,
        executors: &ExecutorRegistry,
        cancel: &CancellationToken,
    ) {
        self.in_flight.remove(&id);
        let Some(stage) = self.stages.get(&id).copied() else {
            return;
        };

        let outcome = match result {
            Ok(mut outputs) => match stage.outputs.iter().find(|c| !outputs.contains_key(c)) {
                Some(&channel) => {
                    self.fail(ExecError::MissingOutput { stage: id, channel }, executors, cancel);
                    StageOutcome::Failed
                }
                None => {
                    for ch in &stage.outputs {
                        if let Some(h) = outputs.remove(ch) {
                            self.channels.insert(*ch, h);
                        }
                    }
                    for d in self.dependents.get(&id).into_iter().flatten() {
                        if let Some(n) = self.waiting_on.get_mut(d) {
                            *n = n.saturating_sub(1);
                            if *n == 0 {
                                self.ready.insert(*d);
                            }
                        }
                    }
                    StageOutcome::Succeeded
                }
            },
            Err(_) if self.failure.is_some() || cancel.is_cancelled() => StageOutcome::Cancelled,
            Err(source) => {
                let err = ExecError::StageFailed {
                    stage: id,
                    platform: stage.platform.clone(),
                    source,
                };
                self.fail(err, executors, cancel);
                StageOutcome::Failed
            }
        };

        let finished_ms = now_ms();
        metrics::record(StageEvent::Completed {
            stage: id,
            platform: &stage.platform,
            outcome,
            elapsed_ms: finished_ms.saturating_sub(started_ms),
        });
        self.reports.push(StageReport {
            stage: id,
            platform: stage.platform.clone(),
            outcome,
            started_ms,
            finished_ms,
        });
    }

    /// Record the first failure and cancel everything in flight.
    fn fail(&mut self, err: ExecError, executors: &ExecutorRegistry, cancel: &CancellationToken) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %err, in_flight = self.in_flight.len(), "stopping stage dispatch");

        if self.failure.is_none() {
            self.failure = Some(err);
        }
        cancel.cancel();
        self.cancel_in_flight(executors);
    }

    /// Forward a cancel requested through the token, once.
    fn forward_cancel(&mut self, executors: &ExecutorRegistry, cancel: &CancellationToken) {
        if self.cancel_forwarded || !cancel.is_cancelled() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::info!(in_flight = self.in_flight.len(), "job cancelled, cancelling running stages");
        self.cancel_in_flight(executors);
    }

    fn cancel_in_flight(&mut self, executors: &ExecutorRegistry) {
        self.cancel_forwarded = true;
        for id in &self.in_flight {
            let Some(stage) = self.stages.get(id) else {
                continue;
            };
            if let Some(executor) = executors.get(&stage.platform) {
                executor.cancel(*id);
            }
        }
    }

    fn finish(self, cancel: &CancellationToken) -> ScheduleOutcome {
        let succeeded = self
            .reports
            .iter()
            .filter(|r| r.outcome == StageOutcome::Succeeded)
            .count();
        let result = match self.failure {
            Some(e) => Err(e),
            None if cancel.is_cancelled() => Err(ExecError::Cancelled),
            None if succeeded < self.stages.len() => Err(ExecError::Core(Error::Invariant(format!(
                "schedule stalled after {succeeded} of {} stages",
                self.stages.len()
            )))),
            None => Ok(()),
        };
        ScheduleOutcome {
            reports: self.reports,
            channels: self.channels,
            result,
        }
    }
}

/// A panicking executor counts as a failed stage.
fn invoke(
    executor: &dyn PlatformExecutor,
    view: StageView<'_>,
    inputs: StageInputs,
    cancel: &CancellationToken,
) -> StageResult {
    let platform = view.platform().clone();
    catch_unwind(AssertUnwindSafe(|| executor.run(view, inputs, cancel)))
        .unwrap_or_else(|_| Err(PlatformExecutionError::new(platform, "executor panicked")))
}

/// Run every stage of `plan` on scoped worker threads.
pub fn run_stages(
    plan: &ExecutionPlan,
    executors: &ExecutorRegistry,
    max_parallel: usize,
    cancel: &CancellationToken,
) -> ScheduleOutcome {
    let mut dispatch = Dispatch::new(plan, max_parallel);

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(StageId, u64, StageResult)>();
        loop {
            dispatch.forward_cancel(executors, cancel);
            while let Some((stage, inputs)) = dispatch.next(executors, cancel) {
                let Some(executor) = executors.get(&stage.platform).cloned() else {
                    dispatch.in_flight.remove(&stage.id);
                    dispatch.fail(ExecError::MissingExecutor(stage.platform.clone()), executors, cancel);
                    break;
                };
                let tx = tx.clone();
                let cancel = cancel.clone();
                scope.spawn(move || {
                    let started = now_ms();
                    let result = invoke(executor.as_ref(), StageView::new(plan, stage), inputs, &cancel);
                    let _ = tx.send((stage.id, started, result));
                });
            }
            if dispatch.in_flight.is_empty() {
                break;
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok((id, started, result)) => dispatch.complete(id, started, result, executors, cancel),
                Err(RecvTimeoutError::Timeout) => dispatch.forward_cancel(executors, cancel),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    dispatch.finish(cancel)
}

/// Run every stage of `plan` as tokio blocking tasks.
#[cfg(feature = "async-scheduler")]
pub async fn run_stages_async(
    plan: std::sync::Arc<ExecutionPlan>,
    executors: std::sync::Arc<ExecutorRegistry>,
    max_parallel: usize,
    cancel: CancellationToken,
) -> ScheduleOutcome {
    use std::sync::Arc;
    use tokio::task::JoinSet;

    let mut dispatch = Dispatch::new(&plan, max_parallel);
    let mut tasks: JoinSet<(StageId, u64, StageResult)> = JoinSet::new();

    loop {
        dispatch.forward_cancel(&executors, &cancel);
        while let Some((stage, inputs)) = dispatch.next(&executors, &cancel) {
            let id = stage.id;
            let Some(executor) = executors.get(&stage.platform).cloned() else {
                dispatch.in_flight.remove(&id);
                dispatch.fail(ExecError::MissingExecutor(stage.platform.clone()), &executors, &cancel);
                break;
            };
            let plan = Arc::clone(&plan);
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || {
                let started = now_ms();
                let result = match plan.stage(id) {
                    Some(stage) => invoke(executor.as_ref(), StageView::new(&plan, stage), inputs, &cancel),
                    None => Err(PlatformExecutionError::new(executor.platform(), format!("unknown {id}"))),
                };
                (id, started, result)
            });
        }
        if dispatch.in_flight.is_empty() || tasks.is_empty() {
            break;
        }
        let Ok(joined) = tokio::time::timeout(CANCEL_POLL, tasks.join_next()).await else {
            dispatch.forward_cancel(&executors, &cancel);
            continue;
        };
        match joined {
            Some(Ok((id, started, result))) => dispatch.complete(id, started, result, &executors, &cancel),
            Some(Err(e)) => {
                let err = Error::Invariant(format!("stage task aborted: {e}"));
                dispatch.fail(err.into(), &executors, &cancel);
            }
            None => break,
        }
    }

    dispatch.finish(&cancel)
}
