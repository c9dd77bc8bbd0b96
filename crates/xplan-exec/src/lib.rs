#![forbid(unsafe_code)]
//! xplan-exec: job lifecycle, stage scheduling and the platform executor seam.
//!
//! A `Job` optimizes its plan once and dispatches the resulting stages to the
//! `PlatformExecutor` registered for each stage's platform. Stages exchange
//! opaque `DataHandle`s over cross-stage channels; the engine never inspects
//! them.

pub mod cancel;
pub mod data;
pub mod engine;
pub mod error;
pub mod executor;
pub mod failpoints;
pub mod job;
pub mod metrics;
pub mod scheduler;

pub use cancel::CancellationToken;
pub use data::{DataHandle, StageInputs, StageOutputs, StageView};
pub use engine::Engine;
pub use error::{ExecError, PlatformExecutionError, Result};
pub use executor::{ExecutorRegistry, PlatformExecutor};
pub use job::{Job, JobState};
pub use scheduler::{run_stages, ScheduleOutcome};
