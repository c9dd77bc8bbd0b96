#![forbid(unsafe_code)]
//! xplan: cross-platform plan mapping, optimization and staged execution.
//!
//! Umbrella over the workspace crates. Most callers want the `prelude`.

pub use xplan_channels as channels;
pub use xplan_core as model;
pub use xplan_exec as exec;
pub use xplan_mapping as mapping;
pub use xplan_planner as planner;

pub mod prelude {
    pub use xplan_channels::{ChannelConversion, ChannelDescriptor, ConversionGraph, ConversionPath};
    pub use xplan_core::prelude::*;
    pub use xplan_exec::{
        CancellationToken, DataHandle, Engine, ExecError, ExecutorRegistry, Job, JobState,
        PlatformExecutionError, PlatformExecutor, StageInputs, StageOutputs, StageView,
    };
    pub use xplan_mapping::{Mapping, MappingCatalog, MappingEngine, OperatorTemplate, SubplanPattern};
    pub use xplan_planner::{ContextBuilder, CostModel, ExecutionPlan, Optimizer, OptimizerContext, Plugin, Stage};
}
