//! Convenient re-exports for downstream crates.

pub use crate::config::{
    ConfigSnapshot, Configuration, CostParams, EnumerationStrategy, JoinCardinalityRule,
    PlatformProvider,
};
pub use crate::constraints::ConstraintSet;
pub use crate::cost::{ConstantCost, CostFunction, LinearCost, NLogNCost, SharedCostFunction};
pub use crate::error::{
    Culprit, Error, NoApplicableMappingError, PlanStructureError, Result, UnsatisfiablePlanError,
};
pub use crate::id::{
    ChannelId, DataKind, DataType, ExecChannelId, ExecOpId, JobId, OperatorId, OperatorKind,
    PlatformId, StageId,
};
pub use crate::ops;
pub use crate::plan::{Edge, InputRef, LoopSpec, Operator, OutputRef, Plan};
pub use crate::platform::{Platform, PlatformRegistry};
pub use crate::transform::TransformDescriptor;
