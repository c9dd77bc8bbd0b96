#![forbid(unsafe_code)]
//! xplan-planner: from a logical plan and candidates to one minimum-cost
//! execution plan cut into platform-homogeneous stages.
//!
//! Design:
//! - Cardinalities are propagated forward with per-kind rules (`cardinality`).
//! - Operator costs resolve per platform and execution kind (`cost`).
//! - Plugins populate a shared, read-only `OptimizerContext` (`context`).
//! - `enumerate` searches candidate combinations, closing crossing edges
//!   through the conversion graph; `physical` materializes the winner and
//!   `stage` partitions it.

pub mod cardinality;
pub mod context;
pub mod cost;
mod enumerate;
pub mod explain;
pub mod optimizer;
pub mod physical;
pub mod stage;

pub use cardinality::{CardinalityEstimates, CardinalityEstimator};
pub use context::{ConfigureHook, ContextBuilder, OptimizerContext, Plugin};
pub use cost::CostModel;
pub use optimizer::Optimizer;
pub use physical::{ExecChannel, ExecutionPlan, PortRef};
pub use stage::{assert_topological, Stage};
