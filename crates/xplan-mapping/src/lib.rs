#![forbid(unsafe_code)]
//! xplan-mapping: from logical operators to platform-bound candidates.
//!
//! Design intent:
//! - Mappings pair a sub-plan pattern with a candidate factory for one platform.
//! - The engine enumerates every admissible candidate; choosing among them
//!   is the planner's job.
//! - Pure and synchronous.

pub mod catalog;
pub mod engine;
pub mod exec_op;
pub mod mapping;
pub mod pattern;

pub use catalog::MappingCatalog;
pub use engine::{Candidate, CandidateSet, MappingEngine};
pub use exec_op::{ExecInput, ExecOutput, ExecRole, ExecutionOperator, OperatorTemplate};
pub use mapping::{CandidateFactory, Mapping, TemplateFactory};
pub use pattern::{OperatorPattern, PatternEdge, PatternError, SubplanMatch, SubplanPattern};
