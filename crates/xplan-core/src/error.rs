use std::fmt;

use thiserror::Error;

use crate::id::{ChannelId, OperatorId, OperatorKind, PlatformId};

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed logical plan. Always a caller bug, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanStructureError {
    #[error("unknown operator {0}")]
    UnknownOperator(OperatorId),

    #[error("operator {op} ({kind}) has no input slot {slot}")]
    NoSuchInputSlot {
        op: OperatorId,
        kind: OperatorKind,
        slot: usize,
    },

    #[error("operator {op} ({kind}) has no output slot {slot}")]
    NoSuchOutputSlot {
        op: OperatorId,
        kind: OperatorKind,
        slot: usize,
    },

    #[error("input slot {slot} of operator {op} ({kind}) already has {arity} inbound channel(s)")]
    ArityExceeded {
        op: OperatorId,
        kind: OperatorKind,
        slot: usize,
        arity: usize,
    },

    #[error("connecting {producer} -> {consumer} would create a cycle")]
    Cycle {
        producer: OperatorId,
        consumer: OperatorId,
    },

    #[error("data type mismatch on {producer} -> {consumer}: producer emits '{produced}', consumer expects '{expected}'")]
    TypeMismatch {
        producer: OperatorId,
        consumer: OperatorId,
        produced: String,
        expected: String,
    },

    #[error("input slot {slot} of operator {op} ({kind}) is not connected")]
    UnconnectedInput {
        op: OperatorId,
        kind: OperatorKind,
        slot: usize,
    },

    #[error("plan has no operators")]
    EmptyPlan,

    #[error("loop operator {op}: {reason}")]
    InvalidLoop { op: OperatorId, reason: String },
}

/// An operator kind without any mapping on a selectable platform.
/// Reported at plan-validation time, before enumeration starts.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no applicable mapping for operator {operator} of kind '{kind}' (selectable platforms: [{}])", join_platforms(.considered))]
pub struct NoApplicableMappingError {
    pub operator: OperatorId,
    pub kind: OperatorKind,
    /// Selectable platforms that were consulted.
    pub considered: Vec<PlatformId>,
}

fn join_platforms(ps: &[PlatformId]) -> String {
    ps.iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The first offending element of an unsatisfiable plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Culprit {
    Operator {
        id: OperatorId,
        kind: OperatorKind,
    },
    Edge {
        channel: ChannelId,
        producer: OperatorId,
        consumer: OperatorId,
        consumer_slot: usize,
    },
}

impl Culprit {
    pub fn operator(&self) -> Option<OperatorId> {
        match self {
            Culprit::Operator { id, .. } => Some(*id),
            Culprit::Edge { .. } => None,
        }
    }
}

impl fmt::Display for Culprit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Culprit::Operator { id, kind } => write!(f, "operator {id} ({kind})"),
            Culprit::Edge {
                channel,
                producer,
                consumer,
                consumer_slot,
            } => write!(
                f,
                "edge {channel} from {producer} to input {consumer_slot} of {consumer}"
            ),
        }
    }
}

/// No candidate combination survives the live constraints.
///
/// This is an expected, user-triggerable outcome (e.g. blacklisting a platform
/// the plan needs) and is kept distinct from internal defects.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unsatisfiable plan at {culprit}: {reason}")]
pub struct UnsatisfiablePlanError {
    pub culprit: Culprit,
    pub reason: String,
    #[source]
    pub cause: Option<NoApplicableMappingError>,
}

impl UnsatisfiablePlanError {
    pub fn at(culprit: Culprit, reason: impl Into<String>) -> Self {
        Self {
            culprit,
            reason: reason.into(),
            cause: None,
        }
    }
}

impl From<NoApplicableMappingError> for UnsatisfiablePlanError {
    fn from(e: NoApplicableMappingError) -> Self {
        Self {
            culprit: Culprit::Operator {
                id: e.operator,
                kind: e.kind.clone(),
            },
            reason: "no candidate execution operator on any selectable platform".into(),
            cause: Some(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    PlanStructure(#[from] PlanStructureError),

    #[error(transparent)]
    NoApplicableMapping(#[from] NoApplicableMappingError),

    #[error(transparent)]
    Unsatisfiable(#[from] UnsatisfiablePlanError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    /// Error with context chain for better debugging
    #[error("Error in {context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error, creating an error chain.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Outermost error after peeling off context layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Caller-triggerable outcomes (bad plans, unsatisfiable constraints,
    /// bad configuration) as opposed to internal defects.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.root(),
            Error::PlanStructure(_)
                | Error::NoApplicableMapping(_)
                | Error::Unsatisfiable(_)
                | Error::Config(_)
                | Error::Codec(_)
        )
    }

    /// True for both mapping failures and enumeration failures.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(
            self.root(),
            Error::NoApplicableMapping(_) | Error::Unsatisfiable(_)
        )
    }

    pub fn as_unsatisfiable(&self) -> Option<&UnsatisfiablePlanError> {
        match self.root() {
            Error::Unsatisfiable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
