use thiserror::Error;

use xplan_core::error::UnsatisfiablePlanError;
use xplan_core::id::{ExecChannelId, PlatformId, StageId};

/// Error reported by a platform executor for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("platform '{platform}': {message}")]
pub struct PlatformExecutionError {
    pub platform: PlatformId,
    pub message: String,
}

impl PlatformExecutionError {
    pub fn new(platform: impl Into<PlatformId>, message: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] xplan_core::Error),

    #[error("stage {stage} on '{platform}' failed: {source}")]
    StageFailed {
        stage: StageId,
        platform: PlatformId,
        #[source]
        source: PlatformExecutionError,
    },

    #[error("job cancelled")]
    Cancelled,

    #[error("invalid job state: {0}")]
    InvalidState(String),

    #[error("no executor registered for platform '{0}'")]
    MissingExecutor(PlatformId),

    #[error("stage {stage} did not produce channel {channel}")]
    MissingOutput { stage: StageId, channel: ExecChannelId },

    #[error("failpoint triggered: {0}")]
    Failpoint(String),
}

impl ExecError {
    pub fn as_core(&self) -> Option<&xplan_core::Error> {
        match self {
            ExecError::Core(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_unsatisfiable(&self) -> Option<&UnsatisfiablePlanError> {
        self.as_core().and_then(|e| e.as_unsatisfiable())
    }

    /// Stage and platform of a failed stage, if that is what happened.
    pub fn failed_stage(&self) -> Option<(StageId, &PlatformId)> {
        match self {
            ExecError::StageFailed { stage, platform, .. } => Some((*stage, platform)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
