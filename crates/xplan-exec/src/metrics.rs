//! Stage lifecycle events for tracing subscribers.
//!
//! Events go to the `xplan::metrics` target at TRACE level. Exporters
//! (OpenTelemetry, Prometheus) belong in the embedding binary.

use xplan_core::id::{PlatformId, StageId};
use xplan_core::manifest::StageOutcome;

#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    Dispatched {
        stage: StageId,
        platform: &'a PlatformId,
        inputs: usize,
    },
    Completed {
        stage: StageId,
        platform: &'a PlatformId,
        outcome: StageOutcome,
        elapsed_ms: u64,
    },
}

#[cfg(feature = "tracing")]
pub fn record(event: StageEvent<'_>) {
    match event {
        StageEvent::Dispatched { stage, platform, inputs } => {
            tracing::trace!(target: "xplan::metrics", %stage, %platform, inputs, "stage_dispatch");
        }
        StageEvent::Completed {
            stage,
            platform,
            outcome,
            elapsed_ms,
        } => {
            tracing::trace!(
                target: "xplan::metrics",
                %stage,
                %platform,
                outcome = ?outcome,
                elapsed_ms,
                "stage_complete"
            );
        }
    }
}

#[cfg(not(feature = "tracing"))]
pub fn record(_event: StageEvent<'_>) {}
