//! Per-job execution manifest for audit.
//!
//! A job emits one manifest once execution finishes, successful or not.

use serde::{Deserialize, Serialize};

use crate::hash::Hash256;
use crate::id::{JobId, PlatformId, StageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageId,
    pub platform: PlatformId,
    pub outcome: StageOutcome,
    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobManifest {
    pub job: JobId,

    /// Fingerprint of the execution plan that ran.
    pub plan_hash: Hash256,

    pub total_cost: f64,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// In completion order.
    pub stages: Vec<StageReport>,

    pub started_ms: u64,
    pub finished_ms: u64,
}

impl JobManifest {
    pub fn new(job: JobId, plan_hash: Hash256, total_cost: f64, started_ms: u64) -> Self {
        Self {
            job,
            plan_hash,
            total_cost,
            engine_version: crate::VERSION.to_string(),
            stages: Vec::new(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn record(&mut self, report: StageReport) {
        self.stages.push(report);
    }

    pub fn finish(mut self, finished_ms: u64) -> Self {
        self.finished_ms = finished_ms;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.outcome == StageOutcome::Succeeded)
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
