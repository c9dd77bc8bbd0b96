//! The seam between the coordinator and concrete execution platforms.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use xplan_core::prelude::*;

use crate::cancel::CancellationToken;
use crate::data::{StageInputs, StageOutputs, StageView};
use crate::error::PlatformExecutionError;

/// Runs whole stages on one platform.
///
/// `run` may be called from a worker thread, concurrently for independent
/// stages. Implementations should poll `cancel` at convenient points.
pub trait PlatformExecutor: Send + Sync {
    fn platform(&self) -> PlatformId;

    fn run(
        &self,
        stage: StageView<'_>,
        inputs: StageInputs,
        cancel: &CancellationToken,
    ) -> std::result::Result<StageOutputs, PlatformExecutionError>;

    /// Called when another stage failed while `stage` is in flight.
    fn cancel(&self, _stage: StageId) {}
}

#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: BTreeMap<PlatformId, Arc<dyn PlatformExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the executor's own platform id, replacing any previous one.
    pub fn register<E: PlatformExecutor + 'static>(&mut self, executor: E) -> &mut Self {
        self.register_shared(Arc::new(executor))
    }

    pub fn register_shared(&mut self, executor: Arc<dyn PlatformExecutor>) -> &mut Self {
        self.executors.insert(executor.platform(), executor);
        self
    }

    pub fn with<E: PlatformExecutor + 'static>(mut self, executor: E) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, platform: &PlatformId) -> Option<&Arc<dyn PlatformExecutor>> {
        self.executors.get(platform)
    }

    pub fn contains(&self, platform: &PlatformId) -> bool {
        self.executors.contains_key(platform)
    }

    pub fn platforms(&self) -> impl Iterator<Item = &PlatformId> {
        self.executors.keys()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("platforms", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
