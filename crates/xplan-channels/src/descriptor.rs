use std::fmt;

use serde::{Deserialize, Serialize};
use xplan_core::prelude::*;

/// A node of the conversion graph: data kind as materialized on a platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub kind: DataKind,
    pub platform: PlatformId,
}

impl ChannelDescriptor {
    pub fn new(kind: impl Into<DataKind>, platform: impl Into<PlatformId>) -> Self {
        Self {
            kind: kind.into(),
            platform: platform.into(),
        }
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.platform)
    }
}
