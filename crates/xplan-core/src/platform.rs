//! Platform identities and the process-wide platform registry.
//!
//! The registry is an explicit value built during setup and passed by
//! reference; there is no global instance.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::id::PlatformId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: PlatformId,
    pub name: String,
    /// Execution-operator kinds this platform can host. Empty means any.
    #[serde(default)]
    pub hosted_kinds: BTreeSet<String>,
    /// Free-form resource requirements (e.g. `"memory" -> "4g"`).
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}

impl Platform {
    pub fn new(id: impl Into<PlatformId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hosted_kinds: BTreeSet::new(),
            resources: BTreeMap::new(),
        }
    }

    pub fn hosting<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosted_kinds.extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.insert(key.into(), value.into());
        self
    }

    pub fn can_host(&self, exec_kind: &str) -> bool {
        self.hosted_kinds.is_empty() || self.hosted_kinds.contains(exec_kind)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformRegistry {
    platforms: BTreeMap<PlatformId, Platform>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a platform. Re-registering the same id merges hosted kinds
    /// and resources, so several plugins may contribute to one platform.
    pub fn register(&mut self, platform: Platform) {
        match self.platforms.get_mut(&platform.id) {
            Some(existing) => {
                let widen = existing.hosted_kinds.is_empty() || platform.hosted_kinds.is_empty();
                if widen {
                    existing.hosted_kinds.clear();
                } else {
                    existing.hosted_kinds.extend(platform.hosted_kinds);
                }
                existing.resources.extend(platform.resources);
            }
            None => {
                self.platforms.insert(platform.id.clone(), platform);
            }
        }
    }

    pub fn get(&self, id: &PlatformId) -> Option<&Platform> {
        self.platforms.get(id)
    }

    pub fn contains(&self, id: &PlatformId) -> bool {
        self.platforms.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &PlatformId> {
        self.platforms.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.values()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}
