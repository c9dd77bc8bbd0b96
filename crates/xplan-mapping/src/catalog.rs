//! Registered mappings, in registration order.

use std::collections::BTreeSet;

use xplan_core::prelude::*;

use crate::mapping::Mapping;

#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    mappings: Vec<Mapping>,
}

impl MappingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, m: Mapping) {
        self.mappings.push(m);
    }

    pub fn extend(&mut self, ms: impl IntoIterator<Item = Mapping>) {
        self.mappings.extend(ms);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn for_platform<'a>(&'a self, p: &'a PlatformId) -> impl Iterator<Item = &'a Mapping> + 'a {
        self.mappings.iter().filter(move |m| &m.platform == p)
    }

    pub fn platforms(&self) -> BTreeSet<PlatformId> {
        self.mappings.iter().map(|m| m.platform.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
