//! Optimizer and execution configuration that downstream crates can
//! serialize/deserialize.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::PlatformId;

/// Administrator-imposed platform policy. The blacklist always dominates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProvider {
    #[serde(default)]
    pub whitelist: BTreeSet<PlatformId>,
    #[serde(default)]
    pub blacklist: BTreeSet<PlatformId>,
}

impl PlatformProvider {
    pub fn add_to_whitelist(&mut self, p: impl Into<PlatformId>) {
        self.whitelist.insert(p.into());
    }

    pub fn add_to_blacklist(&mut self, p: impl Into<PlatformId>) {
        self.blacklist.insert(p.into());
    }

    pub fn whitelist(&self) -> &BTreeSet<PlatformId> {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &BTreeSet<PlatformId> {
        &self.blacklist
    }
}

/// Rule used to estimate the output cardinality of a two-input join.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum JoinCardinalityRule {
    /// `sqrt(left * right)`, capped by the smaller input.
    SqrtProduct,
    /// The larger input.
    MaxInput,
    /// `factor * left * right`.
    ScaledProduct { factor: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostParams {
    /// Cardinality assumed for sources that declare none.
    pub default_source_cardinality: u64,
    /// Selectivity for filters that declare none, in `[0, 1]`.
    pub filter_selectivity: f64,
    pub join_rule: JoinCardinalityRule,
    /// Output/input ratio for reduce-by and group-by.
    pub group_ratio: f64,
    pub distinct_ratio: f64,
    pub flat_map_expansion: f64,
    /// Iterations assumed for loops that declare no expectation.
    pub loop_iterations: u32,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            default_source_cardinality: 1_000,
            filter_selectivity: 0.5,
            join_rule: JoinCardinalityRule::SqrtProduct,
            group_ratio: 0.1,
            distinct_ratio: 0.5,
            flat_map_expansion: 2.0,
            loop_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationStrategy {
    /// Exhaustive below `exhaustive_cutover` combinations, frontier DP above.
    Auto,
    Exhaustive,
    FrontierDp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationConfig {
    pub strategy: EnumerationStrategy,
    /// Largest raw candidate product searched exhaustively under `Auto`.
    pub exhaustive_cutover: u64,
    /// Upper bound on frontier states kept after each position.
    pub max_frontier_states: usize,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            strategy: EnumerationStrategy::Auto,
            exhaustive_cutover: 256,
            max_frontier_states: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Stages allowed in flight at once. The scheduler must respect this.
    pub max_parallel_stages: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel_stages: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub platforms: PlatformProvider,
    #[serde(default)]
    pub cost: CostParams,
    #[serde(default)]
    pub enumeration: EnumerationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Configuration {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `XPLAN_WHITELIST`: comma-separated platform ids
    /// - `XPLAN_BLACKLIST`: comma-separated platform ids
    /// - `XPLAN_FILTER_SELECTIVITY`: default filter selectivity
    /// - `XPLAN_DEFAULT_SOURCE_CARDINALITY`: cardinality for undeclared sources
    /// - `XPLAN_EXHAUSTIVE_CUTOVER`: largest product searched exhaustively
    /// - `XPLAN_MAX_PARALLEL_STAGES`: max stages in flight
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("XPLAN_WHITELIST") {
            for p in split_list(&s) {
                cfg.platforms.add_to_whitelist(p);
            }
        }

        if let Ok(s) = std::env::var("XPLAN_BLACKLIST") {
            for p in split_list(&s) {
                cfg.platforms.add_to_blacklist(p);
            }
        }

        if let Ok(s) = std::env::var("XPLAN_FILTER_SELECTIVITY") {
            if let Ok(v) = s.parse::<f64>() {
                if (0.0..=1.0).contains(&v) {
                    cfg.cost.filter_selectivity = v;
                }
            }
        }

        if let Ok(s) = std::env::var("XPLAN_DEFAULT_SOURCE_CARDINALITY") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.cost.default_source_cardinality = v;
            }
        }

        if let Ok(s) = std::env::var("XPLAN_EXHAUSTIVE_CUTOVER") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.enumeration.exhaustive_cutover = v;
            }
        }

        if let Ok(s) = std::env::var("XPLAN_MAX_PARALLEL_STAGES") {
            if let Ok(v) = s.parse::<usize>() {
                if v > 0 {
                    cfg.execution.max_parallel_stages = v;
                }
            }
        }

        cfg
    }

    pub fn whitelist(&self) -> &BTreeSet<PlatformId> {
        self.platforms.whitelist()
    }

    pub fn blacklist(&self) -> &BTreeSet<PlatformId> {
        self.platforms.blacklist()
    }

    /// Freeze the current contents. Later mutation of `self` does not affect
    /// the snapshot.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot(Arc::new(self.clone()))
    }
}

fn split_list(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Immutable, cheaply clonable configuration owned by a job.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot(Arc<Configuration>);

impl Deref for ConfigSnapshot {
    type Target = Configuration;

    fn deref(&self) -> &Configuration {
        &self.0
    }
}

impl From<Configuration> for ConfigSnapshot {
    fn from(c: Configuration) -> Self {
        ConfigSnapshot(Arc::new(c))
    }
}
