//! Applies the catalog to a plan and collects per-operator candidates.
//!
//! The engine never chooses between candidates; it only enumerates the
//! feasible ones under the live constraint set.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use xplan_core::prelude::*;

use crate::catalog::MappingCatalog;
use crate::exec_op::ExecutionOperator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Position in `CandidateSet::candidates`.
    pub index: usize,
    pub mapping: String,
    pub exec: ExecutionOperator,
}

impl Candidate {
    pub fn platform(&self) -> &PlatformId {
        &self.exec.platform
    }

    pub fn covers(&self) -> &[OperatorId] {
        &self.exec.covers
    }

    pub fn is_fused(&self) -> bool {
        self.exec.covers.len() > 1
    }
}

/// Candidates in discovery order: mapping registration order, then match
/// order, then factory order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
    by_operator: BTreeMap<OperatorId, Vec<usize>>,
}

impl CandidateSet {
    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Every candidate covering `op`, fused ones included.
    pub fn for_operator(&self, op: OperatorId) -> impl Iterator<Item = &Candidate> {
        self.by_operator
            .get(&op)
            .into_iter()
            .flatten()
            .filter_map(|i| self.candidates.get(*i))
    }

    pub fn platforms(&self) -> BTreeSet<PlatformId> {
        self.candidates.iter().map(|c| c.exec.platform.clone()).collect()
    }

    fn push(&mut self, mapping: &str, exec: ExecutionOperator) {
        let index = self.candidates.len();
        for op in &exec.covers {
            self.by_operator.entry(*op).or_default().push(index);
        }
        self.candidates.push(Candidate {
            index,
            mapping: mapping.to_string(),
            exec,
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MappingEngine;

impl MappingEngine {
    /// Match every mapping on a selectable platform against `plan`.
    ///
    /// Fails with the first operator, in topological order, left without
    /// any candidate.
    pub fn map(
        plan: &Plan,
        catalog: &MappingCatalog,
        registry: &PlatformRegistry,
        constraints: &ConstraintSet,
    ) -> std::result::Result<CandidateSet, NoApplicableMappingError> {
        let mut set = CandidateSet::default();

        for mapping in catalog.iter() {
            if !constraints.is_selectable(&mapping.platform) {
                #[cfg(feature = "tracing")]
                tracing::trace!(mapping = %mapping.name, platform = %mapping.platform, "skipping mapping on unselectable platform");
                continue;
            }
            for m in mapping.pattern.find_matches(plan) {
                for exec in mapping.candidates(plan, &m) {
                    if admissible(plan, registry, constraints, &exec) {
                        set.push(&mapping.name, exec);
                    }
                }
            }
        }

        for id in plan.topological_order() {
            if set.by_operator.get(&id).map_or(true, |c| c.is_empty()) {
                let kind = plan
                    .operator(id)
                    .map(|op| op.kind.clone())
                    .unwrap_or_else(|| OperatorKind::new("unknown"));
                return Err(NoApplicableMappingError {
                    operator: id,
                    kind,
                    considered: constraints.selectable().iter().cloned().collect(),
                });
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            operators = plan.len(),
            candidates = set.len(),
            "mapping engine produced candidates"
        );

        Ok(set)
    }
}

/// Hosting, constraint and target-platform checks for one candidate.
fn admissible(
    plan: &Plan,
    registry: &PlatformRegistry,
    constraints: &ConstraintSet,
    exec: &ExecutionOperator,
) -> bool {
    if exec.covers.is_empty() || !constraints.is_selectable(&exec.platform) {
        return false;
    }
    let hosts = registry
        .get(&exec.platform)
        .map_or(false, |p| p.can_host(&exec.exec_kind));
    if !hosts {
        return false;
    }
    exec.covers.iter().all(|id| {
        plan.operator(*id)
            .map_or(false, |op| op.allows_platform(&exec.platform))
    })
}
