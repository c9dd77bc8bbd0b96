//! Forward cardinality propagation with per-kind estimation rules.
//!
//! Estimates are advisory: they steer which plan is cheapest, never whether
//! a plan is valid.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xplan_core::config::{CostParams, JoinCardinalityRule};
use xplan_core::prelude::*;

/// `(operator, per-slot input cardinalities, tuning) -> output cardinality`.
pub type EstimateFn = Arc<dyn Fn(&Operator, &[u64], &CostParams) -> u64 + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardinalityEstimates {
    outputs: BTreeMap<OperatorId, u64>,
    inputs: BTreeMap<OperatorId, Vec<u64>>,
}

impl CardinalityEstimates {
    pub fn output(&self, op: OperatorId) -> u64 {
        self.outputs.get(&op).copied().unwrap_or(0)
    }

    /// Cardinality arriving at `input`, summed over its channels.
    pub fn input(&self, input: InputRef) -> u64 {
        self.inputs
            .get(&input.op)
            .and_then(|v| v.get(input.slot))
            .copied()
            .unwrap_or(0)
    }

    pub fn outputs(&self) -> &BTreeMap<OperatorId, u64> {
        &self.outputs
    }
}

#[derive(Clone)]
pub struct CardinalityEstimator {
    rules: BTreeMap<OperatorKind, EstimateFn>,
}

impl fmt::Debug for CardinalityEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardinalityEstimator")
            .field("kinds", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for CardinalityEstimator {
    fn default() -> Self {
        let mut e = Self {
            rules: BTreeMap::new(),
        };
        e.register(OperatorKind::SOURCE, |op, _, p| {
            op.params.cardinality.unwrap_or(p.default_source_cardinality)
        });
        e.register(OperatorKind::FILTER, |op, i, p| {
            let sel = op.params.selectivity.unwrap_or(p.filter_selectivity);
            scale(total(i), sel.clamp(0.0, 1.0))
        });
        e.register(OperatorKind::JOIN, |_, i, p| join(first(i), second(i), p.join_rule));
        e.register(OperatorKind::CARTESIAN, |_, i, _| {
            first(i).saturating_mul(second(i))
        });
        e.register(OperatorKind::INTERSECT, |_, i, _| first(i).min(second(i)));
        e.register(OperatorKind::REDUCE_BY, |_, i, p| {
            scale(total(i), p.group_ratio).max(1)
        });
        e.register(OperatorKind::GROUP_BY, |_, i, p| {
            scale(total(i), p.group_ratio).max(1)
        });
        e.register(OperatorKind::CO_GROUP, |_, i, p| {
            scale(total(i), p.group_ratio).max(1)
        });
        e.register(OperatorKind::DISTINCT, |_, i, p| {
            scale(total(i), p.distinct_ratio).max(1)
        });
        e.register(OperatorKind::FLAT_MAP, |_, i, p| {
            scale(total(i), p.flat_map_expansion)
        });
        e.register(OperatorKind::COUNT, |_, _, _| 1);
        e.register(OperatorKind::GLOBAL_REDUCE, |_, _, _| 1);
        e.register(OperatorKind::UNION, |_, i, _| total(i));
        e.register(OperatorKind::SAMPLE, |op, i, _| {
            let n = total(i);
            match (op.params.cardinality, op.params.selectivity) {
                (Some(size), _) => n.min(size),
                (None, Some(sel)) => scale(n, sel.clamp(0.0, 1.0)),
                (None, None) => n,
            }
        });
        e
    }
}

impl CardinalityEstimator {
    /// Install or replace the rule for `kind`.
    pub fn register<F>(&mut self, kind: OperatorKind, f: F)
    where
        F: Fn(&Operator, &[u64], &CostParams) -> u64 + Send + Sync + 'static,
    {
        self.rules.insert(kind, Arc::new(f));
    }

    pub fn estimate(&self, plan: &Plan, params: &CostParams) -> CardinalityEstimates {
        self.estimate_with(plan, params, &BTreeMap::new())
    }

    /// Like `estimate`, with fixed output cardinalities for some operators
    /// (used to feed a loop body its entry cardinality).
    pub fn estimate_with(
        &self,
        plan: &Plan,
        params: &CostParams,
        fixed: &BTreeMap<OperatorId, u64>,
    ) -> CardinalityEstimates {
        let mut est = CardinalityEstimates::default();
        for id in plan.topological_order() {
            let Some(op) = plan.operator(id) else {
                continue;
            };
            let mut inputs = vec![0u64; op.inputs.len()];
            for e in plan.inbound_edges(id) {
                if let Some(slot) = inputs.get_mut(e.consumer.slot) {
                    *slot = slot.saturating_add(est.output(e.producer.op));
                }
            }
            let out = match fixed.get(&id) {
                Some(n) => *n,
                None => self.rule_output(op, &inputs, params),
            };
            est.outputs.insert(id, out);
            est.inputs.insert(id, inputs);
        }
        est
    }

    fn rule_output(&self, op: &Operator, inputs: &[u64], params: &CostParams) -> u64 {
        match self.rules.get(&op.kind) {
            Some(rule) => rule(op, inputs, params),
            None if inputs.is_empty() => {
                op.params.cardinality.unwrap_or(params.default_source_cardinality)
            }
            // Pass-through: map, sort, sink, loop, zip_with_id, ...
            None => first(inputs),
        }
    }
}

fn scale(n: u64, factor: f64) -> u64 {
    // f64 -> u64 casts saturate.
    (n as f64 * factor).round() as u64
}

fn total(i: &[u64]) -> u64 {
    i.iter().fold(0u64, |a, b| a.saturating_add(*b))
}

fn first(i: &[u64]) -> u64 {
    i.first().copied().unwrap_or(0)
}

fn second(i: &[u64]) -> u64 {
    i.get(1).copied().unwrap_or(0)
}

fn join(l: u64, r: u64, rule: JoinCardinalityRule) -> u64 {
    match rule {
        JoinCardinalityRule::SqrtProduct => {
            let s = (l as f64 * r as f64).sqrt() as u64;
            s.max(1).min(l.min(r))
        }
        JoinCardinalityRule::MaxInput => l.max(r),
        JoinCardinalityRule::ScaledProduct { factor } => {
            (l as f64 * r as f64 * factor.max(0.0)).round() as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_join_is_capped_by_smaller_input() {
        assert_eq!(join(100, 10_000, JoinCardinalityRule::SqrtProduct), 100);
        assert_eq!(join(400, 100, JoinCardinalityRule::SqrtProduct), 100);
        assert_eq!(join(0, 50, JoinCardinalityRule::SqrtProduct), 0);
    }
}
