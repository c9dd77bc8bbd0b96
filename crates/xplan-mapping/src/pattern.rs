//! Sub-plan patterns and backtracking subgraph matching.
//!
//! Node 0 is the anchor. Every other node must share an edge with an earlier
//! node, so each node beyond the anchor is reached through an already-bound
//! neighbour while matching.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xplan_core::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern has no nodes")]
    Empty,
    #[error("pattern edge {edge} references node {node}, but only {nodes} nodes exist")]
    NodeOutOfRange {
        edge: usize,
        node: usize,
        nodes: usize,
    },
    #[error("pattern edge {0} is a self loop")]
    SelfLoop(usize),
    #[error("pattern node {0} is not connected to any earlier node")]
    Disconnected(usize),
}

impl From<PatternError> for xplan_core::Error {
    fn from(e: PatternError) -> Self {
        xplan_core::Error::Config(format!("invalid pattern: {e}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorPattern {
    /// Accepted kinds. Empty matches any kind.
    pub kinds: Vec<OperatorKind>,
    #[serde(default)]
    pub input_arity: Option<usize>,
}

impl OperatorPattern {
    pub fn kind(kind: OperatorKind) -> Self {
        Self {
            kinds: vec![kind],
            input_arity: None,
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_input_arity(mut self, arity: usize) -> Self {
        self.input_arity = Some(arity);
        self
    }

    pub fn matches(&self, op: &Operator) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&op.kind))
            && self.input_arity.map_or(true, |n| op.inputs.len() == n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEdge {
    pub from: usize,
    pub out_slot: usize,
    pub to: usize,
    pub in_slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubplanPattern {
    nodes: Vec<OperatorPattern>,
    edges: Vec<PatternEdge>,
}

/// One occurrence of a pattern; `operators[i]` is bound to pattern node `i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubplanMatch {
    pub operators: Vec<OperatorId>,
}

impl SubplanMatch {
    pub fn anchor(&self) -> OperatorId {
        self.operators[0]
    }
}

impl SubplanPattern {
    pub fn new(nodes: Vec<OperatorPattern>, edges: Vec<PatternEdge>) -> xplan_core::Result<Self> {
        if nodes.is_empty() {
            return Err(PatternError::Empty.into());
        }
        for (i, e) in edges.iter().enumerate() {
            for node in [e.from, e.to] {
                if node >= nodes.len() {
                    return Err(PatternError::NodeOutOfRange {
                        edge: i,
                        node,
                        nodes: nodes.len(),
                    }
                    .into());
                }
            }
            if e.from == e.to {
                return Err(PatternError::SelfLoop(i).into());
            }
        }
        for k in 1..nodes.len() {
            let linked = edges
                .iter()
                .any(|e| (e.from == k && e.to < k) || (e.to == k && e.from < k));
            if !linked {
                return Err(PatternError::Disconnected(k).into());
            }
        }
        Ok(Self { nodes, edges })
    }

    pub fn single(kind: OperatorKind) -> Self {
        Self {
            nodes: vec![OperatorPattern::kind(kind)],
            edges: Vec::new(),
        }
    }

    /// Linear chain `kinds[0] -> kinds[1] -> ...` over slot 0.
    pub fn chain(kinds: &[OperatorKind]) -> xplan_core::Result<Self> {
        let nodes = kinds.iter().cloned().map(OperatorPattern::kind).collect();
        let edges = (1..kinds.len())
            .map(|k| PatternEdge {
                from: k - 1,
                out_slot: 0,
                to: k,
                in_slot: 0,
            })
            .collect();
        Self::new(nodes, edges)
    }

    pub fn nodes(&self) -> &[OperatorPattern] {
        &self.nodes
    }

    pub fn edges(&self) -> &[PatternEdge] {
        &self.edges
    }

    pub fn is_single(&self) -> bool {
        self.nodes.len() == 1
    }

    /// All matches in `plan`, anchors in topological order. Matches covering
    /// the same operator set are reported once.
    pub fn find_matches(&self, plan: &Plan) -> Vec<SubplanMatch> {
        let mut out = Vec::new();
        let mut seen: BTreeSet<Vec<OperatorId>> = BTreeSet::new();
        for anchor in plan.topological_order() {
            let Some(op) = plan.operator(anchor) else {
                continue;
            };
            if !self.nodes[0].matches(op) {
                continue;
            }
            let mut binding = vec![anchor];
            self.extend(plan, &mut binding, &mut |m| {
                let mut key = m.to_vec();
                key.sort();
                if seen.insert(key) {
                    out.push(SubplanMatch {
                        operators: m.to_vec(),
                    });
                }
            });
        }
        out
    }

    fn extend(&self, plan: &Plan, binding: &mut Vec<OperatorId>, emit: &mut dyn FnMut(&[OperatorId])) {
        let k = binding.len();
        if k == self.nodes.len() {
            if self.intermediates_contained(plan, binding) && convex(plan, binding) {
                emit(binding);
            }
            return;
        }

        for cand in self.candidates_for(plan, binding, k) {
            if binding.contains(&cand) {
                continue;
            }
            let Some(op) = plan.operator(cand) else {
                continue;
            };
            if !self.nodes[k].matches(op) {
                continue;
            }
            binding.push(cand);
            if self.edges_hold(plan, binding) {
                self.extend(plan, binding, emit);
            }
            binding.pop();
        }
    }

    /// Plan operators adjacent to an already-bound node through the first
    /// pattern edge linking node `k` to an earlier node.
    fn candidates_for(&self, plan: &Plan, binding: &[OperatorId], k: usize) -> Vec<OperatorId> {
        let Some(e) = self
            .edges
            .iter()
            .find(|e| (e.to == k && e.from < k) || (e.from == k && e.to < k))
        else {
            return Vec::new();
        };
        let mut out: Vec<OperatorId> = if e.to == k {
            plan.outbound_edges(binding[e.from])
                .into_iter()
                .filter(|pe| pe.producer.slot == e.out_slot && pe.consumer.slot == e.in_slot)
                .map(|pe| pe.consumer.op)
                .collect()
        } else {
            plan.inbound_edges(binding[e.to])
                .into_iter()
                .filter(|pe| pe.consumer.slot == e.in_slot && pe.producer.slot == e.out_slot)
                .map(|pe| pe.producer.op)
                .collect()
        };
        out.sort();
        out.dedup();
        out
    }

    /// Every pattern edge between bound nodes exists in the plan.
    fn edges_hold(&self, plan: &Plan, binding: &[OperatorId]) -> bool {
        self.edges
            .iter()
            .filter(|e| e.from < binding.len() && e.to < binding.len())
            .all(|e| {
                let out = OutputRef {
                    op: binding[e.from],
                    slot: e.out_slot,
                };
                let to = InputRef {
                    op: binding[e.to],
                    slot: e.in_slot,
                };
                plan.channel_from(out)
                    .map_or(false, |ch| ch.consumers.contains(&to))
            })
    }

    /// Channels carried by pattern edges must not also feed operators
    /// outside the match.
    fn intermediates_contained(&self, plan: &Plan, binding: &[OperatorId]) -> bool {
        self.edges.iter().all(|e| {
            let out = OutputRef {
                op: binding[e.from],
                slot: e.out_slot,
            };
            plan.channel_from(out).map_or(true, |ch| {
                ch.consumers.iter().all(|c| binding.contains(&c.op))
            })
        })
    }
}

/// No path leaves the matched operators and comes back into them. A fused
/// realization of a non-convex match would depend on its own output.
fn convex(plan: &Plan, binding: &[OperatorId]) -> bool {
    let members: BTreeSet<OperatorId> = binding.iter().copied().collect();
    let mut stack: Vec<OperatorId> = binding
        .iter()
        .flat_map(|op| plan.downstream(*op))
        .filter(|d| !members.contains(d))
        .collect();
    let mut seen: BTreeSet<OperatorId> = stack.iter().copied().collect();
    while let Some(op) = stack.pop() {
        for next in plan.downstream(op) {
            if members.contains(&next) {
                return false;
            }
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udf() -> TransformDescriptor {
        TransformDescriptor::unary("f")
    }

    #[test]
    fn rejects_disconnected_pattern() {
        let nodes = vec![OperatorPattern::any(), OperatorPattern::any()];
        assert!(SubplanPattern::new(nodes, vec![]).is_err());
    }

    #[test]
    fn chain_match_requires_contained_intermediate() {
        let mut plan = Plan::new();
        let s = plan.add_operator(ops::source("s")).expect("source");
        let m = plan.add_operator(ops::map("m", udf())).expect("map");
        let f = plan.add_operator(ops::filter("f", udf())).expect("filter");
        let k = plan.add_operator(ops::sink("k")).expect("sink");
        plan.connect(s, 0, m, 0).expect("s->m");
        plan.connect(m, 0, f, 0).expect("m->f");
        plan.connect(f, 0, k, 0).expect("f->k");

        let p = SubplanPattern::chain(&[OperatorKind::MAP, OperatorKind::FILTER]).expect("pattern");
        assert_eq!(p.find_matches(&plan), vec![SubplanMatch { operators: vec![m, f] }]);

        // A second consumer of the map output makes the intermediate escape.
        let k2 = plan.add_operator(ops::sink("k2")).expect("sink");
        plan.connect(m, 0, k2, 0).expect("fan-out");
        assert!(p.find_matches(&plan).is_empty());
    }

    #[test]
    fn match_around_an_outside_detour_is_rejected() {
        // sp.0 -> j.0 directly, sp.1 -> m -> j.1 around the would-be fusion.
        let split = OperatorKind::new("split");
        let mut plan = Plan::new();
        let src = plan.add_operator(ops::source("src")).expect("source");
        let sp = plan
            .add_operator(
                Operator::new(split.clone(), "sp")
                    .with_input("in", DataType::ANY)
                    .with_output("left", DataType::ANY)
                    .with_output("right", DataType::ANY),
            )
            .expect("split");
        let m = plan.add_operator(ops::map("m", udf())).expect("map");
        let j = plan.add_operator(ops::join("j")).expect("join");
        plan.connect(src, 0, sp, 0).expect("src->sp");
        plan.connect(sp, 0, j, 0).expect("sp->j");
        plan.connect(sp, 1, m, 0).expect("sp->m");
        plan.connect(m, 0, j, 1).expect("m->j");

        let p = SubplanPattern::chain(&[split, OperatorKind::JOIN]).expect("pattern");
        assert!(p.find_matches(&plan).is_empty());
    }
}
