//! Stage partitioning.
//!
//! Operators start in singleton groups. Walking channels in topological
//! order, a producer's group absorbs its consumer's group when both sit on
//! the same platform and the merge keeps the group graph acyclic. Stages are
//! then numbered in topological order of the group graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use xplan_core::prelude::*;
use xplan_mapping::ExecutionOperator;

use crate::physical::ExecChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub id: StageId,
    pub platform: PlatformId,
    /// In topological order.
    pub operators: Vec<ExecOpId>,
    pub internal_channels: Vec<ExecChannelId>,
    /// Channels produced by other stages.
    pub inputs: Vec<ExecChannelId>,
    /// Channels consumed by other stages.
    pub outputs: Vec<ExecChannelId>,
    pub depends_on: BTreeSet<StageId>,
}

impl Stage {
    pub fn contains(&self, op: ExecOpId) -> bool {
        self.operators.contains(&op)
    }
}

pub(crate) fn partition(
    operators: &BTreeMap<ExecOpId, ExecutionOperator>,
    channels: &BTreeMap<ExecChannelId, ExecChannel>,
) -> Result<Vec<Stage>> {
    let order = topo_order(operators.keys().copied(), channels.values().map(|c| (c.producer.op, c.consumer.op)))
        .ok_or_else(|| Error::Invariant("execution plan contains a cycle".into()))?;
    let rank: BTreeMap<ExecOpId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut group: BTreeMap<ExecOpId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut by_flow: Vec<&ExecChannel> = channels.values().collect();
    by_flow.sort_by_key(|c| {
        (
            rank.get(&c.producer.op).copied(),
            rank.get(&c.consumer.op).copied(),
            c.id,
        )
    });

    for ch in by_flow {
        let (Some(&gp), Some(&gc)) = (group.get(&ch.producer.op), group.get(&ch.consumer.op)) else {
            continue;
        };
        if gp == gc {
            continue;
        }
        let same_platform = match (operators.get(&ch.producer.op), operators.get(&ch.consumer.op)) {
            (Some(p), Some(c)) => p.platform == c.platform,
            _ => false,
        };
        if !same_platform {
            continue;
        }
        let mut trial = group.clone();
        for g in trial.values_mut() {
            if *g == gc {
                *g = gp;
            }
        }
        if group_graph_acyclic(&trial, channels) {
            group = trial;
        }
    }

    // Number groups by topological order of the group graph; ties by the
    // earliest operator rank in the group.
    let mut first_rank: BTreeMap<usize, usize> = BTreeMap::new();
    for (op, g) in &group {
        let r = rank.get(op).copied().unwrap_or(usize::MAX);
        let e = first_rank.entry(*g).or_insert(r);
        *e = (*e).min(r);
    }
    let group_edges: Vec<(usize, usize)> = channels
        .values()
        .filter_map(|c| Some((*group.get(&c.producer.op)?, *group.get(&c.consumer.op)?)))
        .filter(|(a, b)| a != b)
        .collect();
    let mut groups: Vec<usize> = first_rank.keys().copied().collect();
    groups.sort_by_key(|g| first_rank.get(g).copied());
    let group_order = topo_order_by(groups, &group_edges, |g| first_rank.get(g).copied().unwrap_or(usize::MAX))
        .ok_or_else(|| Error::Invariant("stage graph contains a cycle".into()))?;
    let stage_of_group: BTreeMap<usize, StageId> = group_order
        .iter()
        .enumerate()
        .map(|(i, g)| (*g, StageId::new(i as u64)))
        .collect();
    let stage_of = |op: ExecOpId| group.get(&op).and_then(|g| stage_of_group.get(g)).copied();

    let mut stages = Vec::with_capacity(group_order.len());
    for g in &group_order {
        let Some(&id) = stage_of_group.get(g) else {
            continue;
        };
        let ops: Vec<ExecOpId> = order.iter().copied().filter(|op| group.get(op) == Some(g)).collect();
        let platform = ops
            .first()
            .and_then(|op| operators.get(op))
            .map(|o| o.platform.clone())
            .ok_or_else(|| Error::Invariant(format!("empty stage {id}")))?;

        let mut stage = Stage {
            id,
            platform,
            operators: ops,
            internal_channels: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            depends_on: BTreeSet::new(),
        };
        for c in channels.values() {
            let (ps, cs) = (stage_of(c.producer.op), stage_of(c.consumer.op));
            match (ps == Some(id), cs == Some(id)) {
                (true, true) => stage.internal_channels.push(c.id),
                (false, true) => {
                    stage.inputs.push(c.id);
                    if let Some(p) = ps {
                        stage.depends_on.insert(p);
                    }
                }
                (true, false) => stage.outputs.push(c.id),
                (false, false) => {}
            }
        }
        stages.push(stage);
    }
    Ok(stages)
}

fn group_graph_acyclic(group: &BTreeMap<ExecOpId, usize>, channels: &BTreeMap<ExecChannelId, ExecChannel>) -> bool {
    let nodes: BTreeSet<usize> = group.values().copied().collect();
    let edges: Vec<(usize, usize)> = channels
        .values()
        .filter_map(|c| Some((*group.get(&c.producer.op)?, *group.get(&c.consumer.op)?)))
        .filter(|(a, b)| a != b)
        .collect();
    topo_order_by(nodes.into_iter().collect(), &edges, |g| *g).is_some()
}

fn topo_order(
    nodes: impl Iterator<Item = ExecOpId>,
    edges: impl Iterator<Item = (ExecOpId, ExecOpId)>,
) -> Option<Vec<ExecOpId>> {
    let edges: Vec<(ExecOpId, ExecOpId)> = edges.collect();
    topo_order_by(nodes.collect(), &edges, |id| id.get() as usize)
}

/// Kahn's algorithm; among ready nodes the smallest `key` goes first.
/// `None` if the graph has a cycle.
fn topo_order_by<N, K>(nodes: Vec<N>, edges: &[(N, N)], key: K) -> Option<Vec<N>>
where
    N: Copy + Ord,
    K: Fn(&N) -> usize,
{
    let mut indegree: BTreeMap<N, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut succ: BTreeMap<N, Vec<N>> = BTreeMap::new();
    for (a, b) in edges {
        *indegree.entry(*b).or_default() += 1;
        succ.entry(*a).or_default().push(*b);
    }
    let mut ready: BTreeSet<(usize, N)> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| (key(n), *n))
        .collect();
    let mut out = Vec::with_capacity(indegree.len());
    while let Some((_, n)) = ready.pop_first() {
        out.push(n);
        for m in succ.get(&n).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(m) {
                *d -= 1;
                if *d == 0 {
                    ready.insert((key(m), *m));
                }
            }
        }
    }
    (out.len() == indegree.len()).then_some(out)
}

/// Check that every stage dependency points to an earlier stage.
pub fn assert_topological(stages: &[Stage]) -> bool {
    let position: BTreeMap<StageId, usize> = stages.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
    stages.iter().enumerate().all(|(i, s)| {
        s.depends_on
            .iter()
            .all(|d| position.get(d).map_or(false, |p| *p < i))
    })
}
