//! Plan enumeration: choose one candidate per logical operator and close
//! every crossing edge with a conversion path, at minimum total cost.
//!
//! Operators are visited in topological order. A candidate is *anchored* at
//! the first position it covers; fused candidates bind later positions too.
//! Edges are closed at their consumer's position. Consumers of the same
//! producer port share conversion operators along the common prefix of their
//! paths, so each edge is charged only for the steps no earlier consumer of
//! that port already paid for. A fused candidate is only
//! bound if contracting it with the fused candidates already bound keeps the
//! graph acyclic.
//!
//! Two strategies share that skeleton:
//! - exhaustive depth-first search with cost bound, used when the product
//!   of per-position anchored candidate counts is at most the cutover;
//! - frontier dynamic programming: after each position, partial plans are
//!   keyed by the bindings that can still influence the future (positions
//!   bound ahead of time by fusion, and positions with an edge into the
//!   unprocessed suffix); one partial survives per key.
//!
//! Both order solutions by `(cost, binding vector)`, so they agree whenever
//! the arithmetic is exact.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use xplan_channels::{ChannelDescriptor, ConversionPath};
use xplan_core::config::{Configuration, EnumerationStrategy};
use xplan_core::cost::sanitize;
use xplan_core::prelude::*;
use xplan_mapping::{CandidateSet, ExecutionOperator};

use crate::cardinality::CardinalityEstimates;
use crate::context::OptimizerContext;
use crate::optimizer::optimize_in;
use crate::physical::{Chosen, ClosedEdge, ExecutionPlan, Selection};

/// A candidate that survived preparation.
#[derive(Debug, Clone)]
struct Prepared {
    exec: ExecutionOperator,
    covers: Vec<usize>,
    cost: f64,
    loop_body: Option<ExecutionPlan>,
}

#[derive(Debug, Clone)]
struct EdgeSlot {
    edge: Edge,
    producer_pos: usize,
    cardinality: u64,
}

/// Result of trying to close one edge between two prepared candidates.
#[derive(Debug, Clone)]
enum Closure {
    Internal,
    Path {
        out_port: usize,
        in_port: usize,
        path: ConversionPath,
    },
    Unsatisfiable(String),
}

type Binding = Vec<Option<usize>>;

#[derive(Debug, Clone)]
struct State {
    cost: f64,
    binding: Binding,
}

impl State {
    fn rank(&self, other: &State) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.binding.cmp(&other.binding))
    }
}

pub(crate) struct Enumerator<'a> {
    plan: &'a Plan,
    ctx: &'a OptimizerContext,
    config: &'a Configuration,
    constraints: &'a ConstraintSet,
    est: &'a CardinalityEstimates,
    order: Vec<OperatorId>,
    prepared: Vec<Prepared>,
    anchored: Vec<Vec<usize>>,
    covering: Vec<Vec<usize>>,
    inbound: Vec<Vec<EdgeSlot>>,
    /// Per edge slot, the earlier edge slots reading the same producer port.
    siblings: Vec<Vec<Vec<(usize, usize)>>>,
    /// Last position that still needs the binding of each position.
    last_use: Vec<usize>,
    closures: BTreeMap<(usize, usize, usize, usize), Closure>,
    dropped: BTreeMap<OperatorId, String>,
}

impl<'a> Enumerator<'a> {
    pub(crate) fn new(
        plan: &'a Plan,
        ctx: &'a OptimizerContext,
        config: &'a Configuration,
        constraints: &'a ConstraintSet,
        est: &'a CardinalityEstimates,
        candidates: &CandidateSet,
    ) -> Self {
        let order = plan.topological_order();
        let pos: BTreeMap<OperatorId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let n = order.len();

        let mut inbound: Vec<Vec<EdgeSlot>> = vec![Vec::new(); n];
        let mut siblings: Vec<Vec<Vec<(usize, usize)>>> = vec![Vec::new(); n];
        let mut readers: BTreeMap<OutputRef, Vec<(usize, usize)>> = BTreeMap::new();
        let mut last_use: Vec<usize> = (0..n).collect();
        for (i, id) in order.iter().enumerate() {
            for edge in plan.inbound_edges(*id) {
                let Some(&p) = pos.get(&edge.producer.op) else {
                    continue;
                };
                last_use[p] = last_use[p].max(i);
                let earlier = readers.entry(edge.producer).or_default();
                siblings[i].push(earlier.clone());
                earlier.push((i, inbound[i].len()));
                inbound[i].push(EdgeSlot {
                    edge,
                    producer_pos: p,
                    cardinality: est.output(edge.producer.op),
                });
            }
        }
        // A reader's choice prices the later readers of the same port.
        for group in readers.values() {
            let Some(&(last, _)) = group.last() else {
                continue;
            };
            for &(q, _) in group {
                last_use[q] = last_use[q].max(last);
            }
        }

        let mut e = Self {
            plan,
            ctx,
            config,
            constraints,
            est,
            order,
            prepared: Vec::new(),
            anchored: vec![Vec::new(); n],
            covering: vec![Vec::new(); n],
            inbound,
            siblings,
            last_use,
            closures: BTreeMap::new(),
            dropped: BTreeMap::new(),
        };
        e.prepare(candidates, &pos);
        e
    }

    fn prepare(&mut self, candidates: &CandidateSet, pos: &BTreeMap<OperatorId, usize>) {
        let mut bodies: BTreeMap<(OperatorId, PlatformId), std::result::Result<ExecutionPlan, String>> =
            BTreeMap::new();

        for cand in candidates.iter() {
            let exec = &cand.exec;
            let anchor_op = exec.covers.first().copied();
            let reject = |dropped: &mut BTreeMap<OperatorId, String>, why: String| {
                if let Some(op) = anchor_op {
                    dropped.entry(op).or_insert(why);
                }
            };

            // Unselectable platforms never enter the search space.
            if !self.constraints.is_selectable(&exec.platform) {
                reject(&mut self.dropped, format!("platform '{}' is not selectable", exec.platform));
                continue;
            }
            let mut covers: Vec<usize> = exec.covers.iter().filter_map(|op| pos.get(op).copied()).collect();
            if covers.len() != exec.covers.len() || covers.is_empty() {
                continue;
            }
            covers.sort_unstable();
            let members: BTreeSet<OperatorId> = exec.covers.iter().copied().collect();

            if let Some(why) = self.missing_port(exec, &members) {
                #[cfg(feature = "tracing")]
                tracing::debug!(candidate = %exec.name, reason = %why, "dropping candidate");
                reject(&mut self.dropped, why);
                continue;
            }

            let (input, output) = self.boundary_cardinalities(exec);
            let mut cost = self.ctx.cost_model().operator_cost(exec, input, output);

            let mut loop_body = None;
            let loop_ops: Vec<OperatorId> = exec
                .covers
                .iter()
                .copied()
                .filter(|id| self.plan.operator(*id).map_or(false, |o| o.loop_spec.is_some()))
                .collect();
            if let Some(&loop_op) = loop_ops.first() {
                if exec.covers.len() != 1 {
                    reject(&mut self.dropped, "loop operators cannot be fused".into());
                    continue;
                }
                let key = (loop_op, exec.platform.clone());
                if !bodies.contains_key(&key) {
                    let body = self.optimize_body(loop_op, &exec.platform);
                    bodies.insert(key.clone(), body);
                }
                match bodies.get(&key) {
                    Some(Ok(body)) => {
                        let iterations = self.iterations(loop_op);
                        cost += body.total_cost() * f64::from(iterations);
                        loop_body = Some(body.clone());
                    }
                    Some(Err(why)) => {
                        reject(&mut self.dropped, why.clone());
                        continue;
                    }
                    None => continue,
                }
            }

            let idx = self.prepared.len();
            self.anchored[covers[0]].push(idx);
            for p in &covers {
                self.covering[*p].push(idx);
            }
            self.prepared.push(Prepared {
                exec: exec.clone(),
                covers,
                cost: sanitize(cost),
                loop_body,
            });
        }
    }

    /// Every edge crossing the candidate's boundary needs a port.
    fn missing_port(&self, exec: &ExecutionOperator, members: &BTreeSet<OperatorId>) -> Option<String> {
        for op in &exec.covers {
            for e in self.plan.inbound_edges(*op) {
                if !members.contains(&e.producer.op) && exec.input_for(e.consumer).is_none() {
                    return Some(format!("'{}' exposes no input for slot {} of {}", exec.name, e.consumer.slot, op));
                }
            }
            for e in self.plan.outbound_edges(*op) {
                if !members.contains(&e.consumer.op) && exec.output_for(e.producer).is_none() {
                    return Some(format!("'{}' exposes no output for slot {} of {}", exec.name, e.producer.slot, op));
                }
            }
        }
        None
    }

    fn boundary_cardinalities(&self, exec: &ExecutionOperator) -> (u64, u64) {
        let input = exec
            .inputs
            .iter()
            .filter_map(|i| i.logical)
            .fold(0u64, |acc, r| acc.saturating_add(self.est.input(r)));
        let output = exec
            .outputs
            .iter()
            .filter_map(|o| o.logical)
            .fold(0u64, |acc, r| acc.saturating_add(self.est.output(r.op)));
        (input, output)
    }

    fn iterations(&self, loop_op: OperatorId) -> u32 {
        let fallback = self.config.cost.loop_iterations;
        self.plan
            .operator(loop_op)
            .and_then(|o| o.loop_spec.as_deref())
            .map_or(fallback, |spec| spec.planned_iterations(fallback))
    }

    fn optimize_body(&self, loop_op: OperatorId, platform: &PlatformId) -> std::result::Result<ExecutionPlan, String> {
        let spec = self
            .plan
            .operator(loop_op)
            .and_then(|o| o.loop_spec.as_deref())
            .ok_or_else(|| "loop operator without body".to_string())?;
        let entry_cardinality = self.est.input(InputRef { op: loop_op, slot: 0 });
        let fixed: BTreeMap<OperatorId, u64> = spec
            .body
            .sources()
            .into_iter()
            .map(|s| (s, entry_cardinality))
            .collect();
        let pinned = self.constraints.restrict_to(platform);
        optimize_in(&spec.body, self.ctx, self.config, &pinned, &fixed)
            .map_err(|e| format!("loop body cannot run on '{platform}': {e}"))
    }

    /// Raw product of anchored candidate counts, saturating.
    fn search_space(&self) -> u64 {
        self.anchored
            .iter()
            .filter(|a| !a.is_empty())
            .fold(1u64, |acc, a| acc.saturating_mul(a.len() as u64))
    }

    pub(crate) fn run(mut self) -> std::result::Result<Selection, UnsatisfiablePlanError> {
        let strategy = match self.config.enumeration.strategy {
            EnumerationStrategy::Auto if self.search_space() <= self.config.enumeration.exhaustive_cutover => {
                EnumerationStrategy::Exhaustive
            }
            EnumerationStrategy::Auto => EnumerationStrategy::FrontierDp,
            s => s,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            positions = self.order.len(),
            candidates = self.prepared.len(),
            search_space = self.search_space(),
            ?strategy,
            "enumerating plans"
        );

        let best = match strategy {
            EnumerationStrategy::Exhaustive => match self.exhaustive() {
                Some(best) => best,
                // Rerun as DP to locate the first failing operator or edge.
                None => self.frontier_dp()?,
            },
            _ => self.frontier_dp()?,
        };
        self.select(best, strategy)
    }

    fn close(&mut self, slot: usize, at: usize, producer: usize, consumer: usize) -> Closure {
        let key = (at, slot, producer, consumer);
        if let Some(c) = self.closures.get(&key) {
            return c.clone();
        }
        let c = self.compute_closure(&self.inbound[at][slot], producer, consumer);
        self.closures.insert(key, c.clone());
        c
    }

    fn compute_closure(&self, es: &EdgeSlot, producer: usize, consumer: usize) -> Closure {
        if producer == consumer {
            return Closure::Internal;
        }
        let p = &self.prepared[producer].exec;
        let c = &self.prepared[consumer].exec;
        let (Some(out_port), Some(in_port)) = (p.output_for(es.edge.producer), c.input_for(es.edge.consumer)) else {
            return Closure::Unsatisfiable("candidate port missing".into());
        };
        let from = ChannelDescriptor::new(p.outputs[out_port].produces.clone(), p.platform.clone());
        let targets: BTreeSet<ChannelDescriptor> = c.inputs[in_port]
            .accepts
            .iter()
            .map(|k| ChannelDescriptor::new(k.clone(), c.platform.clone()))
            .collect();
        match self
            .ctx
            .conversions()
            .shortest_path(&from, &targets, es.cardinality, self.constraints)
        {
            Some(path) => Closure::Path {
                out_port,
                in_port,
                path,
            },
            None => Closure::Unsatisfiable(format!(
                "no conversion path from {from} to any of [{}] accepted by '{}'",
                targets.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", "),
                c.name
            )),
        }
    }

    /// Cost of closing every edge into position `at`, or the index of the
    /// first edge that cannot be closed.
    fn close_all(&mut self, at: usize, binding: &Binding) -> std::result::Result<f64, usize> {
        let Some(consumer) = binding[at] else {
            return Err(0);
        };
        let mut cost = 0.0;
        for slot in 0..self.inbound[at].len() {
            let Some(producer) = binding[self.inbound[at][slot].producer_pos] else {
                return Err(slot);
            };
            match self.close(slot, at, producer, consumer) {
                Closure::Internal => {}
                Closure::Path { path, .. } => cost += self.unshared_cost(at, slot, producer, &path, binding),
                Closure::Unsatisfiable(_) => return Err(slot),
            }
        }
        Ok(cost)
    }

    /// Cost of the steps of `path` past the longest prefix an earlier reader
    /// of the same producer port already converts through.
    fn unshared_cost(
        &mut self,
        at: usize,
        slot: usize,
        producer: usize,
        path: &ConversionPath,
        binding: &Binding,
    ) -> f64 {
        let mut shared = 0;
        for (q, s) in self.siblings[at][slot].clone() {
            if shared == path.steps.len() {
                break;
            }
            let Some(consumer) = binding[q] else {
                continue;
            };
            if let Closure::Path { path: other, .. } = self.close(s, q, producer, consumer) {
                let common = path.steps.iter().zip(&other.steps).take_while(|(a, b)| a == b).count();
                shared = shared.max(common);
            }
        }
        if shared == 0 {
            return path.cost;
        }
        let cardinality = self.inbound[at][slot].cardinality;
        let graph = self.ctx.conversions();
        path.steps[shared..]
            .iter()
            .filter_map(|step| graph.get(*step))
            .map(|conv| conv.cost(cardinality))
            .sum()
    }

    /// Candidates that may take position `i` given what is already bound.
    fn choices(&self, i: usize, binding: &Binding) -> Vec<Option<usize>> {
        if binding[i].is_some() {
            return vec![None];
        }
        self.anchored[i]
            .iter()
            .copied()
            .filter(|c| self.prepared[*c].covers.iter().all(|p| binding[*p].is_none()))
            .map(Some)
            .collect()
    }

    fn bind(&self, binding: &mut Binding, c: usize) {
        for p in &self.prepared[c].covers {
            binding[*p] = Some(c);
        }
    }

    /// Whether the operator graph stays acyclic once every bound fused
    /// candidate is contracted to a single node. Only binding a fused
    /// candidate `c` can introduce a cycle; unbound positions count as
    /// singletons, and later contractions never remove a cycle.
    fn acyclic_after(&self, c: usize, binding: &Binding) -> bool {
        if self.prepared[c].covers.len() < 2 {
            return true;
        }
        let n = self.order.len();
        let node = |j: usize| match binding[j] {
            Some(g) if self.prepared[g].covers.len() > 1 => n + g,
            _ => j,
        };
        let mut indegree: BTreeMap<usize, usize> = (0..n).map(|j| (node(j), 0)).collect();
        let mut succ: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (at, slots) in self.inbound.iter().enumerate() {
            for es in slots {
                let (from, to) = (node(es.producer_pos), node(at));
                if from != to && succ.entry(from).or_default().insert(to) {
                    *indegree.entry(to).or_default() += 1;
                }
            }
        }
        let mut ready: Vec<usize> = indegree.iter().filter(|(_, d)| **d == 0).map(|(v, _)| *v).collect();
        let mut visited = 0;
        while let Some(v) = ready.pop() {
            visited += 1;
            for w in succ.get(&v).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(w) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(*w);
                    }
                }
            }
        }
        visited == indegree.len()
    }

    fn exhaustive(&mut self) -> Option<State> {
        let n = self.order.len();
        let mut best: Option<State> = None;
        let mut binding: Binding = vec![None; n];
        self.dfs(0, &mut binding, 0.0, &mut best);
        best
    }

    fn dfs(&mut self, i: usize, binding: &mut Binding, cost: f64, best: &mut Option<State>) {
        if let Some(b) = best {
            // Later solutions are lexicographically larger; only strictly
            // cheaper ones can win.
            if cost >= b.cost {
                return;
            }
        }
        if i == self.order.len() {
            *best = Some(State {
                cost,
                binding: binding.clone(),
            });
            return;
        }
        for choice in self.choices(i, binding) {
            let saved = binding.clone();
            if let Some(c) = choice {
                self.bind(binding, c);
                let own = self.prepared[c].cost;
                if self.acyclic_after(c, binding) {
                    if let Ok(edges) = self.close_all(i, binding) {
                        self.dfs(i + 1, binding, cost + own + edges, best);
                    }
                }
            } else if let Ok(edges) = self.close_all(i, binding) {
                self.dfs(i + 1, binding, cost + edges, best);
            }
            *binding = saved;
        }
    }

    fn frontier_key(&self, i: usize, binding: &Binding) -> Vec<(usize, usize)> {
        binding
            .iter()
            .enumerate()
            .filter_map(|(j, b)| {
                let c = (*b)?;
                (j > i || self.last_use[j] > i).then_some((j, c))
            })
            .collect()
    }

    fn frontier_dp(&mut self) -> std::result::Result<State, UnsatisfiablePlanError> {
        let n = self.order.len();
        let mut states: BTreeMap<Vec<(usize, usize)>, State> = BTreeMap::new();
        states.insert(
            Vec::new(),
            State {
                cost: 0.0,
                binding: vec![None; n],
            },
        );

        for i in 0..n {
            let mut next: BTreeMap<Vec<(usize, usize)>, State> = BTreeMap::new();
            let mut failed_slots: BTreeSet<usize> = BTreeSet::new();

            let current: Vec<State> = states.into_values().collect();
            for state in current {
                for choice in self.choices(i, &state.binding) {
                    let mut binding = state.binding.clone();
                    let mut cost = state.cost;
                    if let Some(c) = choice {
                        self.bind(&mut binding, c);
                        if !self.acyclic_after(c, &binding) {
                            continue;
                        }
                        cost += self.prepared[c].cost;
                    }
                    match self.close_all(i, &binding) {
                        Ok(edges) => {
                            let candidate = State {
                                cost: cost + edges,
                                binding,
                            };
                            let key = self.frontier_key(i, &candidate.binding);
                            match next.get(&key) {
                                Some(existing) if existing.rank(&candidate) != Ordering::Greater => {}
                                _ => {
                                    next.insert(key, candidate);
                                }
                            }
                        }
                        Err(slot) => {
                            failed_slots.insert(slot);
                        }
                    }
                }
            }

            if next.is_empty() {
                return Err(self.diagnose(i, &failed_slots));
            }

            let cap = self.config.enumeration.max_frontier_states.max(1);
            if next.len() > cap {
                #[cfg(feature = "tracing")]
                tracing::warn!(position = i, states = next.len(), cap, "frontier state cap exceeded; keeping cheapest");
                let mut all: Vec<(Vec<(usize, usize)>, State)> = next.into_iter().collect();
                all.sort_by(|a, b| a.1.rank(&b.1));
                all.truncate(cap);
                next = all.into_iter().collect();
            }
            states = next;
        }

        states
            .into_values()
            .min_by(|a, b| a.rank(b))
            .ok_or_else(|| UnsatisfiablePlanError::at(self.operator_culprit(0), "plan has no operators"))
    }

    fn operator_culprit(&self, i: usize) -> Culprit {
        let id = self.order.get(i).copied().unwrap_or(OperatorId::new(0));
        let kind = self
            .plan
            .operator(id)
            .map(|o| o.kind.clone())
            .unwrap_or_else(|| OperatorKind::new("unknown"));
        Culprit::Operator { id, kind }
    }

    fn diagnose(&mut self, i: usize, failed_slots: &BTreeSet<usize>) -> UnsatisfiablePlanError {
        let id = self.order[i];
        if self.covering[i].is_empty() {
            let reason = self
                .dropped
                .get(&id)
                .cloned()
                .unwrap_or_else(|| "no candidate on a selectable platform".into());
            return UnsatisfiablePlanError::at(self.operator_culprit(i), reason);
        }
        if let Some(&slot) = failed_slots.iter().next() {
            if let Some(es) = self.inbound[i].get(slot) {
                let reason = self
                    .closures
                    .iter()
                    .filter(|((at, s, _, _), _)| *at == i && *s == slot)
                    .find_map(|(_, c)| match c {
                        Closure::Unsatisfiable(why) => Some(why.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| "no viable producer/consumer combination".into());
                return UnsatisfiablePlanError::at(
                    Culprit::Edge {
                        channel: es.edge.channel,
                        producer: es.edge.producer.op,
                        consumer: es.edge.consumer.op,
                        consumer_slot: es.edge.consumer.slot,
                    },
                    reason,
                );
            }
        }
        UnsatisfiablePlanError::at(
            self.operator_culprit(i),
            "no remaining candidate is compatible with the fused candidates chosen upstream",
        )
    }

    fn select(mut self, best: State, strategy: EnumerationStrategy) -> std::result::Result<Selection, UnsatisfiablePlanError> {
        let mut chosen_index: BTreeMap<usize, usize> = BTreeMap::new();
        let mut chosen = Vec::new();
        for b in best.binding.iter() {
            let Some(c) = *b else {
                return Err(UnsatisfiablePlanError::at(self.operator_culprit(0), "incomplete binding"));
            };
            if !chosen_index.contains_key(&c) {
                chosen_index.insert(c, chosen.len());
                let p = &self.prepared[c];
                chosen.push(Chosen {
                    exec: p.exec.clone(),
                    cost: p.cost,
                    loop_body: p.loop_body.clone(),
                });
            }
        }

        let mut edges = Vec::new();
        for at in 0..self.order.len() {
            for slot in 0..self.inbound[at].len() {
                let es = self.inbound[at][slot].clone();
                let (Some(p), Some(c)) = (best.binding[es.producer_pos], best.binding[at]) else {
                    continue;
                };
                match self.close(slot, at, p, c) {
                    Closure::Internal => {}
                    Closure::Path {
                        out_port,
                        in_port,
                        path,
                    } => edges.push(ClosedEdge {
                        channel: es.edge.channel,
                        producer: chosen_index[&p],
                        out_port,
                        consumer: chosen_index[&c],
                        in_port,
                        path,
                        cardinality: es.cardinality,
                    }),
                    Closure::Unsatisfiable(why) => {
                        return Err(UnsatisfiablePlanError::at(
                            Culprit::Edge {
                                channel: es.edge.channel,
                                producer: es.edge.producer.op,
                                consumer: es.edge.consumer.op,
                                consumer_slot: es.edge.consumer.slot,
                            },
                            why,
                        ))
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(cost = best.cost, operators = chosen.len(), conversions_edges = edges.len(), "selected plan");

        Ok(Selection {
            chosen,
            edges,
            strategy,
        })
    }
}
