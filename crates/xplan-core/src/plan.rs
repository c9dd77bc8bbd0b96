//! The logical operator graph a caller builds.
//!
//! Plans are DAGs. The only sanctioned feedback is a `loop` operator, which
//! owns its body as a nested `Plan` and appears as a single entry/exit node
//! in the outer graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::PlanStructureError;
use crate::id::{ChannelId, DataType, OperatorId, OperatorKind, PlatformId};
use crate::transform::TransformDescriptor;

type PlanResult<T> = std::result::Result<T, PlanStructureError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    pub data_type: DataType,
    /// Fan-in arity: how many channels may feed this slot.
    pub max_channels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorParams {
    #[serde(default)]
    pub transform: Option<TransformDescriptor>,
    /// Fraction of input kept (filters, samples).
    #[serde(default)]
    pub selectivity: Option<f64>,
    /// Declared output cardinality (sources, samples).
    #[serde(default)]
    pub cardinality: Option<u64>,
    #[serde(default)]
    pub expected_iterations: Option<u32>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Bounded feedback construct owned by a `loop` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Body with exactly one source (iteration input) and one sink (feedback).
    pub body: Plan,
    pub feedback_type: DataType,
    pub max_iterations: u32,
    #[serde(default)]
    pub condition: Option<TransformDescriptor>,
    #[serde(default)]
    pub expected_iterations: Option<u32>,
}

impl LoopSpec {
    pub fn new(body: Plan, max_iterations: u32) -> Self {
        Self {
            body,
            feedback_type: DataType::ANY,
            max_iterations,
            condition: None,
            expected_iterations: None,
        }
    }

    /// Iterations the cost model should assume, never above the bound.
    pub fn planned_iterations(&self, fallback: u32) -> u32 {
        self.expected_iterations
            .unwrap_or(fallback)
            .min(self.max_iterations)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub kind: OperatorKind,
    pub name: String,
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
    #[serde(default)]
    pub params: OperatorParams,
    /// When non-empty, only these platforms may realize the operator.
    #[serde(default)]
    pub target_platforms: BTreeSet<PlatformId>,
    #[serde(default)]
    pub loop_spec: Option<Box<LoopSpec>>,
}

impl Operator {
    pub fn new(kind: OperatorKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: OperatorParams::default(),
            target_platforms: BTreeSet::new(),
            loop_spec: None,
        }
    }

    pub fn with_input(self, name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        self.with_input_arity(name, data_type, 1)
    }

    pub fn with_input_arity(
        mut self,
        name: impl Into<String>,
        data_type: impl Into<DataType>,
        max_channels: usize,
    ) -> Self {
        self.inputs.push(InputSlot {
            name: name.into(),
            data_type: data_type.into(),
            max_channels: max_channels.max(1),
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        self.outputs.push(OutputSlot {
            name: name.into(),
            data_type: data_type.into(),
        });
        self
    }

    pub fn with_transform(mut self, t: TransformDescriptor) -> Self {
        self.params.transform = Some(t);
        self
    }

    pub fn with_selectivity(mut self, s: f64) -> Self {
        self.params.selectivity = Some(s);
        self
    }

    pub fn with_cardinality(mut self, c: u64) -> Self {
        self.params.cardinality = Some(c);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.extra.insert(key.into(), value);
        self
    }

    pub fn with_target_platform(mut self, p: impl Into<PlatformId>) -> Self {
        self.target_platforms.insert(p.into());
        self
    }

    pub fn with_loop(mut self, spec: LoopSpec) -> Self {
        self.loop_spec = Some(Box::new(spec));
        self
    }

    pub fn is_loop(&self) -> bool {
        self.kind == OperatorKind::LOOP
    }

    /// Whether `p` passes this operator's target-platform restriction.
    pub fn allows_platform(&self, p: &PlatformId) -> bool {
        self.target_platforms.is_empty() || self.target_platforms.contains(p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub op: OperatorId,
    pub slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputRef {
    pub op: OperatorId,
    pub slot: usize,
}

/// One producer output slot feeding one or more consumer input slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub producer: OutputRef,
    pub consumers: Vec<InputRef>,
    pub data_type: DataType,
}

/// A (channel, consumer slot) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub channel: ChannelId,
    pub producer: OutputRef,
    pub consumer: InputRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    operators: BTreeMap<OperatorId, Operator>,
    channels: BTreeMap<ChannelId, Channel>,
    next_operator: u64,
    next_channel: u64,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operator. Loop operators have their body validated here.
    pub fn add_operator(&mut self, op: Operator) -> PlanResult<OperatorId> {
        let id = OperatorId::new(self.next_operator);
        if op.is_loop() || op.loop_spec.is_some() {
            check_loop(id, &op)?;
        }
        self.next_operator += 1;
        self.operators.insert(id, op);
        Ok(id)
    }

    /// Connect `producer.out_slot` to `consumer.in_slot`.
    ///
    /// Connecting an output slot that already feeds a channel appends the
    /// consumer to that channel (fan-out). Reconnecting an existing edge
    /// returns the existing channel.
    pub fn connect(
        &mut self,
        producer: OperatorId,
        out_slot: usize,
        consumer: OperatorId,
        in_slot: usize,
    ) -> PlanResult<ChannelId> {
        let p = self.require(producer)?;
        let c = self.require(consumer)?;
        let out = p
            .outputs
            .get(out_slot)
            .ok_or_else(|| PlanStructureError::NoSuchOutputSlot {
                op: producer,
                kind: p.kind.clone(),
                slot: out_slot,
            })?;
        let inp = c
            .inputs
            .get(in_slot)
            .ok_or_else(|| PlanStructureError::NoSuchInputSlot {
                op: consumer,
                kind: c.kind.clone(),
                slot: in_slot,
            })?;

        let from = OutputRef {
            op: producer,
            slot: out_slot,
        };
        let to = InputRef {
            op: consumer,
            slot: in_slot,
        };
        if let Some(ch) = self.channel_from(from) {
            if ch.consumers.contains(&to) {
                return Ok(ch.id);
            }
        }

        if !out.data_type.is_compatible_with(&inp.data_type) {
            return Err(PlanStructureError::TypeMismatch {
                producer,
                consumer,
                produced: out.data_type.to_string(),
                expected: inp.data_type.to_string(),
            });
        }

        let inbound = self.inbound_count(to);
        if inbound >= inp.max_channels {
            return Err(PlanStructureError::ArityExceeded {
                op: consumer,
                kind: c.kind.clone(),
                slot: in_slot,
                arity: inp.max_channels,
            });
        }

        if producer == consumer || self.reaches(consumer, producer) {
            return Err(PlanStructureError::Cycle { producer, consumer });
        }

        let data_type = out.data_type.clone();
        let existing = self.channel_from(from).map(|ch| ch.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = ChannelId::new(self.next_channel);
                self.next_channel += 1;
                self.channels.insert(
                    id,
                    Channel {
                        id,
                        producer: from,
                        consumers: Vec::new(),
                        data_type,
                    },
                );
                id
            }
        };
        if let Some(ch) = self.channels.get_mut(&id) {
            ch.consumers.push(to);
        }
        Ok(id)
    }

    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(&id)
    }

    pub fn operators(&self) -> impl Iterator<Item = (OperatorId, &Operator)> {
        self.operators.iter().map(|(id, op)| (*id, op))
    }

    pub fn operator_ids(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.operators.keys().copied()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// The channel leaving `out`, if any.
    pub fn channel_from(&self, out: OutputRef) -> Option<&Channel> {
        self.channels.values().find(|ch| ch.producer == out)
    }

    /// All edges, ordered by channel then consumer registration.
    pub fn edges(&self) -> Vec<Edge> {
        self.channels
            .values()
            .flat_map(|ch| {
                ch.consumers.iter().map(move |c| Edge {
                    channel: ch.id,
                    producer: ch.producer,
                    consumer: *c,
                })
            })
            .collect()
    }

    /// Edges entering `op`, ordered by input slot then channel.
    pub fn inbound_edges(&self, op: OperatorId) -> Vec<Edge> {
        let mut out: Vec<Edge> = self
            .edges()
            .into_iter()
            .filter(|e| e.consumer.op == op)
            .collect();
        out.sort_by_key(|e| (e.consumer.slot, e.channel));
        out
    }

    /// Edges leaving `op`, ordered by output slot then channel.
    pub fn outbound_edges(&self, op: OperatorId) -> Vec<Edge> {
        let mut out: Vec<Edge> = self
            .edges()
            .into_iter()
            .filter(|e| e.producer.op == op)
            .collect();
        out.sort_by_key(|e| (e.producer.slot, e.channel, e.consumer));
        out
    }

    pub fn upstream(&self, op: OperatorId) -> Vec<OperatorId> {
        let set: BTreeSet<OperatorId> = self
            .inbound_edges(op)
            .iter()
            .map(|e| e.producer.op)
            .collect();
        set.into_iter().collect()
    }

    pub fn downstream(&self, op: OperatorId) -> Vec<OperatorId> {
        let set: BTreeSet<OperatorId> = self
            .outbound_edges(op)
            .iter()
            .map(|e| e.consumer.op)
            .collect();
        set.into_iter().collect()
    }

    /// Operators with no inbound channels.
    pub fn sources(&self) -> Vec<OperatorId> {
        let fed: BTreeSet<OperatorId> = self
            .channels
            .values()
            .flat_map(|ch| ch.consumers.iter().map(|c| c.op))
            .collect();
        self.operator_ids().filter(|id| !fed.contains(id)).collect()
    }

    /// Operators with no outbound channels.
    pub fn sinks(&self) -> Vec<OperatorId> {
        let feeding: BTreeSet<OperatorId> = self
            .channels
            .values()
            .filter(|ch| !ch.consumers.is_empty())
            .map(|ch| ch.producer.op)
            .collect();
        self.operator_ids()
            .filter(|id| !feeding.contains(id))
            .collect()
    }

    /// Kahn's algorithm; ready operators are taken in id order, so the
    /// result is fully determined by the plan.
    pub fn topological_order(&self) -> Vec<OperatorId> {
        let mut indegree: BTreeMap<OperatorId, usize> =
            self.operator_ids().map(|id| (id, 0)).collect();
        let mut succ: BTreeMap<OperatorId, Vec<OperatorId>> = BTreeMap::new();
        for e in self.edges() {
            *indegree.entry(e.consumer.op).or_default() += 1;
            succ.entry(e.producer.op).or_default().push(e.consumer.op);
        }

        let mut ready: BTreeSet<OperatorId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.operators.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in succ.get(&id).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }
        order
    }

    /// Completeness check: non-empty and every input slot connected.
    pub fn validate(&self) -> PlanResult<()> {
        if self.operators.is_empty() {
            return Err(PlanStructureError::EmptyPlan);
        }
        for (id, op) in self.operators() {
            for slot in 0..op.inputs.len() {
                if self.inbound_count(InputRef { op: id, slot }) == 0 {
                    return Err(PlanStructureError::UnconnectedInput {
                        op: id,
                        kind: op.kind.clone(),
                        slot,
                    });
                }
            }
        }
        // Plans built through `connect` are acyclic; deserialized ones may not be.
        let ordered: BTreeSet<OperatorId> = self.topological_order().into_iter().collect();
        if ordered.len() != self.operators.len() {
            if let Some(e) = self
                .edges()
                .into_iter()
                .find(|e| !ordered.contains(&e.producer.op) && !ordered.contains(&e.consumer.op))
            {
                return Err(PlanStructureError::Cycle {
                    producer: e.producer.op,
                    consumer: e.consumer.op,
                });
            }
        }
        Ok(())
    }

    fn require(&self, id: OperatorId) -> PlanResult<&Operator> {
        self.operators
            .get(&id)
            .ok_or(PlanStructureError::UnknownOperator(id))
    }

    fn inbound_count(&self, to: InputRef) -> usize {
        self.channels
            .values()
            .filter(|ch| ch.consumers.contains(&to))
            .count()
    }

    /// Whether `to` is reachable from `from` along channels.
    fn reaches(&self, from: OperatorId, to: OperatorId) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(cur) = queue.pop_front() {
            if cur == to {
                return true;
            }
            if !seen.insert(cur) {
                continue;
            }
            for ch in self.channels.values().filter(|ch| ch.producer.op == cur) {
                queue.extend(ch.consumers.iter().map(|c| c.op));
            }
        }
        false
    }
}

fn check_loop(id: OperatorId, op: &Operator) -> PlanResult<()> {
    let invalid = |reason: &str| PlanStructureError::InvalidLoop {
        op: id,
        reason: reason.to_string(),
    };
    let spec = op
        .loop_spec
        .as_deref()
        .ok_or_else(|| invalid("loop operator without a loop body"))?;
    if op.inputs.len() != 1 || op.outputs.len() != 1 {
        return Err(invalid("a loop must expose exactly one input and one output"));
    }
    if spec.max_iterations == 0 {
        return Err(invalid("max_iterations must be at least 1"));
    }
    spec.body.validate().map_err(|e| PlanStructureError::InvalidLoop {
        op: id,
        reason: format!("invalid body: {e}"),
    })?;
    if spec.body.sources().len() != 1 {
        return Err(invalid("body must have exactly one entry operator"));
    }
    if spec.body.sinks().len() != 1 {
        return Err(invalid("body must have exactly one exit operator"));
    }
    Ok(())
}
