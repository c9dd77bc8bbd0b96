//! The optimizer's output: platform-bound operators, explicit conversion
//! operators, execution channels and stages.
//!
//! Everything is keyed by `BTreeMap` so serialization (and therefore the
//! fingerprint) is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use xplan_channels::{ChannelDescriptor, ConversionGraph, ConversionPath};
use xplan_core::config::EnumerationStrategy;
use xplan_core::hash::{Hash256, PLAN_CONTEXT};
use xplan_core::prelude::*;
use xplan_mapping::ExecutionOperator;

use crate::stage::{partition, Stage};

/// One side of an execution channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PortRef {
    pub op: ExecOpId,
    pub slot: usize,
}

/// Point-to-point link between two execution operator ports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecChannel {
    pub id: ExecChannelId,
    pub producer: PortRef,
    pub consumer: PortRef,
    pub descriptor: ChannelDescriptor,
    pub cardinality: u64,
    /// Logical channel this link (or conversion chain) carries.
    pub logical: Option<ChannelId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    operators: BTreeMap<ExecOpId, ExecutionOperator>,
    channels: BTreeMap<ExecChannelId, ExecChannel>,
    stages: Vec<Stage>,
    bindings: BTreeMap<OperatorId, ExecOpId>,
    operator_costs: BTreeMap<ExecOpId, f64>,
    loop_bodies: BTreeMap<ExecOpId, ExecutionPlan>,
    total_cost: f64,
    strategy: EnumerationStrategy,
}

impl ExecutionPlan {
    pub fn operators(&self) -> impl Iterator<Item = (ExecOpId, &ExecutionOperator)> {
        self.operators.iter().map(|(id, op)| (*id, op))
    }

    pub fn operator(&self, id: ExecOpId) -> Option<&ExecutionOperator> {
        self.operators.get(&id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ExecChannel> {
        self.channels.values()
    }

    pub fn channel(&self, id: ExecChannelId) -> Option<&ExecChannel> {
        self.channels.get(&id)
    }

    pub fn inbound(&self, op: ExecOpId) -> impl Iterator<Item = &ExecChannel> {
        self.channels.values().filter(move |c| c.consumer.op == op)
    }

    pub fn outbound(&self, op: ExecOpId) -> impl Iterator<Item = &ExecChannel> {
        self.channels.values().filter(move |c| c.producer.op == op)
    }

    /// Stages in a topological order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Execution operator realizing logical operator `op`.
    pub fn binding(&self, op: OperatorId) -> Option<ExecOpId> {
        self.bindings.get(&op).copied()
    }

    pub fn bound_operator(&self, op: OperatorId) -> Option<&ExecutionOperator> {
        self.binding(op).and_then(|id| self.operators.get(&id))
    }

    pub fn bindings(&self) -> &BTreeMap<OperatorId, ExecOpId> {
        &self.bindings
    }

    pub fn operator_cost(&self, id: ExecOpId) -> Option<f64> {
        self.operator_costs.get(&id).copied()
    }

    pub fn loop_body(&self, id: ExecOpId) -> Option<&ExecutionPlan> {
        self.loop_bodies.get(&id)
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Search strategy that produced this plan.
    pub fn strategy(&self) -> EnumerationStrategy {
        self.strategy
    }

    /// Conversion operators, loop bodies included.
    pub fn conversion_count(&self) -> usize {
        let own = self.operators.values().filter(|o| o.is_conversion()).count();
        own + self
            .loop_bodies
            .values()
            .map(ExecutionPlan::conversion_count)
            .sum::<usize>()
    }

    /// Platforms used, loop bodies included.
    pub fn platforms(&self) -> BTreeSet<PlatformId> {
        let mut out: BTreeSet<PlatformId> =
            self.operators.values().map(|o| o.platform.clone()).collect();
        for body in self.loop_bodies.values() {
            out.extend(body.platforms());
        }
        out
    }

    /// Stable content hash.
    pub fn fingerprint(&self) -> Result<Hash256> {
        Hash256::of(PLAN_CONTEXT, self)
    }
}

/// A chosen candidate with its evaluated cost.
#[derive(Debug, Clone)]
pub(crate) struct Chosen {
    pub exec: ExecutionOperator,
    pub cost: f64,
    pub loop_body: Option<ExecutionPlan>,
}

/// A logical edge crossing two chosen candidates, closed by `path`.
#[derive(Debug, Clone)]
pub(crate) struct ClosedEdge {
    pub channel: ChannelId,
    pub producer: usize,
    pub out_port: usize,
    pub consumer: usize,
    pub in_port: usize,
    pub path: ConversionPath,
    pub cardinality: u64,
}

/// The winning assignment, before materialization.
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    /// Ordered by the topological position of each candidate's anchor.
    pub chosen: Vec<Chosen>,
    pub edges: Vec<ClosedEdge>,
    pub strategy: EnumerationStrategy,
}

impl ExecutionPlan {
    /// Materialize conversions as operators, wire channels and cut stages.
    /// Edges leaving the same producer port reuse the conversion operators
    /// of their common path prefix.
    pub(crate) fn assemble(sel: Selection, graph: &ConversionGraph) -> Result<Self> {
        let mut operators = BTreeMap::new();
        let mut operator_costs = BTreeMap::new();
        let mut bindings = BTreeMap::new();
        let mut loop_bodies = BTreeMap::new();

        for (i, c) in sel.chosen.into_iter().enumerate() {
            let id = ExecOpId::new(i as u64);
            for op in &c.exec.covers {
                bindings.insert(*op, id);
            }
            if let Some(body) = c.loop_body {
                loop_bodies.insert(id, body);
            }
            operator_costs.insert(id, c.cost);
            operators.insert(id, c.exec);
        }

        let mut next_op = ExecOpId::new(operators.len() as u64);
        let mut channels = BTreeMap::new();
        let mut next_channel = ExecChannelId::new(0);
        let mut shared: BTreeMap<(PortRef, Vec<usize>), ExecOpId> = BTreeMap::new();

        for e in &sel.edges {
            let producer_id = ExecOpId::new(e.producer as u64);
            let consumer_id = ExecOpId::new(e.consumer as u64);
            let producer = operators.get(&producer_id).ok_or_else(|| {
                Error::Invariant(format!("closed edge references missing producer {producer_id}"))
            })?;
            let produced = producer
                .outputs
                .get(e.out_port)
                .ok_or_else(|| Error::Invariant(format!("{producer_id} has no output {}", e.out_port)))?;

            let origin = PortRef {
                op: producer_id,
                slot: e.out_port,
            };
            let mut prev = origin;
            let mut descriptor = ChannelDescriptor::new(produced.produces.clone(), producer.platform.clone());

            for (k, &step) in e.path.steps.iter().enumerate() {
                let conv = graph
                    .get(step)
                    .ok_or_else(|| Error::Invariant(format!("unknown conversion index {step}")))?;
                let prefix = (origin, e.path.steps[..=k].to_vec());
                if let Some(&conv_id) = shared.get(&prefix) {
                    prev = PortRef { op: conv_id, slot: 0 };
                    descriptor = conv.target.clone();
                    continue;
                }
                let conv_id = next_op;
                next_op = next_op.next();
                let exec = ExecutionOperator::conversion(
                    conv.name.clone(),
                    conv.platform.clone(),
                    conv.source.kind.clone(),
                    conv.target.kind.clone(),
                );
                operator_costs.insert(conv_id, conv.cost(e.cardinality));
                operators.insert(conv_id, exec);
                shared.insert(prefix, conv_id);

                let id = next_channel;
                next_channel = next_channel.next();
                channels.insert(
                    id,
                    ExecChannel {
                        id,
                        producer: prev,
                        consumer: PortRef { op: conv_id, slot: 0 },
                        descriptor,
                        cardinality: e.cardinality,
                        logical: Some(e.channel),
                    },
                );
                prev = PortRef { op: conv_id, slot: 0 };
                descriptor = conv.target.clone();
            }

            let id = next_channel;
            next_channel = next_channel.next();
            channels.insert(
                id,
                ExecChannel {
                    id,
                    producer: prev,
                    consumer: PortRef {
                        op: consumer_id,
                        slot: e.in_port,
                    },
                    descriptor,
                    cardinality: e.cardinality,
                    logical: Some(e.channel),
                },
            );
        }

        let total_cost = operator_costs.values().sum();
        let stages = partition(&operators, &channels)?;

        Ok(Self {
            operators,
            channels,
            stages,
            bindings,
            operator_costs,
            loop_bodies,
            total_cost,
            strategy: sel.strategy,
        })
    }
}
