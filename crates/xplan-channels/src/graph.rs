//! The channel conversion graph and its shortest-path search.
//!
//! Nodes are `(kind, platform)` descriptors, edges are registered
//! conversions. Paths are ordered by total cost, then hop count, then the
//! lexicographic sequence of conversion registration indices, so the chosen
//! path never depends on iteration order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::Serialize;
use xplan_core::prelude::*;

use crate::conversion::ChannelConversion;
use crate::descriptor::ChannelDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionPath {
    /// Registration indices of the conversions to apply, in order.
    pub steps: Vec<usize>,
    pub cost: f64,
    /// Descriptor reached, one of the requested targets.
    pub target: ChannelDescriptor,
}

impl ConversionPath {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn hops(&self) -> usize {
        self.steps.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversionGraph {
    conversions: Vec<ChannelConversion>,
    outgoing: BTreeMap<ChannelDescriptor, Vec<usize>>,
}

impl ConversionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registration index.
    pub fn register(&mut self, c: ChannelConversion) -> usize {
        let idx = self.conversions.len();
        self.outgoing.entry(c.source.clone()).or_default().push(idx);
        self.conversions.push(c);
        idx
    }

    pub fn extend(&mut self, cs: impl IntoIterator<Item = ChannelConversion>) {
        for c in cs {
            self.register(c);
        }
    }

    pub fn get(&self, idx: usize) -> Option<&ChannelConversion> {
        self.conversions.get(idx)
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelConversion> {
        self.conversions.iter()
    }

    /// Cheapest path from `from` to any of `targets`, skipping conversions
    /// that touch an unselectable platform. An empty path means `from` is
    /// already acceptable.
    pub fn shortest_path(
        &self,
        from: &ChannelDescriptor,
        targets: &BTreeSet<ChannelDescriptor>,
        cardinality: u64,
        constraints: &ConstraintSet,
    ) -> Option<ConversionPath> {
        if targets.is_empty() {
            return None;
        }

        let mut settled: BTreeSet<ChannelDescriptor> = BTreeSet::new();
        let mut heap = BinaryHeap::new();
        heap.push(Label {
            cost: 0.0,
            steps: Vec::new(),
            at: from.clone(),
        });

        while let Some(label) = heap.pop() {
            if !settled.insert(label.at.clone()) {
                continue;
            }
            if targets.contains(&label.at) {
                return Some(ConversionPath {
                    steps: label.steps,
                    cost: label.cost,
                    target: label.at,
                });
            }
            for &idx in self.outgoing.get(&label.at).into_iter().flatten() {
                let conv = &self.conversions[idx];
                if settled.contains(&conv.target) || !conv.is_usable(constraints) {
                    continue;
                }
                let mut steps = label.steps.clone();
                steps.push(idx);
                heap.push(Label {
                    cost: label.cost + conv.cost(cardinality),
                    steps,
                    at: conv.target.clone(),
                });
            }
        }
        None
    }
}

/// Search frontier entry. `BinaryHeap` is a max-heap, so `Ord` is reversed:
/// the greatest label is the cheapest.
#[derive(Debug)]
struct Label {
    cost: f64,
    steps: Vec<usize>,
    at: ChannelDescriptor,
}

impl Label {
    fn rank(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.steps.len().cmp(&other.steps.len()))
            .then_with(|| self.steps.cmp(&other.steps))
            .then_with(|| self.at.cmp(&other.at))
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank(self)
    }
}
