//! Constructors for the common logical operator kinds.
//!
//! All slots are typed `*`; use the `Operator` builder methods for anything
//! more specific.

use crate::id::{DataType, OperatorKind};
use crate::plan::{LoopSpec, Operator};
use crate::transform::TransformDescriptor;

fn unary(kind: OperatorKind, name: &str) -> Operator {
    Operator::new(kind, name)
        .with_input("in", DataType::ANY)
        .with_output("out", DataType::ANY)
}

fn binary(kind: OperatorKind, name: &str) -> Operator {
    Operator::new(kind, name)
        .with_input("left", DataType::ANY)
        .with_input("right", DataType::ANY)
        .with_output("out", DataType::ANY)
}

pub fn source(name: &str) -> Operator {
    Operator::new(OperatorKind::SOURCE, name).with_output("out", DataType::ANY)
}

pub fn sink(name: &str) -> Operator {
    Operator::new(OperatorKind::SINK, name).with_input("in", DataType::ANY)
}

pub fn map(name: &str, udf: TransformDescriptor) -> Operator {
    unary(OperatorKind::MAP, name).with_transform(udf)
}

pub fn flat_map(name: &str, udf: TransformDescriptor) -> Operator {
    unary(OperatorKind::FLAT_MAP, name).with_transform(udf)
}

pub fn map_partitions(name: &str, udf: TransformDescriptor) -> Operator {
    unary(OperatorKind::MAP_PARTITIONS, name).with_transform(udf)
}

pub fn filter(name: &str, predicate: TransformDescriptor) -> Operator {
    unary(OperatorKind::FILTER, name).with_transform(predicate)
}

pub fn reduce_by(name: &str, key: TransformDescriptor) -> Operator {
    unary(OperatorKind::REDUCE_BY, name).with_transform(key)
}

pub fn group_by(name: &str, key: TransformDescriptor) -> Operator {
    unary(OperatorKind::GROUP_BY, name).with_transform(key)
}

pub fn global_reduce(name: &str, udf: TransformDescriptor) -> Operator {
    unary(OperatorKind::GLOBAL_REDUCE, name).with_transform(udf)
}

pub fn sort(name: &str) -> Operator {
    unary(OperatorKind::SORT, name)
}

pub fn distinct(name: &str) -> Operator {
    unary(OperatorKind::DISTINCT, name)
}

pub fn count(name: &str) -> Operator {
    unary(OperatorKind::COUNT, name)
}

pub fn sample(name: &str, size: u64) -> Operator {
    unary(OperatorKind::SAMPLE, name).with_cardinality(size)
}

pub fn zip_with_id(name: &str) -> Operator {
    unary(OperatorKind::ZIP_WITH_ID, name)
}

pub fn join(name: &str) -> Operator {
    binary(OperatorKind::JOIN, name)
}

pub fn co_group(name: &str) -> Operator {
    binary(OperatorKind::CO_GROUP, name)
}

pub fn cartesian(name: &str) -> Operator {
    binary(OperatorKind::CARTESIAN, name)
}

pub fn intersect(name: &str) -> Operator {
    binary(OperatorKind::INTERSECT, name)
}

/// Union of `inputs` channels on a single fan-in slot.
pub fn union(name: &str, inputs: usize) -> Operator {
    Operator::new(OperatorKind::UNION, name)
        .with_input_arity("in", DataType::ANY, inputs)
        .with_output("out", DataType::ANY)
}

/// Bounded loop over `spec.body`.
pub fn repeat(name: &str, spec: LoopSpec) -> Operator {
    let feedback = spec.feedback_type.clone();
    Operator::new(OperatorKind::LOOP, name)
        .with_input("initial", feedback.clone())
        .with_output("final", feedback)
        .with_loop(spec)
}
