//! Stage partitioning of optimized execution plans.


use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fixtures::*;
use xplan_core::prelude::*;
use xplan_planner::{assert_topological, ExecutionPlan, Optimizer, OptimizerContext};

/// Partition properties every execution plan must satisfy.
fn check_partition(exec: &ExecutionPlan) {
    let stages = exec.stages();
    assert!(assert_topological(stages), "stages out of order: {exec}");

    let mut owner: BTreeMap<ExecOpId, StageId> = BTreeMap::new();
    for stage in stages {
        for op in &stage.operators {
            assert!(owner.insert(*op, stage.id).is_none(), "{op} in two stages");
            let platform = &exec.operator(*op).expect("operator").platform;
            assert_eq!(platform, &stage.platform, "{op} off-platform in {}", stage.id);
        }
    }
    assert_eq!(owner.len(), exec.operators().count());

    for stage in stages {
        for ch in &stage.inputs {
            let ch = exec.channel(*ch).expect("channel");
            assert_eq!(owner[&ch.consumer.op], stage.id);
            assert!(stage.depends_on.contains(&owner[&ch.producer.op]));
        }
        for ch in &stage.outputs {
            let ch = exec.channel(*ch).expect("channel");
            assert_eq!(owner[&ch.producer.op], stage.id);
            assert_ne!(owner[&ch.consumer.op], stage.id);
        }
        for ch in &stage.internal_channels {
            let ch = exec.channel(*ch).expect("channel");
            assert_eq!(owner[&ch.producer.op], stage.id);
            assert_eq!(owner[&ch.consumer.op], stage.id);
        }
    }
}

fn ops_of(exec: &ExecutionPlan, stage: usize) -> BTreeSet<ExecOpId> {
    exec.stages()[stage].operators.iter().copied().collect()
}

#[test]
fn test_single_platform_plan_is_one_stage() {
    let (plan, _) = join_plan();
    let mut b = OptimizerContext::builder();
    b.register_plugin(plugin(ALPHA, DataKind::STREAM, &basic_kinds(), 1.0));
    let exec = Optimizer::new(b.build())
        .optimize(&plan, &Configuration::default())
        .expect("optimize");
    check_partition(&exec);

    let stages = exec.stages();
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].operators.len(), 5);
    assert_eq!(stages[0].internal_channels.len(), 4);
    assert!(stages[0].inputs.is_empty());
    assert!(stages[0].outputs.is_empty());
    assert!(stages[0].depends_on.is_empty());
}

#[test]
fn test_round_trip_between_platforms_cuts_four_stages() {
    // Join is cheap only on BETA; everything else is cheaper on ALPHA.
    let mut b = OptimizerContext::builder();
    b.register_plugin(
        plugin(ALPHA, DataKind::STREAM, &basic_kinds(), 2.0)
            .with_kind_cost(ALPHA, "alpha.join", Arc::new(ConstantCost::new(20.0)))
            .with_conversion(conversion(("stream", ALPHA), ("collection", BETA), 1.0)),
    );
    b.register_plugin(
        plugin(BETA, DataKind::COLLECTION, &basic_kinds(), 3.0)
            .with_kind_cost(BETA, "beta.source", Arc::new(ConstantCost::new(9.0)))
            .with_conversion(conversion(("collection", BETA), ("stream", ALPHA), 1.0)),
    );
    let (plan, [left, right, j, m, snk]) = join_plan();
    let exec = Optimizer::new(b.build())
        .optimize(&plan, &Configuration::default())
        .expect("optimize");
    check_partition(&exec);

    let bound = |op| exec.binding(op).expect("bound");
    let stages = exec.stages();
    assert_eq!(stages.len(), 4);
    assert_eq!(stages[0].platform.as_str(), ALPHA);
    assert_eq!(stages[1].platform.as_str(), ALPHA);
    assert_eq!(stages[2].platform.as_str(), BETA);
    assert_eq!(stages[3].platform.as_str(), ALPHA);

    assert!(stages[0].contains(bound(left)));
    assert!(stages[1].contains(bound(right)));
    assert!(stages[2].contains(bound(j)));
    assert_eq!(ops_of(&exec, 3), BTreeSet::from([bound(m), bound(snk)]));

    // Each conversion joins its producer's stage.
    for stage in &stages[..3] {
        assert_eq!(stage.operators.len(), 2);
        let conv = exec.operator(stage.operators[1]).expect("operator");
        assert!(conv.is_conversion());
    }

    assert_eq!(stages[2].depends_on, BTreeSet::from([stages[0].id, stages[1].id]));
    assert_eq!(stages[3].depends_on, BTreeSet::from([stages[2].id]));
}

#[test]
fn test_same_platform_merge_never_creates_a_stage_cycle() {
    // src fans out to `m` (only on BETA) and straight into `j`, which also
    // consumes `m`. Merging `src` with `j` would make the stages cyclic.
    let mut b = OptimizerContext::builder();
    b.register_plugin(
        plugin(
            ALPHA,
            DataKind::STREAM,
            &[OperatorKind::SOURCE, OperatorKind::JOIN, OperatorKind::SINK],
            1.0,
        )
        .with_conversion(conversion(("stream", ALPHA), ("collection", BETA), 1.0)),
    );
    b.register_plugin(
        plugin(BETA, DataKind::COLLECTION, &[OperatorKind::MAP], 1.0)
            .with_conversion(conversion(("collection", BETA), ("stream", ALPHA), 1.0)),
    );

    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("src");
    let m = plan.add_operator(ops::map("m", udf("f"))).expect("map");
    let j = plan.add_operator(ops::join("j")).expect("join");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");
    plan.connect(src, 0, m, 0).expect("src->m");
    plan.connect(src, 0, j, 0).expect("src->j");
    plan.connect(m, 0, j, 1).expect("m->j");
    plan.connect(j, 0, snk, 0).expect("j->snk");

    let exec = Optimizer::new(b.build())
        .optimize(&plan, &Configuration::default())
        .expect("optimize");
    check_partition(&exec);

    let stages = exec.stages();
    assert_eq!(stages.len(), 3);
    let bound = |op| exec.binding(op).expect("bound");
    assert!(stages[0].contains(bound(src)));
    assert!(!stages[0].contains(bound(j)));
    assert_eq!(stages[1].platform.as_str(), BETA);
    assert!(stages[1].contains(bound(m)));
    assert_eq!(ops_of(&exec, 2), BTreeSet::from([bound(j), bound(snk)]));
    assert_eq!(stages[2].depends_on, BTreeSet::from([stages[0].id, stages[1].id]));
}

#[test]
fn test_stage_ids_follow_position() {
    let (plan, _) = join_plan();
    let exec = Optimizer::new(two_platforms(1.0, 1.0, 1.0))
        .optimize(&plan, &Configuration::default())
        .expect("optimize");
    check_partition(&exec);
    for (i, stage) in exec.stages().iter().enumerate() {
        assert_eq!(stage.id, StageId::new(i as u64));
        assert_eq!(exec.stage(stage.id), Some(stage));
    }
}
