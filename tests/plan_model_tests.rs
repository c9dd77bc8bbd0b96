//! Plan model: building, connecting and validating logical plans.


use fixtures::udf;
use xplan_core::prelude::*;

fn typed_source(name: &str, ty: &str) -> Operator {
    Operator::new(OperatorKind::SOURCE, name).with_output("out", ty)
}

fn typed_sink(name: &str, ty: &str) -> Operator {
    Operator::new(OperatorKind::SINK, name).with_input("in", ty)
}

#[test]
fn test_connect_rejects_type_mismatch() {
    let mut plan = Plan::new();
    let src = plan.add_operator(typed_source("ints", "i64")).expect("source");
    let snk = plan.add_operator(typed_sink("strings", "utf8")).expect("sink");

    let err = plan.connect(src, 0, snk, 0).expect_err("types differ");
    assert_eq!(
        err,
        PlanStructureError::TypeMismatch {
            producer: src,
            consumer: snk,
            produced: "i64".into(),
            expected: "utf8".into(),
        }
    );
    assert_eq!(plan.channels().count(), 0);
}

#[test]
fn test_wildcard_type_is_compatible_with_any() {
    let mut plan = Plan::new();
    let src = plan.add_operator(typed_source("ints", "i64")).expect("source");
    let snk = plan.add_operator(ops::sink("any")).expect("sink");
    plan.connect(src, 0, snk, 0).expect("wildcard accepts i64");
    plan.validate().expect("complete plan");
}

#[test]
fn test_connect_rejects_cycle() {
    let mut plan = Plan::new();
    let a = plan.add_operator(ops::union("a", 2)).expect("a");
    let b = plan.add_operator(ops::map("b", udf("f"))).expect("b");
    plan.connect(a, 0, b, 0).expect("a->b");

    let err = plan.connect(b, 0, a, 0).expect_err("b->a closes a cycle");
    assert_eq!(err, PlanStructureError::Cycle { producer: b, consumer: a });

    let err = plan.connect(a, 0, a, 0).expect_err("self loop");
    assert!(matches!(err, PlanStructureError::Cycle { .. }));
}

#[test]
fn test_connect_enforces_slot_arity() {
    let mut plan = Plan::new();
    let s1 = plan.add_operator(ops::source("s1")).expect("s1");
    let s2 = plan.add_operator(ops::source("s2")).expect("s2");
    let m = plan.add_operator(ops::map("m", udf("f"))).expect("map");
    plan.connect(s1, 0, m, 0).expect("first input");

    let err = plan.connect(s2, 0, m, 0).expect_err("slot is full");
    assert!(matches!(
        err,
        PlanStructureError::ArityExceeded { op, slot: 0, arity: 1, .. } if op == m
    ));
}

#[test]
fn test_union_slot_accepts_its_declared_fan_in() {
    let mut plan = Plan::new();
    let sources: Vec<_> = (0..3)
        .map(|i| plan.add_operator(ops::source(&format!("s{i}"))).expect("source"))
        .collect();
    let u = plan.add_operator(ops::union("u", 2)).expect("union");
    plan.connect(sources[0], 0, u, 0).expect("first");
    plan.connect(sources[1], 0, u, 0).expect("second");
    let err = plan.connect(sources[2], 0, u, 0).expect_err("third exceeds fan-in");
    assert!(matches!(err, PlanStructureError::ArityExceeded { arity: 2, .. }));
}

#[test]
fn test_fan_out_shares_one_channel() {
    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("source");
    let a = plan.add_operator(ops::sink("a")).expect("a");
    let b = plan.add_operator(ops::sink("b")).expect("b");

    let ch_a = plan.connect(src, 0, a, 0).expect("src->a");
    let ch_b = plan.connect(src, 0, b, 0).expect("src->b");
    assert_eq!(ch_a, ch_b);

    let ch = plan.channel(ch_a).expect("channel");
    assert_eq!(ch.consumers.len(), 2);
    assert_eq!(plan.edges().len(), 2);
    assert_eq!(plan.downstream(src), vec![a, b]);
}

#[test]
fn test_reconnecting_an_edge_is_idempotent() {
    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("source");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");

    let first = plan.connect(src, 0, snk, 0).expect("connect");
    let again = plan.connect(src, 0, snk, 0).expect("reconnect");
    assert_eq!(first, again);
    assert_eq!(plan.edges().len(), 1);
}

#[test]
fn test_unknown_slots_and_operators_are_rejected() {
    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("source");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");

    assert!(matches!(
        plan.connect(src, 1, snk, 0),
        Err(PlanStructureError::NoSuchOutputSlot { slot: 1, .. })
    ));
    assert!(matches!(
        plan.connect(src, 0, snk, 3),
        Err(PlanStructureError::NoSuchInputSlot { slot: 3, .. })
    ));
    assert_eq!(
        plan.connect(src, 0, OperatorId::new(99), 0),
        Err(PlanStructureError::UnknownOperator(OperatorId::new(99)))
    );
}

#[test]
fn test_validate_reports_unconnected_input() {
    let mut plan = Plan::new();
    let left = plan.add_operator(ops::source("left")).expect("left");
    let j = plan.add_operator(ops::join("j")).expect("join");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");
    plan.connect(left, 0, j, 0).expect("left->j");
    plan.connect(j, 0, snk, 0).expect("j->snk");

    assert_eq!(
        plan.validate(),
        Err(PlanStructureError::UnconnectedInput {
            op: j,
            kind: OperatorKind::JOIN,
            slot: 1,
        })
    );
}

#[test]
fn test_validate_rejects_empty_plan() {
    assert_eq!(Plan::new().validate(), Err(PlanStructureError::EmptyPlan));
}

#[test]
fn test_topological_order_is_deterministic() {
    let (plan, [left, right, j, m, snk]) = fixtures::join_plan();
    let order = plan.topological_order();
    assert_eq!(order, vec![left, right, j, m, snk]);
    assert_eq!(plan.sources(), vec![left, right]);
    assert_eq!(plan.sinks(), vec![snk]);
    assert_eq!(plan.upstream(j), vec![left, right]);
}

fn body() -> Plan {
    let mut body = Plan::new();
    let entry = body.add_operator(ops::source("entry")).expect("entry");
    let step = body.add_operator(ops::map("step", udf("f"))).expect("step");
    let exit = body.add_operator(ops::sink("exit")).expect("exit");
    body.connect(entry, 0, step, 0).expect("entry->step");
    body.connect(step, 0, exit, 0).expect("step->exit");
    body
}

#[test]
fn test_loop_with_valid_body_is_accepted() {
    let mut plan = Plan::new();
    let lp = plan
        .add_operator(ops::repeat("iterate", LoopSpec::new(body(), 5)))
        .expect("loop");
    let op = plan.operator(lp).expect("operator");
    assert!(op.is_loop());
    assert_eq!(op.loop_spec.as_ref().map(|s| s.max_iterations), Some(5));
}

#[test]
fn test_loop_validation_rejects_bad_bodies() {
    let mut plan = Plan::new();

    let err = plan
        .add_operator(ops::repeat("zero", LoopSpec::new(body(), 0)))
        .expect_err("zero iterations");
    assert!(matches!(err, PlanStructureError::InvalidLoop { .. }));

    let mut incomplete = Plan::new();
    incomplete
        .add_operator(ops::map("dangling", udf("f")))
        .expect("map");
    let err = plan
        .add_operator(ops::repeat("incomplete", LoopSpec::new(incomplete, 3)))
        .expect_err("body input unconnected");
    match err {
        PlanStructureError::InvalidLoop { reason, .. } => assert!(reason.contains("invalid body")),
        other => panic!("unexpected error: {other}"),
    }

    let mut two_exits = body();
    let extra_src = two_exits.add_operator(ops::source("extra")).expect("extra");
    let extra_snk = two_exits.add_operator(ops::sink("extra_out")).expect("extra sink");
    two_exits.connect(extra_src, 0, extra_snk, 0).expect("connect");
    let err = plan
        .add_operator(ops::repeat("ambiguous", LoopSpec::new(two_exits, 3)))
        .expect_err("two entries and exits");
    assert!(matches!(err, PlanStructureError::InvalidLoop { .. }));

    let bare = Operator::new(OperatorKind::LOOP, "bare")
        .with_input("in", DataType::ANY)
        .with_output("out", DataType::ANY);
    assert!(matches!(
        plan.add_operator(bare),
        Err(PlanStructureError::InvalidLoop { .. })
    ));
    assert!(plan.is_empty());
}

#[test]
fn test_planned_iterations_are_bounded() {
    let mut spec = LoopSpec::new(body(), 4);
    assert_eq!(spec.planned_iterations(10), 4);
    assert_eq!(spec.planned_iterations(2), 2);
    spec.expected_iterations = Some(3);
    assert_eq!(spec.planned_iterations(10), 3);
    spec.expected_iterations = Some(0);
    assert_eq!(spec.planned_iterations(10), 1);
}

#[test]
fn test_target_platforms_restrict_allowed_platforms() {
    let free = ops::source("free");
    assert!(free.allows_platform(&PlatformId::new("anything")));

    let pinned = ops::source("pinned").with_target_platform("alpha");
    assert!(pinned.allows_platform(&PlatformId::new("alpha")));
    assert!(!pinned.allows_platform(&PlatformId::new("beta")));
}

#[test]
fn test_plan_roundtrips_through_json() {
    let (plan, _) = fixtures::join_plan();
    let json = serde_json::to_string(&plan).expect("serialize");
    let back: Plan = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.topological_order(), plan.topological_order());
    assert_eq!(back.edges(), plan.edges());
    back.validate().expect("still valid");
}
