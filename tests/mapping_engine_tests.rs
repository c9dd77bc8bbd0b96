//! Mapping engine: candidate discovery under the live constraint set.


use std::sync::Arc;

use fixtures::*;
use xplan_core::prelude::*;
use xplan_mapping::{
    ExecRole, ExecutionOperator, Mapping, MappingCatalog, MappingEngine, OperatorTemplate,
    SubplanMatch, SubplanPattern,
};
use xplan_planner::{Optimizer, OptimizerContext};

fn registry(platforms: &[&str]) -> PlatformRegistry {
    let mut r = PlatformRegistry::new();
    for p in platforms {
        r.register(Platform::new(*p, *p));
    }
    r
}

fn catalog(platforms: &[&str]) -> MappingCatalog {
    let mut c = MappingCatalog::new();
    for p in platforms {
        for k in basic_kinds() {
            c.register(Mapping::single(
                *p,
                k.clone(),
                OperatorTemplate::uniform(format!("{p}.{k}"), DataKind::STREAM),
            ));
        }
    }
    c
}

#[test]
fn test_every_operator_gets_one_candidate_per_platform() {
    let (plan, ids) = source_filter_sink();
    let reg = registry(&[ALPHA, BETA]);
    let set = MappingEngine::map(
        &plan,
        &catalog(&[ALPHA, BETA]),
        &reg,
        &ConstraintSet::unrestricted(&reg),
    )
    .expect("candidates");

    assert_eq!(set.len(), 6);
    for id in ids {
        let platforms: Vec<&str> = set.for_operator(id).map(|c| c.platform().as_str()).collect();
        // Registration order.
        assert_eq!(platforms, vec![ALPHA, BETA]);
        assert!(set.for_operator(id).all(|c| c.covers() == [id]));
    }
    assert!(set.iter().enumerate().all(|(i, c)| c.index == i));
}

#[test]
fn test_candidate_ports_follow_logical_slots() {
    let (plan, [left, right, j, _, _]) = join_plan();
    let reg = registry(&[ALPHA]);
    let set = MappingEngine::map(&plan, &catalog(&[ALPHA]), &reg, &ConstraintSet::unrestricted(&reg))
        .expect("candidates");

    let join = set.for_operator(j).next().expect("join candidate");
    assert_eq!(join.exec.exec_kind, "alpha.join");
    assert_eq!(join.exec.role, ExecRole::Realization);
    assert_eq!(join.exec.inputs.len(), 2);
    assert_eq!(join.exec.input_for(InputRef { op: j, slot: 1 }), Some(1));
    assert_eq!(join.exec.outputs.len(), 1);

    let src = set.for_operator(left).next().expect("left candidate");
    assert!(src.exec.inputs.is_empty());
    assert_eq!(src.exec.output_for(OutputRef { op: left, slot: 0 }), Some(0));
    assert!(set.for_operator(right).next().is_some());
}

#[test]
fn test_unselectable_platforms_yield_no_candidates() {
    let (plan, ids) = source_filter_sink();
    let reg = registry(&[ALPHA, BETA]);
    let cfg = config_with(&[], &[ALPHA]);
    let set = MappingEngine::map(
        &plan,
        &catalog(&[ALPHA, BETA]),
        &reg,
        &ConstraintSet::new(&cfg.platforms, &reg),
    )
    .expect("beta still maps everything");
    for id in ids {
        assert!(set.for_operator(id).all(|c| c.platform().as_str() == BETA));
    }
}

#[test]
fn test_target_platform_filters_candidates() {
    let mut plan = Plan::new();
    let src = plan
        .add_operator(ops::source("src").with_target_platform(BETA))
        .expect("source");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");
    plan.connect(src, 0, snk, 0).expect("src->snk");

    let reg = registry(&[ALPHA, BETA]);
    let set = MappingEngine::map(
        &plan,
        &catalog(&[ALPHA, BETA]),
        &reg,
        &ConstraintSet::unrestricted(&reg),
    )
    .expect("candidates");
    let srcs: Vec<_> = set.for_operator(src).collect();
    assert_eq!(srcs.len(), 1);
    assert_eq!(srcs[0].platform().as_str(), BETA);
    assert_eq!(set.for_operator(snk).count(), 2);
}

#[test]
fn test_hosted_kinds_gate_candidates() {
    let (plan, [_, flt, _]) = source_filter_sink();
    let mut reg = PlatformRegistry::new();
    reg.register(Platform::new(ALPHA, ALPHA).hosting(["alpha.source", "alpha.sink"]));
    let err = MappingEngine::map(&plan, &catalog(&[ALPHA]), &reg, &ConstraintSet::unrestricted(&reg))
        .expect_err("filter is not hosted");
    assert_eq!(err.operator, flt);
    assert_eq!(err.kind, OperatorKind::FILTER);
    assert_eq!(err.considered, vec![PlatformId::new(ALPHA)]);
}

#[test]
fn test_fused_candidate_covers_contained_chain() {
    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("src");
    let m = plan.add_operator(ops::map("m", udf("inc"))).expect("map");
    let f = plan.add_operator(ops::filter("f", udf("odd"))).expect("filter");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");
    plan.connect(src, 0, m, 0).expect("src->m");
    plan.connect(m, 0, f, 0).expect("m->f");
    plan.connect(f, 0, snk, 0).expect("f->snk");

    let mut cat = catalog(&[ALPHA]);
    cat.register(Mapping::fused(
        ALPHA,
        SubplanPattern::chain(&[OperatorKind::MAP, OperatorKind::FILTER]).expect("pattern"),
        OperatorTemplate::uniform("alpha.map_filter", DataKind::STREAM),
    ));
    let reg = registry(&[ALPHA]);
    let set = MappingEngine::map(&plan, &cat, &reg, &ConstraintSet::unrestricted(&reg)).expect("candidates");

    let fused: Vec<_> = set.iter().filter(|c| c.is_fused()).collect();
    assert_eq!(fused.len(), 1);
    let exec = &fused[0].exec;
    assert_eq!(exec.covers, vec![m, f]);
    assert_eq!(exec.name, "alpha.map_filter[m+f]");
    // Only the boundary slots are exposed.
    assert_eq!(exec.inputs.len(), 1);
    assert_eq!(exec.input_for(InputRef { op: m, slot: 0 }), Some(0));
    assert_eq!(exec.output_for(OutputRef { op: f, slot: 0 }), Some(0));
    assert_eq!(exec.output_for(OutputRef { op: m, slot: 0 }), None);
    assert_eq!(exec.transforms.len(), 2);

    assert_eq!(set.for_operator(m).count(), 2);
    assert_eq!(set.for_operator(f).count(), 2);
}

#[test]
fn test_custom_factory_can_offer_several_candidates() {
    let (plan, [_, flt, _]) = source_filter_sink();
    let mut cat = catalog(&[ALPHA]);
    cat.register(Mapping::new(
        "alpha:filter-variants",
        ALPHA,
        SubplanPattern::single(OperatorKind::FILTER),
        Arc::new(|plan: &Plan, m: &SubplanMatch, platform: &PlatformId| {
            ["alpha.filter_vectorized", "alpha.filter_indexed"]
                .into_iter()
                .map(|k| {
                    ExecutionOperator::for_match(
                        plan,
                        m,
                        platform,
                        &OperatorTemplate::uniform(k, DataKind::STREAM),
                    )
                })
                .collect::<Vec<_>>()
        }),
    ));
    let reg = registry(&[ALPHA]);
    let set = MappingEngine::map(&plan, &cat, &reg, &ConstraintSet::unrestricted(&reg)).expect("candidates");
    let kinds: Vec<&str> = set.for_operator(flt).map(|c| c.exec.exec_kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["alpha.filter", "alpha.filter_vectorized", "alpha.filter_indexed"]
    );
    assert!(set
        .for_operator(flt)
        .filter(|c| c.mapping == "alpha:filter-variants")
        .all(|c| c.exec.covers == vec![flt]));
}

#[test]
fn test_optimizer_validate_surfaces_unmapped_kind() {
    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("src");
    let s = plan.add_operator(ops::sample("s", 10)).expect("sample");
    let snk = plan.add_operator(ops::sink("snk")).expect("sink");
    plan.connect(src, 0, s, 0).expect("src->s");
    plan.connect(s, 0, snk, 0).expect("s->snk");

    let optimizer = Optimizer::new(two_platforms(1.0, 1.0, 1.0));
    let err = optimizer
        .validate(&plan, &Configuration::default())
        .expect_err("no mapping for sample");
    match &err {
        Error::NoApplicableMapping(e) => {
            assert_eq!(e.operator, s);
            assert_eq!(e.kind, OperatorKind::SAMPLE);
            assert_eq!(e.considered, vec![PlatformId::new(ALPHA), PlatformId::new(BETA)]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_user_error());
}

#[test]
fn test_optimizer_validate_returns_candidates() {
    let (plan, _) = source_filter_sink();
    let mut b = OptimizerContext::builder();
    b.register_plugin(plugin(ALPHA, DataKind::STREAM, &basic_kinds(), 1.0));
    let set = Optimizer::new(b.build())
        .validate(&plan, &Configuration::default())
        .expect("valid plan");
    assert_eq!(set.len(), 3);
    assert_eq!(set.platforms().len(), 1);
}
