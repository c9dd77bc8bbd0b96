//! Error classification, context chains and messages.


use std::error::Error as _;

use fixtures::*;
use xplan_core::prelude::*;
use xplan_exec::{ExecError, PlatformExecutionError};
use xplan_planner::Optimizer;

#[test]
fn test_user_errors_are_distinguished_from_defects() {
    assert!(Error::from(PlanStructureError::EmptyPlan).is_user_error());
    assert!(Error::Config("bad".into()).is_user_error());
    assert!(Error::Codec("bad".into()).is_user_error());
    assert!(!Error::Invariant("broken".into()).is_user_error());
    assert!(!Error::Hash("broken".into()).is_user_error());
}

#[test]
fn test_context_wraps_without_hiding_the_root() {
    let err = Error::from(PlanStructureError::EmptyPlan)
        .with_context("validating plan")
        .with_context("job 7");
    assert!(matches!(err.root(), Error::PlanStructure(PlanStructureError::EmptyPlan)));
    assert!(err.is_user_error());
    assert_eq!(
        err.to_string(),
        "Error in job 7: Error in validating plan: plan has no operators"
    );
    assert!(err.source().is_some());
}

#[test]
fn test_context_keeps_unsatisfiable_reachable() {
    let unsat = UnsatisfiablePlanError::at(
        Culprit::Operator {
            id: OperatorId::new(3),
            kind: OperatorKind::FILTER,
        },
        "nothing fits",
    );
    let err = Error::from(unsat.clone()).with_context("optimize");
    assert!(err.is_unsatisfiable());
    assert_eq!(err.as_unsatisfiable(), Some(&unsat));
    assert_eq!(
        unsat.to_string(),
        "unsatisfiable plan at operator op#3 (filter): nothing fits"
    );
}

#[test]
fn test_mapping_failure_becomes_unsatisfiable_with_cause() {
    let mut plan = Plan::new();
    let src = plan.add_operator(ops::source("src")).expect("src");
    let s = plan.add_operator(ops::sample("s", 5)).expect("sample");
    plan.connect(src, 0, s, 0).expect("src->s");

    let err = Optimizer::new(two_platforms(1.0, 1.0, 1.0))
        .optimize(&plan, &Configuration::default())
        .expect_err("sample is unmapped");
    assert!(err.is_unsatisfiable());
    let unsat = err.as_unsatisfiable().expect("unsatisfiable");
    assert_eq!(unsat.culprit.operator(), Some(s));
    let cause = unsat.cause.as_ref().expect("mapping cause");
    assert_eq!(cause.kind, OperatorKind::SAMPLE);
    assert!(unsat.source().is_some());
    assert_eq!(
        cause.to_string(),
        format!(
            "no applicable mapping for operator {s} of kind 'sample' (selectable platforms: [alpha, beta])"
        )
    );
}

#[test]
fn test_edge_culprit_message() {
    let culprit = Culprit::Edge {
        channel: ChannelId::new(1),
        producer: OperatorId::new(0),
        consumer: OperatorId::new(2),
        consumer_slot: 1,
    };
    assert_eq!(culprit.operator(), None);
    assert_eq!(
        culprit.to_string(),
        "edge ch#1 from op#0 to input 1 of op#2"
    );
}

#[test]
fn test_plan_structure_messages_name_the_operator() {
    let err = PlanStructureError::UnconnectedInput {
        op: OperatorId::new(4),
        kind: OperatorKind::JOIN,
        slot: 1,
    };
    assert_eq!(
        err.to_string(),
        "input slot 1 of operator op#4 (join) is not connected"
    );
}

#[test]
fn test_exec_error_exposes_core_failures() {
    let unsat = UnsatisfiablePlanError::at(
        Culprit::Operator {
            id: OperatorId::new(0),
            kind: OperatorKind::SOURCE,
        },
        "blacklisted",
    );
    let err = ExecError::from(Error::from(unsat).with_context("job"));
    assert!(err.as_core().is_some());
    assert_eq!(
        err.as_unsatisfiable().map(|u| u.reason.as_str()),
        Some("blacklisted")
    );
    assert!(err.failed_stage().is_none());

    assert!(ExecError::Cancelled.as_core().is_none());
    assert!(ExecError::MissingExecutor(PlatformId::new(BETA))
        .as_unsatisfiable()
        .is_none());
}

#[test]
fn test_stage_failure_message_carries_platform_error() {
    let err = ExecError::StageFailed {
        stage: StageId::new(2),
        platform: PlatformId::new(BETA),
        source: PlatformExecutionError::new(BETA, "disk full"),
    };
    assert_eq!(
        err.to_string(),
        "stage stage#2 on 'beta' failed: platform 'beta': disk full"
    );
    assert_eq!(
        err.source().map(|s| s.to_string()),
        Some("platform 'beta': disk full".to_string())
    );
    let beta = PlatformId::new(BETA);
    assert_eq!(err.failed_stage(), Some((StageId::new(2), &beta)));
}
