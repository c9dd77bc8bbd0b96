//! Conversion graph: cheapest paths between channel descriptors.


use std::collections::BTreeSet;

use fixtures::*;
use xplan_channels::{ChannelConversion, ChannelDescriptor, ConversionGraph};
use xplan_core::prelude::*;
use xplan_planner::{Optimizer, OptimizerContext};

fn d(kind: &str, platform: &str) -> ChannelDescriptor {
    ChannelDescriptor::new(kind, platform)
}

fn constraints(blacklist: &[&str]) -> ConstraintSet {
    let mut r = PlatformRegistry::new();
    for p in [ALPHA, BETA, "gamma"] {
        r.register(Platform::new(p, p));
    }
    ConstraintSet::new(&config_with(&[], blacklist).platforms, &r)
}

#[test]
fn test_source_in_targets_needs_no_conversion() {
    let mut g = ConversionGraph::new();
    g.register(conversion(("stream", ALPHA), ("collection", BETA), 1.0));
    let targets = BTreeSet::from([d("stream", ALPHA), d("collection", BETA)]);
    let path = g
        .shortest_path(&d("stream", ALPHA), &targets, 1_000, &constraints(&[]))
        .expect("path");
    assert!(path.is_empty());
    assert_eq!(path.hops(), 0);
    assert_eq!(path.target, d("stream", ALPHA));
}

#[test]
fn test_cheaper_multi_hop_path_wins() {
    let mut g = ConversionGraph::new();
    let direct = g.register(conversion(("stream", ALPHA), ("collection", BETA), 5.0));
    let to_file = g.register(conversion(("stream", ALPHA), ("file", ALPHA), 1.0));
    let from_file = g.register(conversion(("file", ALPHA), ("collection", BETA), 1.5));

    let targets = BTreeSet::from([d("collection", BETA)]);
    let path = g
        .shortest_path(&d("stream", ALPHA), &targets, 10, &constraints(&[]))
        .expect("path");
    assert_eq!(path.steps, vec![to_file, from_file]);
    assert_eq!(path.cost, 2.5);
    assert_ne!(path.steps, vec![direct]);
}

#[test]
fn test_path_cost_depends_on_cardinality() {
    let mut g = ConversionGraph::new();
    let fixed = g.register(conversion(("stream", ALPHA), ("collection", BETA), 5.0));
    let per_row = g.register(ChannelConversion::new(
        "stream-per-row",
        d("stream", ALPHA),
        d("collection", BETA),
        LinearCost::new(0.0, 0.001, 0.0),
    ));
    let targets = BTreeSet::from([d("collection", BETA)]);

    let small = g
        .shortest_path(&d("stream", ALPHA), &targets, 100, &constraints(&[]))
        .expect("small");
    assert_eq!(small.steps, vec![per_row]);

    let large = g
        .shortest_path(&d("stream", ALPHA), &targets, 1_000_000, &constraints(&[]))
        .expect("large");
    assert_eq!(large.steps, vec![fixed]);
    assert_eq!(large.cost, 5.0);
}

#[test]
fn test_nearest_of_several_targets_is_reached() {
    let mut g = ConversionGraph::new();
    g.register(conversion(("stream", ALPHA), ("collection", BETA), 3.0));
    let cheap = g.register(conversion(("stream", ALPHA), ("broadcast", BETA), 1.0));
    let targets = BTreeSet::from([d("collection", BETA), d("broadcast", BETA)]);
    let path = g
        .shortest_path(&d("stream", ALPHA), &targets, 1, &constraints(&[]))
        .expect("path");
    assert_eq!(path.steps, vec![cheap]);
    assert_eq!(path.target, d("broadcast", BETA));
}

#[test]
fn test_unreachable_and_empty_targets_yield_none() {
    let mut g = ConversionGraph::new();
    g.register(conversion(("stream", ALPHA), ("collection", BETA), 1.0));
    let c = constraints(&[]);
    assert!(g
        .shortest_path(&d("collection", BETA), &BTreeSet::from([d("stream", ALPHA)]), 1, &c)
        .is_none());
    assert!(g
        .shortest_path(&d("stream", ALPHA), &BTreeSet::new(), 1, &c)
        .is_none());
}

#[test]
fn test_conversion_executing_on_blacklisted_platform_is_skipped() {
    let mut g = ConversionGraph::new();
    let via_gamma = g.register(
        conversion(("stream", ALPHA), ("collection", BETA), 1.0).executed_on("gamma"),
    );
    let on_alpha = g.register(conversion(("stream", ALPHA), ("collection", BETA), 4.0));
    let targets = BTreeSet::from([d("collection", BETA)]);

    let free = g
        .shortest_path(&d("stream", ALPHA), &targets, 1, &constraints(&[]))
        .expect("path");
    assert_eq!(free.steps, vec![via_gamma]);

    let blocked = g
        .shortest_path(&d("stream", ALPHA), &targets, 1, &constraints(&["gamma"]))
        .expect("path");
    assert_eq!(blocked.steps, vec![on_alpha]);
}

#[test]
fn test_conversion_defaults_to_source_platform() {
    let c = conversion(("stream", ALPHA), ("collection", BETA), 1.0);
    assert_eq!(c.platform, PlatformId::new(ALPHA));
    assert_eq!(c.cost(42), 1.0);
    let moved = c.executed_on(BETA);
    assert_eq!(moved.platform, PlatformId::new(BETA));
}

#[test]
fn test_optimizer_materializes_every_hop() {
    let mut b = OptimizerContext::builder();
    let kinds = [OperatorKind::SOURCE, OperatorKind::SINK];
    b.register_plugin(
        plugin(ALPHA, DataKind::STREAM, &kinds, 1.0)
            .with_conversion(conversion(("stream", ALPHA), ("collection", BETA), 5.0))
            .with_conversion(conversion(("stream", ALPHA), ("file", ALPHA), 1.0))
            .with_conversion(conversion(("file", ALPHA), ("collection", BETA), 1.0)),
    );
    b.register_plugin(plugin(BETA, DataKind::COLLECTION, &kinds, 1.0));

    let mut plan = Plan::new();
    let src = plan
        .add_operator(ops::source("src").with_target_platform(ALPHA))
        .expect("src");
    let snk = plan
        .add_operator(ops::sink("snk").with_target_platform(BETA))
        .expect("sink");
    plan.connect(src, 0, snk, 0).expect("src->snk");

    let exec = Optimizer::new(b.build())
        .optimize(&plan, &Configuration::default())
        .expect("optimize");
    assert_eq!(exec.total_cost(), 4.0);
    assert_eq!(exec.conversion_count(), 2);

    let names: Vec<&str> = exec
        .operators()
        .filter(|(_, op)| op.is_conversion())
        .map(|(_, op)| op.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["stream@alpha->file@alpha", "file@alpha->collection@beta"]
    );

    // src -> conv -> conv -> snk
    assert_eq!(exec.channels().count(), 3);
    let logical: BTreeSet<_> = exec.channels().map(|ch| ch.logical).collect();
    assert_eq!(logical.len(), 1);
    let descriptors: Vec<String> = exec.channels().map(|ch| ch.descriptor.to_string()).collect();
    assert_eq!(
        descriptors,
        vec!["stream@alpha", "file@alpha", "collection@beta"]
    );
}
