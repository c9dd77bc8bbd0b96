//! Platform constraints: whitelist, blacklist and the derived selectable set.


use std::collections::BTreeSet;

use fixtures::*;
use xplan_core::prelude::*;

fn ids(names: &[&str]) -> BTreeSet<PlatformId> {
    names.iter().map(|n| PlatformId::new(*n)).collect()
}

#[test]
fn test_empty_lists_select_every_registered_platform() {
    let ctx = two_platforms(1.0, 1.0, 1.0);
    let c = ctx.constraints(&PlatformProvider::default());
    assert_eq!(c.selectable(), &ids(&[ALPHA, BETA]));
    assert_eq!(c.rejection_reason(&PlatformId::new(ALPHA)), None);
}

#[test]
fn test_unregistered_platform_is_never_selectable() {
    let ctx = two_platforms(1.0, 1.0, 1.0);
    let cfg = config_with(&["gamma"], &[]);
    let c = ctx.constraints(&cfg.platforms);
    assert!(c.selectable().is_empty());
    assert_eq!(
        c.rejection_reason(&PlatformId::new("gamma")),
        Some("not registered")
    );
    assert_eq!(
        c.rejection_reason(&PlatformId::new(ALPHA)),
        Some("not whitelisted")
    );
}

#[test]
fn test_blacklist_dominates_whitelist() {
    let ctx = two_platforms(1.0, 1.0, 1.0);
    let cfg = config_with(&[ALPHA, BETA], &[BETA]);
    let c = ctx.constraints(&cfg.platforms);
    assert_eq!(c.selectable(), &ids(&[ALPHA]));
    assert_eq!(c.rejection_reason(&PlatformId::new(BETA)), Some("blacklisted"));
}

#[test]
fn test_whitelist_and_blacklist_are_independent_sets() {
    let mut provider = PlatformProvider::default();
    provider.add_to_whitelist(ALPHA);
    provider.add_to_blacklist(ALPHA);
    provider.add_to_whitelist(ALPHA);
    assert_eq!(provider.whitelist(), &ids(&[ALPHA]));
    assert_eq!(provider.blacklist(), &ids(&[ALPHA]));
}

#[test]
fn test_restrict_to_pins_a_single_platform() {
    let ctx = two_platforms(1.0, 1.0, 1.0);
    let c = ctx.constraints(&PlatformProvider::default());
    let pinned = c.restrict_to(&PlatformId::new(BETA));
    assert_eq!(pinned.selectable(), &ids(&[BETA]));
    assert_eq!(
        pinned.rejection_reason(&PlatformId::new(ALPHA)),
        Some("not whitelisted")
    );

    let blocked = ctx.constraints(&config_with(&[], &[BETA]).platforms);
    assert!(blocked.restrict_to(&PlatformId::new(BETA)).selectable().is_empty());
}

#[test]
fn test_snapshot_is_isolated_from_later_changes() {
    let mut cfg = config_with(&[ALPHA], &[]);
    let snapshot = cfg.snapshot();
    cfg.platforms.add_to_blacklist(ALPHA);
    cfg.execution.max_parallel_stages = 1;

    assert!(snapshot.blacklist().is_empty());
    assert_eq!(snapshot.whitelist(), &ids(&[ALPHA]));
    assert_eq!(snapshot.execution.max_parallel_stages, 4);
}

#[test]
fn test_configuration_reads_lists_from_environment() {
    std::env::set_var("XPLAN_WHITELIST", " alpha, beta ,,");
    std::env::set_var("XPLAN_BLACKLIST", "beta");
    std::env::set_var("XPLAN_MAX_PARALLEL_STAGES", "0");
    let cfg = Configuration::from_env();
    std::env::remove_var("XPLAN_WHITELIST");
    std::env::remove_var("XPLAN_BLACKLIST");
    std::env::remove_var("XPLAN_MAX_PARALLEL_STAGES");

    assert_eq!(cfg.whitelist(), &ids(&[ALPHA, BETA]));
    assert_eq!(cfg.blacklist(), &ids(&[BETA]));
    // Zero is ignored.
    assert_eq!(cfg.execution.max_parallel_stages, 4);
}

#[test]
fn test_configuration_deserializes_with_defaults() {
    let cfg: Configuration = serde_json::from_str(
        r#"{"platforms": {"whitelist": ["alpha"], "blacklist": []}}"#,
    )
    .expect("config json");
    assert_eq!(cfg.whitelist(), &ids(&[ALPHA]));
    assert_eq!(cfg.enumeration, Configuration::default().enumeration);
}
