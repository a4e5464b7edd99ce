use std::time::Duration;

use super::*;

#[test]
fn disabled_filter_allows_everything() {
    let antispam = Antispam::new(0);
    assert!(!antispam.is_enabled());
    for _ in 0..10_000 {
        assert!(antispam.allow(1).is_allowed());
    }
    assert_eq!(antispam.tracked_sources(), 0);
}

#[test]
fn surplus_is_rejected_per_source() {
    let antispam = Antispam::new(3);

    for _ in 0..3 {
        assert!(antispam.allow(1).is_allowed());
    }
    assert_eq!(antispam.allow(1), AntispamDecision::RejectedFirst);
    assert_eq!(antispam.allow(1), AntispamDecision::Rejected);

    // Another source has its own budget.
    assert!(antispam.allow(2).is_allowed());
}

#[test]
fn first_rejection_of_a_window_is_flagged_once() {
    let antispam = Antispam::new(1);
    assert!(antispam.allow(7).is_allowed());
    assert_eq!(antispam.allow(7), AntispamDecision::RejectedFirst);
    assert_eq!(antispam.allow(7), AntispamDecision::Rejected);

    antispam.maintenance(Duration::from_secs(5));
    assert!(antispam.allow(7).is_allowed());
    assert_eq!(antispam.allow(7), AntispamDecision::RejectedFirst);
}

#[test]
fn maintenance_resets_budgets() {
    let antispam = Antispam::new(2);
    assert!(antispam.allow(1).is_allowed());
    assert!(antispam.allow(1).is_allowed());
    assert!(!antispam.allow(1).is_allowed());

    antispam.maintenance(Duration::from_secs(5));
    assert!(antispam.allow(1).is_allowed());
}

#[test]
fn idle_sources_are_evicted() {
    let antispam = Antispam::new(2);
    antispam.allow(1);
    assert_eq!(antispam.tracked_sources(), 1);

    // A zero-length window makes every bucket idle immediately.
    antispam.maintenance(Duration::ZERO);
    assert_eq!(antispam.tracked_sources(), 0);
}
