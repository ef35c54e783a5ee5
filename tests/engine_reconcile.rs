//! Reconciliation pass
//!
//! - A persisted entry for a live container is re-reserved, never
//!   re-allocated or re-enforced
//! - Missed creations are repaired
//! - Per-container failures are isolated
//! - Orphans are only swept when enabled

mod common;

use common::{entry, limits, Fixture};
use rootfs_quota::engine::{EngineConfig, EngineErrorCode, ReconcileReport};
use rootfs_quota::enforcer::{EnforcerCall, EnforcerOp, QuotaLimits};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_crash_recovery_marks_persisted_id_without_allocating() {
    let mut fx = Fixture::new(5, 50);
    let path = fx.live("c1");
    fx.restart_with(&[entry("c1", 7, &path)]);
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert!(fx.pool.is_used(7));
    assert_eq!(fx.pool.in_use(), vec![7]);
    assert!(engine.enforcer().calls().is_empty());
    assert_eq!(
        report,
        ReconcileReport {
            live: 1,
            seeded: 1,
            reasserted: 1,
            ..Default::default()
        }
    );
    assert_eq!(fx.store.get("c1").unwrap().project_id, 7);
}

#[tokio::test]
async fn test_missed_creation_is_repaired_around_seeded_ids() {
    let mut fx = Fixture::new(5, 50);
    let c1 = fx.live("c1");
    fx.restart_with(&[entry("c1", 5, &c1)]);
    let c2 = fx.live("c2");
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.restored, 1);
    assert_eq!(report.reasserted, 1);
    let created = fx.store.get("c2").unwrap();
    assert_eq!(created.project_id, 6);
    assert_eq!(created.upperdir, c2);
    assert_eq!(engine.enforcer().tag_of(&c2), Some(6));
    assert_eq!(engine.enforcer().limits_of(6), Some(limits()));
    assert_eq!(engine.metrics().snapshot().reconcile_restored, 1);
}

#[tokio::test]
async fn test_entries_of_gone_containers_still_seed_the_pool() {
    let mut fx = Fixture::new(5, 50);
    let gone = fx.upperdir("c9");
    fx.restart_with(&[entry("c9", 5, &gone)]);
    let c2 = fx.live("c2");
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.seeded, 1);
    assert_eq!(fx.store.get("c2").unwrap().project_id, 6);
    assert_eq!(engine.enforcer().tag_of(&c2), Some(6));
    // not swept by default
    assert!(fx.store.get("c9").is_some());
    assert!(fx.pool.is_used(5));
}

#[tokio::test]
async fn test_not_ready_path_is_skipped() {
    let fx = Fixture::new(5, 50);
    fx.gateway.add_container("c1", fx.upperdir_path("c1"));
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.not_ready, 1);
    assert!(fx.store.is_empty());
    assert!(fx.pool.in_use().is_empty());
}

#[tokio::test]
async fn test_unresolvable_container_does_not_abort_pass() {
    let fx = Fixture::new(5, 50);
    fx.live("a");
    fx.live("b");
    fx.live("c");
    fx.gateway.fail_resolve("b");
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.restored, 2);
    assert!(fx.store.get("a").is_some());
    assert!(fx.store.get("b").is_none());
    assert!(fx.store.get("c").is_some());
}

#[tokio::test]
async fn test_create_failure_is_isolated() {
    let fx = Fixture::new(5, 50);
    fx.live("a");
    let engine = fx.engine();
    engine.enforcer().fail_on(EnforcerOp::SetLimit);

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(fx.pool.in_use().is_empty());

    // a later pass picks it up
    engine.enforcer().clear_failures();
    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.restored, 1);
}

#[tokio::test]
async fn test_list_failure_is_stream_error() {
    let fx = Fixture::new(5, 50);
    fx.gateway.fail_next_list();
    let engine = fx.engine();

    let err = engine.reconcile(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.code(), EngineErrorCode::StreamError);
}

#[tokio::test]
async fn test_out_of_range_entry_is_not_marked() {
    let mut fx = Fixture::new(5, 50);
    let path = fx.live("c1");
    fx.restart_with(&[entry("c1", 900, &path)]);
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.seeded, 0);
    assert_eq!(report.reasserted, 1);
    assert!(fx.pool.in_use().is_empty());
    assert_eq!(fx.store.get("c1").unwrap().project_id, 900);
}

#[tokio::test]
async fn test_path_drift_keeps_entry() {
    let mut fx = Fixture::new(5, 50);
    let recorded = fx.upperdir("old");
    fx.restart_with(&[entry("c1", 8, &recorded)]);
    fx.live("c1");
    let engine = fx.engine();

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.reasserted, 1);
    assert_eq!(fx.store.get("c1").unwrap().upperdir, recorded);
    assert!(engine.enforcer().calls().is_empty());
}

#[tokio::test]
async fn test_orphan_sweep_when_enabled() {
    let mut fx = Fixture::new(5, 50);
    let gone = fx.upperdir("c9");
    let live = fx.live("c1");
    fx.restart_with(&[entry("c9", 9, &gone), entry("c1", 5, &live)]);
    let mut config = EngineConfig::new(limits());
    config.orphan_sweep = true;
    let engine = fx.engine_with(config);
    engine.enforcer().set_tag(&gone, 9);

    let report = engine.reconcile(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.swept, 1);
    assert!(fx.store.get("c9").is_none());
    assert!(fx.store.get("c1").is_some());
    assert!(!fx.pool.is_used(9));
    assert!(fx.pool.is_used(5));
    assert_eq!(engine.enforcer().limits_of(9), Some(QuotaLimits::cleared()));
    assert_eq!(engine.metrics().snapshot().orphans_swept, 1);
}

#[tokio::test]
async fn test_cancelled_pass_stops_before_external_calls() {
    let fx = Fixture::new(5, 50);
    fx.live("c1");
    let engine = fx.engine();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.reconcile(&cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(fx.store.is_empty());
    assert!(!engine
        .enforcer()
        .calls()
        .iter()
        .any(|c| matches!(c, EnforcerCall::Tag { .. })));
}

#[tokio::test]
async fn test_reconcile_updates_occupancy_gauges() {
    let fx = Fixture::new(5, 50);
    fx.live("a");
    fx.live("b");
    let engine = fx.engine();

    engine.reconcile(&CancellationToken::new()).await.unwrap();

    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.ids_in_use, 2);
    assert_eq!(snapshot.entries, 2);
    assert_eq!(snapshot.reconcile_passes, 1);
}
