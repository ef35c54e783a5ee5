//! Metrics registry
//!
//! - Counters are monotonic, reset only on process start
//! - Two gauges mirror pool and store occupancy
//! - Atomic, lock-free

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

const PREFIX: &str = "rootfs_quota";

/// All operational counters and gauges
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    events_processed: AtomicU64,
    quotas_applied: AtomicU64,
    quotas_removed: AtomicU64,
    create_failures: AtomicU64,
    delete_failures: AtomicU64,
    clear_failures: AtomicU64,
    pool_exhausted: AtomicU64,
    persistence_failures: AtomicU64,
    state_inconsistencies: AtomicU64,
    reconcile_passes: AtomicU64,
    reconcile_restored: AtomicU64,
    reconcile_skipped: AtomicU64,
    orphans_swept: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    stream_losses: AtomicU64,
    ids_in_use: AtomicU64,
    entries: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_processed(&self) {
        Self::bump(&self.events_processed);
    }

    pub fn increment_quotas_applied(&self) {
        Self::bump(&self.quotas_applied);
    }

    pub fn increment_quotas_removed(&self) {
        Self::bump(&self.quotas_removed);
    }

    pub fn increment_create_failures(&self) {
        Self::bump(&self.create_failures);
    }

    pub fn increment_delete_failures(&self) {
        Self::bump(&self.delete_failures);
    }

    pub fn increment_clear_failures(&self) {
        Self::bump(&self.clear_failures);
    }

    pub fn increment_pool_exhausted(&self) {
        Self::bump(&self.pool_exhausted);
    }

    pub fn increment_persistence_failures(&self) {
        Self::bump(&self.persistence_failures);
    }

    pub fn increment_state_inconsistencies(&self) {
        Self::bump(&self.state_inconsistencies);
    }

    pub fn increment_reconcile_passes(&self) {
        Self::bump(&self.reconcile_passes);
    }

    pub fn increment_reconcile_restored(&self) {
        Self::bump(&self.reconcile_restored);
    }

    pub fn increment_reconcile_skipped(&self) {
        Self::bump(&self.reconcile_skipped);
    }

    pub fn increment_orphans_swept(&self) {
        Self::bump(&self.orphans_swept);
    }

    pub fn increment_connects(&self) {
        Self::bump(&self.connects);
    }

    pub fn increment_connect_failures(&self) {
        Self::bump(&self.connect_failures);
    }

    pub fn increment_stream_losses(&self) {
        Self::bump(&self.stream_losses);
    }

    /// Set the in-use ID and entry gauges
    pub fn set_occupancy(&self, ids_in_use: u64, entries: u64) {
        self.ids_in_use.store(ids_in_use, Ordering::Relaxed);
        self.entries.store(entries, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            events_processed: load(&self.events_processed),
            quotas_applied: load(&self.quotas_applied),
            quotas_removed: load(&self.quotas_removed),
            create_failures: load(&self.create_failures),
            delete_failures: load(&self.delete_failures),
            clear_failures: load(&self.clear_failures),
            pool_exhausted: load(&self.pool_exhausted),
            persistence_failures: load(&self.persistence_failures),
            state_inconsistencies: load(&self.state_inconsistencies),
            reconcile_passes: load(&self.reconcile_passes),
            reconcile_restored: load(&self.reconcile_restored),
            reconcile_skipped: load(&self.reconcile_skipped),
            orphans_swept: load(&self.orphans_swept),
            connects: load(&self.connects),
            connect_failures: load(&self.connect_failures),
            stream_losses: load(&self.stream_losses),
            ids_in_use: load(&self.ids_in_use),
            entries: load(&self.entries),
        }
    }

    /// Prometheus text exposition of the current values
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let counters: [(&str, &str, u64); 16] = [
            ("events_processed_total", "Runtime events handled", s.events_processed),
            ("quotas_applied_total", "Quotas applied to a container rootfs", s.quotas_applied),
            ("quotas_removed_total", "Quotas removed after container deletion", s.quotas_removed),
            ("create_failures_total", "Failed create sequences", s.create_failures),
            ("delete_failures_total", "Failed delete sequences", s.delete_failures),
            ("clear_failures_total", "Failed limit clears during deletion", s.clear_failures),
            ("pool_exhausted_total", "Allocations rejected by an exhausted pool", s.pool_exhausted),
            ("persistence_failures_total", "State document writes that failed", s.persistence_failures),
            ("state_inconsistencies_total", "Recorded and on-disk project IDs that disagreed", s.state_inconsistencies),
            ("reconcile_passes_total", "Reconciliation passes started", s.reconcile_passes),
            ("reconcile_restored_total", "Quotas created during reconciliation", s.reconcile_restored),
            ("reconcile_skipped_total", "Containers skipped during reconciliation", s.reconcile_skipped),
            ("orphans_swept_total", "Entries removed for containers no longer present", s.orphans_swept),
            ("connects_total", "Successful runtime connections", s.connects),
            ("connect_failures_total", "Failed runtime connection attempts", s.connect_failures),
            ("stream_losses_total", "Event streams lost after connecting", s.stream_losses),
        ];
        let gauges: [(&str, &str, u64); 2] = [
            ("project_ids_in_use", "Project IDs currently allocated", s.ids_in_use),
            ("state_entries", "Entries in the state document", s.entries),
        ];

        let mut out = String::with_capacity(2048);
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
            let _ = writeln!(out, "# TYPE {PREFIX}_{name} counter");
            let _ = writeln!(out, "{PREFIX}_{name} {value}");
        }
        for (name, help, value) in gauges {
            let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
            let _ = writeln!(out, "# TYPE {PREFIX}_{name} gauge");
            let _ = writeln!(out, "{PREFIX}_{name} {value}");
        }
        out
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub quotas_applied: u64,
    pub quotas_removed: u64,
    pub create_failures: u64,
    pub delete_failures: u64,
    pub clear_failures: u64,
    pub pool_exhausted: u64,
    pub persistence_failures: u64,
    pub state_inconsistencies: u64,
    pub reconcile_passes: u64,
    pub reconcile_restored: u64,
    pub reconcile_skipped: u64,
    pub orphans_swept: u64,
    pub connects: u64,
    pub connect_failures: u64,
    pub stream_losses: u64,
    pub ids_in_use: u64,
    pub entries: u64,
}
