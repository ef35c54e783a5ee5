//! Reconciliation pass, run after every successful connect

use std::collections::BTreeSet;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::errors::{EngineError, EngineResult};
use super::lifecycle::{CreateOutcome, DeleteOutcome};
use super::worker::ReconciliationEngine;
use crate::enforcer::QuotaEnforcer;
use crate::observability::{log_event_with_fields, Event};
use crate::runtime::RuntimeGateway;

/// What one reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Containers the runtime listed
    pub live: usize,
    /// Persisted project IDs marked used before any allocation
    pub seeded: usize,
    /// Live containers that already had an entry
    pub reasserted: usize,
    /// Live containers that got a quota they were missing
    pub restored: usize,
    /// Live containers whose path could not be resolved
    pub skipped: usize,
    /// Live containers whose path does not exist yet
    pub not_ready: usize,
    /// Create or sweep sequences that failed
    pub failed: usize,
    /// Entries removed because their container is gone
    pub swept: usize,
}

impl<G, E, C> ReconciliationEngine<G, E, C>
where
    G: RuntimeGateway,
    E: QuotaEnforcer,
    C: Clock,
{
    /// Bring the pool, the store and enforcement in line with the runtime's
    /// live containers.
    ///
    /// 1. Mark every persisted project ID used, before any allocation.
    /// 2. For each live container with an existing path: keep its entry, or
    ///    run the create sequence if it has none.
    /// 3. Optionally sweep entries whose container is no longer live.
    ///
    /// A failure on one container is logged and does not abort the pass.
    ///
    /// # Errors
    ///
    /// - `StreamError` if the live containers cannot be listed.
    /// - `Cancelled` if cancellation is observed between containers.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> EngineResult<ReconcileReport> {
        self.ensure_active(cancel)?;

        let started = Instant::now();
        self.metrics.increment_reconcile_passes();
        log_event_with_fields(
            Event::ReconcileBegin,
            &[("entries", &self.store.len().to_string())],
        );

        let mut report = ReconcileReport::default();

        for entry in self.store.all() {
            match self.pool.mark_used(entry.project_id) {
                Ok(()) => report.seeded += 1,
                Err(e) => log_event_with_fields(
                    Event::ReconcileEntryOutOfRange,
                    &[
                        ("container_id", &entry.container_id),
                        ("project_id", &entry.project_id.to_string()),
                        ("error", &e.to_string()),
                    ],
                ),
            }
        }

        let live = match self.gateway.list_containers().await {
            Ok(live) => live,
            Err(e) => {
                let err = EngineError::stream("listing containers failed", e);
                self.report(Event::ReconcileFailed, &err);
                return Err(err);
            }
        };
        report.live = live.len();

        for container_id in &live {
            self.ensure_active(cancel)?;

            let upperdir = match self.gateway.resolve_upperdir(container_id).await {
                Ok(path) => path,
                Err(e) => {
                    report.skipped += 1;
                    self.metrics.increment_reconcile_skipped();
                    log_event_with_fields(
                        Event::ReconcileSkipped,
                        &[("container_id", container_id), ("error", &e.to_string())],
                    );
                    continue;
                }
            };

            if tokio::fs::metadata(&upperdir).await.is_err() {
                report.not_ready += 1;
                log_event_with_fields(
                    Event::ReconcileNotReady,
                    &[
                        ("container_id", container_id),
                        ("path", &upperdir.display().to_string()),
                    ],
                );
                continue;
            }

            if let Some(entry) = self.store.get(container_id) {
                if entry.upperdir != upperdir {
                    log_event_with_fields(
                        Event::ReconcilePathDrift,
                        &[
                            ("container_id", container_id),
                            ("recorded", &entry.upperdir.display().to_string()),
                            ("resolved", &upperdir.display().to_string()),
                        ],
                    );
                }
                report.reasserted += 1;
                continue;
            }

            match self.create_quota(container_id, &upperdir, cancel).await {
                Ok(CreateOutcome::Applied(_)) => {
                    report.restored += 1;
                    self.metrics.increment_reconcile_restored();
                }
                Ok(CreateOutcome::AlreadyPresent(_)) => report.reasserted += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => report.failed += 1,
            }
        }

        if self.config.orphan_sweep {
            let live: BTreeSet<&str> = live.iter().map(String::as_str).collect();
            for entry in self.store.all() {
                if live.contains(entry.container_id.as_str()) {
                    continue;
                }
                self.ensure_active(cancel)?;
                match self.remove_quota(&entry.container_id, &entry.upperdir).await {
                    Ok(DeleteOutcome::Removed { project_id }) => {
                        report.swept += 1;
                        self.metrics.increment_orphans_swept();
                        log_event_with_fields(
                            Event::OrphanSwept,
                            &[
                                ("container_id", &entry.container_id),
                                ("project_id", &project_id.to_string()),
                            ],
                        );
                    }
                    Ok(DeleteOutcome::NoQuota) => {}
                    Err(_) => report.failed += 1,
                }
            }
        }

        self.update_occupancy();
        log_event_with_fields(
            Event::ReconcileComplete,
            &[
                ("live", &report.live.to_string()),
                ("reasserted", &report.reasserted.to_string()),
                ("restored", &report.restored.to_string()),
                ("skipped", &report.skipped.to_string()),
                ("not_ready", &report.not_ready.to_string()),
                ("failed", &report.failed.to_string()),
                ("swept", &report.swept.to_string()),
                ("duration_ms", &started.elapsed().as_millis().to_string()),
            ],
        );
        Ok(report)
    }
}
