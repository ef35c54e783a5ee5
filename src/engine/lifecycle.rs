//! Per-container create and delete sequences
//!
//! Create: allocate → tag → limit → persist. Enforcement is complete before
//! the entry is written, so a persisted entry always implies enforcement.
//!
//! Delete: resolve → pick ID → clear → remove entry → release.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::errors::{EngineError, EngineResult};
use super::worker::ReconciliationEngine;
use crate::crash_point::{maybe_crash, points};
use crate::enforcer::{EnforcerError, QuotaEnforcer, QuotaLimits};
use crate::observability::{log_event_with_fields, Event};
use crate::runtime::RuntimeGateway;
use crate::state::Entry;

/// Result of a create sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new project ID was tagged, limited and persisted
    Applied(Entry),
    /// The container already had an entry; nothing was done
    AlreadyPresent(Entry),
}

impl CreateOutcome {
    pub fn entry(&self) -> &Entry {
        match self {
            CreateOutcome::Applied(entry) | CreateOutcome::AlreadyPresent(entry) => entry,
        }
    }
}

/// Result of a delete sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed { project_id: u32 },
    /// No project ID was recorded or found on disk
    NoQuota,
}

impl<G, E, C> ReconciliationEngine<G, E, C>
where
    G: RuntimeGateway,
    E: QuotaEnforcer,
    C: Clock,
{
    /// Apply a quota to `container_id`'s writable layer at `upperdir`.
    ///
    /// # Errors
    ///
    /// - `PoolExhausted`: nothing was changed.
    /// - `EnforcementFailure`: the project ID was released, no entry written.
    /// - `PersistenceFailure`: enforcement stays applied and the project ID
    ///   stays allocated, so it cannot be handed to another container while
    ///   the path is still tagged with it.
    pub async fn create_quota(
        &self,
        container_id: &str,
        upperdir: &Path,
        cancel: &CancellationToken,
    ) -> EngineResult<CreateOutcome> {
        self.ensure_active(cancel)?;

        if let Some(existing) = self.store.get(container_id) {
            log_event_with_fields(
                Event::QuotaAlreadyPresent,
                &[
                    ("container_id", container_id),
                    ("project_id", &existing.project_id.to_string()),
                ],
            );
            return Ok(CreateOutcome::AlreadyPresent(existing));
        }

        let project_id = match self.pool.allocate() {
            Ok(id) => id,
            Err(e) => {
                self.metrics.increment_pool_exhausted();
                return Err(self.create_failed(
                    EngineError::pool_exhausted(container_id, e).with_path(upperdir),
                ));
            }
        };
        maybe_crash(points::CREATE_AFTER_ALLOCATE);

        if let Err(e) = self.enforcer.tag(upperdir, project_id).await {
            self.pool.release(project_id);
            return Err(self.create_failed(
                EngineError::enforcement(container_id, "tag", e)
                    .with_path(upperdir)
                    .with_project_id(project_id),
            ));
        }

        if let Err(e) = self.enforcer.set_limit(project_id, &self.config.limits).await {
            self.pool.release(project_id);
            return Err(self.create_failed(
                EngineError::enforcement(container_id, "set limit", e)
                    .with_path(upperdir)
                    .with_project_id(project_id),
            ));
        }
        maybe_crash(points::CREATE_AFTER_ENFORCE);

        let entry = Entry::new(container_id, project_id, upperdir);
        if let Err(e) = self.store.put(entry.clone()) {
            self.metrics.increment_persistence_failures();
            self.update_occupancy();
            return Err(self.create_failed(
                EngineError::persistence(container_id, e)
                    .with_path(upperdir)
                    .with_project_id(project_id),
            ));
        }
        maybe_crash(points::CREATE_AFTER_PERSIST);

        self.metrics.increment_quotas_applied();
        self.update_occupancy();
        log_event_with_fields(
            Event::QuotaApplied,
            &[
                ("container_id", container_id),
                ("project_id", &project_id.to_string()),
                ("path", &upperdir.display().to_string()),
                ("soft", self.config.limits.soft.as_str()),
                ("hard", self.config.limits.hard.as_str()),
            ],
        );
        Ok(CreateOutcome::Applied(entry))
    }

    /// Remove the quota of a deleted container.
    ///
    /// The writable layer is resolved through the runtime, which still
    /// answers for a just-deleted container.
    pub async fn delete_quota(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<DeleteOutcome> {
        self.ensure_active(cancel)?;

        let upperdir = match self.gateway.resolve_upperdir(container_id).await {
            Ok(path) => path,
            Err(e) => {
                return Err(self.delete_failed(EngineError::path_unresolved(container_id, e)))
            }
        };

        self.remove_quota(container_id, &upperdir).await
    }

    /// Delete sequence once the path is known.
    ///
    /// The recorded project ID wins when only it is available. When both the
    /// record and the on-disk tag exist and disagree, nothing is touched and
    /// `StateInconsistent` is returned. An unreadable tag with no record is an
    /// `EnforcementFailure`.
    pub(super) async fn remove_quota(
        &self,
        container_id: &str,
        upperdir: &Path,
    ) -> EngineResult<DeleteOutcome> {
        let recorded = self.store.get(container_id).map(|e| e.project_id);
        let on_filesystem = tokio::fs::metadata(upperdir).await.is_ok();

        let project_id = if on_filesystem {
            let on_disk = match self.enforcer.read_tag(upperdir).await {
                Ok(0) | Err(EnforcerError::ProjectIdNotFound { .. }) => None,
                Ok(id) => Some(id),
                Err(e) => {
                    let err =
                        EngineError::enforcement(container_id, "read tag", e).with_path(upperdir);
                    let Some(recorded) = recorded else {
                        return Err(self.delete_failed(err));
                    };
                    // the recorded ID is still authoritative
                    self.report(Event::QuotaTagUnreadable, &err.with_project_id(recorded));
                    None
                }
            };
            match (recorded, on_disk) {
                (Some(recorded), Some(on_disk)) if recorded != on_disk => {
                    self.metrics.increment_state_inconsistencies();
                    let err = EngineError::inconsistent(container_id, upperdir, recorded, on_disk);
                    self.report(Event::StateInconsistent, &err);
                    return Err(err);
                }
                (Some(recorded), _) => Some(recorded),
                (None, Some(on_disk)) => self.unowned_tag(container_id, on_disk),
                (None, None) => None,
            }
        } else {
            log_event_with_fields(
                Event::UpperdirMissing,
                &[
                    ("container_id", container_id),
                    ("path", &upperdir.display().to_string()),
                ],
            );
            recorded
        };

        let Some(project_id) = project_id else {
            log_event_with_fields(
                Event::QuotaNotFound,
                &[
                    ("container_id", container_id),
                    ("path", &upperdir.display().to_string()),
                ],
            );
            return Ok(DeleteOutcome::NoQuota);
        };

        if on_filesystem {
            if let Err(e) = self
                .enforcer
                .set_limit(project_id, &QuotaLimits::cleared())
                .await
            {
                self.metrics.increment_clear_failures();
                let err = EngineError::enforcement(container_id, "clear limit", e)
                    .with_path(upperdir)
                    .with_project_id(project_id);
                self.report(Event::QuotaClearFailed, &err);
            }
        }
        maybe_crash(points::DELETE_AFTER_CLEAR);

        if recorded.is_some() {
            if let Err(e) = self.store.remove(container_id) {
                self.metrics.increment_persistence_failures();
                return Err(self.delete_failed(
                    EngineError::persistence(container_id, e)
                        .with_path(upperdir)
                        .with_project_id(project_id),
                ));
            }
        }
        maybe_crash(points::DELETE_AFTER_REMOVE);

        self.pool.release(project_id);

        self.metrics.increment_quotas_removed();
        self.update_occupancy();
        log_event_with_fields(
            Event::QuotaRemoved,
            &[
                ("container_id", container_id),
                ("project_id", &project_id.to_string()),
                ("path", &upperdir.display().to_string()),
            ],
        );
        Ok(DeleteOutcome::Removed { project_id })
    }

    /// A tag read off disk with no record behind it. Only usable if it is
    /// ours to manage and not recorded for another container.
    fn unowned_tag(&self, container_id: &str, on_disk: u32) -> Option<u32> {
        if !self.pool.range().contains(on_disk) {
            return None;
        }
        if let Some(owner) = self.store.find_by_project_id(on_disk) {
            log_event_with_fields(
                Event::ProjectIdShared,
                &[
                    ("container_id", container_id),
                    ("owner", &owner.container_id),
                    ("project_id", &on_disk.to_string()),
                ],
            );
            return None;
        }
        Some(on_disk)
    }

    fn create_failed(&self, err: EngineError) -> EngineError {
        self.metrics.increment_create_failures();
        self.report(Event::QuotaCreateFailed, &err);
        err
    }

    fn delete_failed(&self, err: EngineError) -> EngineError {
        self.metrics.increment_delete_failures();
        self.report(Event::QuotaDeleteFailed, &err);
        err
    }
}
