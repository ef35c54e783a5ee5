//! The engine value and event dispatch

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::clock::{Clock, TokioClock};
use super::connection::{ConnectionState, ReconnectPolicy};
use super::errors::{EngineError, EngineResult};
use crate::enforcer::{QuotaEnforcer, QuotaLimits};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::pool::ProjectIdPool;
use crate::runtime::{extract_upperdir, RuntimeEvent, RuntimeGateway};
use crate::state::StateStore;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Limits applied to every new container
    pub limits: QuotaLimits,
    pub reconnect: ReconnectPolicy,
    /// Run the deletion sequence for entries whose container is gone
    pub orphan_sweep: bool,
}

impl EngineConfig {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            reconnect: ReconnectPolicy::default(),
            orphan_sweep: false,
        }
    }
}

/// Keeps project quotas in step with the runtime's container lifecycle.
///
/// Events are processed one at a time, in arrival order. The pool and the
/// store are shared handles so callers can inspect them while the engine
/// runs.
pub struct ReconciliationEngine<G, E, C = TokioClock> {
    pub(super) gateway: G,
    pub(super) enforcer: E,
    pub(super) clock: C,
    pub(super) pool: Arc<ProjectIdPool>,
    pub(super) store: Arc<StateStore>,
    pub(super) metrics: Arc<MetricsRegistry>,
    pub(super) config: EngineConfig,
    pub(super) state: ConnectionState,
}

impl<G, E> ReconciliationEngine<G, E, TokioClock>
where
    G: RuntimeGateway,
    E: QuotaEnforcer,
{
    pub fn new(
        gateway: G,
        enforcer: E,
        pool: Arc<ProjectIdPool>,
        store: Arc<StateStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            enforcer,
            clock: TokioClock,
            pool,
            store,
            metrics: Arc::new(MetricsRegistry::new()),
            config,
            state: ConnectionState::Disconnected,
        }
    }
}

impl<G, E, C> ReconciliationEngine<G, E, C>
where
    G: RuntimeGateway,
    E: QuotaEnforcer,
    C: Clock,
{
    /// Swap the time source used for reconnect delays
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ReconciliationEngine<G, E, C2> {
        ReconciliationEngine {
            gateway: self.gateway,
            enforcer: self.enforcer,
            clock,
            pool: self.pool,
            store: self.store,
            metrics: self.metrics,
            config: self.config,
            state: self.state,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn enforcer(&self) -> &E {
        &self.enforcer
    }

    pub fn pool(&self) -> &Arc<ProjectIdPool> {
        &self.pool
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// React to one runtime event.
    ///
    /// Failures are logged by the sequence that hit them; the returned error
    /// is informational and never stops the event loop, except `Cancelled`.
    pub async fn handle_event(
        &self,
        event: &RuntimeEvent,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        self.metrics.increment_events_processed();

        match event {
            RuntimeEvent::TaskCreate {
                container_id,
                rootfs,
            } => {
                let upperdir = match extract_upperdir(rootfs) {
                    Some(path) => path,
                    None => self.resolve_for_create(container_id, cancel).await?,
                };
                self.create_quota(container_id, &upperdir, cancel)
                    .await
                    .map(|_| ())
            }
            RuntimeEvent::TaskDelete { container_id } => {
                self.delete_quota(container_id, cancel).await.map(|_| ())
            }
            RuntimeEvent::Other { .. } => Ok(()),
        }
    }

    async fn resolve_for_create(
        &self,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<PathBuf> {
        self.ensure_active(cancel)?;
        match self.gateway.resolve_upperdir(container_id).await {
            Ok(path) => Ok(path),
            Err(e) => {
                let err = EngineError::path_unresolved(container_id, e);
                self.metrics.increment_create_failures();
                self.report(Event::QuotaCreateFailed, &err);
                Err(err)
            }
        }
    }

    pub(super) fn ensure_active(&self, cancel: &CancellationToken) -> EngineResult<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled());
        }
        Ok(())
    }

    pub(super) fn report(&self, event: Event, err: &EngineError) {
        let fields = err.log_fields();
        let refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        log_event_with_fields(event, &refs);
    }

    pub(super) fn update_occupancy(&self) {
        self.metrics
            .set_occupancy(self.pool.used_count() as u64, self.store.len() as u64);
    }
}
