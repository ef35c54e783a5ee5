//! Process lifecycle
//!
//! Boot order: config → state document → pool → collaborators → tokio
//! runtime → engine. Any failure before the engine starts is fatal. Once
//! running, SIGINT/SIGTERM cancel the engine; the in-flight sequence
//! finishes and the process exits zero.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::args::Cli;
use super::config::Config;
use super::errors::{CliError, CliResult};
use crate::engine::{Clock, EngineError, ReconciliationEngine};
use crate::enforcer::{QuotaEnforcer, XfsQuotaEnforcer};
use crate::observability::{log_event, log_event_with_fields, serve_metrics, Event, MetricsRegistry};
use crate::pool::ProjectIdPool;
use crate::runtime::{CtrGateway, RuntimeGateway};
use crate::state::StateStore;

/// Parse arguments and run until shutdown
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    start(&cli.config)
}

/// Boot from the configuration at `config_path` and run until a shutdown
/// signal arrives.
pub fn start(config_path: &Path) -> CliResult<()> {
    log_event(Event::BootStart);

    let config = Config::load(config_path)?;
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("config", &config_path.display().to_string()),
            ("namespace", &config.namespace),
            ("project_id_min", &config.project_id_min.to_string()),
            ("project_id_max", &config.project_id_max.to_string()),
        ],
    );

    let store = load_state(&config)?;
    let pool = Arc::new(ProjectIdPool::new(config.project_id_range()?));
    let metrics = Arc::new(MetricsRegistry::new());

    let engine = ReconciliationEngine::new(
        CtrGateway::new(config.ctr_options()),
        XfsQuotaEnforcer::new(config.xfs_tools()),
        pool,
        store,
        config.engine_config()?,
    )
    .with_metrics(Arc::clone(&metrics));

    let metrics_addr = config.metrics_addr()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::boot_failed(format!("Failed to start tokio runtime: {}", e)))?;

    runtime.block_on(serve(engine, metrics, metrics_addr))
}

fn load_state(config: &Config) -> CliResult<Arc<StateStore>> {
    match StateStore::load(&config.state_file_path) {
        Ok(store) => {
            log_event_with_fields(
                Event::StateLoaded,
                &[
                    ("path", &config.state_file_path.display().to_string()),
                    ("entries", &store.len().to_string()),
                ],
            );
            Ok(Arc::new(store))
        }
        Err(e) if e.is_fatal() => {
            let err = EngineError::corrupt_state(e).with_path(&config.state_file_path);
            let fields = err.log_fields();
            let refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            log_event_with_fields(Event::StateCorrupt, &refs);
            Err(CliError::state_load_failed(err.to_string()))
        }
        Err(e) => Err(CliError::state_load_failed(e.to_string())),
    }
}

async fn serve<G, E, C>(
    mut engine: ReconciliationEngine<G, E, C>,
    metrics: Arc<MetricsRegistry>,
    metrics_addr: Option<SocketAddr>,
) -> CliResult<()>
where
    G: RuntimeGateway,
    E: QuotaEnforcer,
    C: Clock,
{
    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let metrics_task = metrics_addr.map(|addr| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(addr, metrics, cancel).await {
                log_event_with_fields(
                    Event::MetricsFailed,
                    &[("addr", &addr.to_string()), ("error", &e.to_string())],
                );
            }
        })
    });

    let result = engine.run(&cancel).await;

    cancel.cancel();
    if let Some(task) = metrics_task {
        // a failure is logged by join_metrics
        let _ = join_metrics(task).await;
    }
    log_event(Event::ShutdownComplete);

    result.map_err(|e| CliError::boot_failed(e.to_string()))
}

/// Wait for the metrics server task; a panic in it is logged
async fn join_metrics(task: JoinHandle<()>) -> Result<(), JoinError> {
    let joined = task.await;
    if let Err(ref e) = joined {
        log_event_with_fields(Event::MetricsFailed, &[("error", &e.to_string())]);
    }
    joined
}

fn spawn_signal_listener(cancel: CancellationToken) -> CliResult<()> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| CliError::boot_failed(format!("Failed to register SIGTERM: {}", e)))?;
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| CliError::boot_failed(format!("Failed to register SIGINT: {}", e)))?;

    tokio::spawn(async move {
        let received = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = cancel.cancelled() => return,
        };
        log_event_with_fields(Event::ShutdownStart, &[("signal", received)]);
        cancel.cancel();
    });
    Ok(())
}
