//! Metrics HTTP endpoint
//!
//! - `GET /metrics` Prometheus text exposition
//! - `GET /metrics.json` the same values as JSON
//! - `GET /health` liveness

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::metrics::MetricsRegistry;
use super::{log_event_with_fields, Event};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub fn metrics_routes(registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics.json", get(metrics_json_handler))
        .with_state(registry)
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        registry.to_prometheus(),
    )
}

async fn metrics_json_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    (StatusCode::OK, Json(registry.snapshot()))
}

/// Serve the metrics routes on `addr` until `cancel` fires.
pub async fn serve_metrics(
    addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    log_event_with_fields(Event::MetricsServing, &[("addr", &local.to_string())]);

    axum::serve(listener, metrics_routes(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reports_registry() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.increment_quotas_applied();
        registry.set_occupancy(1, 1);

        let (status, body) = get_body(metrics_routes(registry), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("rootfs_quota_quotas_applied_total 1"));
        assert!(body.contains("rootfs_quota_state_entries 1"));
    }

    #[tokio::test]
    async fn test_metrics_json_endpoint() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.increment_reconcile_passes();

        let (status, body) = get_body(metrics_routes(registry), "/metrics.json").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["reconcile_passes"], 1);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) =
            get_body(metrics_routes(Arc::new(MetricsRegistry::new())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve_metrics(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(MetricsRegistry::new()),
            cancel.clone(),
        ));
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
