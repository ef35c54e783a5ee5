//! Observability
//!
//! - Structured JSON log lines, one per event
//! - Counters and occupancy gauges
//! - Optional HTTP exposition of the metrics
//!
//! # Usage
//!
//! ```ignore
//! use rootfs_quota::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::QuotaApplied, &[("container_id", "c1"), ("project_id", "1001")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_quotas_applied();
//! ```

mod events;
mod logger;
mod metrics;
mod server;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use server::{metrics_routes, serve_metrics, HealthResponse};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
