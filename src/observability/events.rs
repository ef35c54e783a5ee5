//! Observable events
//!
//! Every log line carries one of these as its `event` key.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    BootStart,
    ConfigLoaded,
    StateLoaded,
    /// State document unreadable (FATAL)
    StateCorrupt,
    MetricsServing,
    MetricsFailed,
    ShutdownStart,
    ShutdownComplete,

    // Runtime connection
    ConnectBegin,
    Connected,
    ConnectFailed,
    Listening,
    StreamLost,
    ReconnectScheduled,
    EventUnparseable,

    // Reconciliation
    ReconcileBegin,
    ReconcileComplete,
    ReconcileFailed,
    ReconcileSkipped,
    ReconcileNotReady,
    ReconcilePathDrift,
    ReconcileEntryOutOfRange,
    OrphanSwept,

    // Quota lifecycle
    QuotaApplied,
    QuotaAlreadyPresent,
    QuotaCreateFailed,
    QuotaRemoved,
    QuotaNotFound,
    QuotaDeleteFailed,
    QuotaClearFailed,
    QuotaTagUnreadable,
    UpperdirMissing,
    StateInconsistent,
    ProjectIdShared,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "ROOTFS_QUOTA_STARTUP_BEGIN",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StateLoaded => "STATE_LOADED",
            Event::StateCorrupt => "STATE_CORRUPT",
            Event::MetricsServing => "METRICS_SERVING",
            Event::MetricsFailed => "METRICS_FAILED",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::ConnectBegin => "RUNTIME_CONNECT_BEGIN",
            Event::Connected => "RUNTIME_CONNECTED",
            Event::ConnectFailed => "RUNTIME_CONNECT_FAILED",
            Event::Listening => "EVENT_LOOP_LISTENING",
            Event::StreamLost => "EVENT_STREAM_LOST",
            Event::ReconnectScheduled => "RECONNECT_SCHEDULED",
            Event::EventUnparseable => "EVENT_UNPARSEABLE",

            Event::ReconcileBegin => "RECONCILE_BEGIN",
            Event::ReconcileComplete => "RECONCILE_COMPLETE",
            Event::ReconcileFailed => "RECONCILE_FAILED",
            Event::ReconcileSkipped => "RECONCILE_CONTAINER_SKIPPED",
            Event::ReconcileNotReady => "RECONCILE_NOT_READY",
            Event::ReconcilePathDrift => "RECONCILE_PATH_DRIFT",
            Event::ReconcileEntryOutOfRange => "RECONCILE_ENTRY_OUT_OF_RANGE",
            Event::OrphanSwept => "ORPHAN_SWEPT",

            Event::QuotaApplied => "QUOTA_APPLIED",
            Event::QuotaAlreadyPresent => "QUOTA_ALREADY_PRESENT",
            Event::QuotaCreateFailed => "QUOTA_CREATE_FAILED",
            Event::QuotaRemoved => "QUOTA_REMOVED",
            Event::QuotaNotFound => "QUOTA_NOT_FOUND",
            Event::QuotaDeleteFailed => "QUOTA_DELETE_FAILED",
            Event::QuotaClearFailed => "QUOTA_CLEAR_FAILED",
            Event::QuotaTagUnreadable => "QUOTA_TAG_UNREADABLE",
            Event::UpperdirMissing => "UPPERDIR_MISSING",
            Event::StateInconsistent => "STATE_INCONSISTENT",
            Event::ProjectIdShared => "PROJECT_ID_SHARED",
        }
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::StateCorrupt => Severity::Fatal,

            Event::MetricsFailed
            | Event::ReconcileFailed
            | Event::QuotaCreateFailed
            | Event::QuotaDeleteFailed
            | Event::StateInconsistent => Severity::Error,

            Event::ConnectFailed
            | Event::StreamLost
            | Event::EventUnparseable
            | Event::ReconcileSkipped
            | Event::ReconcileNotReady
            | Event::ReconcilePathDrift
            | Event::ReconcileEntryOutOfRange
            | Event::QuotaNotFound
            | Event::QuotaClearFailed
            | Event::QuotaTagUnreadable
            | Event::UpperdirMissing
            | Event::ProjectIdShared => Severity::Warn,

            _ => Severity::Info,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
