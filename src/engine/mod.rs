//! Reconciliation engine
//!
//! One worker drives the cycle connect → reconcile → listen, reacting to
//! container lifecycle events one at a time:
//!
//! - task create: allocate a project ID, tag the writable layer, apply the
//!   limits, persist the entry
//! - task delete: resolve the writable layer, clear the limits, remove the
//!   entry, release the project ID
//!
//! Every successful (re)connect runs a full reconciliation pass before any
//! event is handled. The event subscription is opened first, so events
//! raised during the pass are handled after it.
//!
//! The pool and the store keep their own locks; no lock spans both. Each
//! sequence is ordered so that a crash between steps leaves a state the
//! next reconciliation pass recovers from.

mod clock;
mod connection;
mod errors;
mod lifecycle;
mod reconcile;
mod worker;

pub use clock::{Clock, ManualClock, TokioClock};
pub use connection::{ConnectionState, ReconnectPolicy};
pub use errors::{EngineError, EngineErrorCode, EngineResult};
pub use lifecycle::{CreateOutcome, DeleteOutcome};
pub use reconcile::ReconcileReport;
pub use worker::{EngineConfig, ReconciliationEngine};
