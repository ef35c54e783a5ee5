//! Connection state machine
//!
//! ```text
//!            ┌──────────── backoff ────────────┐
//!            v                                 │
//! Disconnected → Connecting → Reconciling → Listening
//!                    │             │           │
//!                    └── failure ──┴── lost ───┘
//! ```
//!
//! Cancellation is observed while connecting, while waiting for the next
//! event, during the backoff delay, and before every sequence step.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::errors::{EngineError, EngineResult};
use super::worker::ReconciliationEngine;
use crate::enforcer::QuotaEnforcer;
use crate::observability::{log_event_with_fields, Event};
use crate::runtime::{EventStream, RuntimeGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Reconciling,
    Listening,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Reconciling => "reconciling",
            ConnectionState::Listening => "listening",
        }
    }
}

/// Delay before reconnect attempt `n`: `initial_delay * 2^(n-1)`, capped
/// at `max_delay`. Equal values give a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Delay after `consecutive_failures` failed cycles (1-based)
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let doublings = consecutive_failures.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << doublings)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

enum ListenExit {
    Cancelled,
    Lost(EngineError),
}

impl<G, E, C> ReconciliationEngine<G, E, C>
where
    G: RuntimeGateway,
    E: QuotaEnforcer,
    C: Clock,
{
    /// Drive connect → reconcile → listen until `cancel` fires.
    ///
    /// Connection failures and lost streams are never fatal: the engine
    /// waits out the reconnect delay and starts over, and every new
    /// connection is followed by a full reconciliation pass. The in-flight
    /// sequence, if any, finishes before this returns.
    pub async fn run(&mut self, cancel: &CancellationToken) -> EngineResult<()> {
        let mut failures: u32 = 0;

        while !cancel.is_cancelled() {
            self.state = ConnectionState::Connecting;
            log_event_with_fields(
                Event::ConnectBegin,
                &[("attempt", &(failures + 1).to_string())],
            );

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.gateway.connect() => result,
            };

            match connected {
                Ok(mut events) => {
                    self.metrics.increment_connects();
                    log_event_with_fields(Event::Connected, &[]);

                    self.state = ConnectionState::Reconciling;
                    match self.reconcile(cancel).await {
                        Ok(_) => {
                            failures = 0;
                            self.state = ConnectionState::Listening;
                            log_event_with_fields(Event::Listening, &[]);
                            match self.listen(&mut events, cancel).await {
                                ListenExit::Cancelled => break,
                                ListenExit::Lost(err) => {
                                    self.metrics.increment_stream_losses();
                                    self.report(Event::StreamLost, &err);
                                }
                            }
                        }
                        Err(e) if e.is_cancelled() => break,
                        // logged by the pass
                        Err(_) => {}
                    }
                }
                Err(e) => {
                    self.metrics.increment_connect_failures();
                    self.report(
                        Event::ConnectFailed,
                        &EngineError::stream("connect failed", e),
                    );
                }
            }

            self.state = ConnectionState::Disconnected;
            failures = failures.saturating_add(1);
            let delay = self.config.reconnect.delay_for(failures);
            log_event_with_fields(
                Event::ReconnectScheduled,
                &[
                    ("attempt", &failures.to_string()),
                    ("delay_ms", &delay.as_millis().to_string()),
                ],
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(delay) => {}
            }
        }

        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    async fn listen(&self, events: &mut G::Events, cancel: &CancellationToken) -> ListenExit {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ListenExit::Cancelled,
                next = events.next_event() => next,
            };

            match next {
                Ok(Some(event)) => {
                    if let Err(e) = self.handle_event(&event, cancel).await {
                        if e.is_cancelled() {
                            return ListenExit::Cancelled;
                        }
                    }
                }
                Ok(None) => return ListenExit::Lost(EngineError::stream_closed()),
                Err(e) => return ListenExit::Lost(EngineError::stream("event stream failed", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_fixed_five_seconds() {
        let policy = ReconnectPolicy::default();
        for n in 1..10 {
            assert_eq!(policy.delay_for(n), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_exponential_policy_doubles_to_cap() {
        let policy = ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_policy_saturates_on_large_counts() {
        let policy = ReconnectPolicy::exponential(Duration::from_secs(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(3));
    }

    #[test]
    fn test_max_never_below_initial() {
        let policy = ReconnectPolicy::exponential(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectionState::Listening.as_str(), "listening");
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
    }
}
