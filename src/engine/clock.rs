//! Time source for reconnect backoff

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[allow(async_fn_in_trait)]
pub trait Clock {
    async fn sleep(&self, duration: Duration);
}

/// Real time, via `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct ManualInner {
    sleeps: Vec<Duration>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Clock that records requested sleeps and returns immediately.
///
/// Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Cancel `token` once `count` sleeps have been requested
    pub fn cancel_after(&self, count: usize, token: CancellationToken) {
        self.lock().cancel_after = Some((count, token));
    }
}

impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        {
            let mut inner = self.lock();
            inner.sleeps.push(duration);
            let recorded = inner.sleeps.len();
            if let Some((count, ref token)) = inner.cancel_after {
                if recorded >= count {
                    token.cancel();
                }
            }
        }
        tokio::task::yield_now().await;
    }
}
