use crate::config::RefreshRate;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "capture::sampling";

/// One-shot cancellation flag owned by a single session.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel cannot slip between.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Source of display-refresh ticks.
pub trait FrameClock: Send + Sync {
    fn next_frame(&self) -> BoxFuture<'_, ()>;
}

/// Ticks at a fixed refresh rate.
#[derive(Clone, Copy, Debug)]
pub struct IntervalFrameClock {
    period: Duration,
}

impl IntervalFrameClock {
    pub fn new(refresh: RefreshRate) -> Self {
        Self {
            period: refresh.frame_period(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for IntervalFrameClock {
    fn default() -> Self {
        Self::new(RefreshRate::default())
    }
}

impl FrameClock for IntervalFrameClock {
    fn next_frame(&self) -> BoxFuture<'_, ()> {
        tokio::time::sleep(self.period).boxed()
    }
}

/// Runs `tick` once immediately and then once per frame until cancelled.
///
/// `tick` receives the session token so it can re-check cancellation while holding the
/// handles it reads. Ticks never overlap. Cancelling (explicitly or by dropping) takes effect before the next
/// tick, and nothing is rescheduled afterwards.
#[derive(Debug)]
pub struct SamplingLoop {
    token: CancelToken,
    task: JoinHandle<u64>,
}

impl SamplingLoop {
    pub fn spawn<F>(clock: Arc<dyn FrameClock>, mut tick: F) -> Self
    where
        F: FnMut(&CancelToken) + Send + 'static,
    {
        let token = CancelToken::new();
        let task = tokio::spawn({
            let token = token.clone();
            async move {
                let mut ticks = 0u64;
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    tick(&token);
                    ticks += 1;
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = clock.next_frame() => {}
                    }
                }
                tracing::trace!(target: LOG_TARGET, ticks, "sampling loop exited");
                ticks
            }
        });
        Self { token, task }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop. Consumes the handle, so a session can cancel only once.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for SamplingLoop {
    fn drop(&mut self) {
        if self.token.cancel() {
            tracing::trace!(target: LOG_TARGET, "sampling loop cancelled");
        }
        self.task.abort();
    }
}
