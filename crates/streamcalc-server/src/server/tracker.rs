//! Call admission, accounting and graceful shutdown.
//!
//! Every service method opens its call through [`CallTracker::begin`], which
//! refuses new work once shutdown has started and otherwise hands back a
//! [`CallGuard`] owning the call's [`DeadlineContext`]. All call contexts are
//! children of one root context, so aborting the root reaches every call that
//! outlives the drain period.

use crate::server::telemetry::{
    decrement_calls_inflight, increment_call_errors, increment_calls, increment_calls_inflight,
    record_call_duration,
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use streamcalc_core::{DeadlineContext, Error, Result, types::Shape};
use tokio::time::{sleep, timeout};
use tonic::metadata::MetadataMap;

/// How often the drain loop re-checks the number of in-flight calls.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CallTracker {
    root: DeadlineContext,
    inflight: AtomicUsize,
    shutting_down: AtomicBool,
    default_timeout: Option<Duration>,
    shutdown_timeout: Duration,
}

impl CallTracker {
    pub fn new(default_timeout: Option<Duration>, shutdown_timeout: Duration) -> Self {
        Self {
            root: DeadlineContext::new(),
            inflight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            default_timeout,
            shutdown_timeout,
        }
    }

    /// Admits a `shape` call to `method`, deriving its context from the
    /// request metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has started.
    pub fn begin(
        self: &Arc<Self>,
        method: &'static str,
        shape: Shape,
        metadata: &MetadataMap,
    ) -> Result<CallGuard> {
        // Count first so the drain loop can never miss an admitted call.
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.shutting_down.load(Ordering::SeqCst) {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            increment_call_errors(method, tonic::Code::Cancelled);
            return Err(Error::ServiceShutdown);
        }

        increment_calls(method, shape);
        increment_calls_inflight();

        Ok(CallGuard {
            tracker: Arc::clone(self),
            ctx: DeadlineContext::from_metadata(&self.root, metadata, self.default_timeout),
            method,
            start: Instant::now(),
        })
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Gracefully shuts down call processing.
    ///
    /// - Refuses new calls.
    /// - Waits up to the shutdown timeout for in-flight calls to finish.
    /// - Aborts whatever is left with [`Error::ServiceShutdown`] and waits up
    ///   to the same timeout again for those calls to unwind.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new calls ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new calls");
        self.shutting_down.store(true, Ordering::SeqCst);

        // === Phase 1: Wait for in-flight calls to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        match self.wait_idle().await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight calls drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} calls still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Abort remaining calls ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Aborting remaining calls via the root context");
        self.root.abort(Error::ServiceShutdown);

        // === Phase 3: Wait for aborted calls to report back ===
        if self.wait_idle().await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("{} calls did not unwind after abort", self.inflight());
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Call tracker shutdown complete");
    }

    async fn wait_idle(&self) -> core::result::Result<(), tokio::time::error::Elapsed> {
        timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
    }
}

/// An admitted call. Dropping it releases the call's in-flight slot.
pub struct CallGuard {
    tracker: Arc<CallTracker>,
    ctx: DeadlineContext,
    method: &'static str,
    start: Instant,
}

impl CallGuard {
    pub fn context(&self) -> &DeadlineContext {
        &self.ctx
    }

    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Records the call's outcome and releases it.
    pub fn finish<T>(self, outcome: &Result<T>) {
        if let Err(e) = outcome {
            #[cfg(feature = "tracing")]
            {
                if e.is_interrupt() {
                    tracing::debug!(method = self.method, "Call interrupted: {}", e);
                } else {
                    tracing::warn!(method = self.method, "Call failed: {}", e);
                }
            }
            increment_call_errors(self.method, e.code());
        }
        record_call_duration(self.method, self.start.elapsed().as_secs_f64() * 1000.0);
    }

    /// Ends the call with `err` before any work was done.
    pub fn reject(self, err: Error) -> tonic::Status {
        let status = tonic::Status::from(err.clone());
        self.finish(&Err::<(), _>(err));
        status
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.tracker.inflight.fetch_sub(1, Ordering::SeqCst);
        decrement_calls_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(shutdown_timeout: Duration) -> Arc<CallTracker> {
        Arc::new(CallTracker::new(None, shutdown_timeout))
    }

    #[tokio::test]
    async fn guards_count_inflight_calls() {
        let tracker = tracker(Duration::from_secs(1));
        let a = tracker.begin("test.A", Shape::Unary, &MetadataMap::new()).unwrap();
        let b = tracker.begin("test.B", Shape::Unary, &MetadataMap::new()).unwrap();
        assert_eq!(tracker.inflight(), 2);

        a.finish(&Ok(()));
        drop(b);
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_bounds_every_call() {
        let tracker = Arc::new(CallTracker::new(
            Some(Duration::from_millis(500)),
            Duration::from_secs(1),
        ));
        let guard = tracker.begin("test.Slow", Shape::Unary, &MetadataMap::new()).unwrap();
        assert_eq!(guard.context().remaining(), Some(Duration::from_millis(500)));
        assert_eq!(guard.context().done().await, Error::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_new_calls_and_waits_for_drain() {
        let tracker = tracker(Duration::from_secs(5));
        let guard = tracker.begin("test.Busy", Shape::Unary, &MetadataMap::new()).unwrap();
        let start = tokio::time::Instant::now();

        let finishing = tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            drop(guard);
        });

        let shutdown = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.shutdown().await })
        };
        tokio::task::yield_now().await;

        assert!(tracker.is_shutting_down());
        assert!(matches!(
            tracker.begin("test.Late", Shape::Unary, &MetadataMap::new()),
            Err(Error::ServiceShutdown)
        ));

        finishing.await.unwrap();
        shutdown.await.unwrap();
        assert_eq!(tracker.inflight(), 0);
        // The drain ended with the call, well before the timeout.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_calls_after_timeout() {
        let tracker = tracker(Duration::from_secs(2));
        let guard = tracker.begin("test.Stuck", Shape::Unary, &MetadataMap::new()).unwrap();

        let call = tokio::spawn(async move {
            let cause = guard.context().done().await;
            drop(guard);
            cause
        });

        let start = tokio::time::Instant::now();
        tracker.shutdown().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(call.await.unwrap(), Error::ServiceShutdown);
        assert_eq!(tracker.inflight(), 0);
    }
}
