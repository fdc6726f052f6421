//! Deadline and cancellation propagation for calls.
//!
//! A [`DeadlineContext`] is attached to every call. It carries an optional
//! absolute expiry and a cancellation flag that is set at most once, together
//! with the [`Error`] that explains why. Every driver in
//! [`crate::streaming`] checks it before invoking handler logic and races it
//! against each suspension point, so a cancelled call stops within one pending
//! I/O operation.
//!
//! Contexts form a tree. A child observes its parent's cancellation, expires at
//! the earlier of both deadlines, and reports its parent's cause when it was
//! cancelled through the parent. The server keeps one root context per
//! process; aborting it with [`Error::ServiceShutdown`] reaches every in-flight
//! call.

use crate::common::error::{Error, Result};
use core::time::Duration;
use std::sync::{Arc, OnceLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;

/// Request header carrying the caller's remaining budget.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Kept off a caller's `grpc-timeout` so the call context expires before the
/// transport's own timer for the same header, and the call ends with
/// `DEADLINE_EXCEEDED` rather than the transport's `CANCELLED`.
pub const GRPC_TIMEOUT_HEADROOM: Duration = Duration::from_millis(5);

/// Cancellation and expiry carrier for one call.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone, Debug)]
pub struct DeadlineContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    deadline: Option<Instant>,
    token: CancellationToken,
    cause: OnceLock<Error>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn interrupt(&self, cause: Error) {
        // The first cause wins, including one inherited from the parent.
        if self.token.is_cancelled() {
            return;
        }
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    fn cause(&self) -> Error {
        if let Some(cause) = self.cause.get() {
            return cause.clone();
        }
        match &self.parent {
            Some(parent) if parent.token.is_cancelled() => parent.cause(),
            _ => Error::Cancelled,
        }
    }

    fn expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for DeadlineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadlineContext {
    /// A context without a deadline. It ends only when cancelled.
    pub fn new() -> Self {
        Self::build(None, CancellationToken::new(), None)
    }

    /// A context that expires `timeout` from now.
    ///
    /// A timeout too large to represent behaves like no deadline at all.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(
            Instant::now().checked_add(timeout),
            CancellationToken::new(),
            None,
        )
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline), CancellationToken::new(), None)
    }

    /// A child sharing this context's deadline.
    pub fn child(&self) -> Self {
        self.child_with_deadline(None)
    }

    /// A child that expires `timeout` from now, or earlier if this context
    /// does.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child_with_deadline(Instant::now().checked_add(timeout))
    }

    /// A child that expires at `deadline`, or earlier if this context does.
    pub fn child_with_deadline(&self, deadline: Option<Instant>) -> Self {
        let deadline = match (self.inner.deadline, deadline) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self::build(
            deadline,
            self.inner.token.child_token(),
            Some(Arc::clone(&self.inner)),
        )
    }

    /// Derives a call context from the `grpc-timeout` request header.
    ///
    /// The effective budget is the smaller of the caller's timeout, less
    /// [`GRPC_TIMEOUT_HEADROOM`] (at most half of it), and `default_timeout`.
    /// A missing or malformed header leaves only `default_timeout` in effect.
    pub fn from_metadata(
        parent: &DeadlineContext,
        metadata: &MetadataMap,
        default_timeout: Option<Duration>,
    ) -> Self {
        let requested = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(|timeout| {
                timeout
                    .saturating_sub(GRPC_TIMEOUT_HEADROOM)
                    .max(timeout / 2)
            });

        let timeout = match (requested, default_timeout) {
            (Some(requested), Some(default)) => Some(requested.min(default)),
            (requested, default) => requested.or(default),
        };

        match timeout {
            Some(timeout) => parent.child_with_timeout(timeout),
            None => parent.child(),
        }
    }

    fn build(
        deadline: Option<Instant>,
        token: CancellationToken,
        parent: Option<Arc<Inner>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline,
                token,
                cause: OnceLock::new(),
                parent,
            }),
        }
    }

    /// The absolute expiry, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before expiry, saturating at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancels the call on behalf of the caller.
    pub fn cancel(&self) {
        self.inner.interrupt(Error::Cancelled);
    }

    /// Ends the call with `cause`, which every observer of this context (and
    /// of its children) reports from then on.
    pub fn abort(&self, cause: Error) {
        self.inner.interrupt(cause);
    }

    /// Whether the context has been cancelled or has expired.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Returns the cancellation cause if the call should stop now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeadlineExceeded`] once the deadline has passed, the
    /// recorded cause once cancelled, and `Ok(())` otherwise.
    pub fn check(&self) -> Result<()> {
        if self.inner.token.is_cancelled() {
            return Err(self.inner.cause());
        }
        if self.inner.expired() {
            self.inner.interrupt(Error::DeadlineExceeded);
            return Err(self.inner.cause());
        }
        Ok(())
    }

    /// Resolves once the context is cancelled or expires, yielding the cause.
    ///
    /// This is cancel-safe and meant to be raced against a suspension point in
    /// a `tokio::select!`.
    pub async fn done(&self) -> Error {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.inner.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {
                        self.inner.interrupt(Error::DeadlineExceeded);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
        self.inner.cause()
    }
}

/// Parses a `grpc-timeout` header value: up to eight ASCII digits followed by
/// one unit of `H`, `M`, `S`, `m`, `u` or `n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount.checked_mul(3600)?)),
        "M" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let ctx = DeadlineContext::with_timeout(Duration::from_millis(100));
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(100)));

        let start = Instant::now();
        assert_eq!(ctx.done().await, Error::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(ctx.check(), Err(Error::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn check_notices_elapsed_deadline_without_waiting() {
        let ctx = DeadlineContext::with_timeout(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(11)).await;
        assert!(ctx.is_done());
        assert_eq!(ctx.check(), Err(Error::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_wins_over_later_expiry() {
        let ctx = DeadlineContext::with_timeout(Duration::from_millis(100));
        ctx.cancel();
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(ctx.check(), Err(Error::Cancelled));
        assert_eq!(ctx.done().await, Error::Cancelled);
    }

    #[tokio::test]
    async fn first_cause_is_kept() {
        let ctx = DeadlineContext::new();
        ctx.abort(Error::invalid_argument("bad input"));
        ctx.cancel();
        assert_eq!(ctx.done().await, Error::invalid_argument("bad input"));
    }

    #[tokio::test]
    async fn child_reports_parent_cause() {
        let root = DeadlineContext::new();
        let call = root.child();
        let half = call.child();

        root.abort(Error::ServiceShutdown);
        assert_eq!(half.done().await, Error::ServiceShutdown);
        assert_eq!(call.check(), Err(Error::ServiceShutdown));

        // A later abort on the child does not rewrite history.
        half.abort(Error::internal("late"));
        assert_eq!(half.check(), Err(Error::ServiceShutdown));
    }

    #[tokio::test]
    async fn child_cancel_does_not_reach_parent() {
        let parent = DeadlineContext::new();
        let child = parent.child();
        child.cancel();
        assert_eq!(child.check(), Err(Error::Cancelled));
        assert!(parent.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn child_takes_earlier_deadline() {
        let parent = DeadlineContext::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.child_with_timeout(Duration::from_millis(5));
        assert!(tighter.deadline() < parent.deadline());
        assert_eq!(tighter.done().await, Error::DeadlineExceeded);
        assert!(parent.check().is_ok());
    }

    #[test]
    fn parses_grpc_timeout_values() {
        assert_eq!(parse_grpc_timeout("100m"), Some(Duration::from_millis(100)));
        assert_eq!(parse_grpc_timeout("2S"), Some(Duration::from_secs(2)));
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("250u"), Some(Duration::from_micros(250)));
        assert_eq!(parse_grpc_timeout("99999999n"), Some(Duration::from_nanos(99_999_999)));

        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("m"), None);
        assert_eq!(parse_grpc_timeout("10"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_timeout_is_clamped_by_default() {
        let root = DeadlineContext::new();

        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, "5S".parse().unwrap());

        let ctx = DeadlineContext::from_metadata(&root, &metadata, None);
        assert_eq!(
            ctx.remaining(),
            Some(Duration::from_secs(5) - GRPC_TIMEOUT_HEADROOM)
        );

        let ctx =
            DeadlineContext::from_metadata(&root, &metadata, Some(Duration::from_secs(1)));
        assert_eq!(ctx.remaining(), Some(Duration::from_secs(1)));

        let mut malformed = MetadataMap::new();
        malformed.insert(GRPC_TIMEOUT_HEADER, "soon".parse().unwrap());
        let ctx = DeadlineContext::from_metadata(&root, &malformed, None);
        assert_eq!(ctx.deadline(), None);

        root.cancel();
        assert_eq!(ctx.check(), Err(Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_timeout_expires_ahead_of_header_budget() {
        let root = DeadlineContext::new();

        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, "200m".parse().unwrap());
        let ctx = DeadlineContext::from_metadata(&root, &metadata, None);
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(195)));

        // Tiny budgets keep at least half of what the caller asked for.
        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, "4m".parse().unwrap());
        let ctx = DeadlineContext::from_metadata(&root, &metadata, None);
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(2)));
    }
}
