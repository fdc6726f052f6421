//! Stream halves: the two I/O boundaries a call suspends on.
//!
//! [`Inbound`] reads requests from any `Stream<Item = Result<T, Status>>`,
//! which is what tonic hands a server for client-streaming and duplex methods.
//! [`Outbound`] writes responses into a bounded channel whose receiver tonic
//! drains onto the wire. Both race every suspension against their
//! [`DeadlineContext`] so a cancelled call never blocks on I/O.

use crate::{
    DeadlineContext,
    common::{
        error::{Error, Result},
        types::{HalfState, ResponseStream},
    },
};
use core::time::Duration;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

/// How long a failing half waits for room to deliver its final status.
const FAILURE_DELIVERY_GRACE: Duration = Duration::from_secs(1);

/// The receiving direction of a call.
pub struct Inbound<S> {
    stream: S,
    ctx: DeadlineContext,
    state: HalfState,
    received: usize,
}

impl<S, T> Inbound<S>
where
    S: Stream<Item = core::result::Result<T, Status>> + Unpin,
{
    pub fn new(stream: S, ctx: DeadlineContext) -> Self {
        Self {
            stream,
            ctx,
            state: HalfState::Open,
            received: 0,
        }
    }

    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` once the peer signals end-of-input; further calls
    /// keep returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Fails with the context's cause if the call is cancelled or expires
    /// while waiting (the pending message, if any, is not consumed), or with
    /// the transport's status mapped into [`Error`].
    pub async fn recv(&mut self) -> Result<Option<T>> {
        match self.state {
            HalfState::Open => {}
            HalfState::Closed => return Ok(None),
            HalfState::Failed => {
                return Err(Error::ChannelError {
                    context: "inbound half already failed".to_string(),
                });
            }
        }

        if let Err(cause) = self.ctx.check() {
            return Err(self.fail(cause));
        }

        let next = tokio::select! {
            biased;
            cause = self.ctx.done() => return Err(self.fail(cause)),
            next = self.stream.next() => next,
        };

        match next {
            Some(Ok(msg)) => {
                self.received += 1;
                Ok(Some(msg))
            }
            Some(Err(status)) => Err(self.fail(status.into())),
            None => {
                self.state = HalfState::Closed;
                Ok(None)
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = HalfState::Failed;
        err
    }

    pub const fn state(&self) -> HalfState {
        self.state
    }

    /// Number of messages delivered so far.
    pub const fn received(&self) -> usize {
        self.received
    }
}

/// The sending direction of a call.
///
/// Dropping an `Outbound` closes the half: once every sender is gone tonic
/// ends the response stream with an OK status.
pub struct Outbound<T> {
    tx: mpsc::Sender<core::result::Result<T, Status>>,
    ctx: DeadlineContext,
    state: HalfState,
    sent: usize,
}

impl<T> Outbound<T>
where
    T: Send + 'static,
{
    /// Creates an outbound half with room for `capacity` in-flight messages,
    /// together with the response stream to hand to tonic.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; the server validates it at startup.
    pub fn channel(ctx: DeadlineContext, capacity: usize) -> (Self, ResponseStream<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, ctx), Box::pin(ReceiverStream::new(rx)))
    }
}

impl<T> Outbound<T> {
    pub fn new(tx: mpsc::Sender<core::result::Result<T, Status>>, ctx: DeadlineContext) -> Self {
        Self {
            tx,
            ctx,
            state: HalfState::Open,
            sent: 0,
        }
    }

    /// Sends one message, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Fails with the context's cause if the call ends while waiting. If the
    /// receiver is gone the peer has abandoned the call: the context is
    /// cancelled and the cause is returned.
    pub async fn send(&mut self, msg: T) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::ChannelError {
                context: "outbound half already terminated".to_string(),
            });
        }

        if let Err(cause) = self.ctx.check() {
            self.state = HalfState::Failed;
            return Err(cause);
        }

        let permit = tokio::select! {
            biased;
            cause = self.ctx.done() => {
                self.state = HalfState::Failed;
                return Err(cause);
            }
            permit = self.tx.reserve() => permit,
        };

        match permit {
            Ok(permit) => {
                permit.send(Ok(msg));
                self.sent += 1;
                Ok(())
            }
            Err(_) => {
                self.state = HalfState::Failed;
                self.ctx.cancel();
                Err(self.ctx.check().err().unwrap_or(Error::Cancelled))
            }
        }
    }

    /// Closes the half gracefully.
    pub fn close(mut self) -> HalfState {
        self.state = HalfState::Closed;
        self.state
    }

    /// Closes the half with `err`, making a best effort to deliver it to the
    /// peer as the final status. Messages already sent stand.
    pub async fn fail(mut self, err: Error) -> HalfState {
        self.state = HalfState::Failed;
        deliver_failure(&self.tx, err).await;
        self.state
    }

    /// A handle on the same channel, used to deliver a call's final status
    /// after this half is gone and to watch for the peer going away.
    pub fn reporter(&self) -> mpsc::Sender<core::result::Result<T, Status>> {
        self.tx.clone()
    }

    /// Re-targets this half at another context, typically a child scoped to
    /// one call's pair of halves.
    pub fn with_context(mut self, ctx: DeadlineContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn context(&self) -> &DeadlineContext {
        &self.ctx
    }

    pub const fn state(&self) -> HalfState {
        self.state
    }

    /// Number of messages accepted by the channel so far.
    pub const fn sent(&self) -> usize {
        self.sent
    }
}

/// Pushes `err` as the final item of a response channel.
///
/// A full channel gets a short grace period; a closed one means the peer is
/// already gone and there is nobody left to tell.
pub(crate) async fn deliver_failure<T>(tx: &mpsc::Sender<core::result::Result<T, Status>>, err: Error) {
    let item = match tx.try_send(Err(err.into())) {
        Ok(()) => return,
        Err(TrySendError::Closed(_)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Peer gone before failure could be delivered");
            return;
        }
        Err(TrySendError::Full(item)) => item,
    };

    match tokio::time::timeout(FAILURE_DELIVERY_GRACE, tx.send(item)).await {
        Ok(Ok(())) => {}
        Ok(Err(_e)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Failed to forward err: {}", _e);
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Timed out delivering failure to a stalled peer");
        }
    }
}
