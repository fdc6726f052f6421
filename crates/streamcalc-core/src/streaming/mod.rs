//! Drivers for the four call shapes.
//!
//! - [`execute`]: one request, one response, raced against the call's
//!   deadline.
//! - [`produce`]: one request expanded into an ordered response stream.
//! - [`collect`]: an inbound stream folded into one response.
//! - [`coordinate`]: two independent halves joined by a bounded handoff.
//!
//! Every driver takes its [`DeadlineContext`] from the halves it is given and
//! stops within one suspension point once that context ends.

mod collector;
mod coordinator;
pub mod half;
mod producer;
mod unary;

pub use collector::collect;
pub use coordinator::{DuplexSummary, coordinate};
pub use half::{Inbound, Outbound};
pub use producer::produce;
pub use unary::execute;

use crate::DeadlineContext;
use tokio::sync::mpsc;
use tonic::Status;

/// Drives `work` to completion, cancelling `ctx` as soon as the receiver
/// behind `watch` is dropped.
///
/// tonic drops a response stream when the peer goes away. Work that is slow
/// between two sends would otherwise only notice on its next send.
pub(crate) async fn until_disconnected<T, F>(
    ctx: &DeadlineContext,
    watch: &mpsc::Sender<Result<T, Status>>,
    work: F,
) -> F::Output
where
    F: Future,
{
    tokio::pin!(work);

    tokio::select! {
        out = &mut work => out,
        () = watch.closed() => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Response stream dropped, cancelling call");

            ctx.cancel();
            work.await
        }
    }
}
