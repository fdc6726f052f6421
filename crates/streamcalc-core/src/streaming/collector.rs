use super::half::Inbound;
use crate::{Result, aggregate::Reducer};
use futures::Stream;
use tonic::Status;

/// Folds an inbound half into a single response.
///
/// Every message is folded into `reducer` in arrival order until the peer
/// signals end-of-input, then exactly one value is computed from the final
/// state. The reducer's state is private to this call and is discarded if the
/// call fails.
///
/// # Errors
///
/// Returns the inbound half's failure (transport error, cancellation or
/// expiry) without producing a response, or the reducer's own failure from
/// [`Reducer::finish`].
pub async fn collect<S, R>(mut inbound: Inbound<S>, mut reducer: R) -> Result<R::Output>
where
    S: Stream<Item = core::result::Result<R::Input, Status>> + Unpin,
    R: Reducer,
{
    while let Some(input) = inbound.recv().await? {
        reducer.fold(input);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(received = inbound.received(), "Inbound half closed, reducing");

    reducer.finish()
}
