use crate::{DeadlineContext, Result};

/// Runs a single-response handler under `ctx`.
///
/// The handler is not invoked at all if the call is already cancelled or
/// expired. Otherwise the handler races the context: if the context ends
/// first, the handler future is dropped, its eventual result is discarded and
/// the context's cause is returned. Handler failures are returned unchanged.
///
/// The handler receives its own clone of the context so long-running logic
/// can observe cancellation at its own suspension points.
///
/// # Errors
///
/// Returns the handler's failure, or [`Error::DeadlineExceeded`] /
/// [`Error::Cancelled`] from the context.
///
/// [`Error::DeadlineExceeded`]: crate::Error::DeadlineExceeded
/// [`Error::Cancelled`]: crate::Error::Cancelled
pub async fn execute<Req, Resp, F, Fut>(
    ctx: &DeadlineContext,
    request: Req,
    handler: F,
) -> Result<Resp>
where
    F: FnOnce(Req, DeadlineContext) -> Fut,
    Fut: Future<Output = Result<Resp>>,
{
    ctx.check()?;

    tokio::select! {
        biased;
        cause = ctx.done() => Err(cause),
        result = handler(request, ctx.clone()) => result,
    }
}
