use super::{
    half::{Inbound, Outbound, deliver_failure},
    until_disconnected,
};
use crate::{
    DeadlineContext, Error, Result, aggregate::Aggregator, common::types::HalfState,
};
use futures::Stream;
use tokio::{sync::mpsc, task::JoinError};
use tonic::Status;

/// How a duplex call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuplexSummary {
    /// Messages read from the peer.
    pub received: usize,
    /// Messages written to the peer.
    pub emitted: usize,
    pub inbound: HalfState,
    pub outbound: HalfState,
}

/// Runs a bidirectional call as two independent halves.
///
/// The inbound half reads every message from `inbound` and feeds it to
/// `aggregator`. Each emission is handed to the outbound half over a bounded
/// channel of `handoff_capacity` values and written to `out` in the order it
/// was produced. Neither half waits on the other except through that channel.
///
/// The call completes only after both halves are closed: the inbound half
/// when the peer signals end-of-input, the outbound half once the handoff is
/// drained after that. An idle outbound half never ends the call on its own.
///
/// If either half fails, the other is stopped at its next suspension point
/// and the failure becomes the call's final status. Messages already written
/// stand.
///
/// # Errors
///
/// Returns the first failure of either half, the cause of a cancelled or
/// expired context, or [`Error::Internal`] if a half panics.
pub async fn coordinate<S, A, T>(
    inbound: S,
    aggregator: A,
    out: Outbound<T>,
    handoff_capacity: usize,
) -> Result<DuplexSummary>
where
    S: Stream<Item = core::result::Result<A::Input, Status>> + Unpin + Send + 'static,
    A: Aggregator + Send + 'static,
    A::Input: Send,
    A::Emit: Send + 'static,
    T: From<A::Emit> + Send + 'static,
{
    let ctx = out.context().clone();
    let watch = out.reporter();
    until_disconnected(&ctx, &watch, run(inbound, aggregator, out, handoff_capacity)).await
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
async fn run<S, A, T>(
    inbound: S,
    aggregator: A,
    out: Outbound<T>,
    handoff_capacity: usize,
) -> Result<DuplexSummary>
where
    S: Stream<Item = core::result::Result<A::Input, Status>> + Unpin + Send + 'static,
    A: Aggregator + Send + 'static,
    A::Input: Send,
    A::Emit: Send + 'static,
    T: From<A::Emit> + Send + 'static,
{
    let reporter = out.reporter();
    let halves = out.context().child();
    let (handoff_tx, handoff_rx) = mpsc::channel(handoff_capacity);

    let reading = tokio::spawn(read_half(
        Inbound::new(inbound, halves.clone()),
        aggregator,
        handoff_tx,
        halves.clone(),
    ));
    let writing = tokio::spawn(write_half(out.with_context(halves.clone()), handoff_rx));

    let (read, write) = tokio::join!(reading, writing);
    let read = read.unwrap_or_else(|e| Err(panicked("inbound", &e)));
    let write = write.unwrap_or_else(|e| Err(panicked("outbound", &e)));

    match (read, write) {
        (Ok(received), Ok(emitted)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(received, emitted, "Duplex call completed");

            Ok(DuplexSummary {
                received,
                emitted,
                inbound: HalfState::Closed,
                outbound: HalfState::Closed,
            })
        }
        (Err(first), _) | (Ok(_), Err(first)) => {
            // The sibling may have failed with a consequence of the first
            // failure; the cause recorded on `halves` is the root one.
            let err = halves.check().err().unwrap_or(first);

            #[cfg(feature = "tracing")]
            tracing::debug!("Duplex call failed: {}", err);

            deliver_failure(&reporter, err.clone()).await;
            Err(err)
        }
    }
}

async fn read_half<S, A>(
    mut inbound: Inbound<S>,
    mut aggregator: A,
    handoff: mpsc::Sender<A::Emit>,
    halves: DeadlineContext,
) -> Result<usize>
where
    S: Stream<Item = core::result::Result<A::Input, Status>> + Unpin,
    A: Aggregator,
{
    let res = pump_inbound(&mut inbound, &mut aggregator, &handoff, &halves).await;
    if let Err(e) = &res {
        halves.abort(e.clone());
    }
    res
}

async fn pump_inbound<S, A>(
    inbound: &mut Inbound<S>,
    aggregator: &mut A,
    handoff: &mpsc::Sender<A::Emit>,
    halves: &DeadlineContext,
) -> Result<usize>
where
    S: Stream<Item = core::result::Result<A::Input, Status>> + Unpin,
    A: Aggregator,
{
    while let Some(input) = inbound.recv().await? {
        let Some(emit) = aggregator.update(input) else {
            continue;
        };

        tokio::select! {
            biased;
            cause = halves.done() => return Err(cause),
            sent = handoff.send(emit) => sent.map_err(|e| Error::ChannelError {
                context: format!("Failed to hand off emission: {e}"),
            })?,
        }
    }

    Ok(inbound.received())
}

async fn write_half<E, T>(mut out: Outbound<T>, mut handoff: mpsc::Receiver<E>) -> Result<usize>
where
    T: From<E>,
{
    let halves = out.context().clone();

    loop {
        let next = tokio::select! {
            biased;
            cause = halves.done() => return Err(cause),
            next = handoff.recv() => next,
        };

        match next {
            Some(emit) => {
                if let Err(e) = out.send(T::from(emit)).await {
                    halves.abort(e.clone());
                    return Err(e);
                }
            }
            // The inbound half closed and everything it handed off is written.
            None => {
                let sent = out.sent();
                out.close();
                return Ok(sent);
            }
        }
    }
}

fn panicked(half: &str, err: &JoinError) -> Error {
    Error::internal(format!("{half} half panicked: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Greeting, RunningMax};
    use core::time::Duration;
    use futures::StreamExt;
    use tokio_stream::wrappers::ReceiverStream;
    use tonic::Code;

    fn inputs<T>(items: Vec<T>) -> impl Stream<Item = core::result::Result<T, Status>> + Unpin + Send + 'static
    where
        T: Send + 'static,
    {
        futures::stream::iter(items.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn empty_inbound_closes_cleanly() {
        let (out, stream) = Outbound::<i64>::channel(DeadlineContext::new(), 2);
        let call = tokio::spawn(coordinate(inputs(Vec::<i64>::new()), RunningMax::new(), out, 1));

        let emitted: Vec<_> = stream.collect().await;
        assert!(emitted.is_empty());
        assert_eq!(
            call.await.unwrap(),
            Ok(DuplexSummary {
                received: 0,
                emitted: 0,
                inbound: HalfState::Closed,
                outbound: HalfState::Closed,
            })
        );
    }

    #[tokio::test]
    async fn running_max_emits_each_new_maximum() {
        let (out, stream) = Outbound::<i64>::channel(DeadlineContext::new(), 2);
        let call = tokio::spawn(coordinate(
            inputs(vec![3_i64, 6, 4, 1, 9, 4, 6, 2, 11, 47, 3]),
            RunningMax::new(),
            out,
            1,
        ));

        let emitted: Vec<i64> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(emitted, vec![3, 6, 9, 11, 47]);
        assert_eq!(
            call.await.unwrap(),
            Ok(DuplexSummary {
                received: 11,
                emitted: 5,
                inbound: HalfState::Closed,
                outbound: HalfState::Closed,
            })
        );
    }

    #[tokio::test]
    async fn greets_everyone_as_they_arrive() {
        let (out, stream) = Outbound::<String>::channel(DeadlineContext::new(), 4);
        let names = vec!["Ada".to_string(), "Grace".to_string()];
        let summary = coordinate(inputs(names), Greeting, out, 4).await.unwrap();
        assert_eq!(summary.emitted, 2);

        let greetings: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(greetings, vec!["Hello Ada!", "Hello Grace!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_end_of_input() {
        let (tx, rx) = mpsc::channel::<core::result::Result<i64, Status>>(4);
        let (out, mut stream) = Outbound::<i64>::channel(DeadlineContext::new(), 4);
        let call = tokio::spawn(coordinate(ReceiverStream::new(rx), RunningMax::new(), out, 2));

        tx.send(Ok(5)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), 5);

        // Nothing is queued on either side, yet the call stays open.
        let idle = tokio::time::timeout(Duration::from_secs(60), stream.next()).await;
        assert!(idle.is_err());
        assert!(!call.is_finished());

        drop(tx);
        assert!(stream.next().await.is_none());
        assert_eq!(call.await.unwrap().unwrap().received, 1);
    }

    #[tokio::test]
    async fn inbound_failure_becomes_final_status() {
        let (tx, rx) = mpsc::channel::<core::result::Result<i64, Status>>(4);
        let (out, mut stream) = Outbound::<i64>::channel(DeadlineContext::new(), 4);
        let call = tokio::spawn(coordinate(ReceiverStream::new(rx), RunningMax::new(), out, 2));

        tx.send(Ok(3)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), 3);
        tx.send(Ok(6)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), 6);
        tx.send(Err(Status::data_loss("frame corrupted"))).await.unwrap();

        let status = stream.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(stream.next().await.is_none());
        assert!(call.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn dropped_response_stream_cancels_call() {
        let (tx, rx) = mpsc::channel::<core::result::Result<i64, Status>>(4);
        let (out, stream) = Outbound::<i64>::channel(DeadlineContext::new(), 4);
        let call = tokio::spawn(coordinate(ReceiverStream::new(rx), RunningMax::new(), out, 2));

        drop(stream);
        assert_eq!(call.await.unwrap(), Err(Error::Cancelled));
        // The inbound half stopped reading.
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reaches_both_halves() {
        let ctx = DeadlineContext::new();
        let (tx, rx) = mpsc::channel::<core::result::Result<i64, Status>>(4);
        let (out, mut stream) = Outbound::<i64>::channel(ctx.clone(), 4);
        let call = tokio::spawn(coordinate(ReceiverStream::new(rx), RunningMax::new(), out, 2));

        tx.send(Ok(1)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);

        ctx.cancel();
        assert_eq!(call.await.unwrap(), Err(Error::Cancelled));
        assert_eq!(stream.next().await.unwrap().unwrap_err().code(), Code::Cancelled);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_idle_call() {
        let (_tx, rx) = mpsc::channel::<core::result::Result<i64, Status>>(4);
        let ctx = DeadlineContext::with_timeout(Duration::from_millis(200));
        let (out, mut stream) = Outbound::<i64>::channel(ctx, 4);

        let res = coordinate(ReceiverStream::new(rx), RunningMax::new(), out, 2).await;
        assert_eq!(res, Err(Error::DeadlineExceeded));
        assert_eq!(
            stream.next().await.unwrap().unwrap_err().code(),
            Code::DeadlineExceeded
        );
    }
}
