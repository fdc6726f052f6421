use super::{half::Outbound, until_disconnected};
use crate::{Error, Result};
use futures::{Stream, StreamExt};

/// Drives a server-streaming handler's output onto an outbound half.
///
/// Items are pulled from `items` one at a time and sent in generation order
/// as soon as each is available. The half is closed once `items` ends. If an
/// item is a failure, or the call is cancelled or expires, the half is closed
/// with that failure instead; messages already sent are not retracted.
///
/// The call's context is the one `out` was created with. It is also cancelled
/// as soon as the peer drops the response stream, so a producer that is slow
/// between items still stops promptly.
///
/// Returns the number of messages sent.
///
/// # Errors
///
/// Returns the failure the half was closed with.
pub async fn produce<T, S>(items: S, out: Outbound<T>) -> Result<usize>
where
    T: Send + 'static,
    S: Stream<Item = Result<T>>,
{
    let ctx = out.context().clone();
    let watch = out.reporter();
    until_disconnected(&ctx, &watch, drive(items, out)).await
}

async fn drive<T, S>(items: S, mut out: Outbound<T>) -> Result<usize>
where
    T: Send + 'static,
    S: Stream<Item = Result<T>>,
{
    let ctx = out.context().clone();
    let mut items = core::pin::pin!(items);

    loop {
        // Check before asking the handler for more work.
        let next = match ctx.check() {
            Err(cause) => Err(cause),
            Ok(()) => tokio::select! {
                biased;
                cause = ctx.done() => Err(cause),
                next = items.next() => Ok(next),
            },
        };

        let item = match next {
            Ok(Some(Ok(item))) => item,
            Ok(None) => {
                let sent = out.sent();
                out.close();
                return Ok(sent);
            }
            Ok(Some(Err(err))) | Err(err) => return Err(fail(out, err).await),
        };

        if let Err(err) = out.send(item).await {
            return Err(fail(out, err).await);
        }
    }
}

async fn fail<T>(out: Outbound<T>, err: Error) -> Error {
    #[cfg(feature = "tracing")]
    tracing::debug!(sent = out.sent(), "Server stream failed: {}", err);
    out.fail(err.clone()).await;
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeadlineContext, aggregate::PrimeFactors, common::types::ResponseStream};
    use core::time::Duration;
    use tonic::Code;

    async fn drain<T>(stream: ResponseStream<T>) -> (Vec<T>, Option<tonic::Status>) {
        let mut items = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(item) => items.push(item),
                Err(status) => return (items, Some(status)),
            }
        }
        (items, None)
    }

    #[tokio::test]
    async fn streams_prime_factors_in_order() {
        let (out, stream) = Outbound::channel(DeadlineContext::new(), 1);
        let factors = PrimeFactors::new(12).unwrap();
        let producer = tokio::spawn(produce(futures::stream::iter(factors.map(Ok)), out));

        let (items, status) = drain(stream).await;
        assert_eq!(items, vec![2, 2, 3]);
        assert!(status.is_none());
        assert_eq!(producer.await.unwrap(), Ok(3));
    }

    #[tokio::test]
    async fn empty_sequence_just_closes() {
        let (out, stream) = Outbound::channel(DeadlineContext::new(), 1);
        let factors = PrimeFactors::new(1).unwrap();
        let sent = produce(futures::stream::iter(factors.map(Ok)), out).await;
        assert_eq!(sent, Ok(0));
        let (items, status) = drain(stream).await;
        assert!(items.is_empty());
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn deadline_interrupts_factoring_a_large_prime() {
        // Largest prime below 2^63: about 1.5 billion trial divisions.
        let factors = PrimeFactors::new(9_223_372_036_854_775_783).unwrap();
        let ctx = DeadlineContext::with_timeout(Duration::from_millis(50));
        let (out, stream) = Outbound::<i64>::channel(ctx, 1);

        let start = std::time::Instant::now();
        let res = produce(factors.into_stream().map(Ok), out).await;
        assert_eq!(res, Err(Error::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(2));

        let (items, status) = drain(stream).await;
        assert!(items.is_empty());
        assert_eq!(status.unwrap().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn mid_sequence_failure_keeps_sent_items() {
        let (out, stream) = Outbound::channel(DeadlineContext::new(), 4);
        let items = futures::stream::iter(vec![
            Ok(1),
            Ok(2),
            Err(Error::internal("store went away")),
            Ok(3),
        ]);

        let res = produce(items, out).await;
        assert_eq!(res, Err(Error::internal("store went away")));

        let (items, status) = drain(stream).await;
        assert_eq!(items, vec![1, 2]);
        let status = status.unwrap();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "store went away");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_before_next_item() {
        let ctx = DeadlineContext::new();
        let (out, stream) = Outbound::channel(ctx.clone(), 8);

        // One item every 100ms, forever.
        let ticks = futures::stream::unfold(0_i64, |n| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some((Ok(n), n + 1))
        });
        let producer = tokio::spawn(produce(ticks, out));

        tokio::time::sleep(Duration::from_millis(350)).await;
        ctx.cancel();

        assert_eq!(producer.await.unwrap(), Err(Error::Cancelled));
        let (items, status) = drain(stream).await;
        assert_eq!(items, vec![0, 1, 2]);
        assert_eq!(status.unwrap().code(), Code::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_cancels_slow_producer() {
        let ctx = DeadlineContext::new();
        let (out, stream) = Outbound::channel(ctx.clone(), 8);
        let slow = futures::stream::unfold((), |()| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Some((Ok(0_i64), ()))
        });
        let producer = tokio::spawn(produce(slow, out));

        tokio::task::yield_now().await;
        drop(stream);

        assert_eq!(producer.await.unwrap(), Err(Error::Cancelled));
        assert_eq!(ctx.check(), Err(Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_stream() {
        let ctx = DeadlineContext::with_timeout(Duration::from_millis(250));
        let (out, stream) = Outbound::channel(ctx, 8);
        let ticks = futures::stream::unfold(0_i64, |n| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some((Ok(n), n + 1))
        });

        assert_eq!(produce(ticks, out).await, Err(Error::DeadlineExceeded));
        let (items, status) = drain(stream).await;
        assert_eq!(items, vec![0, 1]);
        assert_eq!(status.unwrap().code(), Code::DeadlineExceeded);
    }
}
