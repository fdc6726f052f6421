//! gRPC service implementations.
//!
//! Each service is a thin adapter: it admits the call through the shared
//! [`CallTracker`], maps protobuf messages to domain values and hands the call
//! to the matching driver from [`streamcalc_core::streaming`].
//!
//! ## Structure
//!
//! - [`calculator`] - `calculator.Calculator`, one method per call shape.
//! - [`greeter`] - `greet.Greeter`, the same shapes over greetings.
//! - [`blog`] - `blog.BlogService`, CRUD over an injected [`BlogStore`].
//!
//! [`BlogStore`]: crate::server::storage::BlogStore

pub mod blog;
pub mod calculator;
pub mod greeter;

pub use blog::BlogService;
pub use calculator::CalculatorService;
pub use greeter::GreeterService;

use crate::server::{
    config::ServerConfig,
    telemetry::{increment_messages_received, increment_messages_sent},
    tracker::{CallGuard, CallTracker},
};
use futures::{Stream, TryStreamExt};
use std::sync::Arc;
use streamcalc_core::{
    DeadlineContext, Result,
    aggregate::{Aggregator, Reducer},
    streaming::{Inbound, Outbound, coordinate, collect, execute, produce},
    types::{ResponseStream, Shape},
};
use tonic::{Request, Response, Status, Streaming};

/// State shared by every service in one server.
#[derive(Clone)]
pub struct ServiceState {
    pub config: ServerConfig,
    pub tracker: Arc<CallTracker>,
}

impl ServiceState {
    pub fn new(config: ServerConfig) -> Self {
        let tracker = CallTracker::new(config.default_timeout, config.shutdown_timeout);
        Self {
            config,
            tracker: Arc::new(tracker),
        }
    }

    /// Initiates a graceful shutdown of every call admitted through this
    /// state.
    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
    }

    fn admit<T>(
        &self,
        method: &'static str,
        shape: Shape,
        request: &Request<T>,
    ) -> Result<CallGuard> {
        self.tracker.begin(method, shape, request.metadata())
    }

    /// Serves a unary call.
    async fn unary<Req, Resp, F, Fut>(
        &self,
        method: &'static str,
        request: Request<Req>,
        handler: F,
    ) -> core::result::Result<Response<Resp>, Status>
    where
        F: FnOnce(Req, DeadlineContext) -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        let guard = self.admit(method, Shape::Unary, &request)?;
        let res = execute(guard.context(), request.into_inner(), handler).await;
        guard.finish(&res);
        Ok(Response::new(res?))
    }

    /// Serves a server-streaming call whose responses are `items`.
    ///
    /// `items` runs on its own task; the response stream is returned at once.
    fn server_stream<T, S>(&self, guard: CallGuard, items: S) -> Response<ResponseStream<T>>
    where
        T: Send + 'static,
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        let method = guard.method();
        let (out, stream) =
            Outbound::channel(guard.context().clone(), self.config.stream_buffer_size);

        spawn_call(method, Shape::ServerStream, async move {
            let res = produce(items, out).await;
            guard.finish(&res);
        });

        Response::new(count_sent(method, stream))
    }

    /// Serves a client-streaming call by folding every request into
    /// `reducer`.
    async fn client_stream<M, R, F>(
        &self,
        method: &'static str,
        request: Request<Streaming<M>>,
        extract: F,
        reducer: R,
    ) -> core::result::Result<R::Output, Status>
    where
        M: Send + 'static,
        R: Reducer,
        F: FnMut(M) -> R::Input,
    {
        let guard = self.admit(method, Shape::ClientStream, &request)?;
        let inbound = count_received(method, request.into_inner()).map_ok(extract);
        let res = collect(Inbound::new(inbound, guard.context().clone()), reducer).await;
        guard.finish(&res);
        Ok(res?)
    }

    /// Serves a bidirectional call, feeding every request to `aggregator` and
    /// streaming each emission back.
    fn duplex<M, A, T, F>(
        &self,
        method: &'static str,
        request: Request<Streaming<M>>,
        extract: F,
        aggregator: A,
    ) -> core::result::Result<Response<ResponseStream<T>>, Status>
    where
        M: Send + 'static,
        A: Aggregator + Send + 'static,
        A::Input: Send,
        A::Emit: Send + 'static,
        T: From<A::Emit> + Send + 'static,
        F: FnMut(M) -> A::Input + Send + Unpin + 'static,
    {
        let guard = self.admit(method, Shape::Duplex, &request)?;
        let inbound = count_received(method, request.into_inner()).map_ok(extract);
        let (out, stream) =
            Outbound::channel(guard.context().clone(), self.config.stream_buffer_size);
        let handoff = self.config.handoff_buffer_size;

        spawn_call(method, Shape::Duplex, async move {
            let res = coordinate(inbound, aggregator, out, handoff).await;
            guard.finish(&res);
        });

        Ok(Response::new(count_sent(method, stream)))
    }
}

/// Spawns the task driving one streaming call.
fn spawn_call<F>(_method: &'static str, _shape: Shape, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        let span = tracing::info_span!("streaming", method = _method, shape = %_shape);
        fut.instrument(span)
    };

    tokio::spawn(fut);
}

fn count_received<M>(
    method: &'static str,
    inbound: Streaming<M>,
) -> impl Stream<Item = core::result::Result<M, Status>> + Unpin + Send + 'static
where
    M: Send + 'static,
{
    inbound.inspect_ok(move |_| increment_messages_received(method))
}

fn count_sent<T>(method: &'static str, stream: ResponseStream<T>) -> ResponseStream<T>
where
    T: Send + 'static,
{
    Box::pin(stream.inspect_ok(move |_| increment_messages_sent(method)))
}
