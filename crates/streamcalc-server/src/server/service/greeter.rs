//! `greet.Greeter`: the same call shapes as the calculator, over greetings.

use super::ServiceState;
use core::time::Duration;
use futures::StreamExt;
use streamcalc_core::{
    DeadlineContext, Result,
    aggregate::{Greeting, GreetingConcat},
    proto::greet::{
        GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
        GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
        GreetWithDeadlineResponse, LongGreetRequest, LongGreetResponse,
        greeter_server::{Greeter, GreeterServer},
    },
    types::{ResponseStream, Shape},
};
use tonic::{Request, Response, Status, Streaming, codec::CompressionEncoding};

/// `GreetWithDeadline` checks its context this many times while it works.
const SLOW_GREET_STEPS: u32 = 3;

#[derive(Clone)]
pub struct GreeterService {
    state: ServiceState,
}

impl GreeterService {
    pub const fn new(state: ServiceState) -> Self {
        Self { state }
    }

    /// Wraps the service in its generated server with compression enabled.
    pub fn into_server(self) -> GreeterServer<Self> {
        GreeterServer::new(self)
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    }
}

fn first_name(greeting: Option<streamcalc_core::proto::greet::Greeting>) -> String {
    greeting.unwrap_or_default().first_name
}

/// Answers after `runtime`, checking `ctx` between steps so an abandoned
/// call stops working early.
async fn slow_greet(
    name: String,
    ctx: DeadlineContext,
    runtime: Duration,
) -> Result<GreetWithDeadlineResponse> {
    let step = runtime / SLOW_GREET_STEPS;
    for _ in 0..SLOW_GREET_STEPS {
        ctx.check()?;
        tokio::time::sleep(step).await;
    }
    Ok(GreetWithDeadlineResponse {
        result: format!("Hello {name}"),
    })
}

#[tonic::async_trait]
impl Greeter for GreeterService {
    type GreetManyTimesStream = ResponseStream<GreetManyTimesResponse>;
    type GreetEveryoneStream = ResponseStream<GreetEveryoneResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet(&self, request: Request<GreetRequest>) -> core::result::Result<Response<GreetResponse>, Status> {
        self.state
            .unary("greet.Greet", request, |req, _ctx| async move {
                Ok(GreetResponse {
                    result: format!("Hello {}", first_name(req.greeting)),
                })
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_many_times(
        &self,
        request: Request<GreetManyTimesRequest>,
    ) -> core::result::Result<Response<Self::GreetManyTimesStream>, Status> {
        let guard = self
            .state
            .admit("greet.GreetManyTimes", Shape::ServerStream, &request)?;

        let name = first_name(request.into_inner().greeting);
        let interval = self.state.config.greet_interval;
        let items = futures::stream::iter(0..self.state.config.greet_repeat).then(move |i| {
            let result = format!("Hello {name} number {i}");
            async move {
                if i > 0 {
                    tokio::time::sleep(interval).await;
                }
                Ok(GreetManyTimesResponse::from(result))
            }
        });

        Ok(self.state.server_stream(guard, items))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn long_greet(
        &self,
        request: Request<Streaming<LongGreetRequest>>,
    ) -> core::result::Result<Response<LongGreetResponse>, Status> {
        let result = self
            .state
            .client_stream(
                "greet.LongGreet",
                request,
                |req: LongGreetRequest| first_name(req.greeting),
                GreetingConcat::new(),
            )
            .await?;
        Ok(Response::new(LongGreetResponse { result }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_everyone(
        &self,
        request: Request<Streaming<GreetEveryoneRequest>>,
    ) -> core::result::Result<Response<Self::GreetEveryoneStream>, Status> {
        self.state.duplex(
            "greet.GreetEveryone",
            request,
            |req: GreetEveryoneRequest| first_name(req.greeting),
            Greeting,
        )
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_with_deadline(
        &self,
        request: Request<GreetWithDeadlineRequest>,
    ) -> core::result::Result<Response<GreetWithDeadlineResponse>, Status> {
        let runtime = self.state.config.slow_greet;
        self.state
            .unary("greet.GreetWithDeadline", request, move |req, ctx| {
                slow_greet(first_name(req.greeting), ctx, runtime)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamcalc_core::Error;

    #[tokio::test(start_paused = true)]
    async fn slow_greet_stops_at_next_step_once_cancelled() {
        let ctx = DeadlineContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let res = slow_greet("Ada".to_string(), ctx, Duration::from_secs(3)).await;
        assert_eq!(res, Err(Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_greet_answers_after_runtime() {
        let res = slow_greet("Ada".to_string(), DeadlineContext::new(), Duration::from_secs(3)).await;
        assert_eq!(
            res,
            Ok(GreetWithDeadlineResponse {
                result: "Hello Ada".to_string()
            })
        );
    }
}
