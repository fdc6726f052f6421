//! `calculator.Calculator`: arithmetic over every call shape.

use super::ServiceState;
use futures::StreamExt;
use streamcalc_core::{
    Error,
    aggregate::{PrimeFactors, RunningAverage, RunningMax},
    proto::calculator::{
        AverageRequest, AverageResponse, MaxRequest, MaxResponse, PrimeRequest, PrimeResponse,
        SquareRootRequest, SquareRootResponse, SumRequest, SumResponse,
        calculator_server::{Calculator, CalculatorServer},
    },
    types::{ResponseStream, Shape},
};
use tonic::{Request, Response, Status, Streaming, codec::CompressionEncoding};

#[derive(Clone)]
pub struct CalculatorService {
    state: ServiceState,
}

impl CalculatorService {
    pub const fn new(state: ServiceState) -> Self {
        Self { state }
    }

    /// Wraps the service in its generated server with compression enabled.
    pub fn into_server(self) -> CalculatorServer<Self> {
        CalculatorServer::new(self)
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    }
}

#[tonic::async_trait]
impl Calculator for CalculatorService {
    type PrimeStream = ResponseStream<PrimeResponse>;
    type MaxStream = ResponseStream<MaxResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn sum(&self, request: Request<SumRequest>) -> Result<Response<SumResponse>, Status> {
        self.state
            .unary("calculator.Sum", request, |req, _ctx| async move {
                let (a, b) = (req.first_number, req.second_number);
                a.checked_add(b)
                    .map(|sum_result| SumResponse { sum_result })
                    .ok_or_else(|| {
                        Error::invalid_argument(format!(
                            "Sum of {a} and {b} overflows a 64-bit integer"
                        ))
                    })
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(number = request.get_ref().number)))]
    async fn prime(
        &self,
        request: Request<PrimeRequest>,
    ) -> Result<Response<Self::PrimeStream>, Status> {
        let guard = self
            .state
            .admit("calculator.Prime", Shape::ServerStream, &request)?;

        // Validated up front so a bad input fails before any emission.
        let factors = match PrimeFactors::new(request.get_ref().number) {
            Ok(factors) => factors,
            Err(e) => return Err(guard.reject(e)),
        };

        let items = factors.into_stream().map(|p| Ok(PrimeResponse::from(p)));
        Ok(self.state.server_stream(guard, items))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn average(
        &self,
        request: Request<Streaming<AverageRequest>>,
    ) -> Result<Response<AverageResponse>, Status> {
        let average = self
            .state
            .client_stream(
                "calculator.Average",
                request,
                |req: AverageRequest| req.number,
                RunningAverage::new(),
            )
            .await?;
        Ok(Response::new(AverageResponse { average }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn max(
        &self,
        request: Request<Streaming<MaxRequest>>,
    ) -> Result<Response<Self::MaxStream>, Status> {
        self.state.duplex(
            "calculator.Max",
            request,
            |req: MaxRequest| req.number,
            RunningMax::new(),
        )
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(number = request.get_ref().number)))]
    async fn square_root(
        &self,
        request: Request<SquareRootRequest>,
    ) -> Result<Response<SquareRootResponse>, Status> {
        self.state
            .unary("calculator.SquareRoot", request, |req, _ctx| async move {
                let number = req.number;
                if number < 0.0 {
                    return Err(Error::invalid_argument(format!(
                        "Received a negative argument: {number}"
                    )));
                }
                Ok(SquareRootResponse {
                    square_root: number.sqrt(),
                })
            })
            .await
    }
}
