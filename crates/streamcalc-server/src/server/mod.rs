//! Server-side components of the `streamcalc` gRPC service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI and environment configuration.
//! - [`service`] - The calculator, greeter and blog services.
//! - [`storage`] - Blog persistence behind the [`storage::BlogStore`] trait.
//! - [`tracker`] - Call admission, in-flight accounting and graceful drain.
//! - [`telemetry`] - Structured logging and optional OpenTelemetry export.

pub mod config;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod tracker;

use config::ServerConfig;
use futures::Stream;
use service::{BlogService, CalculatorService, GreeterService, ServiceState};
use std::sync::Arc;
use storage::MemoryStore;
use streamcalc_core::proto::{
    FILE_DESCRIPTOR_SET, blog::blog_service_server::BlogServiceServer,
    calculator::calculator_server::CalculatorServer, greet::greeter_server::GreeterServer,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::transport::{Server, server::Connected};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Serves every service on `incoming` until `signal` resolves, then drains
/// in-flight calls before returning.
///
/// Once `signal` fires the health service reports `NOT_SERVING`, new calls are
/// refused and running calls get [`ServerConfig::shutdown_timeout`] to finish
/// before they are aborted.
pub async fn serve_with_incoming<I, IO, IE, F>(
    incoming: I,
    config: ServerConfig,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    set_serving(&health_reporter).await;

    let state = ServiceState::new(config);
    let calculator = CalculatorService::new(state.clone());
    let greeter = GreeterService::new(state.clone());
    let blog = BlogService::new(state.clone(), Arc::new(MemoryStore::new()));

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(calculator.into_server())
        .add_service(greeter.into_server())
        .add_service(blog.into_server())
        .serve_with_incoming_shutdown(incoming, async move {
            signal.await;

            #[cfg(feature = "tracing")]
            tracing::info!("Shutdown signal received, terminating gracefully...");

            set_not_serving(&health_reporter).await;
            state.shutdown().await;
        })
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

async fn set_serving(reporter: &HealthReporter) {
    reporter
        .set_serving::<CalculatorServer<CalculatorService>>()
        .await;
    reporter.set_serving::<GreeterServer<GreeterService>>().await;
    reporter
        .set_serving::<BlogServiceServer<BlogService<MemoryStore>>>()
        .await;
}

async fn set_not_serving(reporter: &HealthReporter) {
    reporter
        .set_not_serving::<CalculatorServer<CalculatorService>>()
        .await;
    reporter
        .set_not_serving::<GreeterServer<GreeterService>>()
        .await;
    reporter
        .set_not_serving::<BlogServiceServer<BlogService<MemoryStore>>>()
        .await;
}
