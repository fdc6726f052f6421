//! # Shared Call Types
//!
//! Types describing a call's shape and the state of its stream halves, shared
//! by the drivers in [`crate::streaming`] and the services built on them.
//!
//! ## Type Aliases
//!
//! - [`ResponseStream`] - The boxed outbound stream handed to tonic for every
//!   server-streaming and duplex method.
//!
//! ## Enums
//!
//! - [`Shape`] - The four interaction shapes a call can have.
//! - [`HalfState`] - Lifecycle of one direction of a call.

use core::fmt;
use core::pin::Pin;
use futures::Stream;
use tonic::Status;

/// The outbound stream type returned by streaming handlers.
///
/// Items are produced by an [`Outbound`](crate::streaming::Outbound) half and
/// consumed by tonic, which encodes them onto the wire in order.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// The interaction shape of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// One request, one response.
    Unary,
    /// One request, many responses.
    ServerStream,
    /// Many requests, one response.
    ClientStream,
    /// Many requests and many responses, progressing independently.
    Duplex,
}

impl Shape {
    pub const fn as_str(self) -> &'static str {
        match self {
            Shape::Unary => "unary",
            Shape::ServerStream => "server_stream",
            Shape::ClientStream => "client_stream",
            Shape::Duplex => "duplex",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one stream half.
///
/// `Open` moves to exactly one of the terminal states: `Closed` after a
/// graceful end-of-stream, `Failed` after a transport error, a cancellation or
/// a sibling half's failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HalfState {
    Open,
    Closed,
    Failed,
}

impl HalfState {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, HalfState::Open)
    }
}
