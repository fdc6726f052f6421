//! Error types for streaming calls.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a call can end with. It implements `From<Error>` for `tonic::Status` so
//! failures reach clients with the right status code and their message intact,
//! and `From<Status>` so failures observed on an inbound stream re-enter the
//! same taxonomy.
//!
//! ## Error Cases
//! - `InvalidArgument`: The request was malformed or out of domain.
//! - `NotFound`: The referenced entity does not exist.
//! - `Internal`: A collaborator failed unexpectedly.
//! - `ChannelError`: An internal communication failure between the tasks
//!   driving a call.
//! - `DeadlineExceeded`: The call outlived its deadline.
//! - `Cancelled`: The caller aborted the call.
//! - `ServiceShutdown`: The call was refused or aborted because the service is
//!   shutting down.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for every call shape.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The request was malformed or outside the handler's domain.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The referenced entity is absent.
    #[error("Not found: {reason}")]
    NotFound { reason: String },

    /// Unexpected failure in a collaborator.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The call outlived its deadline.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The caller aborted the call.
    #[error("Call cancelled")]
    Cancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// The status code this error is reported with.
    pub const fn code(&self) -> Code {
        match self {
            Error::InvalidArgument { .. } => Code::InvalidArgument,
            Error::NotFound { .. } => Code::NotFound,
            Error::Internal { .. } | Error::ChannelError { .. } => Code::Internal,
            Error::DeadlineExceeded => Code::DeadlineExceeded,
            Error::Cancelled | Error::ServiceShutdown => Code::Cancelled,
        }
    }

    /// Whether this error ends a call because of its context rather than
    /// because of anything the handler did.
    pub const fn is_interrupt(&self) -> bool {
        matches!(
            self,
            Error::DeadlineExceeded | Error::Cancelled | Error::ServiceShutdown
        )
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument { reason } => Status::invalid_argument(reason),
            Error::NotFound { reason } => Status::not_found(reason),
            Error::Internal { context } => Status::internal(context),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            Error::Cancelled => Status::cancelled("Call was cancelled"),
            Error::ServiceShutdown => Status::cancelled("Service is shutting down"),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument => Error::InvalidArgument { reason: message },
            Code::NotFound => Error::NotFound { reason: message },
            Code::DeadlineExceeded => Error::DeadlineExceeded,
            Code::Cancelled => Error::Cancelled,
            _ => Error::Internal { context: message },
        }
    }
}
