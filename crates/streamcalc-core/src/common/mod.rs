//! Shared error and type definitions.
//!
//! - [`error`] - The [`Error`](error::Error) taxonomy and its mapping to and
//!   from `tonic::Status`.
//! - [`types`] - Call shapes, stream half states and the response stream
//!   alias.

pub mod error;
pub mod types;
