#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
pub use common::error::{Error, Result};

pub mod aggregate;
pub mod context;
pub mod proto;
pub mod streaming;

pub use context::DeadlineContext;
