#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{config, serve_with_incoming};
