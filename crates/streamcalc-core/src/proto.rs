//! Generated protocol types and the conversions the streaming drivers need.
//!
//! One module per protobuf package. Response messages that wrap a single
//! aggregator emission convert from it, so an [`Outbound`] of the message type
//! can be fed straight from an [`Aggregator`].
//!
//! [`Outbound`]: crate::streaming::Outbound
//! [`Aggregator`]: crate::aggregate::Aggregator

pub mod calculator {
    tonic::include_proto!("calculator");
}

pub mod greet {
    tonic::include_proto!("greet");
}

pub mod blog {
    tonic::include_proto!("blog");
}

/// Encoded descriptors for every service, for `tonic-reflection`.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("streamcalc_descriptor");

impl From<i64> for calculator::MaxResponse {
    fn from(max: i64) -> Self {
        Self { max }
    }
}

impl From<i64> for calculator::PrimeResponse {
    fn from(prime_result: i64) -> Self {
        Self { prime_result }
    }
}

impl From<String> for greet::GreetEveryoneResponse {
    fn from(result: String) -> Self {
        Self { result }
    }
}

impl From<String> for greet::GreetManyTimesResponse {
    fn from(result: String) -> Self {
        Self { result }
    }
}
