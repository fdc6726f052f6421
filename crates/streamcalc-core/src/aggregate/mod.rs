//! Incremental aggregators.
//!
//! Pure, synchronous reducers that consume one input at a time while keeping
//! private running state. They never suspend and never observe a
//! [`DeadlineContext`](crate::DeadlineContext); the drivers in
//! [`crate::streaming`] feed them and decide what to do with their output.
//!
//! Two policies are modelled:
//!
//! - [`Aggregator`] - emits zero or one value per input while the stream is
//!   still open. Used by the duplex coordinator ([`RunningMax`],
//!   [`Greeting`]).
//! - [`Reducer`] - folds every input silently and produces exactly one value
//!   once the input is exhausted. Used by the client-stream aggregator
//!   ([`RunningAverage`], [`GreetingConcat`]).
//!
//! [`PrimeFactors`] is the odd one out: it expands a single input into a lazy
//! sequence and is driven as an [`Iterator`] by the server-stream producer.
//!
//! State is owned by exactly one call direction. None of these types are
//! shared, so none of them lock.

mod average;
mod greeting;
mod max;
mod primes;

pub use average::RunningAverage;
pub use greeting::{Greeting, GreetingConcat, greeting_for};
pub use max::RunningMax;
pub use primes::{DIVISIONS_PER_YIELD, PrimeFactors, Progress};

use crate::Result;

/// A per-input update rule that may emit a value for each input.
pub trait Aggregator {
    type Input;
    type Emit;

    /// Folds `input` into the running state and returns the value to emit, if
    /// this input produced one.
    fn update(&mut self, input: Self::Input) -> Option<Self::Emit>;
}

/// A fold that yields one value after the last input.
pub trait Reducer {
    type Input;
    type Output;

    /// Folds `input` into the running state.
    fn fold(&mut self, input: Self::Input);

    /// Computes the final value from the accumulated state.
    ///
    /// # Errors
    ///
    /// Implementations fail when the accumulated state has no meaningful
    /// result, for example an average over zero inputs.
    fn finish(self) -> Result<Self::Output>;
}
