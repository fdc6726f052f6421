use crate::{Error, Result};
use futures::Stream;

/// Trial divisions [`PrimeFactors::into_stream`] performs before yielding to
/// the runtime.
pub const DIVISIONS_PER_YIELD: u32 = 1 << 16;

/// Outcome of one bounded round of trial division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Factor(i64),
    /// The division budget ran out before the next factor was found.
    Pending,
    Done,
}

/// Lazy trial-division factorization.
///
/// Each call to [`next`](Iterator::next) divides the remaining value by its
/// smallest divisor `>= 2` and yields that divisor, so factors come out prime,
/// with multiplicity, in non-decreasing order. Once the candidate divisor
/// passes the square root of what remains, the remainder itself is prime and
/// is yielded last.
///
/// `1` factors into the empty sequence. Zero and negative numbers have no
/// factorization and are rejected by [`PrimeFactors::new`].
#[derive(Clone, Debug)]
pub struct PrimeFactors {
    remaining: u64,
    divisor: u64,
}

impl PrimeFactors {
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `number < 1`.
    pub fn new(number: i64) -> Result<Self> {
        if number < 1 {
            return Err(Error::invalid_argument(format!(
                "Cannot factor a non-positive number: {number}"
            )));
        }
        Ok(Self {
            remaining: number.unsigned_abs(),
            divisor: 2,
        })
    }

    /// Tries at most `budget` candidate divisors in search of the next factor.
    pub fn advance(&mut self, budget: u32) -> Progress {
        for _ in 0..budget {
            if self.remaining <= 1 {
                return Progress::Done;
            }
            // divisor^2 > remaining, written so it cannot overflow.
            if self.divisor > self.remaining / self.divisor {
                let prime = self.remaining;
                self.remaining = 1;
                return Progress::Factor(prime as i64);
            }
            if self.remaining % self.divisor == 0 {
                self.remaining /= self.divisor;
                return Progress::Factor(self.divisor as i64);
            }
            self.divisor += if self.divisor == 2 { 1 } else { 2 };
        }
        if self.remaining <= 1 {
            Progress::Done
        } else {
            Progress::Pending
        }
    }

    /// The factors as a stream that yields to the runtime every
    /// [`DIVISIONS_PER_YIELD`] divisions.
    pub fn into_stream(self) -> impl Stream<Item = i64> + Send + 'static {
        futures::stream::unfold(self, |mut factors| async move {
            loop {
                match factors.advance(DIVISIONS_PER_YIELD) {
                    Progress::Factor(prime) => return Some((prime, factors)),
                    Progress::Done => return None,
                    Progress::Pending => tokio::task::yield_now().await,
                }
            }
        })
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        loop {
            match self.advance(u32::MAX) {
                Progress::Factor(prime) => return Some(prime),
                Progress::Done => return None,
                Progress::Pending => {}
            }
        }
    }
}
