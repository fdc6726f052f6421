use super::Reducer;
use crate::{Error, Result};

/// Running `(sum, count)` over integer inputs, finished as their mean.
///
/// The sum is kept as `i128` so no sequence of `i64` inputs short of 2^64
/// elements can overflow it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunningAverage {
    sum: i128,
    count: u64,
}

impl RunningAverage {
    pub const fn new() -> Self {
        Self { sum: 0, count: 0 }
    }
}

impl Reducer for RunningAverage {
    type Input = i64;
    type Output = f64;

    fn fold(&mut self, input: i64) {
        self.sum += i128::from(input);
        self.count += 1;
    }

    /// # Errors
    ///
    /// An empty stream has no average and fails with
    /// [`Error::InvalidArgument`].
    fn finish(self) -> Result<f64> {
        if self.count == 0 {
            return Err(Error::invalid_argument("cannot average an empty stream"));
        }
        Ok(self.sum as f64 / self.count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn average(inputs: &[i64]) -> Result<f64> {
        let mut avg = RunningAverage::new();
        for &n in inputs {
            avg.fold(n);
        }
        avg.finish()
    }

    #[test]
    fn averages_inputs() {
        assert_eq!(average(&[7, 5, 2, 1]), Ok(3.75));
        assert_eq!(average(&[1, 3, 5, 7, 9]), Ok(5.0));
        assert_eq!(average(&[-4, 4]), Ok(0.0));
    }

    #[test]
    fn empty_stream_is_invalid() {
        assert_eq!(
            average(&[]),
            Err(Error::invalid_argument("cannot average an empty stream"))
        );
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let avg = average(&[i64::MAX, i64::MAX, i64::MAX]).unwrap();
        assert_eq!(avg, i64::MAX as f64);
    }
}
