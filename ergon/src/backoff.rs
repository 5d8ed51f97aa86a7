//! The backoff used by [`crate::retry::RetryPolicy`] to space out request attempts.
//!
//! The delay grows exponentially from a base delay and can optionally be extended by a random
//! jitter, so that many clients failing at the same moment do not retry in lockstep.
//!
//! All of the constructors and configuration functions are `const`.
//!
//! # Example
//!
//! ```
//! # use ergon::prelude::*;
//! # use chrono::TimeDelta;
//! let strategy = BackoffStrategy::exponential(TimeDelta::milliseconds(100))
//!     .with_jitter(TimeDelta::milliseconds(100));
//!
//! assert!(strategy.backoff(0) >= TimeDelta::milliseconds(100));
//! assert!(strategy.backoff(0) < TimeDelta::milliseconds(200));
//! assert!(strategy.backoff(3) >= TimeDelta::milliseconds(800));
//! assert!(strategy.backoff(3) < TimeDelta::milliseconds(900));
//! ```

use chrono::TimeDelta;
use rand::Rng;

/// Exponential backoff, doubling with each attempt starting from `base` on attempt `0`, i.e.
/// `base * 2^attempt`, plus a random jitter in the range `0 =< jitter < delta`.
///
/// The jitter only ever adds to the exponential delay and the result saturates at
/// [`TimeDelta::max_value`] rather than overflowing.
///
/// # Example
///
/// ```
/// # use ergon::prelude::*;
/// # use chrono::TimeDelta;
/// let strategy = BackoffStrategy::exponential(TimeDelta::seconds(2));
///
/// assert_eq!(strategy.backoff(0), TimeDelta::seconds(2));
/// assert_eq!(strategy.backoff(1), TimeDelta::seconds(4));
/// assert_eq!(strategy.backoff(2), TimeDelta::seconds(8));
/// assert_eq!(strategy.backoff(3), TimeDelta::seconds(16));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStrategy {
    base: TimeDelta,
    jitter: TimeDelta,
}

impl BackoffStrategy {
    pub const fn exponential(base: TimeDelta) -> Self {
        Self {
            base,
            jitter: TimeDelta::zero(),
        }
    }

    /// Add a random jitter of up to `jitter` to every backoff.
    pub const fn with_jitter(mut self, jitter: TimeDelta) -> Self {
        self.jitter = jitter;
        self
    }

    /// Given the number of retries already performed returns the [`TimeDelta`] to wait before the
    /// next attempt.
    pub fn backoff(&self, attempt: u32) -> TimeDelta {
        let backoff = 2_i32
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(TimeDelta::max_value());

        let milliseconds = self.jitter.num_milliseconds();
        if milliseconds <= 0 {
            return backoff;
        }
        let jitter = rand::thread_rng().gen_range(0..milliseconds);
        backoff
            .checked_add(&TimeDelta::milliseconds(jitter))
            .unwrap_or(TimeDelta::max_value())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exponential_backoff() {
        let delay = TimeDelta::milliseconds(100);
        let strategy = BackoffStrategy::exponential(delay);

        for i in 0..10 {
            assert_eq!(strategy.backoff(i), delay * 2_i32.pow(i));
        }
    }

    #[test]
    fn exponential_backoff_is_non_decreasing() {
        let strategy = BackoffStrategy::exponential(TimeDelta::milliseconds(100));

        for i in 0..40 {
            assert!(strategy.backoff(i) <= strategy.backoff(i + 1));
        }
    }

    #[test]
    fn exponential_backoff_saturates() {
        let strategy = BackoffStrategy::exponential(TimeDelta::seconds(1));

        assert_eq!(strategy.backoff(64), TimeDelta::max_value());
        assert_eq!(strategy.backoff(u32::MAX), TimeDelta::max_value());

        let strategy = strategy.with_jitter(TimeDelta::seconds(1));
        assert_eq!(strategy.backoff(u32::MAX), TimeDelta::max_value());
    }

    #[test]
    fn exponential_backoff_with_jitter() {
        let delay = TimeDelta::milliseconds(100);
        let jitter = TimeDelta::milliseconds(100);
        let strategy = BackoffStrategy::exponential(delay).with_jitter(jitter);

        for i in 0..8 {
            let expected = delay * 2_i32.pow(i);
            for _ in 0..50 {
                let backoff = strategy.backoff(i);
                assert!(backoff >= expected);
                assert!(backoff < expected + jitter);
            }
        }
    }

    #[test]
    fn zero_jitter_is_ignored() {
        let delay = TimeDelta::milliseconds(100);
        let strategy = BackoffStrategy::exponential(delay).with_jitter(TimeDelta::zero());

        assert_eq!(strategy.backoff(0), delay);
        assert_eq!(strategy.backoff(1), delay * 2);
    }
}
