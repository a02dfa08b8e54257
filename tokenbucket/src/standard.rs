//! A token bucket guarded by a mutex.

use parking_lot::Mutex;

use crate::bucket::{check_positive, check_tokens};
use crate::clock::MonotonicClock;
use crate::state::Outcome;
use crate::{
    BucketState, Clock, Configuration, ConsumptionProbe, Error, TokenBucket,
};

/// A token bucket which serializes operations with a mutex.
///
/// Every operation samples the clock, then performs its refill-inspect-mutate
/// sequence while holding the lock. Threads contending for the bucket block
/// on the mutex; fairness follows the underlying lock.
///
/// # Examples
///
/// ```
/// use tokenbucket::{Bandwidth, Bucket, Configuration, TokenBucket};
/// use core::time::Duration;
///
/// // ratelimit to 100/s with bursts up to 500
/// let bandwidth = Bandwidth::greedy(500, 100, Duration::from_secs(1)).unwrap();
/// let bucket = Bucket::new(Configuration::from(bandwidth));
///
/// assert!(bucket.try_consume(1).unwrap());
/// ```
pub struct Bucket<C = MonotonicClock> {
    configuration: Configuration,
    clock: C,
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Create a bucket which reads the system monotonic clock.
    pub fn new(configuration: Configuration) -> Self {
        Self::with_clock(configuration, MonotonicClock::new())
    }
}

impl<C: Clock> Bucket<C> {
    /// Create a bucket with an injected clock.
    pub fn with_clock(configuration: Configuration, clock: C) -> Self {
        let now = clock.now_nanos();
        let state = Mutex::new(BucketState::new(&configuration, now));

        Self {
            configuration,
            clock,
            state,
        }
    }

    /// Sample the clock and run one refill-inspect-mutate sequence while
    /// holding the lock.
    fn update<R>(&self, op: impl FnOnce(&mut BucketState, u64) -> Outcome<R>) -> R {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();

        state.refill(&self.configuration, now);

        op(&mut state, now).into_inner()
    }
}

impl<C: Clock> TokenBucket for Bucket<C> {
    fn try_consume(&self, tokens: u64) -> Result<bool, Error> {
        check_tokens(&self.configuration, tokens)?;

        Ok(self.update(|state, _now| state.try_consume(tokens)))
    }

    fn try_consume_and_return_remaining(
        &self,
        tokens: u64,
    ) -> Result<ConsumptionProbe, Error> {
        check_tokens(&self.configuration, tokens)?;

        Ok(self.update(|state, now| {
            state.try_consume_and_return_remaining(&self.configuration, now, tokens)
        }))
    }

    fn consume_as_much_as_possible(&self, limit: u64) -> u64 {
        self.update(|state, _now| state.consume_as_much_as_possible(limit))
    }

    fn reserve_and_calculate_time_to_sleep(
        &self,
        tokens: u64,
        wait_limit_nanos: u64,
    ) -> Result<Option<u64>, Error> {
        check_positive(tokens)?;

        Ok(self.update(|state, now| {
            state.reserve(&self.configuration, now, tokens, wait_limit_nanos)
        }))
    }

    fn add_tokens(&self, tokens: u64) -> Result<(), Error> {
        check_positive(tokens)?;

        Ok(self.update(|state, _now| state.add_tokens(&self.configuration, tokens)))
    }

    fn available_tokens(&self) -> u64 {
        self.update(|state, _now| Outcome::Unchanged(state.available_tokens()))
    }

    fn snapshot(&self) -> BucketState {
        self.state.lock().clone()
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}
