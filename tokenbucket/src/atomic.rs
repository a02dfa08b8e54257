//! A lock-free token bucket using copy-and-publish.

use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

use crate::bucket::{check_positive, check_tokens};
use crate::clock::MonotonicClock;
use crate::state::Outcome;
use crate::{
    BucketState, Clock, Configuration, ConsumptionProbe, Error, TokenBucket,
};

/// A token bucket which never blocks.
///
/// The state lives behind an atomically swappable reference and is treated as
/// immutable once published. A mutating operation deep copies the published
/// state, applies its refill-inspect-mutate sequence to the copy, and
/// installs it with a compare-and-swap on reference identity. Losing the race
/// reloads the published state, overwrites the working copy in place, and
/// retries with the originally sampled timestamp; refill is monotone in the
/// timestamp, so replaying an older reading over newer state is a no-op.
///
/// Progress is lock-free: a failed compare-and-swap means some other
/// operation succeeded. No operation ever parks a thread, but an individual
/// operation may retry an unbounded number of times under contention.
///
/// # Examples
///
/// ```
/// use tokenbucket::{atomic, Bandwidth, Configuration, TokenBucket};
/// use core::time::Duration;
///
/// let bandwidth = Bandwidth::greedy(500, 100, Duration::from_secs(1)).unwrap();
/// let bucket = atomic::Bucket::new(Configuration::from(bandwidth));
///
/// assert!(bucket.try_consume(1).unwrap());
/// ```
pub struct Bucket<C = MonotonicClock> {
    configuration: Configuration,
    clock: C,
    state: ArcSwap<BucketState>,
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
        let state = ArcSwap::from_pointee(BucketState::new(&configuration, now));

        Self {
            configuration,
            clock,
            state,
        }
    }

    /// Sample the clock and run one refill-inspect-mutate sequence against a
    /// working copy, publishing it only when the operation mutates.
    ///
    /// The working copy is freshly allocated on entry, so the first
    /// compare-and-swap can never alias a state published by a concurrent
    /// writer. Retries reuse the allocation.
    fn update<R>(&self, mut op: impl FnMut(&mut BucketState, u64) -> Outcome<R>) -> R {
        let now = self.clock.now_nanos();
        let mut observed = self.state.load_full();
        let mut working = (*observed).clone();

        loop {
            working.refill(&self.configuration, now);

            match op(&mut working, now) {
                Outcome::Unchanged(result) => return result,
                Outcome::Mutated(result) => {
                    let candidate = Arc::new(working);
                    let previous = self
                        .state
                        .compare_and_swap(&observed, Arc::clone(&candidate));

                    if Arc::ptr_eq(&previous, &observed) {
                        return result;
                    }

                    // lost the race: adopt the winner's state and replay the
                    // operation onto it, reusing the working allocation
                    observed = Guard::into_inner(previous);
                    working = Arc::try_unwrap(candidate)
                        .unwrap_or_else(|shared| (*shared).clone());
                    working.copy_from(&observed);
                }
            }
        }
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

    /// Refill a private copy and report it. Observers never publish refill
    /// work; refill is idempotent and monotone in the timestamp, so two
    /// concurrent readers at the same reading compute the same answer.
    fn available_tokens(&self) -> u64 {
        let now = self.clock.now_nanos();
        let mut working = BucketState::clone(&self.state.load());

        working.refill(&self.configuration, now);
        working.available_tokens()
    }

    fn snapshot(&self) -> BucketState {
        BucketState::clone(&self.state.load())
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}
