//! The operation set shared by both bucket variants, and the adapter which
//! lifts it into already-completed futures.

use core::future::{ready, Ready};

use crate::{BucketState, Configuration, Error};

/// The outcome of a consume attempt, carrying the remaining balance and, on
/// rejection, the estimated wait until the request could succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumptionProbe {
    /// The tokens were consumed; `remaining_tokens` is the balance available
    /// immediately afterwards.
    Consumed { remaining_tokens: u64 },
    /// The tokens were not consumed; `nanos_to_wait_for_refill` is the
    /// smallest delay after which the same request could succeed if nothing
    /// else consumes.
    Rejected {
        remaining_tokens: u64,
        nanos_to_wait_for_refill: u64,
    },
}

impl ConsumptionProbe {
    /// Returns true if the tokens were consumed.
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed { .. })
    }

    /// The balance available immediately after the attempt.
    pub fn remaining_tokens(&self) -> u64 {
        match self {
            Self::Consumed { remaining_tokens } | Self::Rejected { remaining_tokens, .. } => {
                *remaining_tokens
            }
        }
    }

    /// The estimated wait for a rejected attempt, zero for a consumed one.
    pub fn nanos_to_wait_for_refill(&self) -> u64 {
        match self {
            Self::Consumed { .. } => 0,
            Self::Rejected {
                nanos_to_wait_for_refill,
                ..
            } => *nanos_to_wait_for_refill,
        }
    }
}

/// A token bucket.
///
/// Both bucket variants implement this contract with identical observable
/// semantics: every operation samples the clock once, then performs its
/// refill-inspect-mutate sequence atomically. Successful mutating operations
/// are linearizable in a single total order per bucket.
pub trait TokenBucket {
    /// Try to consume `tokens`, returning whether they were consumed. The
    /// bucket is left unchanged when the balance is insufficient.
    fn try_consume(&self, tokens: u64) -> Result<bool, Error>;

    /// Try to consume `tokens`, additionally reporting the remaining balance
    /// and, on rejection, the wait estimated for the request to succeed.
    fn try_consume_and_return_remaining(&self, tokens: u64)
        -> Result<ConsumptionProbe, Error>;

    /// Consume as many tokens as are available, up to `limit`, returning the
    /// number consumed. A `limit` of zero is a no-op.
    fn consume_as_much_as_possible(&self, limit: u64) -> u64;

    /// Reserve `tokens` for future use and return the delay the caller should
    /// sleep, in nanoseconds. The reservation may drive balances negative;
    /// they heal as refills repay the deficit.
    ///
    /// When `wait_limit_nanos` is nonzero and the required delay exceeds it,
    /// the bucket is left unchanged and `None` is returned. A
    /// `wait_limit_nanos` of zero (or `u64::MAX`) accepts any delay.
    fn reserve_and_calculate_time_to_sleep(
        &self,
        tokens: u64,
        wait_limit_nanos: u64,
    ) -> Result<Option<u64>, Error>;

    /// Credit `tokens` to every bandwidth, clamping each at its capacity.
    ///
    /// Credit heals a reservation deficit first; a bandwidth already at
    /// capacity ignores the credit, so this cannot be used as a pure counter.
    fn add_tokens(&self, tokens: u64) -> Result<(), Error>;

    /// Refill to the current time and return the available balance.
    fn available_tokens(&self) -> u64;

    /// Return a deep copy of the current state.
    fn snapshot(&self) -> BucketState;

    /// Get a reference to the bucket's configuration.
    fn configuration(&self) -> &Configuration;

    /// Borrow the bucket as an asynchronous one.
    fn as_async(&self) -> AsyncBucket<'_, Self>
    where
        Self: Sized,
    {
        AsyncBucket::new(self)
    }
}

/// Validation shared by the consume operations: rejects zero and requests no
/// bandwidth could ever admit. Runs before the atomic section, so a failed
/// request never leaves partial state behind.
pub(crate) fn check_tokens(configuration: &Configuration, tokens: u64) -> Result<(), Error> {
    if tokens == 0 {
        return Err(Error::ZeroTokens);
    }

    if tokens > configuration.min_capacity() {
        return Err(Error::TokensMoreThanCapacity);
    }

    Ok(())
}

/// Validation for operations which may exceed capacity (reservations
/// overdraw by design, credits clamp).
pub(crate) fn check_positive(tokens: u64) -> Result<(), Error> {
    if tokens == 0 {
        return Err(Error::ZeroTokens);
    }

    Ok(())
}

/// An adapter lifting any [`TokenBucket`] into one whose operations return
/// already-completed futures.
///
/// Operations on a local bucket complete synchronously, so the lifting is
/// mechanical: each call executes on the caller and wraps the result in
/// [`core::future::Ready`].
///
/// # Examples
///
/// ```
/// use tokenbucket::{Bandwidth, Bucket, Configuration, TokenBucket};
/// use core::time::Duration;
///
/// # futures::executor::block_on(async {
/// let bandwidth = Bandwidth::greedy(10, 10, Duration::from_secs(1)).unwrap();
/// let bucket = Bucket::new(Configuration::from(bandwidth));
///
/// assert!(bucket.as_async().try_consume(1).await.unwrap());
/// # });
/// ```
pub struct AsyncBucket<'a, B: ?Sized> {
    bucket: &'a B,
}

impl<'a, B: TokenBucket + ?Sized> AsyncBucket<'a, B> {
    pub fn new(bucket: &'a B) -> Self {
        Self { bucket }
    }

    pub fn try_consume(&self, tokens: u64) -> Ready<Result<bool, Error>> {
        ready(self.bucket.try_consume(tokens))
    }

    pub fn try_consume_and_return_remaining(
        &self,
        tokens: u64,
    ) -> Ready<Result<ConsumptionProbe, Error>> {
        ready(self.bucket.try_consume_and_return_remaining(tokens))
    }

    pub fn consume_as_much_as_possible(&self, limit: u64) -> Ready<u64> {
        ready(self.bucket.consume_as_much_as_possible(limit))
    }

    pub fn reserve_and_calculate_time_to_sleep(
        &self,
        tokens: u64,
        wait_limit_nanos: u64,
    ) -> Ready<Result<Option<u64>, Error>> {
        ready(
            self.bucket
                .reserve_and_calculate_time_to_sleep(tokens, wait_limit_nanos),
        )
    }

    pub fn add_tokens(&self, tokens: u64) -> Ready<Result<(), Error>> {
        ready(self.bucket.add_tokens(tokens))
    }

    pub fn available_tokens(&self) -> Ready<u64> {
        ready(self.bucket.available_tokens())
    }
}
