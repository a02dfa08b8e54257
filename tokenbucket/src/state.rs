//! Runtime state for a bucket and the refill-inspect-mutate kernels shared by
//! both bucket variants.

use crate::bucket::ConsumptionProbe;
use crate::config::Configuration;

/// The result of an inspect-mutate kernel, recording whether the state was
/// modified. The lock-free bucket publishes only on `Mutated`.
pub(crate) enum Outcome<R> {
    Unchanged(R),
    Mutated(R),
}

impl<R> Outcome<R> {
    pub(crate) fn into_inner(self) -> R {
        match self {
            Self::Unchanged(result) | Self::Mutated(result) => result,
        }
    }
}

/// Runtime values for a single bandwidth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandwidthState {
    /// Current token balance. Negative while a reservation deficit is being
    /// repaid by refills.
    pub(crate) tokens: i64,
    /// Timestamp of the last refill boundary, in nanoseconds.
    pub(crate) last_refill: u64,
    /// Sub-token remainder carried between greedy refills, in units of
    /// token-nanoseconds. Always less than the refill period, always zero
    /// for intervally refill.
    pub(crate) rounding_error: u64,
}

impl BandwidthState {
    /// The current token balance. Negative while the bandwidth is repaying a
    /// reservation deficit.
    pub fn tokens(&self) -> i64 {
        self.tokens
    }

    /// The timestamp of the last refill boundary, in nanoseconds.
    pub fn last_refill_nanos(&self) -> u64 {
        self.last_refill
    }

    /// The sub-token remainder carried between greedy refills.
    pub fn rounding_error(&self) -> u64 {
        self.rounding_error
    }

    /// Credit tokens, reducing any deficit first and clamping the surplus at
    /// capacity.
    pub(crate) fn credit(&mut self, capacity: u64, amount: u128) {
        // tokens never exceeds capacity, so headroom is nonnegative
        let headroom = (capacity as i128 - self.tokens as i128) as u128;

        if amount >= headroom {
            self.tokens = capacity as i64;
        } else {
            self.tokens = (self.tokens as i128 + amount as i128) as i64;
        }
    }
}

/// The mutable state of a bucket: one `BandwidthState` per configured
/// bandwidth, in configuration order.
///
/// A deep copy is a single allocation of a flat slice, which keeps the
/// copy-and-publish path of the lock-free bucket cheap. Snapshots returned by
/// the buckets are values of this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketState {
    bandwidths: Box<[BandwidthState]>,
}

impl BucketState {
    pub(crate) fn new(configuration: &Configuration, now: u64) -> Self {
        Self {
            bandwidths: configuration
                .bandwidths()
                .iter()
                .map(|bandwidth| bandwidth.initial_state(now))
                .collect(),
        }
    }

    /// Overwrite this state with the contents of another without allocating.
    pub(crate) fn copy_from(&mut self, other: &Self) {
        self.bandwidths.copy_from_slice(&other.bandwidths);
    }

    /// Get a reference to the per-bandwidth states.
    pub fn as_slice(&self) -> &[BandwidthState] {
        &self.bandwidths
    }

    /// The number of tokens available for consumption: the minimum balance
    /// across all bandwidths, floored at zero.
    pub fn available_tokens(&self) -> u64 {
        self.bandwidths
            .iter()
            .map(|state| state.tokens.max(0) as u64)
            .min()
            .unwrap_or(0)
    }

    /// Refill every bandwidth to `now`.
    pub(crate) fn refill(&mut self, configuration: &Configuration, now: u64) {
        for (bandwidth, state) in configuration.bandwidths().iter().zip(self.bandwidths.iter_mut())
        {
            bandwidth.replenish(state, now);
        }
    }

    /// Subtract `tokens` from every bandwidth. Balances may go negative; the
    /// caller decides whether a deficit is admissible.
    pub(crate) fn consume(&mut self, tokens: u64) {
        for state in self.bandwidths.iter_mut() {
            state.tokens = state.tokens.saturating_sub_unsigned(tokens);
        }
    }

    /// The smallest delay after which every bandwidth could admit `tokens`,
    /// assuming no further consumption. Must be called after a refill to
    /// `now`.
    pub(crate) fn nanos_until_available(
        &self,
        configuration: &Configuration,
        now: u64,
        tokens: u64,
    ) -> u64 {
        configuration
            .bandwidths()
            .iter()
            .zip(self.bandwidths.iter())
            .map(|(bandwidth, state)| bandwidth.nanos_until_available(state, now, tokens))
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn try_consume(&mut self, tokens: u64) -> Outcome<bool> {
        if self.available_tokens() < tokens {
            Outcome::Unchanged(false)
        } else {
            self.consume(tokens);
            Outcome::Mutated(true)
        }
    }

    pub(crate) fn try_consume_and_return_remaining(
        &mut self,
        configuration: &Configuration,
        now: u64,
        tokens: u64,
    ) -> Outcome<ConsumptionProbe> {
        let available = self.available_tokens();

        if available < tokens {
            Outcome::Unchanged(ConsumptionProbe::Rejected {
                remaining_tokens: available,
                nanos_to_wait_for_refill: self.nanos_until_available(configuration, now, tokens),
            })
        } else {
            self.consume(tokens);
            Outcome::Mutated(ConsumptionProbe::Consumed {
                remaining_tokens: self.available_tokens(),
            })
        }
    }

    pub(crate) fn consume_as_much_as_possible(&mut self, limit: u64) -> Outcome<u64> {
        let consumed = limit.min(self.available_tokens());

        if consumed == 0 {
            Outcome::Unchanged(0)
        } else {
            self.consume(consumed);
            Outcome::Mutated(consumed)
        }
    }

    pub(crate) fn reserve(
        &mut self,
        configuration: &Configuration,
        now: u64,
        tokens: u64,
        wait_limit_nanos: u64,
    ) -> Outcome<Option<u64>> {
        let delay = self.nanos_until_available(configuration, now, tokens);

        if wait_limit_nanos > 0 && delay > wait_limit_nanos {
            Outcome::Unchanged(None)
        } else {
            self.consume(tokens);
            Outcome::Mutated(Some(delay))
        }
    }

    pub(crate) fn add_tokens(&mut self, configuration: &Configuration, tokens: u64) -> Outcome<()> {
        for (bandwidth, state) in configuration.bandwidths().iter().zip(self.bandwidths.iter_mut())
        {
            state.credit(bandwidth.capacity(), tokens as u128);
        }

        Outcome::Mutated(())
    }
}
