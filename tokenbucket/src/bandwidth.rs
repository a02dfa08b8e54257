//! Bandwidth descriptors and the per-bandwidth refill algebra.

use core::time::Duration;

use crate::state::BandwidthState;
use crate::BuildError;

/// Refill modes define how tokens are returned to a bandwidth over time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Refill {
    /// Tokens accrue continuously at `refill_tokens / refill_period`, with
    /// sub-token remainders carried between refills.
    Greedy,
    /// Tokens are credited in lump sums of `refill_tokens` at period
    /// boundaries.
    Intervally,
}

/// An immutable rate-limit rule pairing a capacity with a refill schedule.
///
/// A bucket is configured with one or more bandwidths and admits a consume
/// only if every bandwidth can admit it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bandwidth {
    capacity: u64,
    initial_tokens: u64,
    refill_tokens: u64,
    refill_period: u64,
    refill: Refill,
}

impl Bandwidth {
    /// Create a bandwidth with continuous refill: `refill_tokens` accrue
    /// evenly spread across each `refill_period`. The bandwidth starts full.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokenbucket::Bandwidth;
    /// use core::time::Duration;
    ///
    /// // 100 tokens/s with bursts of up to 500 tokens
    /// let bandwidth = Bandwidth::greedy(500, 100, Duration::from_secs(1)).unwrap();
    /// assert_eq!(bandwidth.capacity(), 500);
    /// ```
    pub fn greedy(
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
    ) -> Result<Self, BuildError> {
        Self::new(capacity, refill_tokens, refill_period, Refill::Greedy)
    }

    /// Create a bandwidth with discrete refill: `refill_tokens` are credited
    /// all at once each time a full `refill_period` elapses. The bandwidth
    /// starts full.
    pub fn intervally(
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
    ) -> Result<Self, BuildError> {
        Self::new(capacity, refill_tokens, refill_period, Refill::Intervally)
    }

    fn new(
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
        refill: Refill,
    ) -> Result<Self, BuildError> {
        if capacity == 0 {
            return Err(BuildError::ZeroCapacity);
        }

        // token balances are signed so that reservations may run a deficit
        if capacity > i64::MAX as u64 {
            return Err(BuildError::CapacityTooLarge);
        }

        if refill_tokens == 0 {
            return Err(BuildError::ZeroRefillTokens);
        }

        if refill_tokens > capacity {
            return Err(BuildError::RefillExceedsCapacity);
        }

        if refill_period.is_zero() {
            return Err(BuildError::ZeroRefillPeriod);
        }

        let refill_period = u64::try_from(refill_period.as_nanos())
            .map_err(|_| BuildError::RefillPeriodTooLong)?;

        Ok(Self {
            capacity,
            initial_tokens: capacity,
            refill_tokens,
            refill_period,
            refill,
        })
    }

    /// Override the number of tokens the bandwidth starts with.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokenbucket::Bandwidth;
    /// use core::time::Duration;
    ///
    /// let bandwidth = Bandwidth::greedy(10, 10, Duration::from_secs(1))
    ///     .and_then(|b| b.with_initial_tokens(0))
    ///     .unwrap();
    /// assert_eq!(bandwidth.initial_tokens(), 0);
    /// ```
    pub fn with_initial_tokens(mut self, initial_tokens: u64) -> Result<Self, BuildError> {
        if initial_tokens > self.capacity {
            return Err(BuildError::InitialTokensExceedCapacity);
        }

        self.initial_tokens = initial_tokens;
        Ok(self)
    }

    /// The maximum number of tokens the bandwidth can hold.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The number of tokens the bandwidth starts with.
    pub fn initial_tokens(&self) -> u64 {
        self.initial_tokens
    }

    /// The number of tokens credited per refill period.
    pub fn refill_tokens(&self) -> u64 {
        self.refill_tokens
    }

    /// The refill period.
    pub fn refill_period(&self) -> Duration {
        Duration::from_nanos(self.refill_period)
    }

    /// The refill mode.
    pub fn refill(&self) -> Refill {
        self.refill
    }

    pub(crate) fn initial_state(&self, now: u64) -> BandwidthState {
        BandwidthState {
            tokens: self.initial_tokens as i64,
            last_refill: now,
            rounding_error: 0,
        }
    }

    /// Credit tokens accrued between `state.last_refill` and `now`.
    ///
    /// A reading at or before `last_refill` is a no-op, so a stale timestamp
    /// applied after a newer one cannot move state backwards.
    ///
    /// Refilling at intermediate readings yields exactly the same state as a
    /// single refill to the final reading: greedy refill carries the
    /// sub-token remainder in `rounding_error`, intervally refill advances by
    /// whole periods only. The lock-free bucket relies on this to let readers
    /// refill private copies without publishing.
    pub(crate) fn replenish(&self, state: &mut BandwidthState, now: u64) {
        if now <= state.last_refill {
            return;
        }

        let elapsed = now - state.last_refill;

        match self.refill {
            Refill::Greedy => {
                // widen to 128 bits, the product can exceed 64
                let divided = elapsed as u128 * self.refill_tokens as u128
                    + state.rounding_error as u128;

                let tokens = divided / self.refill_period as u128;

                state.credit(self.capacity, tokens);

                // the remainder is less than the period, so it fits in 64 bits
                state.rounding_error = (divided % self.refill_period as u128) as u64;
                state.last_refill = now;
            }
            Refill::Intervally => {
                let periods = elapsed / self.refill_period;

                if periods == 0 {
                    return;
                }

                state.credit(self.capacity, periods as u128 * self.refill_tokens as u128);
                state.last_refill += periods * self.refill_period;
            }
        }
    }

    /// The smallest delay after which this bandwidth could admit `tokens`,
    /// assuming no further consumption. Must be called after a refill to
    /// `now`.
    ///
    /// The delay is deficit-based: it is the time needed to generate
    /// `tokens - state.tokens` fresh tokens, which for a bandwidth in deficit
    /// includes the time to climb back to zero.
    pub(crate) fn nanos_until_available(
        &self,
        state: &BandwidthState,
        now: u64,
        tokens: u64,
    ) -> u64 {
        let deficit = tokens as i128 - state.tokens as i128;

        if deficit <= 0 {
            return 0;
        }

        let deficit = deficit as u128;
        let refill_tokens = self.refill_tokens as u128;
        let refill_period = self.refill_period as u128;

        let delay = match self.refill {
            Refill::Greedy => deficit
                .checked_mul(refill_period)
                .map(|nanos| nanos.div_ceil(refill_tokens))
                .unwrap_or(u128::MAX),
            Refill::Intervally => {
                let periods = deficit.div_ceil(refill_tokens);

                // discount the part of the current period already elapsed
                let elapsed = (now - state.last_refill) as u128;

                periods
                    .checked_mul(refill_period)
                    .map(|nanos| nanos.saturating_sub(elapsed))
                    .unwrap_or(u128::MAX)
            }
        };

        delay.min(u64::MAX as u128) as u64
    }
}
