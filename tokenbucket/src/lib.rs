//! This library provides a thread safe multi-bandwidth token bucket
//! ratelimiter.
//!
//! A bucket is configured with one or more [`Bandwidth`]s, each pairing a
//! capacity with a refill schedule. A consume succeeds only if every
//! bandwidth can admit it, so composing bandwidths expresses limits like
//! "100 per second, but no more than 1000 per minute". Tokens may also be
//! reserved ahead of refill, driving a bandwidth into a deficit which heals
//! as time advances.
//!
//! Two bucket variants share one contract ([`TokenBucket`]) with identical
//! observable semantics:
//!
//! * [`Bucket`] serializes operations with a mutex.
//! * [`atomic::Bucket`] is lock-free: operations copy the state, modify the
//!   copy, and install it with a compare-and-swap, retrying on contention.
//!
//! # Examples
//!
//! ```
//! use tokenbucket::{Bandwidth, Bucket, Configuration, TokenBucket};
//! use core::time::Duration;
//!
//! // ratelimit to 100/s with bursts up to 500
//! let bandwidth = Bandwidth::greedy(500, 100, Duration::from_secs(1)).unwrap();
//! let bucket = Bucket::new(Configuration::from(bandwidth));
//!
//! for _ in 0..100 {
//!     // do some work here
//!     if !bucket.try_consume(1).unwrap() {
//!         // over the limit, back off
//!         break;
//!     }
//! }
//! ```

mod bandwidth;
mod bucket;
mod clock;
mod config;
mod errors;
mod standard;
mod state;

pub mod atomic;

pub use bandwidth::{Bandwidth, Refill};
pub use bucket::{AsyncBucket, ConsumptionProbe, TokenBucket};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Configuration;
pub use errors::{BuildError, Error};
pub use standard::Bucket;
pub use state::{BandwidthState, BucketState};

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use std::sync::Arc;

    const MS: u64 = 1_000_000;

    /// Run a test body against both variants, each with a fresh manual clock.
    fn for_each_variant(
        configuration: Configuration,
        test: impl Fn(&dyn TokenBucket, &ManualClock),
    ) {
        let clock = Arc::new(ManualClock::default());
        let bucket = Bucket::with_clock(configuration.clone(), clock.clone());
        test(&bucket, &clock);

        let clock = Arc::new(ManualClock::default());
        let bucket = atomic::Bucket::with_clock(configuration, clock.clone());
        test(&bucket, &clock);
    }

    fn greedy(capacity: u64, refill_tokens: u64) -> Bandwidth {
        Bandwidth::greedy(capacity, refill_tokens, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn basic_consume() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, _clock| {
            assert!(bucket.try_consume(4).unwrap());
            assert_eq!(bucket.available_tokens(), 6);

            assert!(!bucket.try_consume(7).unwrap());
            assert_eq!(bucket.available_tokens(), 6);
        });
    }

    #[test]
    fn refill_over_time() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, clock| {
            assert!(bucket.try_consume(10).unwrap());
            assert_eq!(bucket.available_tokens(), 0);

            clock.advance(Duration::from_millis(500));
            assert_eq!(bucket.available_tokens(), 5);

            clock.advance(Duration::from_millis(1500));
            assert_eq!(bucket.available_tokens(), 10);
        });
    }

    #[test]
    fn conjunction_of_bandwidths() {
        let configuration =
            Configuration::new(vec![greedy(100, 100), greedy(10, 1)]).unwrap();

        for_each_variant(configuration, |bucket, _clock| {
            assert_eq!(bucket.consume_as_much_as_possible(100), 10);
            assert_eq!(bucket.available_tokens(), 0);
        });
    }

    #[test]
    fn intervally_refill_credits_at_boundaries() {
        let bandwidth = Bandwidth::intervally(5, 5, Duration::from_secs(1))
            .and_then(|b| b.with_initial_tokens(0))
            .unwrap();

        for_each_variant(Configuration::from(bandwidth), |bucket, clock| {
            let probe = bucket.try_consume_and_return_remaining(1).unwrap();
            assert_eq!(
                probe,
                ConsumptionProbe::Rejected {
                    remaining_tokens: 0,
                    nanos_to_wait_for_refill: 1000 * MS,
                }
            );

            clock.advance(Duration::from_millis(999));
            let probe = bucket.try_consume_and_return_remaining(1).unwrap();
            assert_eq!(
                probe,
                ConsumptionProbe::Rejected {
                    remaining_tokens: 0,
                    nanos_to_wait_for_refill: MS,
                }
            );

            clock.advance(Duration::from_millis(1));
            let probe = bucket.try_consume_and_return_remaining(1).unwrap();
            assert_eq!(
                probe,
                ConsumptionProbe::Consumed {
                    remaining_tokens: 4
                }
            );
        });
    }

    #[test]
    fn reservation_runs_a_deficit() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, _clock| {
            assert_eq!(
                bucket
                    .reserve_and_calculate_time_to_sleep(15, 2000 * MS)
                    .unwrap(),
                Some(500 * MS)
            );
            assert_eq!(bucket.available_tokens(), 0);

            // the deficit extends the next reservation's delay
            assert_eq!(
                bucket
                    .reserve_and_calculate_time_to_sleep(1, 2000 * MS)
                    .unwrap(),
                Some(600 * MS)
            );
        });
    }

    #[test]
    fn reservation_rejected_by_wait_limit() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, _clock| {
            assert_eq!(
                bucket
                    .reserve_and_calculate_time_to_sleep(15, 400 * MS)
                    .unwrap(),
                None
            );
            assert_eq!(bucket.available_tokens(), 10);
        });
    }

    #[test]
    fn reservation_deficit_heals() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, clock| {
            // drive the balance to -capacity
            assert_eq!(
                bucket
                    .reserve_and_calculate_time_to_sleep(20, 0)
                    .unwrap(),
                Some(1000 * MS)
            );
            assert_eq!(bucket.snapshot().as_slice()[0].tokens(), -10);
            assert_eq!(bucket.available_tokens(), 0);

            clock.advance(Duration::from_secs(1));
            assert_eq!(bucket.available_tokens(), 0);

            clock.advance(Duration::from_secs(1));
            assert_eq!(bucket.available_tokens(), 10);
        });
    }

    #[test]
    fn add_tokens_heals_but_cannot_overfill() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, _clock| {
            assert_eq!(
                bucket
                    .reserve_and_calculate_time_to_sleep(15, 0)
                    .unwrap(),
                Some(500 * MS)
            );

            bucket.add_tokens(8).unwrap();
            assert_eq!(bucket.available_tokens(), 3);

            bucket.add_tokens(100).unwrap();
            assert_eq!(bucket.available_tokens(), 10);
        });
    }

    #[test]
    fn consume_boundaries() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, _clock| {
            assert!(bucket.try_consume(1).unwrap());
            assert!(bucket.try_consume(9).unwrap());
            assert_eq!(
                bucket.try_consume(11).unwrap_err(),
                Error::TokensMoreThanCapacity
            );
        });

        let empty = greedy(10, 10).with_initial_tokens(0).unwrap();
        for_each_variant(Configuration::from(empty), |bucket, _clock| {
            assert!(!bucket.try_consume(1).unwrap());
        });
    }

    #[test]
    fn snapshot_reflects_a_single_point_in_time() {
        for_each_variant(Configuration::from(greedy(10, 10)), |bucket, clock| {
            assert!(bucket.try_consume(4).unwrap());
            let snapshot = bucket.snapshot();

            assert_eq!(snapshot.available_tokens(), 6);
            assert_eq!(snapshot.as_slice().len(), 1);
            assert_eq!(snapshot.as_slice()[0].tokens(), 6);
            assert_eq!(snapshot.as_slice()[0].last_refill_nanos(), 0);

            // later activity does not alter the copy
            clock.advance(Duration::from_secs(1));
            assert!(bucket.try_consume(1).unwrap());
            assert_eq!(snapshot.available_tokens(), 6);
        });
    }

    #[test]
    fn long_horizon_consumption_is_bounded_by_the_rate() {
        // capacity 100, 7 tokens per second, starting full
        let bandwidth = Bandwidth::greedy(100, 7, Duration::from_secs(1)).unwrap();

        for_each_variant(Configuration::from(bandwidth), |bucket, clock| {
            let mut consumed = 0;

            for _ in 0..1000 {
                clock.advance(Duration::from_millis(137));
                consumed += bucket.consume_as_much_as_possible(3);
            }

            // initial + capacity headroom + rate * elapsed
            let elapsed_nanos = 1000u128 * 137 * MS as u128;
            let bound = 100 + 100 + (elapsed_nanos * 7 / (1000 * MS as u128)) as u64;
            assert!(consumed <= bound);
        });
    }

    #[test]
    fn variants_produce_identical_traces() {
        use rand::prelude::*;

        let mut rng = StdRng::seed_from_u64(0xb0cce7);

        for _ in 0..50 {
            let mut bandwidths = Vec::new();

            for _ in 0..rng.gen_range(1..=3) {
                let capacity = rng.gen_range(1..=50);
                let refill_tokens = rng.gen_range(1..=capacity);
                let period = Duration::from_millis(rng.gen_range(1..=2000));
                let initial = rng.gen_range(0..=capacity);

                let bandwidth = if rng.gen_bool(0.5) {
                    Bandwidth::greedy(capacity, refill_tokens, period)
                } else {
                    Bandwidth::intervally(capacity, refill_tokens, period)
                }
                .and_then(|b| b.with_initial_tokens(initial))
                .unwrap();

                bandwidths.push(bandwidth);
            }

            let configuration = Configuration::new(bandwidths).unwrap();

            let standard_clock = Arc::new(ManualClock::default());
            let standard =
                Bucket::with_clock(configuration.clone(), standard_clock.clone());

            let atomic_clock = Arc::new(ManualClock::default());
            let atomic =
                atomic::Bucket::with_clock(configuration.clone(), atomic_clock.clone());

            for _ in 0..200 {
                let advance = Duration::from_micros(rng.gen_range(0..=500_000));
                standard_clock.advance(advance);
                atomic_clock.advance(advance);

                let tokens = rng.gen_range(1..=60);

                match rng.gen_range(0..6) {
                    0 => assert_eq!(standard.try_consume(tokens), atomic.try_consume(tokens)),
                    1 => assert_eq!(
                        standard.try_consume_and_return_remaining(tokens),
                        atomic.try_consume_and_return_remaining(tokens)
                    ),
                    2 => assert_eq!(
                        standard.consume_as_much_as_possible(tokens),
                        atomic.consume_as_much_as_possible(tokens)
                    ),
                    3 => {
                        let wait_limit = rng.gen_range(0..=2_000_000_000);
                        assert_eq!(
                            standard.reserve_and_calculate_time_to_sleep(tokens, wait_limit),
                            atomic.reserve_and_calculate_time_to_sleep(tokens, wait_limit)
                        );
                    }
                    4 => assert_eq!(standard.add_tokens(tokens), atomic.add_tokens(tokens)),
                    _ => assert_eq!(
                        standard.available_tokens(),
                        atomic.available_tokens()
                    ),
                }
            }

            // both variants also end in the same published state once a
            // mutating operation has flushed any pending refill
            standard.add_tokens(1).unwrap();
            atomic.add_tokens(1).unwrap();
            assert_eq!(standard.snapshot(), atomic.snapshot());
        }
    }

    #[test]
    fn last_refill_never_decreases() {
        for_each_variant(Configuration::from(greedy(10, 3)), |bucket, clock| {
            let mut last = bucket.snapshot().as_slice()[0].last_refill_nanos();

            for _ in 0..100 {
                clock.advance(Duration::from_millis(123));
                let _ = bucket.try_consume(1).unwrap();

                let current = bucket.snapshot().as_slice()[0].last_refill_nanos();
                assert!(current >= last);
                last = current;
            }
        });
    }
}
