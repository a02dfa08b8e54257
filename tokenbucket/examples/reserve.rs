use core::time::Duration;
use std::time::Instant;

use tokenbucket::{Bandwidth, Bucket, Configuration, TokenBucket};

fn main() {
    // 10 tokens/s, starting empty
    let bandwidth = Bandwidth::greedy(10, 10, Duration::from_secs(1))
        .and_then(|b| b.with_initial_tokens(0))
        .unwrap();
    let bucket = Bucket::new(Configuration::from(bandwidth));

    let start = Instant::now();

    for batch in 0..5 {
        // reserve ahead of refill and sleep out the returned delay
        let nanos = bucket
            .reserve_and_calculate_time_to_sleep(4, 0)
            .unwrap()
            .expect("no wait limit set");

        std::thread::sleep(Duration::from_nanos(nanos));

        println!(
            "{:>6.3}s sent batch {} after sleeping {}ms",
            start.elapsed().as_secs_f64(),
            batch,
            nanos / 1_000_000
        );
    }
}
