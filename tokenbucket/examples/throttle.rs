use core::time::Duration;
use std::time::Instant;

use tokenbucket::{Bandwidth, Bucket, Configuration, TokenBucket};

fn main() {
    // 5 ops/s with bursts up to 10
    let bandwidth = Bandwidth::greedy(10, 5, Duration::from_secs(1)).unwrap();
    let bucket = Bucket::new(Configuration::from(bandwidth));

    let start = Instant::now();

    for i in 0..20 {
        while !bucket.try_consume(1).unwrap() {
            std::thread::sleep(Duration::from_millis(10));
        }

        println!(
            "{:>6.3}s op {:>2} ({} tokens left)",
            start.elapsed().as_secs_f64(),
            i,
            bucket.available_tokens()
        );
    }
}
