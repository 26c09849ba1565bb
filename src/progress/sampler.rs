//! Atomic progress counters and the periodic sampler that prints them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use tokio::time::{interval, Duration};

/// Monotonically increasing counters updated by executor workers.
///
/// All fields use relaxed-visibility atomic adds; only eventual visibility to
/// the sampler and overall monotonicity are required (spec property 7), not
/// a strict happens-before relationship between counters.
#[derive(Debug, Default)]
pub struct Counters {
    pub total_copies: AtomicU64,
    pub total_updates: AtomicU64,
    pub total_mkdirs: AtomicU64,
    pub total_bytes: AtomicU64,
    pub total_time_ms: AtomicU64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_copy(&self, bytes: u64, elapsed_ms: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.total_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.total_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update(&self) {
        self.total_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mkdir(&self) {
        self.total_mkdirs.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.total_copies.load(Ordering::Relaxed),
            self.total_updates.load(Ordering::Relaxed),
            self.total_mkdirs.load(Ordering::Relaxed),
            self.total_bytes.load(Ordering::Relaxed),
            self.total_time_ms.load(Ordering::Relaxed),
        )
    }
}

/// Periodically prints `Counters`: rolling Mb/s (bytes over cumulative
/// transfer time), total Mb/s (bytes over wall clock), and copies/s (also
/// over wall clock).
pub struct Sampler {
    counters: Arc<Counters>,
    start: Instant,
    stop: Arc<Notify>,
}

impl Sampler {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            start: Instant::now(),
            stop: Arc::new(Notify::new()),
        }
    }

    /// A clonable handle other tasks can use to ask the sampler to stop.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    /// Run until `stop_handle().notify_one()` is called, printing a line
    /// roughly every 250ms (~4Hz).
    pub async fn run(self) {
        let mut ticker = interval(Duration::from_millis(250));
        println!();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    println!("{}", self.render());
                }
                _ = self.stop.notified() => {
                    return;
                }
            }
        }
    }

    fn render(&self) -> String {
        let (copies, updates, mkdirs, bytes, time_ms) = self.counters.snapshot();
        let elapsed = self.start.elapsed();
        let elapsed_ms = elapsed.as_millis().max(1) as u64;

        let rolling_mbps = if bytes != 0 && time_ms != 0 {
            (bytes as f64 / time_ms as f64 * 1000.0) / 1024.0 / 1024.0
        } else {
            0.0
        };
        let total_mbps = if bytes != 0 {
            (bytes as f64 / elapsed_ms as f64 * 1000.0) / 1024.0 / 1024.0
        } else {
            0.0
        };
        let copies_per_sec = if copies != 0 {
            copies as f64 / elapsed_ms as f64 * 1000.0
        } else {
            0.0
        };

        let formatted_bytes = humansize::format_size(bytes, humansize::BINARY);
        format!(
            "{copies}c {updates}u {mkdirs}m, {formatted_bytes} in {elapsed:?} (cum = {time_ms}ms) ({rolling_mbps:.2}Mb/s total = {total_mbps:.2}Mb/s | {copies_per_sec:.2}C/s)"
        )
    }

    /// One final summary line, printed once after the run completes.
    pub fn final_summary(&self) -> String {
        let (_, _, _, bytes, time_ms) = self.counters.snapshot();
        let total_mbps = if bytes != 0 && time_ms != 0 {
            (bytes as f64 / time_ms as f64 * 1000.0) / 1024.0 / 1024.0
        } else {
            0.0
        };
        let formatted_bytes = humansize::format_size(bytes, humansize::BINARY);
        format!("{formatted_bytes} in {time_ms}ms -> {total_mbps:.2}Mb/s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic_under_concurrent_updates() {
        let counters = Counters::new();
        for _ in 0..100 {
            counters.record_copy(1024, 5);
        }
        assert_eq!(counters.total_copies.load(Ordering::Relaxed), 100);
        assert_eq!(counters.total_bytes.load(Ordering::Relaxed), 100 * 1024);
        assert_eq!(counters.total_time_ms.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn render_handles_zero_state_without_dividing_by_zero() {
        let counters = Counters::new();
        let sampler = Sampler::new(counters);
        let line = sampler.render();
        assert!(line.contains("0c 0u 0m"));
    }

    #[tokio::test]
    async fn stop_handle_terminates_run() {
        let counters = Counters::new();
        let sampler = Sampler::new(counters);
        let stop = sampler.stop_handle();
        let handle = tokio::spawn(sampler.run());
        stop.notify_one();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sampler did not stop in time")
            .unwrap();
    }
}
