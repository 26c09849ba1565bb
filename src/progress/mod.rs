//! Progress counters and periodic reporting.
//!
//! Workers update a set of lock-free atomic counters as they apply Actions;
//! a periodic ticker samples them and prints rolling and cumulative
//! throughput, matching the original client's progress line.

mod sampler;

pub use sampler::*;
