//! Dynamically scaled worker pool driven by buffer throughput.
//!
//! [`WorkerPool`] owns a set of worker threads plus one monitor thread and
//! drains any [`WorkBuffer`](crate::buffer::WorkBuffer). The monitor samples
//! the buffer's [`throughput_ratio`](crate::buffer::WorkBuffer::throughput_ratio)
//! every interval and, behind hysteresis gates, activates or deactivates
//! workers between `min_threads` and `max_threads`:
//!
//! ```text
//!   producers ──► WorkBuffer ──► worker ──► task(&mut item)
//!                     ▲          worker ──► task(&mut item)
//!                     │          worker (inactive, parked)
//!                     │
//!                monitor: ratio > spawn_ratio for spawn_hysteresis
//!                         intervals ──► activate one more worker
//!                         ratio < shrink_ratio for shrink_hysteresis
//!                         intervals ──► deactivate one worker
//! ```
//!
//! Deactivated workers park but keep their threads; reactivation is a flag
//! flip and an unpark, never a respawn. The pool only consumes: producers push
//! into the buffer through its concrete type.
//!
//! Configuration is validated at construction: thread counts are clamped into
//! a consistent order (`min <= reserved <= max`) and inverted ratio thresholds
//! are rejected with [`ConfigError`].

mod context;
mod worker_pool;

pub use worker_pool::WorkerPool;

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::telemetry::Counter;

/// Error raised when a [`PoolConfig`] cannot describe a runnable pool.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The spawn threshold must sit strictly above the shrink threshold and
    /// both must be positive, otherwise the monitor would flap or never act.
    #[error("spawn ratio threshold ({spawn}) must be greater than shrink ratio threshold ({shrink}) and both must be positive")]
    InvalidThresholds {
        /// Configured spawn threshold.
        spawn: f64,
        /// Configured shrink threshold.
        shrink: f64,
    },

    /// Batch popping with a zero batch size can never make progress.
    #[error("batch pop max_count must be at least 1")]
    InvalidBatchPop,
}

/// Batch-pop tuning for workers draining a batch-capable buffer.
///
/// A worker batches when the queue looks deep enough (`min_size`) or when
/// enough time passed since its last batch (`timeout`), and claims at most
/// `max_count` items per batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchPopConfig {
    /// Queue depth at which batching kicks in.
    pub min_size: usize,
    /// Upper bound on items claimed per batch.
    pub max_count: usize,
    /// Batch anyway when this much time passed since the worker's last batch.
    pub timeout: Duration,
}

impl Default for BatchPopConfig {
    fn default() -> Self {
        BatchPopConfig {
            min_size: 8,
            max_count: 32,
            timeout: Duration::from_millis(1),
        }
    }
}

/// Configuration for a [`WorkerPool`].
///
/// The defaults mirror the hardware: half the available parallelism spawned up
/// front, all of it as the ceiling. Build with struct-update or the `with_*`
/// methods:
///
/// ```rust
/// use anello::pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::default()
///     .with_threads(1, 2, 8)
///     .with_ratio_thresholds(1.5, 0.5)
///     .with_monitor_interval(Duration::from_millis(50));
/// assert_eq!(config.max_threads, 8);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Threads spawned immediately on `start()`.
    pub reserved_threads: usize,
    /// Lower bound on active workers; at least 1.
    pub min_threads: usize,
    /// Hard upper bound on worker threads.
    pub max_threads: usize,
    /// Throughput ratio above which the monitor wants to activate workers.
    pub spawn_ratio: f64,
    /// Throughput ratio below which the monitor wants to deactivate workers.
    pub shrink_ratio: f64,
    /// Monitor sampling interval.
    pub monitor_interval: Duration,
    /// Spin budget handed to the buffer's `wait_for_item`.
    pub spin_count: usize,
    /// Consecutive over-threshold samples required before activating.
    pub spawn_hysteresis: usize,
    /// Consecutive under-threshold samples required before deactivating.
    pub shrink_hysteresis: usize,
    /// When set, scale by `max(1, deviation / factor)` workers at once
    /// instead of one at a time.
    pub batch_scaling: Option<f64>,
    /// When set, workers drain in batches instead of single pops.
    pub batch_pop: Option<BatchPopConfig>,
    /// When `true`, the monitor stretches its interval while ratios are
    /// stable and snaps back on movement. A latency/overhead trade, not a
    /// correctness knob.
    pub adaptive_interval: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let parallelism = thread::available_parallelism().map(usize::from).unwrap_or(1);
        PoolConfig {
            reserved_threads: (parallelism / 2).max(1),
            min_threads: 1,
            max_threads: parallelism.max(1),
            spawn_ratio: 1.2,
            shrink_ratio: 0.8,
            monitor_interval: Duration::from_millis(200),
            spin_count: 100,
            spawn_hysteresis: 2,
            shrink_hysteresis: 2,
            batch_scaling: None,
            batch_pop: None,
            adaptive_interval: false,
        }
    }
}

impl PoolConfig {
    /// Sets `min_threads`, `reserved_threads`, and `max_threads` together.
    pub fn with_threads(mut self, min: usize, reserved: usize, max: usize) -> Self {
        self.min_threads = min;
        self.reserved_threads = reserved;
        self.max_threads = max;
        self
    }

    /// Sets the spawn and shrink ratio thresholds.
    pub fn with_ratio_thresholds(mut self, spawn: f64, shrink: f64) -> Self {
        self.spawn_ratio = spawn;
        self.shrink_ratio = shrink;
        self
    }

    /// Sets the monitor sampling interval.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Sets both hysteresis gates.
    pub fn with_hysteresis(mut self, spawn: usize, shrink: usize) -> Self {
        self.spawn_hysteresis = spawn;
        self.shrink_hysteresis = shrink;
        self
    }

    /// Enables deviation-proportional scaling with the given factor.
    pub fn with_batch_scaling(mut self, factor: f64) -> Self {
        self.batch_scaling = Some(factor);
        self
    }

    /// Enables batch popping with the given tuning.
    pub fn with_batch_pop(mut self, batch: BatchPopConfig) -> Self {
        self.batch_pop = Some(batch);
        self
    }

    /// Enables the adaptive monitor interval.
    pub fn with_adaptive_interval(mut self) -> Self {
        self.adaptive_interval = true;
        self
    }

    /// Clamps thread counts into a consistent order and rejects threshold
    /// combinations the monitor could not act on.
    ///
    /// Clamping, in order: `min_threads` raised to 1, `reserved_threads`
    /// raised to `min_threads`, `max_threads` raised to `reserved_threads`.
    pub(crate) fn normalized(mut self) -> Result<Self, ConfigError> {
        if self.min_threads < 1 {
            self.min_threads = 1;
        }
        if self.reserved_threads < self.min_threads {
            self.reserved_threads = self.min_threads;
        }
        if self.max_threads < self.reserved_threads {
            self.max_threads = self.reserved_threads;
        }
        if self.spawn_ratio <= self.shrink_ratio || self.shrink_ratio <= 0.0 {
            return Err(ConfigError::InvalidThresholds {
                spawn: self.spawn_ratio,
                shrink: self.shrink_ratio,
            });
        }
        if matches!(self.batch_pop, Some(batch) if batch.max_count == 0) {
            return Err(ConfigError::InvalidBatchPop);
        }
        Ok(self)
    }
}

/// Counters published by a pool's workers.
///
/// `processed` counts task invocations that returned normally; `failed`
/// counts invocations that panicked and were contained at the worker
/// boundary. Both are sharded, so workers never contend updating them.
#[derive(Debug)]
pub struct PoolStats {
    pub(crate) processed: Counter,
    pub(crate) failed: Counter,
}

impl PoolStats {
    pub(crate) const fn new() -> Self {
        PoolStats {
            processed: Counter::new().with_name("pool_processed"),
            failed: Counter::new().with_name("pool_failed"),
        }
    }

    /// Tasks completed without panicking.
    pub fn processed(&self) -> usize {
        self.processed.value()
    }

    /// Tasks that panicked and were isolated.
    pub fn failed(&self) -> usize {
        self.failed.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default().normalized().unwrap();
        assert!(config.min_threads >= 1);
        assert!(config.reserved_threads >= config.min_threads);
        assert!(config.max_threads >= config.reserved_threads);
    }

    #[test]
    fn test_clamping_order() {
        let config = PoolConfig::default()
            .with_threads(0, 0, 0)
            .normalized()
            .unwrap();
        assert_eq!(config.min_threads, 1);
        assert_eq!(config.reserved_threads, 1);
        assert_eq!(config.max_threads, 1);

        let config = PoolConfig::default()
            .with_threads(4, 2, 1)
            .normalized()
            .unwrap();
        assert_eq!(config.min_threads, 4);
        assert_eq!(config.reserved_threads, 4);
        assert_eq!(config.max_threads, 4);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = PoolConfig::default()
            .with_ratio_thresholds(0.5, 1.5)
            .normalized()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidThresholds {
                spawn: 0.5,
                shrink: 1.5
            }
        );
    }

    #[test]
    fn test_equal_thresholds_rejected() {
        assert!(PoolConfig::default()
            .with_ratio_thresholds(1.0, 1.0)
            .normalized()
            .is_err());
    }

    #[test]
    fn test_nonpositive_shrink_rejected() {
        assert!(PoolConfig::default()
            .with_ratio_thresholds(1.0, 0.0)
            .normalized()
            .is_err());
    }

    #[test]
    fn test_zero_batch_count_rejected() {
        let err = PoolConfig::default()
            .with_batch_pop(BatchPopConfig {
                max_count: 0,
                ..BatchPopConfig::default()
            })
            .normalized()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidBatchPop);
    }

    #[test]
    fn test_stats_start_at_zero() {
        let stats = PoolStats::new();
        assert_eq!(stats.processed(), 0);
        assert_eq!(stats.failed(), 0);
    }
}
