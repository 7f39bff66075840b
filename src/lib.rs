//! # Anello - Lock-Free Ring Buffer, Adaptive Worker Pool, Async Logger
//!
//! A Rust library providing a small concurrency substrate built from three
//! tightly coupled components: a fixed-capacity **lock-free MPMC ring buffer**
//! with throughput telemetry, a **worker pool** that scales its active thread
//! count from that telemetry, and an **asynchronous rotating file logger**
//! built on the same queue-and-drain discipline.
//!
//! ## The Problem
//!
//! Bounded hand-off between producer and consumer threads is usually built on
//! a mutex-guarded queue. Under load, every push and pop serializes on the
//! lock, the queue depth is invisible to the thing draining it, and sizing the
//! consumer side becomes guesswork: too few workers and the backlog grows, too
//! many and they spin on an empty queue.
//!
//! ## The Solution
//!
//! The three pieces here close that loop:
//!
//! 1. [`buffer::ring::RingBuffer`] moves items between threads with one
//!    compare-exchange per operation, pads its hot counters onto separate
//!    cache lines, and counts every push and pop.
//! 2. [`pool::WorkerPool`] watches the buffer's pushes-per-pop ratio through a
//!    monitor thread and, behind hysteresis gates, activates or deactivates
//!    workers between a configured minimum and maximum. Deactivated workers
//!    park; reactivation is a flag flip, not a thread spawn.
//! 3. [`logger::LogManager`] applies the same pattern to logging: producers
//!    enqueue timestamped records and move on, one writer thread formats,
//!    appends, coalesces flushes, and rotates the file by size into a
//!    `history/` directory.
//!
//! ```text
//!  producers ──► RingBuffer ──► workers ──► task(&mut item)
//!                    │
//!                    └── throughput_ratio ──► monitor ──► scale up / down
//!
//!  Logger::log ──► bounded queue ──► writer thread ──► app.log
//!                                        │ size threshold
//!                                        ▼
//!                              history/app-<first>-<last>.log
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use anello::buffer::ring::RingBuffer;
//! use anello::pool::{PoolConfig, WorkerPool};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let buffer = Arc::new(RingBuffer::<u64, 256>::new());
//! let processed = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&processed);
//! let pool = WorkerPool::new(
//!     Arc::clone(&buffer),
//!     move |_item: &mut u64| {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     },
//!     PoolConfig::default().with_threads(1, 2, 8),
//! )
//! .unwrap();
//!
//! pool.start();
//! for i in 0..100 {
//!     while buffer.push(i).is_err() {
//!         std::thread::yield_now();
//!     }
//! }
//! while processed.load(Ordering::Relaxed) < 100 {
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//! pool.stop();
//! ```
//!
//! Logging to a rotating file:
//!
//! ```rust,no_run
//! use anello::logger::{LogManager, LoggerConfig, Severity};
//!
//! let manager = LogManager::open(
//!     LoggerConfig::new("logs/app.log").with_max_file_size(10 * 1024 * 1024),
//! )
//! .unwrap();
//!
//! let log = manager.logger("Startup");
//! log.log(Severity::Info, "service listening").unwrap();
//! log.flush();
//! // Dropping the manager drains the queue and joins the writer.
//! ```
//!
//! ## Components
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`buffer`] | [`WorkBuffer`](buffer::WorkBuffer) trait, lock-free [`RingBuffer`](buffer::ring::RingBuffer), mutex-based [`LockedQueue`](buffer::locked::LockedQueue) |
//! | [`pool`] | [`WorkerPool`](pool::WorkerPool), [`PoolConfig`](pool::PoolConfig), scaling monitor |
//! | [`logger`] | [`LogManager`](logger::LogManager), [`Logger`](logger::Logger) handles, rotation |
//! | [`telemetry`] | Sharded [`Counter`](telemetry::Counter) backing all statistics |
//! | [`snapshot`] | Serializable stats captures (requires the `serde` feature) |
//!
//! ## Thread Safety
//!
//! Every component is `Send + Sync` and designed to be shared via `Arc`.
//! Shutdown is cooperative throughout: a monotonic flag plus a wait primitive
//! that observes it, never forced thread termination.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Enables the [`snapshot`] module and derives on [`logger::Severity`] |

pub mod buffer;
pub mod logger;
pub mod pool;
pub mod telemetry;

#[cfg(feature = "serde")]
pub mod snapshot;
