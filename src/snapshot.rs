//! Serializable point-in-time captures of component statistics.
//!
//! Snapshots decouple observation from export: capture once, then serialize
//! with any serde-compatible format for files, HTTP endpoints, or IPC.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature:
//!
//! ```toml
//! [dependencies]
//! anello = { version = "0.2", features = ["serde"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use anello::buffer::ring::RingBuffer;
//!
//! let ring = RingBuffer::<u32, 64>::new();
//! ring.push(1).unwrap();
//!
//! let snapshot = ring.snapshot();
//! let json = serde_json::to_string(&snapshot).unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::buffer::ring::RingBuffer;
use crate::buffer::WorkBuffer;
use crate::logger::LogManager;
use crate::pool::WorkerPool;

/// A snapshot of a buffer's occupancy and lifetime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Items queued at capture time.
    pub len: usize,
    /// Fixed capacity.
    pub capacity: usize,
    /// Successful pushes since creation.
    pub pushed: usize,
    /// Successful pops since creation.
    pub popped: usize,
}

/// A snapshot of a pool's thread counts and task outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Workers marked active at capture time.
    pub active_threads: usize,
    /// Worker threads owned, active or not.
    pub total_threads: usize,
    /// Tasks completed without panicking.
    pub processed: usize,
    /// Tasks that panicked and were isolated.
    pub failed: usize,
}

/// A snapshot of a logger's queue depth and writer counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggerSnapshot {
    /// Records queued but not yet written at capture time.
    pub queued: usize,
    /// Records written since the manager opened.
    pub written: usize,
    /// Records dropped by the overflow policy.
    pub dropped: usize,
    /// Completed rotations.
    pub rotations: usize,
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Captures occupancy and push/pop telemetry.
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            len: self.len(),
            capacity: self.capacity(),
            pushed: self.pushed(),
            popped: self.popped(),
        }
    }
}

impl<B, E> WorkerPool<B, E>
where
    B: WorkBuffer<E>,
    E: Send,
{
    /// Captures thread counts and task outcome counters.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            active_threads: self.active_threads(),
            total_threads: self.total_threads(),
            processed: self.stats().processed(),
            failed: self.stats().failed(),
        }
    }
}

impl LogManager {
    /// Captures queue depth and writer counters.
    pub fn snapshot(&self) -> LoggerSnapshot {
        LoggerSnapshot {
            queued: self.queued(),
            written: self.stats().written(),
            dropped: self.stats().dropped(),
            rotations: self.stats().rotations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_snapshot_capture() {
        let ring = RingBuffer::<u32, 8>::new();
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        ring.pop().unwrap();

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len, 1);
        assert_eq!(snapshot.capacity, 8);
        assert_eq!(snapshot.pushed, 2);
        assert_eq!(snapshot.popped, 1);
    }

    #[test]
    fn test_buffer_snapshot_round_trip() {
        let snapshot = BufferSnapshot {
            len: 3,
            capacity: 64,
            pushed: 100,
            popped: 97,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: BufferSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_pool_snapshot_round_trip() {
        let snapshot = PoolSnapshot {
            active_threads: 2,
            total_threads: 4,
            processed: 1000,
            failed: 3,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"active_threads\":2"));
        let back: PoolSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_logger_snapshot_round_trip() {
        let snapshot = LoggerSnapshot {
            queued: 0,
            written: 42,
            dropped: 1,
            rotations: 2,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: LoggerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_pool_snapshot_capture() {
        use crate::pool::PoolConfig;
        use std::sync::Arc;

        let buffer = Arc::new(RingBuffer::<u32, 8>::new());
        let pool = WorkerPool::new(buffer, |_: &mut u32| {}, PoolConfig::default()).unwrap();
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.active_threads, 0);
        assert_eq!(snapshot.total_threads, 0);
        assert_eq!(snapshot.processed, 0);
    }
}
