//! Sharded atomic counters backing the crate's throughput telemetry.
//!
//! Every multi-writer statistic in this crate (items pushed and popped on a
//! buffer, tasks processed and failed by the pool, records written and dropped
//! by the logger) is updated from many threads at once. A single shared atomic
//! would make each of those updates bounce one cache line between every core.
//! [`Counter`] avoids that by sharding the count across 64 cache-line-padded
//! slots, one per writing thread (modulo 64), and summing on read.
//!
//! # Architecture
//!
//! 1. A global atomic ticket (`NEXT_SLOT_ID`) assigns sequential IDs to threads
//! 2. Each thread stores its assigned slot index in thread-local storage
//! 3. The slot index selects which shard a thread writes to
//! 4. Each shard is cache-line padded to prevent false sharing
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │         Counter Structure           │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──writes──►   │ [Slot 0] ████████ (CachePadded)     │
//!   Thread 1 ──writes──►   │ [Slot 1] ████████ (CachePadded)     │
//!        ...               │    ...                              │
//!   Thread 63 ─writes──►   │ [Slot 63] ███████ (CachePadded)     │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                   value() aggregates
//!                                   all slots on read
//! ```
//!
//! Slots are assigned round-robin; after 64 threads the assignment wraps and
//! two threads share a slot, which raises contention slightly but never
//! affects correctness. Counts are monotone: only `add` exists, so a reader
//! that sums the shards twice can never observe the total going backwards.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Number of shards per counter.
///
/// 64 threads can update a counter without any contention; each shard sits on
/// its own cache line, so a counter occupies `64 * 64 = 4096` bytes.
pub(crate) const NUM_SHARDS: usize = 64;

/// Global ticket for assigning slot IDs to threads.
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot index assigned to the current thread, stable for its lifetime.
    static THREAD_SLOT_INDEX: usize = next_slot_id();
}

/// Assigns the next available slot ID, in the range `[0, NUM_SHARDS)`.
///
/// Uses `Ordering::Relaxed` because only atomicity matters here; two threads
/// occasionally landing on the same slot costs a little contention, nothing
/// more.
fn next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_SHARDS
}

/// A monotone, sharded event counter.
///
/// `Counter` is the storage behind [`RingBuffer`](crate::buffer::ring::RingBuffer)
/// push/pop telemetry, [`PoolStats`](crate::pool::PoolStats), and
/// [`LoggerStats`](crate::logger::LoggerStats). Writers call [`add`](Counter::add)
/// from any thread; readers call [`value`](Counter::value), which sums all 64
/// shards with relaxed loads.
///
/// # Const Initialization
///
/// The counter can live in a `static`:
///
/// ```rust
/// use anello::telemetry::Counter;
///
/// static EVENTS: Counter = Counter::new();
/// EVENTS.add(1);
/// assert!(EVENTS.value() >= 1);
/// ```
///
/// # Examples
///
/// ```rust
/// use anello::telemetry::Counter;
/// use std::sync::Arc;
/// use std::thread;
///
/// let counter = Arc::new(Counter::new().with_name("items"));
/// let mut handles = vec![];
///
/// for _ in 0..4 {
///     let c = Arc::clone(&counter);
///     handles.push(thread::spawn(move || {
///         for _ in 0..1000 {
///             c.add(1);
///         }
///     }));
/// }
///
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(counter.value(), 4000);
/// ```
pub struct Counter {
    name: &'static str,
    shards: [CachePadded<AtomicUsize>; NUM_SHARDS],
}

impl Counter {
    /// Creates a new counter initialized to zero, with no name.
    pub const fn new() -> Self {
        const ZERO: CachePadded<AtomicUsize> = CachePadded::new(AtomicUsize::new(0));
        Counter {
            name: "",
            shards: [ZERO; NUM_SHARDS],
        }
    }

    /// Sets the name of this counter, returning `self` for method chaining.
    ///
    /// The name shows up in [`Debug`] output and helps identify counters in
    /// diagnostics.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Adds a value to the current thread's shard.
    ///
    /// Lock-free; threads assigned to different slots never touch the same
    /// cache line.
    #[inline]
    pub fn add(&self, value: usize) {
        self.shard().fetch_add(value, Ordering::Relaxed);
    }

    /// Computes the total value by summing all shards.
    ///
    /// More expensive than a single atomic read (64 relaxed loads), which is
    /// the right trade-off for counters that are written far more often than
    /// they are read. The result is monotone across successive calls from the
    /// same thread.
    #[inline]
    pub fn value(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.load(Ordering::Relaxed))
            .sum()
    }

    /// Returns the name of this counter, or `""` if unnamed.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a reference to the current thread's shard.
    #[inline]
    fn shard(&self) -> &AtomicUsize {
        THREAD_SLOT_INDEX.with(|idx| &self.shards[*idx])
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Counter {
    /// Formats the counter showing non-zero shards.
    ///
    /// Output format: `name{ [slot]:value [slot]:value ... }`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, shard) in self.shards.iter().enumerate() {
            let val = shard.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}
