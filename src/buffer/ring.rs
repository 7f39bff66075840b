//! Fixed-capacity lock-free MPMC ring buffer with throughput telemetry.
//!
//! [`RingBuffer`] is the hot-path queue of this crate: producers reserve a
//! slot with one compare-exchange on the producer counter, consumers claim one
//! (or a whole batch) with one compare-exchange on the consumer counter, and a
//! per-slot sequence number hands each value from exactly one producer to
//! exactly one consumer.
//!
//! # Layout
//!
//! ```text
//!            head (producers)──┐            ┌──tail (consumers)
//!                              ▼            ▼
//!        ┌──────┬──────┬──────┬──────┬──────┬──────┬──────┬──────┐
//!        │ seq  │ seq  │ seq  │ seq  │ seq  │ seq  │ seq  │ seq  │
//!        │ data │ data │ data │ free │ free │ data │ data │ data │
//!        └──────┴──────┴──────┴──────┴──────┴──────┴──────┴──────┘
//!                 slot index = counter & (N - 1)
//! ```
//!
//! `head` and `tail` are monotonically increasing and wrap modulo `usize`;
//! only the unsigned distance `head - tail` and the masked slot index are ever
//! interpreted, so wrap-around is harmless. `head`, `tail`, and the
//! wait/notify `item_count` each sit on their own cache line.
//!
//! # Slot handoff
//!
//! A producer that wins the compare-exchange on `head` owns ticket `h`. It
//! waits (bounded spin, then yield) for slot `h & (N-1)` to show sequence `h`,
//! writes the value, then publishes sequence `h + 1` with release ordering. A
//! consumer owning ticket `t` waits for sequence `t + 1`, reads the value, and
//! retires the slot with sequence `t + N` for the next lap. The release store
//! of the sequence is what makes the slot contents visible to whichever thread
//! observes the corresponding counter advance.

use std::cell::UnsafeCell;
use std::fmt::Debug;
use std::hint;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_utils::CachePadded;

use crate::buffer::{WorkBuffer, BACKLOG_RATIO, IDLE_RATIO};
use crate::telemetry::Counter;

/// Spins this many times on a slot sequence before yielding the thread.
const SLOT_SPIN_LIMIT: usize = 64;

/// Sleep applied by [`RingBuffer::wait_for_item`] between spin rounds.
const WAIT_SLEEP: Duration = Duration::from_micros(10);

/// One storage cell of the ring: a sequence number plus the (possibly
/// uninitialized) value it guards.
struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(seq: usize) -> Self {
        Slot {
            sequence: AtomicUsize::new(seq),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Spins until the slot's sequence equals `expected`.
    ///
    /// The owner of a claimed ticket always completes its handoff, so this
    /// wait is bounded by one slot handoff, never by overall queue progress.
    #[inline]
    fn wait_for_sequence(&self, expected: usize) {
        let mut spin = 0usize;
        while self.sequence.load(Ordering::Acquire) != expected {
            if spin < SLOT_SPIN_LIMIT {
                spin += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}

/// Observation-window state for [`RingBuffer::throughput_ratio`].
///
/// `last_push`/`last_pop` snapshot the monotone counters at the previous
/// sample. Both start at zero, so the first sample's window spans everything
/// since creation and obeys the same degenerate rules as any other window.
struct ThroughputSampler {
    last_push: AtomicU64,
    last_pop: AtomicU64,
}

impl ThroughputSampler {
    const fn new() -> Self {
        ThroughputSampler {
            last_push: AtomicU64::new(0),
            last_pop: AtomicU64::new(0),
        }
    }
}

/// A fixed-capacity, lock-free, multi-producer multi-consumer ring buffer.
///
/// `N` must be a power of two and at least 2; both are enforced at compile
/// time. The buffer never blocks on `push`/`pop`: a full buffer hands the
/// value back as `Err(item)` and an empty buffer returns `None`, leaving retry
/// policy to the caller. [`wait_for_item`](Self::wait_for_item) gives
/// consumers a cheap spin-then-sleep wait, and
/// [`signal_shutdown`](Self::signal_shutdown) wakes all such waiters for
/// cooperative teardown.
///
/// # Ordering
///
/// Items are popped in strict FIFO order of successful push reservations;
/// [`pop_batch`](Self::pop_batch) preserves that order within the batch. For
/// one producer and one consumer this is exact FIFO delivery.
///
/// # Examples
///
/// ```rust
/// use anello::buffer::ring::RingBuffer;
///
/// let ring = RingBuffer::<u64, 4>::new();
/// assert!(ring.push(1).is_ok());
/// assert!(ring.push(2).is_ok());
/// assert_eq!(ring.len(), 2);
/// assert_eq!(ring.pop(), Some(1));
/// assert_eq!(ring.pop(), Some(2));
/// assert_eq!(ring.pop(), None);
/// ```
///
/// Backpressure on a full buffer:
///
/// ```rust
/// use anello::buffer::ring::RingBuffer;
///
/// let ring = RingBuffer::<u8, 2>::new();
/// ring.push(1).unwrap();
/// ring.push(2).unwrap();
/// assert_eq!(ring.push(3), Err(3)); // full: the value comes back
/// ```
pub struct RingBuffer<T, const N: usize> {
    slots: Box<[Slot<T>]>,
    /// Next producer ticket.
    head: CachePadded<AtomicUsize>,
    /// Next consumer ticket.
    tail: CachePadded<AtomicUsize>,
    /// Wait/notify occupancy hint, not authoritative for claims.
    item_count: CachePadded<AtomicUsize>,
    shutdown: AtomicBool,
    pushed: Counter,
    popped: Counter,
    sampler: ThroughputSampler,
}

// The UnsafeCell slots are handed off producer-to-consumer through the
// sequence protocol; each value is written by one thread and read by one.
unsafe impl<T: Send, const N: usize> Send for RingBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T, const N: usize> RingBuffer<T, N> {
    const CAPACITY_CHECK: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "RingBuffer capacity must be a power of two and at least 2"
    );

    /// Creates an empty buffer.
    ///
    /// Fails to compile when `N` is not a power of two or is below 2.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;
        RingBuffer {
            slots: (0..N).map(Slot::new).collect(),
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            item_count: CachePadded::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
            pushed: Counter::new().with_name("ring_pushed"),
            popped: Counter::new().with_name("ring_popped"),
            sampler: ThroughputSampler::new(),
        }
    }

    /// Attempts to enqueue `item`.
    ///
    /// Returns `Err(item)` iff the buffer is full at the moment of
    /// observation, handing the value back for the caller to retry or drop.
    /// Lost compare-exchange races are retried internally with the updated
    /// producer ticket and never lose data.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            if head.wrapping_sub(tail) >= N {
                return Err(item);
            }
            match self.head.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let slot = &self.slots[head & (N - 1)];
                    slot.wait_for_sequence(head);
                    unsafe { (*slot.value.get()).write(item) };
                    slot.sequence.store(head.wrapping_add(1), Ordering::Release);
                    self.pushed.add(1);
                    self.item_count.fetch_add(1, Ordering::Release);
                    return Ok(());
                }
                Err(current) => head = current,
            }
        }
    }

    /// Removes and returns the oldest item, or `None` if the buffer is empty
    /// at the moment of observation.
    pub fn pop(&self) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Acquire);
            if tail == head {
                return None;
            }
            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let value = unsafe { self.take_slot(tail) };
                    self.popped.add(1);
                    self.item_count.fetch_sub(1, Ordering::Release);
                    return Some(value);
                }
                Err(current) => tail = current,
            }
        }
    }

    /// Pops up to `max` items into `out` with a single consumer reservation.
    ///
    /// One compare-exchange advances the consumer ticket by
    /// `min(available, max)`, then the claimed slots are drained in FIFO
    /// order. This amortizes the contended atomic over the whole batch, which
    /// is the point of batch mode under sustained load. Returns the number of
    /// items appended; `0` iff the buffer was observed empty or `max == 0`.
    pub fn pop_batch(&self, out: &mut Vec<T>, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Acquire);
            let available = head.wrapping_sub(tail);
            if available == 0 {
                return 0;
            }
            let count = available.min(max);
            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(count),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    out.reserve(count);
                    for i in 0..count {
                        let value = unsafe { self.take_slot(tail.wrapping_add(i)) };
                        out.push(value);
                    }
                    self.popped.add(count);
                    self.item_count.fetch_sub(count, Ordering::Release);
                    return count;
                }
                Err(current) => tail = current,
            }
        }
    }

    /// Reads the value claimed by consumer ticket `ticket` and retires the
    /// slot for the next lap.
    ///
    /// # Safety
    ///
    /// The caller must own `ticket` through a successful tail advance; each
    /// ticket may be taken exactly once.
    unsafe fn take_slot(&self, ticket: usize) -> T {
        let slot = &self.slots[ticket & (N - 1)];
        slot.wait_for_sequence(ticket.wrapping_add(1));
        let value = (*slot.value.get()).assume_init_read();
        slot.sequence.store(ticket.wrapping_add(N), Ordering::Release);
        value
    }

    /// Waits until an item is available or shutdown is signaled.
    ///
    /// Spins (yielding) up to `spin` times while empty, then sleeps ~10 µs
    /// and re-checks, so a waiter observes shutdown within one sleep interval
    /// regardless of producer behavior.
    pub fn wait_for_item(&self, spin: usize) {
        while self.item_count.load(Ordering::Acquire) == 0 && !self.is_shutdown() {
            for _ in 0..spin {
                if self.item_count.load(Ordering::Relaxed) != 0 {
                    break;
                }
                thread::yield_now();
            }
            if self.item_count.load(Ordering::Acquire) == 0 && !self.is_shutdown() {
                thread::sleep(WAIT_SLEEP);
            }
        }
    }

    /// Signals shutdown, waking any thread in
    /// [`wait_for_item`](Self::wait_for_item). Monotonic; items already queued
    /// remain poppable.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// `true` once shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of items currently queued; always within `0..=N`.
    pub fn len(&self) -> usize {
        // Two counters cannot be read in one shot; retry until tail is
        // unchanged across the pair so the distance is a consistent snapshot.
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            if self.tail.load(Ordering::Acquire) == tail {
                return head.wrapping_sub(tail);
            }
        }
    }

    /// `true` if the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        tail == head
    }

    /// `true` if the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) >= N
    }

    /// The fixed capacity `N`.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Total number of successful pushes since creation.
    pub fn pushed(&self) -> usize {
        self.pushed.value()
    }

    /// Total number of successful pops since creation.
    pub fn popped(&self) -> usize {
        self.popped.value()
    }

    /// Pushes-per-pop over the window since the previous call.
    ///
    /// A window with no activity reports [`IDLE_RATIO`]; a window with pushes
    /// but no pops reports [`BACKLOG_RATIO`]. The snapshots start at zero, so
    /// the first call's window covers everything since creation: pushes that
    /// land before the monitor's first sample already read as a backlog.
    ///
    /// Must be called from exactly one observer thread (the pool's monitor):
    /// concurrent callers would race on the window snapshots and split one
    /// window's deltas between them.
    pub fn throughput_ratio(&self) -> f64 {
        let cur_push = self.pushed.value() as u64;
        let cur_pop = self.popped.value() as u64;
        let delta_push =
            cur_push.saturating_sub(self.sampler.last_push.swap(cur_push, Ordering::Relaxed));
        let delta_pop =
            cur_pop.saturating_sub(self.sampler.last_pop.swap(cur_pop, Ordering::Relaxed));
        if delta_push == 0 && delta_pop == 0 {
            return IDLE_RATIO;
        }
        if delta_pop == 0 {
            return BACKLOG_RATIO;
        }
        delta_push as f64 / delta_pop as f64
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Debug for RingBuffer<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("pushed", &self.pushed.value())
            .field("popped", &self.popped.value())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl<T, const N: usize> Drop for RingBuffer<T, N> {
    fn drop(&mut self) {
        // Exclusive access: every ticket in [tail, head) completed its
        // handoff, so those slots hold initialized values.
        let head = *self.head.get_mut();
        let mut pos = *self.tail.get_mut();
        while pos != head {
            let slot = &mut self.slots[pos & (N - 1)];
            unsafe { (*slot.value.get()).assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

impl<T: Send, const N: usize> WorkBuffer<T> for RingBuffer<T, N> {
    fn len(&self) -> usize {
        RingBuffer::len(self)
    }

    fn capacity(&self) -> usize {
        N
    }

    fn pop(&self) -> Option<T> {
        RingBuffer::pop(self)
    }

    /// Single-reservation batch claim; see [`RingBuffer::pop_batch`].
    fn pop_batch(&self, out: &mut Vec<T>, max: usize) -> usize {
        RingBuffer::pop_batch(self, out, max)
    }

    fn wait_for_item(&self, spin: usize) {
        RingBuffer::wait_for_item(self, spin)
    }

    fn signal_shutdown(&self) {
        RingBuffer::signal_shutdown(self)
    }

    fn is_shutdown(&self) -> bool {
        RingBuffer::is_shutdown(self)
    }

    fn throughput_ratio(&self) -> f64 {
        RingBuffer::throughput_ratio(self)
    }
}
