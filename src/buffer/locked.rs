//! Mutex-and-condvar work queue, the plain counterpart of the lock-free ring.
//!
//! [`LockedQueue`] implements the same [`WorkBuffer`](crate::buffer::WorkBuffer)
//! capability set as [`RingBuffer`](crate::buffer::ring::RingBuffer), with one
//! mutex around a `VecDeque` and a condition variable for waiting consumers.
//! It is unbounded, so `push` always succeeds.
//!
//! It exists for two reasons: it proves the pool's polymorphism over buffer
//! implementations (a condvar-blocking queue and a spinning lock-free ring
//! drive the same worker loop), and it is the baseline the criterion benches
//! measure the ring against.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::buffer::{WorkBuffer, BACKLOG_RATIO, IDLE_RATIO};

struct Inner<T> {
    queue: VecDeque<T>,
    push_count: u64,
    pop_count: u64,
    last_push: u64,
    last_pop: u64,
}

/// An unbounded MPMC queue guarded by a single mutex.
///
/// Push/pop telemetry lives under the same mutex as the queue, so
/// [`throughput_ratio`](LockedQueue::throughput_ratio) needs no atomics at
/// all; the cost is that every operation serializes on the lock.
///
/// # Examples
///
/// ```rust
/// use anello::buffer::locked::LockedQueue;
///
/// let queue = LockedQueue::new();
/// queue.push(1);
/// queue.push(2);
/// assert_eq!(queue.len(), 2);
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.pop(), Some(2));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct LockedQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl<T> LockedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        LockedQueue {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                push_count: 0,
                pop_count: 0,
                last_push: 0,
                last_pop: 0,
            }),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `value` to the back of the queue and wakes one waiter.
    pub fn push(&self, value: T) {
        let mut inner = self.lock();
        inner.queue.push_back(value);
        inner.push_count += 1;
        drop(inner);
        self.available.notify_one();
    }

    /// Removes and returns the oldest item, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        let value = inner.queue.pop_front();
        if value.is_some() {
            inner.pop_count += 1;
        }
        value
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Blocks until an item is queued or shutdown is signaled.
    ///
    /// Condvar-based, so the `spin` hint of the
    /// [`WorkBuffer`](crate::buffer::WorkBuffer) contract is not needed here.
    pub fn wait_for_item(&self) {
        let mut inner = self.lock();
        while inner.queue.is_empty() && !self.is_shutdown() {
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Signals shutdown and wakes every waiting consumer.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.available.notify_all();
    }

    /// `true` once shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Pushes-per-pop over the window since the previous call.
    ///
    /// Same degenerate-sample rules as the ring: nothing happened means
    /// [`IDLE_RATIO`], pushes without pops means [`BACKLOG_RATIO`].
    pub fn throughput_ratio(&self) -> f64 {
        let mut inner = self.lock();
        let delta_push = inner.push_count - inner.last_push;
        let delta_pop = inner.pop_count - inner.last_pop;
        inner.last_push = inner.push_count;
        inner.last_pop = inner.pop_count;
        if delta_push == 0 && delta_pop == 0 {
            return IDLE_RATIO;
        }
        if delta_pop == 0 {
            return BACKLOG_RATIO;
        }
        delta_push as f64 / delta_pop as f64
    }
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for LockedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LockedQueue")
            .field("len", &inner.queue.len())
            .field("pushed", &inner.push_count)
            .field("popped", &inner.pop_count)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl<T: Send> WorkBuffer<T> for LockedQueue<T> {
    fn len(&self) -> usize {
        LockedQueue::len(self)
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }

    fn pop(&self) -> Option<T> {
        LockedQueue::pop(self)
    }

    fn wait_for_item(&self, _spin: usize) {
        LockedQueue::wait_for_item(self)
    }

    fn signal_shutdown(&self) {
        LockedQueue::signal_shutdown(self)
    }

    fn is_shutdown(&self) -> bool {
        LockedQueue::is_shutdown(self)
    }

    fn throughput_ratio(&self) -> f64 {
        LockedQueue::throughput_ratio(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo() {
        let queue = LockedQueue::new();
        for i in 0..10 {
            queue.push(i);
        }
        for i in 0..10 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_unbounded_capacity() {
        let queue: LockedQueue<u8> = LockedQueue::new();
        assert_eq!(WorkBuffer::capacity(&queue), usize::MAX);
    }

    #[test]
    fn test_default_pop_batch_via_trait() {
        let queue = LockedQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        let mut out = Vec::new();
        // Exercises the trait's provided single-pop fallback.
        assert_eq!(WorkBuffer::pop_batch(&queue, &mut out, 3), 3);
        assert_eq!(out, vec![0, 1, 2]);
        assert_eq!(WorkBuffer::pop_batch(&queue, &mut out, 10), 2);
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_wait_returns_on_push() {
        let queue = Arc::new(LockedQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.wait_for_item();
                queue.pop()
            })
        };
        thread::sleep(Duration::from_millis(10));
        queue.push(42);
        assert_eq!(waiter.join().unwrap(), Some(42));
    }

    #[test]
    fn test_shutdown_wakes_waiter() {
        let queue: Arc<LockedQueue<u32>> = Arc::new(LockedQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_for_item())
        };
        thread::sleep(Duration::from_millis(10));
        queue.signal_shutdown();
        waiter.join().unwrap();
        assert!(queue.is_shutdown());
    }

    #[test]
    fn test_throughput_ratio_rules() {
        let queue = LockedQueue::new();
        assert_eq!(queue.throughput_ratio(), IDLE_RATIO);

        for i in 0..4 {
            queue.push(i);
        }
        assert_eq!(queue.throughput_ratio(), BACKLOG_RATIO);

        queue.pop();
        queue.pop();
        assert_eq!(queue.throughput_ratio(), 0.0);

        for i in 0..4 {
            queue.push(i);
        }
        queue.pop();
        queue.pop();
        let ratio = queue.throughput_ratio();
        assert!((ratio - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(LockedQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|tid| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(tid * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
    }
}
