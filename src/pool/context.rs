//! Per-worker bookkeeping: one join handle plus two independent flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, Thread};

/// Flags shared between a worker thread and the pool.
///
/// `exit_requested` is monotonic (false to true, once); `active` toggles as
/// the monitor scales. A worker with `active == false` performs no pops; a
/// worker with `exit_requested == true` terminates at its next loop boundary.
pub(crate) struct WorkerFlags {
    pub(crate) exit_requested: AtomicBool,
    pub(crate) active: AtomicBool,
}

impl WorkerFlags {
    pub(crate) fn new() -> Self {
        WorkerFlags {
            exit_requested: AtomicBool::new(false),
            active: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Relaxed)
    }
}

/// One worker slot in the pool.
///
/// Contexts are movable but not clonable; the flags live behind an `Arc`
/// shared with the worker thread, so the pool's context vector may grow and
/// reallocate without invalidating anything the thread holds. A context is
/// never removed while the pool runs; `stop()` takes the handle out to join.
pub(crate) struct WorkerContext {
    handle: Option<JoinHandle<()>>,
    /// Unparker for the worker thread (activation and shutdown wakeups).
    thread: Thread,
    pub(crate) flags: Arc<WorkerFlags>,
}

impl WorkerContext {
    pub(crate) fn new(handle: JoinHandle<()>, flags: Arc<WorkerFlags>) -> Self {
        let thread = handle.thread().clone();
        WorkerContext {
            handle: Some(handle),
            thread,
            flags,
        }
    }

    /// Wakes the worker thread if it is parked.
    pub(crate) fn unpark(&self) {
        self.thread.unpark();
    }

    /// Takes the join handle out, leaving the context joinable exactly once.
    pub(crate) fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_flags_default_state() {
        let flags = WorkerFlags::new();
        assert!(!flags.is_active());
        assert!(!flags.exit_requested());
    }

    #[test]
    fn test_context_unpark_and_join() {
        let flags = Arc::new(WorkerFlags::new());
        let thread_flags = Arc::clone(&flags);
        let handle = thread::spawn(move || {
            while !thread_flags.exit_requested() {
                thread::park_timeout(Duration::from_millis(50));
            }
        });

        let mut ctx = WorkerContext::new(handle, Arc::clone(&flags));
        flags.exit_requested.store(true, Ordering::Relaxed);
        ctx.unpark();

        let handle = ctx.take_handle().unwrap();
        handle.join().unwrap();
        assert!(ctx.take_handle().is_none());
    }
}
