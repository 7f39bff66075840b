//! The record queue and the background writer thread.
//!
//! Producers and the writer share [`Core`]: a bounded `VecDeque` of records
//! behind one mutex, a not-empty condvar for the writer, a not-full condvar
//! for blocked producers, and the `force_flush`/`fatal` flags. The file
//! handle itself is owned by the writer thread alone; rotation runs on the
//! writer thread between records, so writes and rotation are serialized by
//! construction and no partial line can ever straddle a rotation.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::logger::rotation::{self, RotationStrategy};
use crate::logger::{LogError, LogRecord, LoggerStats, OverflowPolicy};

/// Consecutive write failures tolerated before the writer gives up.
const FATAL_WRITE_FAILURES: u32 = 5;

/// Poll cadence of [`Core::flush`].
const FLUSH_POLL: Duration = Duration::from_millis(10);

pub(crate) struct QueueState {
    pub(crate) records: VecDeque<LogRecord>,
    pub(crate) running: bool,
}

/// State shared between producers, `flush` callers, and the writer thread.
pub(crate) struct Core {
    queue: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    overflow: OverflowPolicy,
    force_flush: AtomicBool,
    fatal: AtomicBool,
    pub(crate) stats: LoggerStats,
}

impl Core {
    pub(crate) fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Core {
            queue: Mutex::new(QueueState {
                records: VecDeque::new(),
                running: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            overflow,
            force_flush: AtomicBool::new(false),
            fatal: AtomicBool::new(false),
            stats: LoggerStats::new(),
        }
    }

    pub(crate) fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    pub(crate) fn queued(&self) -> usize {
        self.lock_queue().records.len()
    }

    /// Enqueues a record, applying the overflow policy when the queue is at
    /// capacity. Fails fast once the writer is fatal or the manager shut down.
    pub(crate) fn enqueue(&self, record: LogRecord) -> Result<(), LogError> {
        if self.is_fatal() {
            return Err(LogError::WriterFatal);
        }
        let mut state = self.lock_queue();
        if !state.running {
            return Err(LogError::ShutDown);
        }
        while state.records.len() >= self.capacity {
            match self.overflow {
                OverflowPolicy::Drop => {
                    self.stats.dropped.add(1);
                    return Ok(());
                }
                OverflowPolicy::Block => {
                    state = self
                        .not_full
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                    if self.is_fatal() {
                        return Err(LogError::WriterFatal);
                    }
                    if !state.running {
                        return Err(LogError::ShutDown);
                    }
                }
            }
        }
        state.records.push_back(record);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Requests a flush and blocks until the queue is drained and the stream
    /// flushed. Returns early if the writer died or the manager shut down.
    pub(crate) fn flush(&self) {
        self.force_flush.store(true, Ordering::Release);
        self.not_empty.notify_all();
        loop {
            thread::sleep(FLUSH_POLL);
            if self.is_fatal() {
                return;
            }
            let state = self.lock_queue();
            if !state.running {
                return;
            }
            if state.records.is_empty() && !self.force_flush.load(Ordering::Acquire) {
                return;
            }
        }
    }

    /// Marks the manager as shut down and wakes everyone; called before
    /// joining the writer.
    pub(crate) fn begin_shutdown(&self) {
        self.lock_queue().running = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// The writer thread's private state: the file handle and the per-generation
/// bookkeeping (size, first/last timestamps, flush coalescing).
pub(crate) struct Writer {
    core: Arc<Core>,
    path: PathBuf,
    file: Option<BufWriter<File>>,
    size: u64,
    max_file_size: u64,
    max_backups: usize,
    strategy: Option<RotationStrategy>,
    first_timestamp: String,
    last_timestamp: String,
    pending_flush: usize,
    flush_count_threshold: usize,
    flush_time_threshold: Duration,
    last_flush: Instant,
    io_failures: u32,
}

impl Writer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        core: Arc<Core>,
        path: PathBuf,
        file: File,
        initial_size: u64,
        max_file_size: u64,
        max_backups: usize,
        strategy: Option<RotationStrategy>,
        flush_count_threshold: usize,
        flush_time_threshold: Duration,
    ) -> Self {
        Writer {
            core,
            path,
            file: Some(BufWriter::new(file)),
            size: initial_size,
            max_file_size,
            max_backups,
            strategy,
            first_timestamp: String::new(),
            last_timestamp: String::new(),
            pending_flush: 0,
            flush_count_threshold,
            flush_time_threshold,
            last_flush: Instant::now(),
            io_failures: 0,
        }
    }

    /// The writer thread body: wait, drain, coalesce flushes, exit on
    /// shutdown after a final flush.
    pub(crate) fn run(mut self) {
        loop {
            let mut state = self.core.lock_queue();
            while state.records.is_empty()
                && state.running
                && !self.core.force_flush.load(Ordering::Acquire)
            {
                state = self
                    .core
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }

            while let Some(record) = state.records.pop_front() {
                drop(state);
                self.core.not_full.notify_one();
                self.write_record(&record);
                if self.core.is_fatal() {
                    self.core.lock_queue().records.clear();
                    self.core.not_full.notify_all();
                    return;
                }
                state = self.core.lock_queue();
            }
            let running = state.running;
            drop(state);

            if self.core.force_flush.load(Ordering::Acquire) {
                self.flush_file();
                self.core.force_flush.store(false, Ordering::Release);
            }
            if !running {
                self.flush_file();
                return;
            }
        }
    }

    fn write_record(&mut self, record: &LogRecord) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let line = format!(
            "{} | {} | {} | {}\n",
            record.timestamp,
            record.component,
            record.severity.as_str(),
            record.message
        );
        match file.write_all(line.as_bytes()) {
            Ok(()) => {
                self.io_failures = 0;
                self.size += line.len() as u64;
                if self.first_timestamp.is_empty() {
                    self.first_timestamp = record.timestamp.clone();
                }
                self.last_timestamp = record.timestamp.clone();
                self.core.stats.written.add(1);
                self.pending_flush += 1;
                if self.size >= self.max_file_size {
                    self.rotate();
                }
                if self.pending_flush >= self.flush_count_threshold
                    || self.last_flush.elapsed() >= self.flush_time_threshold
                {
                    self.flush_file();
                }
            }
            Err(_) => self.register_io_failure(),
        }
    }

    /// Archives the active file and reopens an empty one at the same path.
    ///
    /// A failure anywhere in here (rename, directory creation, reopen) is a
    /// resource error during writer operation and marks the logger fatal.
    fn rotate(&mut self) {
        let Some(mut buffered) = self.file.take() else {
            return;
        };
        if buffered.flush().is_err() {
            self.file = Some(buffered);
            self.register_io_failure();
            return;
        }
        let file = match buffered.into_inner() {
            Ok(file) => file,
            Err(_) => {
                self.mark_fatal();
                return;
            }
        };

        let reopened = match self.strategy.as_mut() {
            Some(strategy) => strategy(&self.path, file),
            None => {
                drop(file);
                match rotation::rotate_into_history(
                    &self.path,
                    &self.first_timestamp,
                    &self.last_timestamp,
                ) {
                    Ok(_) => {
                        // Retention is best effort; a failed trim never
                        // blocks logging.
                        let _ = rotation::trim_history(&self.path, self.max_backups);
                        File::create(&self.path)
                    }
                    Err(err) => Err(err),
                }
            }
        };

        match reopened {
            Ok(file) => {
                self.first_timestamp.clear();
                self.last_timestamp.clear();
                self.size = 0;
                self.file = Some(BufWriter::new(file));
                self.core.stats.rotations.add(1);
            }
            Err(_) => self.mark_fatal(),
        }
    }

    fn flush_file(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if file.flush().is_ok() {
                self.pending_flush = 0;
                self.last_flush = Instant::now();
            }
        }
    }

    fn register_io_failure(&mut self) {
        self.io_failures += 1;
        if self.io_failures >= FATAL_WRITE_FAILURES {
            self.mark_fatal();
        }
    }

    fn mark_fatal(&mut self) {
        self.file = None;
        self.core.fatal.store(true, Ordering::Release);
        self.core.not_full.notify_all();
        self.core.not_empty.notify_all();
    }
}
