//! Asynchronous file logger with size-based rotation.
//!
//! Producers call [`Logger::log`], which timestamps the record immediately,
//! pushes it into a bounded queue, and returns. A single background writer
//! thread formats records into lines, appends them to the active file, and
//! rotates the file into a `history/` directory once it crosses the size
//! threshold:
//!
//! ```text
//!  Logger::log ──┐
//!  Logger::log ──┼──► bounded queue ──► writer thread ──► logs/app.log
//!  Logger::log ──┘                          │
//!                                           │ size >= max_file_size
//!                                           ▼
//!                          logs/history/app-<first>-<last>.log
//! ```
//!
//! Each line is `<timestamp> | <component> | <severity> | <message>`, with the
//! timestamp captured at enqueue time, so the written order of a file equals
//! its timestamp order. Rotated files are named after the first and last
//! timestamp they contain.
//!
//! Ownership is explicit: [`LogManager::open`] returns the owning handle and
//! dropping it (or calling [`LogManager::shutdown`]) drains the queue and
//! joins the writer. For code that wants one logger per process there is a
//! single optional global slot behind [`LogManager::initialize`]; initializing
//! it twice is an error, not a silent replacement.

mod manager;
mod rotation;
mod timestamp;
mod writer;

pub use manager::{LogManager, Logger, LoggerConfig};
pub use rotation::RotationStrategy;

use std::fmt::{self, Display};
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::telemetry::Counter;

/// Default active-file size threshold: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of rotated files kept in `history/`; `0` disables trimming.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Default record count between coalesced stream flushes.
pub const DEFAULT_FLUSH_COUNT_THRESHOLD: usize = 10;

/// Default elapsed time between coalesced stream flushes.
pub const DEFAULT_FLUSH_TIME_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(5);

/// Default bound on queued-but-unwritten records.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Record severity, in increasing order of weight.
///
/// The wire strings written into log lines are stable: `DEBUG`, `INFO`,
/// `WARNING`, `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Trace-level detail.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something surprising that the system recovered from.
    Warning,
    /// Something failed.
    Error,
}

impl Severity {
    /// The stable string written into log lines.
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued log record.
///
/// The timestamp is captured when the record is created (at enqueue time, not
/// at write time), so records land in the file in timestamp order.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Record severity.
    pub severity: Severity,
    /// Component (module, subsystem) the record came from.
    pub component: Arc<str>,
    /// Free-form message text.
    pub message: String,
    /// Formatted local timestamp, `YYYY_MM_DD-HH_MM_SS.ffffff`.
    pub timestamp: String,
}

impl LogRecord {
    /// Creates a record stamped with the current local time.
    pub fn new(severity: Severity, component: Arc<str>, message: String) -> Self {
        LogRecord {
            severity,
            component,
            message,
            timestamp: timestamp::now(),
        }
    }
}

/// What `log` does when the record queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Block the producer until the writer frees space. The default.
    #[default]
    Block,
    /// Drop the record and count it in [`LoggerStats::dropped`].
    Drop,
}

/// Errors surfaced by the logger.
#[derive(Debug, Error)]
pub enum LogError {
    /// The process-wide slot already holds a manager.
    #[error("log manager is already initialized")]
    AlreadyInitialized,

    /// The process-wide slot is empty.
    #[error("log manager is not initialized")]
    NotInitialized,

    /// Opening the file or creating its directories failed.
    #[error("log file error: {0}")]
    Io(#[from] io::Error),

    /// The writer hit an unrecoverable file error; the logger is dead and
    /// every further `log` fails fast.
    #[error("log writer entered a fatal state")]
    WriterFatal,

    /// The manager has been shut down.
    #[error("log manager is shut down")]
    ShutDown,
}

/// Counters published by the logger.
#[derive(Debug)]
pub struct LoggerStats {
    pub(crate) written: Counter,
    pub(crate) dropped: Counter,
    pub(crate) rotations: Counter,
}

impl LoggerStats {
    pub(crate) const fn new() -> Self {
        LoggerStats {
            written: Counter::new().with_name("log_written"),
            dropped: Counter::new().with_name("log_dropped"),
            rotations: Counter::new().with_name("log_rotations"),
        }
    }

    /// Records written to the active file since the manager opened.
    pub fn written(&self) -> usize {
        self.written.value()
    }

    /// Records dropped by the [`OverflowPolicy::Drop`] policy.
    pub fn dropped(&self) -> usize {
        self.dropped.value()
    }

    /// Completed file rotations.
    pub fn rotations(&self) -> usize {
        self.rotations.value()
    }
}
