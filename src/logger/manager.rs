//! Logger ownership: configuration, the owning manager, component handles,
//! and the optional process-wide slot.

use std::fmt::{self, Debug};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::logger::rotation::RotationStrategy;
use crate::logger::writer::{Core, Writer};
use crate::logger::{
    LogError, LogRecord, LoggerStats, OverflowPolicy, Severity, DEFAULT_FLUSH_COUNT_THRESHOLD,
    DEFAULT_FLUSH_TIME_THRESHOLD, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_QUEUE_CAPACITY,
};

/// Configuration for a [`LogManager`].
///
/// ```rust,no_run
/// use anello::logger::{LoggerConfig, LogManager};
///
/// let config = LoggerConfig::new("logs/app.log")
///     .with_max_file_size(1024 * 1024)
///     .with_max_backups(3);
/// let manager = LogManager::open(config).unwrap();
/// let log = manager.logger("Startup");
/// ```
pub struct LoggerConfig {
    pub(crate) path: PathBuf,
    pub(crate) max_file_size: u64,
    pub(crate) max_backups: usize,
    pub(crate) flush_count_threshold: usize,
    pub(crate) flush_time_threshold: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) rotation_strategy: Option<RotationStrategy>,
}

impl LoggerConfig {
    /// Configuration with the documented defaults: 10 MiB files, 5 backups,
    /// flush every 10 records or 5 seconds, a 1024-record queue that blocks
    /// producers when full, built-in rotation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LoggerConfig {
            path: path.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_backups: DEFAULT_MAX_BACKUPS,
            flush_count_threshold: DEFAULT_FLUSH_COUNT_THRESHOLD,
            flush_time_threshold: DEFAULT_FLUSH_TIME_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
            rotation_strategy: None,
        }
    }

    /// Size threshold (bytes) at which the active file rotates.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Rotated files kept in `history/`; `0` disables retention trimming.
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Records between coalesced stream flushes.
    pub fn with_flush_count_threshold(mut self, count: usize) -> Self {
        self.flush_count_threshold = count;
        self
    }

    /// Elapsed time between coalesced stream flushes.
    pub fn with_flush_time_threshold(mut self, threshold: Duration) -> Self {
        self.flush_time_threshold = threshold;
        self
    }

    /// Bound on queued-but-unwritten records (minimum 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// What producers do when the queue is full.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Replaces the built-in rotation with a custom strategy.
    pub fn with_rotation_strategy(mut self, strategy: RotationStrategy) -> Self {
        self.rotation_strategy = Some(strategy);
        self
    }
}

impl Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("path", &self.path)
            .field("max_file_size", &self.max_file_size)
            .field("max_backups", &self.max_backups)
            .field("flush_count_threshold", &self.flush_count_threshold)
            .field("flush_time_threshold", &self.flush_time_threshold)
            .field("queue_capacity", &self.queue_capacity)
            .field("overflow", &self.overflow)
            .field("custom_rotation", &self.rotation_strategy.is_some())
            .finish()
    }
}

/// Owns one log file and its background writer.
///
/// Opening a manager creates parent directories, opens the file in append
/// mode, and starts the writer thread. Dropping the manager (or calling
/// [`shutdown`](Self::shutdown)) drains queued records, flushes, and joins
/// the writer.
///
/// There is at most one writer per manager and one manager per active file;
/// any number of [`Logger`] handles may feed it from any thread.
pub struct LogManager {
    core: Arc<Core>,
    writer: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl LogManager {
    /// Opens the log file and starts the writer.
    ///
    /// Fails with [`LogError::Io`] when the file or its parent directories
    /// cannot be created.
    pub fn open(config: LoggerConfig) -> Result<Self, LogError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;
        let initial_size = file.metadata()?.len();

        let core = Arc::new(Core::new(config.queue_capacity, config.overflow));
        let writer = Writer::new(
            Arc::clone(&core),
            config.path.clone(),
            file,
            initial_size,
            config.max_file_size,
            config.max_backups,
            config.rotation_strategy,
            config.flush_count_threshold,
            config.flush_time_threshold,
        );
        let handle = thread::spawn(move || writer.run());

        Ok(LogManager {
            core,
            writer: Some(handle),
            path: config.path,
        })
    }

    /// Returns a lightweight handle that logs under `component`.
    pub fn logger(&self, component: impl Into<String>) -> Logger {
        Logger {
            component: Arc::from(component.into()),
            core: Arc::clone(&self.core),
        }
    }

    /// Blocks until every queued record is written and the stream flushed.
    pub fn flush(&self) {
        self.core.flush();
    }

    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` once the writer hit an unrecoverable file error.
    pub fn is_fatal(&self) -> bool {
        self.core.is_fatal()
    }

    /// Records currently queued but not yet written.
    pub fn queued(&self) -> usize {
        self.core.queued()
    }

    /// Written/dropped/rotation counters.
    pub fn stats(&self) -> &LoggerStats {
        &self.core.stats
    }

    /// Drains the queue, flushes, closes the file, and joins the writer.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.writer.take() {
            self.core.begin_shutdown();
            let _ = handle.join();
        }
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Debug for LogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogManager")
            .field("path", &self.path)
            .field("queued", &self.queued())
            .field("written", &self.stats().written())
            .field("fatal", &self.is_fatal())
            .finish()
    }
}

/// A cheap, cloneable logging handle bound to one component name.
///
/// Handles stay valid for the lifetime of the shared core; logging after the
/// manager shut down fails with [`LogError::ShutDown`].
#[derive(Clone)]
pub struct Logger {
    component: Arc<str>,
    core: Arc<Core>,
}

impl Logger {
    /// Enqueues a record under this handle's component name.
    ///
    /// The record is timestamped here, at enqueue time. Blocks only when the
    /// queue is full and the overflow policy is
    /// [`OverflowPolicy::Block`](crate::logger::OverflowPolicy::Block).
    pub fn log(&self, severity: Severity, message: impl Into<String>) -> Result<(), LogError> {
        self.core.enqueue(LogRecord::new(
            severity,
            Arc::clone(&self.component),
            message.into(),
        ))
    }

    /// Enqueues a record under an explicit component name, overriding this
    /// handle's.
    pub fn log_as(
        &self,
        severity: Severity,
        component: &str,
        message: impl Into<String>,
    ) -> Result<(), LogError> {
        self.core
            .enqueue(LogRecord::new(severity, Arc::from(component), message.into()))
    }

    /// Blocks until every queued record is written and the stream flushed.
    /// Safe to call concurrently with `log` from other threads.
    pub fn flush(&self) {
        self.core.flush();
    }

    /// The component name this handle logs under.
    pub fn component(&self) -> &str {
        &self.component
    }
}

impl Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .finish()
    }
}

/// The single optional process-wide manager slot.
static GLOBAL: Mutex<Option<LogManager>> = Mutex::new(None);

fn global_slot() -> MutexGuard<'static, Option<LogManager>> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LogManager {
    /// Installs a manager into the process-wide slot.
    ///
    /// Fails with [`LogError::AlreadyInitialized`] when the slot is occupied;
    /// duplicate initialization is a caller bug, never a silent replacement.
    pub fn initialize(config: LoggerConfig) -> Result<(), LogError> {
        let mut slot = global_slot();
        if slot.is_some() {
            return Err(LogError::AlreadyInitialized);
        }
        *slot = Some(LogManager::open(config)?);
        Ok(())
    }

    /// `true` while the process-wide slot holds a manager.
    pub fn is_initialized() -> bool {
        global_slot().is_some()
    }

    /// Returns a [`Logger`] from the process-wide manager.
    pub fn global_logger(component: impl Into<String>) -> Result<Logger, LogError> {
        global_slot()
            .as_ref()
            .map(|manager| manager.logger(component))
            .ok_or(LogError::NotInitialized)
    }

    /// Shuts down and removes the process-wide manager, if any.
    pub fn shutdown_global() {
        let manager = global_slot().take();
        drop(manager);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn read_all_lines(dir: &Path, active: &Path) -> Vec<String> {
        let mut lines = Vec::new();
        let history = dir.join("history");
        if history.is_dir() {
            let mut rotated: Vec<PathBuf> = fs::read_dir(&history)
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            rotated.sort();
            for path in rotated {
                lines.extend(fs::read_to_string(path).unwrap().lines().map(String::from));
            }
        }
        if active.is_file() {
            lines.extend(
                fs::read_to_string(active)
                    .unwrap()
                    .lines()
                    .map(String::from),
            );
        }
        lines
    }

    #[test]
    fn test_line_format_and_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let manager = LogManager::open(LoggerConfig::new(&path)).unwrap();
        let log = manager.logger("Core");

        log.log(Severity::Info, "first").unwrap();
        log.log(Severity::Warning, "second").unwrap();
        log.log_as(Severity::Error, "Other", "third").unwrap();
        manager.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(" | Core | INFO | first"));
        assert!(lines[1].contains(" | Core | WARNING | second"));
        assert!(lines[2].contains(" | Other | ERROR | third"));
        for line in &lines {
            assert_eq!(line.matches(" | ").count(), 3);
        }
        assert_eq!(manager.stats().written(), 3);
    }

    #[test]
    fn test_flush_makes_all_records_visible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let manager = LogManager::open(LoggerConfig::new(&path)).unwrap();
        let log = manager.logger("Flush");

        for i in 0..100 {
            log.log(Severity::Debug, format!("record {i}")).unwrap();
        }
        log.flush();

        let lines = read_all_lines(dir.path(), &path);
        assert_eq!(lines.len(), 100);
        assert!(lines[0].contains("record 0"));
        assert!(lines[99].contains("record 99"));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut manager = LogManager::open(LoggerConfig::new(&path)).unwrap();
        let log = manager.logger("Drain");

        for i in 0..50 {
            log.log(Severity::Info, format!("record {i}")).unwrap();
        }
        manager.shutdown();

        let lines = read_all_lines(dir.path(), &path);
        assert_eq!(lines.len(), 50);
        assert!(matches!(
            log.log(Severity::Info, "late"),
            Err(LogError::ShutDown)
        ));
    }

    #[test]
    fn test_rotation_under_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let manager = LogManager::open(
            LoggerConfig::new(&path)
                .with_max_file_size(10 * 1024)
                .with_max_backups(0),
        )
        .unwrap();
        let log = manager.logger("Rotate");

        for i in 0..3000 {
            log.log(Severity::Info, format!("Message #{i}")).unwrap();
        }
        manager.flush();

        let history = dir.path().join("history");
        assert!(history.is_dir());
        assert!(fs::read_dir(&history).unwrap().count() >= 1);
        assert!(manager.stats().rotations() >= 1);

        let lines = read_all_lines(dir.path(), &path);
        assert_eq!(lines.len(), 3000);
        assert!(lines.iter().any(|l| l.contains("Message #0")));
        assert!(lines.iter().any(|l| l.contains("Message #2999")));
    }

    #[test]
    fn test_rotated_name_embeds_file_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let manager = LogManager::open(
            LoggerConfig::new(&path)
                .with_max_file_size(2 * 1024)
                .with_flush_count_threshold(1),
        )
        .unwrap();
        let log = manager.logger("Interval");

        for i in 0..200 {
            log.log(Severity::Info, format!("line {i}")).unwrap();
        }
        manager.flush();

        let history = dir.path().join("history");
        for entry in fs::read_dir(&history).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().into_owned();
            let contents = fs::read_to_string(entry.path()).unwrap();
            let mut lines = contents.lines();
            let first_ts = lines.next().unwrap().split(" | ").next().unwrap().to_string();
            let last_ts = contents
                .lines()
                .last()
                .unwrap()
                .split(" | ")
                .next()
                .unwrap()
                .to_string();
            assert!(
                name.contains(&first_ts) && name.contains(&last_ts),
                "{name} does not embed [{first_ts}, {last_ts}]"
            );
        }
    }

    #[test]
    fn test_retention_trims_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let manager = LogManager::open(
            LoggerConfig::new(&path)
                .with_max_file_size(512)
                .with_max_backups(2),
        )
        .unwrap();
        let log = manager.logger("Trim");

        for i in 0..2000 {
            log.log(Severity::Info, format!("padding line number {i}"))
                .unwrap();
        }
        manager.flush();

        assert!(manager.stats().rotations() > 2);
        let history = dir.path().join("history");
        assert!(fs::read_dir(&history).unwrap().count() <= 3);
    }

    #[test]
    fn test_custom_rotation_strategy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let invocations = Arc::new(AtomicUsize::new(0));

        let strategy_count = Arc::clone(&invocations);
        let strategy: RotationStrategy = Box::new(move |path, old| {
            strategy_count.fetch_add(1, Ordering::Relaxed);
            drop(old);
            fs::File::create(path)
        });

        let manager = LogManager::open(
            LoggerConfig::new(&path)
                .with_max_file_size(1024)
                .with_rotation_strategy(strategy),
        )
        .unwrap();
        let log = manager.logger("Custom");

        for i in 0..500 {
            log.log(Severity::Info, format!("record {i}")).unwrap();
        }
        manager.flush();

        assert!(invocations.load(Ordering::Relaxed) >= 1);
        // The built-in archive step was replaced wholesale.
        assert!(!dir.path().join("history").exists());
        assert!(manager.stats().rotations() >= 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/app.log");
        let manager = LogManager::open(LoggerConfig::new(&path)).unwrap();
        let log = manager.logger("Nested");
        log.log(Severity::Info, "made it").unwrap();
        manager.flush();
        assert!(path.is_file());
    }

    #[test]
    fn test_append_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        {
            let manager = LogManager::open(LoggerConfig::new(&path)).unwrap();
            manager.logger("First").log(Severity::Info, "one").unwrap();
        }
        {
            let manager = LogManager::open(LoggerConfig::new(&path)).unwrap();
            manager.logger("Second").log(Severity::Info, "two").unwrap();
        }
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_concurrent_producers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let manager = Arc::new(LogManager::open(LoggerConfig::new(&path)).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|tid| {
                let log = manager.logger(format!("Thread{tid}"));
                thread::spawn(move || {
                    for i in 0..50 {
                        log.log(Severity::Debug, format!("t{tid} m{i}")).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        manager.flush();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 200);
        assert_eq!(manager.stats().written(), 200);
    }

    #[test]
    fn test_global_slot_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("global.log");

        assert!(matches!(
            LogManager::global_logger("Early"),
            Err(LogError::NotInitialized)
        ));

        LogManager::initialize(LoggerConfig::new(&path)).unwrap();
        assert!(LogManager::is_initialized());

        assert!(matches!(
            LogManager::initialize(LoggerConfig::new(dir.path().join("other.log"))),
            Err(LogError::AlreadyInitialized)
        ));

        let log = LogManager::global_logger("Global").unwrap();
        log.log(Severity::Info, "via the slot").unwrap();
        log.flush();
        assert!(fs::read_to_string(&path).unwrap().contains("via the slot"));

        LogManager::shutdown_global();
        assert!(!LogManager::is_initialized());
    }
}
