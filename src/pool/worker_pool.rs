//! The pool proper: worker loops, the scaling monitor, and lifecycle.

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer::WorkBuffer;
use crate::pool::context::{WorkerContext, WorkerFlags};
use crate::pool::{ConfigError, PoolConfig, PoolStats};

/// How long an inactive worker parks before re-checking its flags.
const IDLE_PARK: Duration = Duration::from_millis(1);

/// Two ratios closer than this count as "stable" for the adaptive interval.
const RATIO_STABILITY_EPSILON: f64 = 0.1;

/// Stable cycles required before the adaptive interval doubles.
const STABLE_CYCLES_BEFORE_BACKOFF: usize = 3;

/// Cap on adaptive interval growth, as a multiple of the configured interval.
const MAX_INTERVAL_GROWTH: u32 = 8;

type Task<E> = dyn Fn(&mut E) + Send + Sync;

/// Mutable pool state, guarded by one mutex.
///
/// The monitor holds the lock across an entire scaling decision; workers
/// never take it.
struct Core {
    contexts: Vec<WorkerContext>,
    active_threads: usize,
    spawn_counter: usize,
    shrink_counter: usize,
}

struct Shared<B, E> {
    buffer: Arc<B>,
    task: Box<Task<E>>,
    config: PoolConfig,
    running: AtomicBool,
    core: Mutex<Core>,
    stats: PoolStats,
}

impl<B, E> Shared<B, E> {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A worker pool that drains a [`WorkBuffer`] and scales itself on the
/// buffer's observed push/pop ratio.
///
/// Workers pop items and hand them to the task; a panicking task is contained
/// at the worker boundary and counted in [`PoolStats::failed`], never killing
/// the worker or leaking into its siblings. The pool never produces into the
/// buffer.
///
/// [`start`](Self::start) and [`stop`](Self::stop) are idempotent and safe
/// from any thread; `stop` requests cooperative exit, signals buffer shutdown
/// to wake waiters, and joins every owned thread before returning. Dropping a
/// running pool stops it.
///
/// # Examples
///
/// ```rust
/// use anello::buffer::ring::RingBuffer;
/// use anello::pool::{PoolConfig, WorkerPool};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let buffer = Arc::new(RingBuffer::<u32, 64>::new());
/// let sum = Arc::new(AtomicUsize::new(0));
///
/// let task_sum = Arc::clone(&sum);
/// let pool = WorkerPool::new(
///     Arc::clone(&buffer),
///     move |item: &mut u32| {
///         task_sum.fetch_add(*item as usize, Ordering::Relaxed);
///     },
///     PoolConfig::default().with_threads(1, 2, 4),
/// )
/// .unwrap();
///
/// pool.start();
/// for i in 1..=10 {
///     buffer.push(i).unwrap();
/// }
/// while sum.load(Ordering::Relaxed) < 55 {
///     std::thread::sleep(Duration::from_millis(1));
/// }
/// pool.stop();
/// assert_eq!(sum.load(Ordering::Relaxed), 55);
/// ```
pub struct WorkerPool<B, E>
where
    B: WorkBuffer<E>,
    E: Send,
{
    shared: Arc<Shared<B, E>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl<B, E> WorkerPool<B, E>
where
    B: WorkBuffer<E> + 'static,
    E: Send + 'static,
{
    /// Creates a pool that feeds popped items to `task`.
    ///
    /// Thread counts in `config` are clamped into `min <= reserved <= max`;
    /// inverted ratio thresholds fail with [`ConfigError`].
    pub fn new(
        buffer: Arc<B>,
        task: impl Fn(&mut E) + Send + Sync + 'static,
        config: PoolConfig,
    ) -> Result<Self, ConfigError> {
        let config = config.normalized()?;
        Ok(WorkerPool {
            shared: Arc::new(Shared {
                buffer,
                task: Box::new(task),
                config,
                running: AtomicBool::new(false),
                core: Mutex::new(Core {
                    contexts: Vec::new(),
                    active_threads: 0,
                    spawn_counter: 0,
                    shrink_counter: 0,
                }),
                stats: PoolStats::new(),
            }),
            monitor: Mutex::new(None),
        })
    }

    /// Creates a pool whose buffer entries are themselves callables, invoked
    /// directly.
    pub fn for_callables(buffer: Arc<B>, config: PoolConfig) -> Result<Self, ConfigError>
    where
        E: FnMut(),
    {
        Self::new(buffer, |item: &mut E| item(), config)
    }

    /// Starts the pool if it is not already running.
    ///
    /// Spawns `reserved_threads` workers, marks the first `min_threads` of
    /// them active, and launches the monitor thread.
    pub fn start(&self) {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        {
            let mut core = self.shared.lock_core();
            for _ in 0..self.shared.config.reserved_threads {
                launch_worker(&self.shared, &mut core);
            }
            core.active_threads = self.shared.config.min_threads;
            for ctx in core.contexts.iter().take(self.shared.config.min_threads) {
                ctx.flags.active.store(true, Ordering::Relaxed);
                ctx.unpark();
            }
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::spawn(move || monitor_loop(shared));
        *self.lock_monitor() = Some(handle);
    }
}

impl<B, E> WorkerPool<B, E>
where
    B: WorkBuffer<E>,
    E: Send,
{
    /// Stops the pool if it is running, joining every owned thread.
    ///
    /// Items still queued in the buffer are not drained; callers needing
    /// at-least-once delivery must drain before stopping.
    pub fn stop(&self) {
        if self
            .shared
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        {
            let core = self.shared.lock_core();
            for ctx in &core.contexts {
                ctx.flags.exit_requested.store(true, Ordering::Relaxed);
            }
            self.shared.buffer.signal_shutdown();
            for ctx in &core.contexts {
                ctx.unpark();
            }
        }

        if let Some(monitor) = self.lock_monitor().take() {
            monitor.thread().unpark();
            let _ = monitor.join();
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut core = self.shared.lock_core();
            core.contexts
                .iter_mut()
                .filter_map(WorkerContext::take_handle)
                .collect()
        };
        for handle in handles {
            let _ = handle.join();
        }

        let mut core = self.shared.lock_core();
        core.contexts.clear();
        core.active_threads = 0;
        core.spawn_counter = 0;
        core.shrink_counter = 0;
    }

    /// Snapshot of how many workers are currently marked active.
    pub fn active_threads(&self) -> usize {
        self.shared.lock_core().active_threads
    }

    /// Snapshot of how many worker threads the pool owns, active or not.
    pub fn total_threads(&self) -> usize {
        self.shared.lock_core().contexts.len()
    }

    /// `true` while the pool is between `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Task outcome counters.
    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    fn lock_monitor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B, E> Drop for WorkerPool<B, E>
where
    B: WorkBuffer<E>,
    E: Send,
{
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B, E> Debug for WorkerPool<B, E>
where
    B: WorkBuffer<E>,
    E: Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.lock_core();
        f.debug_struct("WorkerPool")
            .field("running", &self.shared.running.load(Ordering::SeqCst))
            .field("active_threads", &core.active_threads)
            .field("total_threads", &core.contexts.len())
            .field("processed", &self.shared.stats.processed())
            .field("failed", &self.shared.stats.failed())
            .finish()
    }
}

/// Spawns one worker thread and records its context.
fn launch_worker<B, E>(shared: &Arc<Shared<B, E>>, core: &mut Core)
where
    B: WorkBuffer<E> + 'static,
    E: Send + 'static,
{
    let flags = Arc::new(WorkerFlags::new());
    let worker_shared = Arc::clone(shared);
    let worker_flags = Arc::clone(&flags);
    let handle = thread::spawn(move || worker_loop(worker_shared, worker_flags));
    core.contexts.push(WorkerContext::new(handle, flags));
}

/// Activates up to `count` workers, launching new contexts when every
/// existing one is already active. Bounded by `max_threads`.
fn activate_workers<B, E>(shared: &Arc<Shared<B, E>>, core: &mut Core, count: usize)
where
    B: WorkBuffer<E> + 'static,
    E: Send + 'static,
{
    for _ in 0..count {
        if core.active_threads >= shared.config.max_threads {
            break;
        }
        if core.contexts.len() <= core.active_threads {
            launch_worker(shared, core);
        }
        if let Some(ctx) = core.contexts.iter().find(|ctx| !ctx.flags.is_active()) {
            ctx.flags.active.store(true, Ordering::Relaxed);
            ctx.unpark();
            core.active_threads += 1;
        }
    }
}

/// Deactivates up to `count` workers, never dropping below `min_threads` and
/// never destroying a context.
fn deactivate_workers<B, E>(shared: &Shared<B, E>, core: &mut Core, count: usize) {
    for _ in 0..count {
        if core.active_threads <= shared.config.min_threads {
            break;
        }
        if let Some(ctx) = core.contexts.iter().find(|ctx| ctx.flags.is_active()) {
            ctx.flags.active.store(false, Ordering::Relaxed);
            core.active_threads -= 1;
        }
    }
}

/// Workers to activate or deactivate for a threshold deviation.
fn scaling_step(deviation: f64, batch_scaling: Option<f64>) -> usize {
    match batch_scaling {
        Some(factor) if factor > 0.0 => ((deviation / factor) as usize).max(1),
        _ => 1,
    }
}

fn worker_loop<B, E>(shared: Arc<Shared<B, E>>, flags: Arc<WorkerFlags>)
where
    B: WorkBuffer<E> + 'static,
    E: Send + 'static,
{
    let mut batch: Vec<E> = Vec::new();
    let mut last_batch = Instant::now();

    while !flags.exit_requested() {
        if !flags.is_active() {
            thread::park_timeout(IDLE_PARK);
            continue;
        }

        shared.buffer.wait_for_item(shared.config.spin_count);

        if flags.exit_requested() || shared.buffer.is_shutdown() {
            break;
        }
        // Deactivated while waiting: no pops until reactivated.
        if !flags.is_active() {
            continue;
        }

        match shared.config.batch_pop {
            Some(cfg)
                if shared.buffer.len() >= cfg.min_size || last_batch.elapsed() >= cfg.timeout =>
            {
                batch.clear();
                shared.buffer.pop_batch(&mut batch, cfg.max_count);
                last_batch = Instant::now();
                for item in batch.drain(..) {
                    run_task(&shared, item);
                }
            }
            _ => {
                if let Some(item) = shared.buffer.pop() {
                    run_task(&shared, item);
                }
            }
        }
    }
}

/// Invokes the task inside the failure-isolating boundary.
fn run_task<B, E>(shared: &Shared<B, E>, mut item: E) {
    match catch_unwind(AssertUnwindSafe(|| (shared.task)(&mut item))) {
        Ok(()) => shared.stats.processed.add(1),
        Err(_) => shared.stats.failed.add(1),
    }
}

fn monitor_loop<B, E>(shared: Arc<Shared<B, E>>)
where
    B: WorkBuffer<E> + 'static,
    E: Send + 'static,
{
    let base = shared.config.monitor_interval;
    let mut interval = base;
    let mut prev_ratio: Option<f64> = None;
    let mut stable_cycles = 0usize;

    while shared.running.load(Ordering::SeqCst) {
        thread::park_timeout(interval);
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        let ratio = shared.buffer.throughput_ratio();
        let mut scaled = false;
        {
            let mut core = shared.lock_core();

            if ratio > shared.config.spawn_ratio {
                if core.active_threads < shared.config.max_threads {
                    core.spawn_counter += 1;
                    if core.spawn_counter >= shared.config.spawn_hysteresis {
                        let step = scaling_step(
                            ratio - shared.config.spawn_ratio,
                            shared.config.batch_scaling,
                        );
                        activate_workers(&shared, &mut core, step);
                        core.spawn_counter = 0;
                        scaled = true;
                    }
                }
            } else {
                core.spawn_counter = 0;
            }

            if ratio < shared.config.shrink_ratio {
                if core.active_threads > shared.config.min_threads {
                    core.shrink_counter += 1;
                    if core.shrink_counter >= shared.config.shrink_hysteresis {
                        let step = scaling_step(
                            shared.config.shrink_ratio - ratio,
                            shared.config.batch_scaling,
                        );
                        deactivate_workers(&shared, &mut core, step);
                        core.shrink_counter = 0;
                        scaled = true;
                    }
                }
            } else {
                core.shrink_counter = 0;
            }
        }

        if shared.config.adaptive_interval {
            let stable =
                matches!(prev_ratio, Some(prev) if (ratio - prev).abs() < RATIO_STABILITY_EPSILON);
            if scaled || !stable {
                stable_cycles = 0;
                interval = (interval / 2).max(base);
            } else {
                stable_cycles += 1;
                if stable_cycles >= STABLE_CYCLES_BEFORE_BACKOFF {
                    interval = (interval * 2).min(base * MAX_INTERVAL_GROWTH);
                    stable_cycles = 0;
                }
            }
        }
        prev_ratio = Some(ratio);
    }
}
