//! # Task Supervision
//!
//! Two execution contexts are available to plugin code:
//!
//! - the **worker pool**, where background work such as offer timers runs on
//!   any thread, and
//! - the **synchronous context**, a single serialized "main tick" to which
//!   every callback that touches shared game state is marshaled.
//!
//! Work crosses from the pool to the synchronous context by message passing:
//! [`TaskSupervisor::run_sync`] queues a job and hands back a [`SyncReceipt`]
//! that can be awaited until the job has run.

use crate::error::{TaskError, TaskResult};
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A unit of work for the synchronous context.
pub type SyncJob = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Default interval between two ticks of the synchronous context (20 ticks per second).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest interval the tick loop accepts.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Supervisor Trait
// ============================================================================

/// Host-provided executor used by framework utilities.
///
/// Implementations must not poll `run_async` futures inline on the calling
/// thread.
pub trait TaskSupervisor: Send + Sync + 'static {
    /// Runs `task` on the worker pool and returns a handle that can cancel it.
    fn run_async(&self, task: BoxFuture<'static, ()>) -> TaskHandle;

    /// Queues `job` on the synchronous context.
    fn run_sync(&self, job: SyncJob) -> SyncReceipt;
}

/// Cancelable handle to a task running on the worker pool.
#[derive(Debug)]
pub struct TaskHandle {
    abort: tokio::task::AbortHandle,
}

impl TaskHandle {
    pub fn new(abort: tokio::task::AbortHandle) -> Self {
        Self { abort }
    }

    /// Requests cancellation. The task stops at its next suspension point;
    /// work it has already handed to the synchronous context is not recalled.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Completion notice for a job queued on the synchronous context.
#[derive(Debug)]
pub struct SyncReceipt {
    done: oneshot::Receiver<TaskResult<()>>,
    queued: bool,
}

impl SyncReceipt {
    /// A receipt for a job that could not be queued.
    fn closed() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(TaskError::ContextClosed));
        Self { done: rx, queued: false }
    }

    /// `false` when the job was dropped because the context had shut down.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Waits until the job has run on the synchronous context.
    pub async fn wait(self) -> TaskResult<()> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(TaskError::ContextClosed),
        }
    }
}

// ============================================================================
// Synchronous Context
// ============================================================================

struct QueuedJob {
    job: SyncJob,
    done: oneshot::Sender<TaskResult<()>>,
}

/// Cloneable sender side of the synchronous context.
#[derive(Clone)]
pub struct SyncHandle {
    queue: mpsc::UnboundedSender<QueuedJob>,
    ticks: Arc<AtomicU64>,
}

impl SyncHandle {
    /// Queues a job for the next tick.
    pub fn submit(&self, job: SyncJob) -> SyncReceipt {
        let (done, rx) = oneshot::channel();
        match self.queue.send(QueuedJob { job, done }) {
            Ok(()) => SyncReceipt { done: rx, queued: true },
            Err(_) => {
                warn!("⚠️ Synchronous context is closed, job dropped");
                SyncReceipt::closed()
            }
        }
    }

    /// Number of ticks the context has completed so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("ticks", &self.tick_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The single serialized execution context.
///
/// Jobs queued through a [`SyncHandle`] run one after another, in submission
/// order, during [`SyncContext::tick`]. Nothing else runs them, so two jobs
/// never execute concurrently.
pub struct SyncContext {
    queue: mpsc::UnboundedReceiver<QueuedJob>,
    ticks: Arc<AtomicU64>,
    tick_interval: Duration,
}

impl SyncContext {
    /// Creates a context and the handle used to feed it.
    ///
    /// A zero interval is raised to [`MIN_TICK_INTERVAL`].
    pub fn new(tick_interval: Duration) -> (Self, SyncHandle) {
        let tick_interval = if tick_interval.is_zero() {
            warn!("⚠️ Tick interval of 0ms, using {}ms", MIN_TICK_INTERVAL.as_millis());
            MIN_TICK_INTERVAL
        } else {
            tick_interval
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let ticks = Arc::new(AtomicU64::new(0));

        let context = Self {
            queue: rx,
            ticks: ticks.clone(),
            tick_interval,
        };
        let handle = SyncHandle { queue: tx, ticks };

        (context, handle)
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Runs every job queued so far. Returns the number of jobs processed.
    pub fn tick(&mut self) -> usize {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let mut processed = 0;
        while let Ok(queued) = self.queue.try_recv() {
            let result = run_job(queued.job);
            // The waiter may have been cancelled; the job still counts.
            let _ = queued.done.send(result);
            processed += 1;
        }

        if processed > 0 {
            debug!(tick, processed, "Synchronous jobs processed");
        }

        processed
    }

    /// Ticks at the configured interval until `shutdown` resolves, then drains
    /// whatever is still queued.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("🔁 Synchronous context started ({}ms tick)", self.tick_interval.as_millis());

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        self.queue.close();
        let drained = self.tick();
        info!(
            "🛑 Synchronous context stopped after {} ticks ({} jobs drained)",
            self.ticks.load(Ordering::Relaxed),
            drained
        );
    }
}

fn run_job(job: SyncJob) -> TaskResult<()> {
    match std::panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("❌ Synchronous job failed: {:#}", e);
            Err(TaskError::JobFailed(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("💥 Synchronous job panicked: {}", message);
            Err(TaskError::JobPanicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Tokio Supervisor
// ============================================================================

/// [`TaskSupervisor`] backed by a tokio runtime and a [`SyncContext`].
#[derive(Clone, Debug)]
pub struct TokioTaskSupervisor {
    runtime: tokio::runtime::Handle,
    sync: SyncHandle,
}

impl TokioTaskSupervisor {
    pub fn with_runtime(runtime: tokio::runtime::Handle, sync: SyncHandle) -> Self {
        Self { runtime, sync }
    }

    /// Uses the runtime the caller is running on.
    pub fn current(sync: SyncHandle) -> TaskResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TaskError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, sync))
    }

    pub fn sync_handle(&self) -> &SyncHandle {
        &self.sync
    }
}

impl TaskSupervisor for TokioTaskSupervisor {
    fn run_async(&self, task: BoxFuture<'static, ()>) -> TaskHandle {
        let join = self.runtime.spawn(task);
        TaskHandle::new(join.abort_handle())
    }

    fn run_sync(&self, job: SyncJob) -> SyncReceipt {
        self.sync.submit(job)
    }
}
