//! C4: pool lifecycle, task submission, cancellation, and drain/termination.
//!
//! The pool owns exactly one mutex and one condvar (`parking_lot`, not
//! `std::sync`, matching the teacher's concurrency primitives throughout
//! `horizon-lattice-core`). Every predicate a worker or `wait_and_destroy`
//! needs to act on is evaluated while that one mutex is held:
//!
//! - *something to process*: the task queue is non-empty.
//! - *is done*: destruction has been requested and nothing is outstanding
//!   (queued, running, or parked as a continuation).
//! - *runoff*: an early-termination property (`RunUntilFirstFailure` /
//!   `RunUntilFirstSuccess`) has tripped, so every task still pending should
//!   be drained as canceled rather than run.
//!
//! These three are mutually exclusive by construction and are checked in
//! that order by the worker loop in `worker.rs`. There is no reentrant lock
//! anywhere in this crate: the mutex is always released before a work
//! function or a deletor runs, so a work function that calls back into the
//! pool (`task_continuation`, `cancel_task`, `add_task` on the same pool) is
//! re-entering the public API, never a held lock.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{ArcMutexGuard, Condvar, Mutex, RawMutex};
use tracing::{debug, trace};

use crate::continuation::ContinuationRegistry;
use crate::error::{PoolError, Result};
use crate::handle::{self, PoolHandle};
use crate::ids::{ContinuationUid, TaskId};
use crate::logging::targets;
use crate::queue::TaskQueue;
pub(crate) use crate::task::TaskResult;
use crate::task::{DeletorFn, WorkFn};
use crate::timer::TimerService;
use crate::worker;

/// Governs when a pool stops accepting new work and starts draining what is
/// still pending as canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolProperty {
    /// Run every submitted task to completion; never trips runoff.
    RunAll,
    /// The first `TaskResult::Failure` trips runoff: every other still-
    /// pending task is canceled instead of run.
    RunUntilFirstFailure,
    /// The first `TaskResult::Success` trips runoff: every other still-
    /// pending task is canceled instead of run.
    RunUntilFirstSuccess,
}

/// Aggregate counters snapshotted by the monitor subsystem and returned by
/// [`Pool::snapshot`]. Mirrors the counter set of `spec.md` §3: `pending` is
/// `queued`, `async` is `continuations_pending`, and `processing` is derived
/// (`outstanding - queued - continuations_pending`) rather than tracked
/// redundantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolSnapshot {
    /// Cumulative tasks submitted since pool creation (continuation
    /// resumptions do not count again; they were already counted once).
    pub submitted: u64,
    pub queued: usize,
    pub processing: usize,
    pub continuations_pending: usize,
    pub workers_alive: usize,
    pub workers_idle: usize,
    pub success: u64,
    pub failure: u64,
    pub canceled: u64,
    /// Time elapsed since [`Pool::builder`]'s `create_and_start`.
    pub elapsed: Duration,
}

/// Default `idle_timeout`: an idle worker with no other work waits this
/// long for something new before retiring.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// The "infinity" ceiling `idle_timeout`/`set_idle_timeout` clamp to rather
/// than accept literally unbounded. ~120 days.
const IDLE_TIMEOUT_CEILING: Duration = Duration::from_secs(120 * 24 * 60 * 60);

fn clamp_idle_timeout(timeout: Duration) -> Duration {
    timeout.min(IDLE_TIMEOUT_CEILING)
}

pub(crate) struct PoolState {
    pub(crate) queue: TaskQueue,
    pub(crate) continuations: ContinuationRegistry,
    pub(crate) timers: TimerService,
    pub(crate) idle_timeout: Duration,
    pub(crate) workers_alive: usize,
    pub(crate) workers_idle: usize,
    pub(crate) workers_spawned_total: usize,
    pub(crate) destroying: bool,
    pub(crate) runoff: bool,
    pub(crate) outstanding: usize,
    pub(crate) submitted: u64,
    pub(crate) success: u64,
    pub(crate) failure: u64,
    pub(crate) canceled: u64,
}

type WorkerLocalFactory = dyn Fn() -> Box<dyn Any + Send> + Send + Sync;
type WorkerLocalDestroy = dyn Fn(Box<dyn Any + Send>) + Send + Sync;
type ResourceAlloc = dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync;
type ResourceDealloc = dyn Fn(Arc<dyn Any + Send + Sync>) + Send + Sync;

/// A configured global resource manager: `alloc` runs once when the pool's
/// first worker spawns, `dealloc` once when its last worker retires (workers
/// coming and going freely in between, e.g. across idle-timeout retirement
/// and respawn).
#[derive(Clone)]
struct ResourceManager {
    alloc: Arc<ResourceAlloc>,
    dealloc: Arc<ResourceDealloc>,
}

pub(crate) struct PoolInner {
    pub(crate) property: PoolProperty,
    pub(crate) requested_workers: usize,
    pub(crate) state: Mutex<PoolState>,
    pub(crate) cv: Condvar,
    started: AtomicBool,
    created_at: Instant,
    global_data: Option<Arc<dyn Any + Send + Sync>>,
    global_resource: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
    resource_manager: Mutex<Option<ResourceManager>>,
    worker_local_factory: Mutex<Option<Arc<WorkerLocalFactory>>>,
    worker_local_destroy: Mutex<Option<Arc<WorkerLocalDestroy>>>,
    monitor: Mutex<Option<crate::monitor::Monitor>>,
    /// Backs [`guard_begin`]/[`guard_end`]. Deliberately a lock of its own
    /// rather than `state`'s: user aggregation code runs with `state`
    /// released (see module docs), and handing a user callback the
    /// scheduler's own lock would let a careless work function deadlock
    /// itself by calling back into `add_task`/`cancel_task` while still
    /// holding it. A dedicated lock gives user code the same "serialize my
    /// own multi-step update" guarantee `spec.md` §4.4 asks for without
    /// exposing the pool's internal critical section.
    user_guard: Arc<Mutex<()>>,
}

/// Runs the configured allocator and populates the global resource slot.
/// Called on the newly spawned worker thread itself, exactly when it is the
/// pool's first live worker.
pub(crate) fn allocate_global_resource(inner: &Arc<PoolInner>) {
    let manager = inner.resource_manager.lock().clone();
    if let Some(manager) = manager {
        let resource = (manager.alloc)();
        *inner.global_resource.lock() = Some(resource);
    }
}

/// Runs the configured deallocator over whatever is in the global resource
/// slot and clears it. Called once a retiring worker finds it was the last
/// one alive.
pub(crate) fn deallocate_global_resource(inner: &Arc<PoolInner>) {
    let resource = inner.global_resource.lock().take();
    let manager = inner.resource_manager.lock().clone();
    if let (Some(resource), Some(manager)) = (resource, manager) {
        (manager.dealloc)(resource);
    }
}

/// Runs the configured worker-local destructor (if any) over `data`. Called
/// once per worker, at its own termination.
pub(crate) fn destroy_worker_local(inner: &Arc<PoolInner>, data: Box<dyn Any + Send>) {
    if let Some(destroy) = inner.worker_local_destroy.lock().clone() {
        destroy(data);
    }
}

impl PoolInner {
    fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot_for_monitor(&self) -> PoolSnapshot {
        let guard = self.state.lock();
        self.snapshot_locked(&guard)
    }

    fn snapshot_locked(&self, guard: &PoolState) -> PoolSnapshot {
        let queued = guard.queue.len();
        let continuations_pending = guard.continuations.len();
        PoolSnapshot {
            submitted: guard.submitted,
            queued,
            processing: guard
                .outstanding
                .saturating_sub(queued)
                .saturating_sub(continuations_pending),
            continuations_pending,
            workers_alive: guard.workers_alive,
            workers_idle: guard.workers_idle,
            success: guard.success,
            failure: guard.failure,
            canceled: guard.canceled,
            elapsed: self.created_at.elapsed(),
        }
    }
}

/// A running worker pool.
///
/// Cheap to clone: internally an `Arc` plus a generation-tagged handle. Every
/// clone refers to the same underlying crew and queue.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
    handle: PoolHandle,
}

/// Configures and starts a [`Pool`].
pub struct PoolBuilder {
    property: PoolProperty,
    workers: usize,
    idle_timeout: Duration,
    global_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            property: PoolProperty::RunAll,
            workers: 0,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            global_data: None,
        }
    }
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The termination property. Defaults to [`PoolProperty::RunAll`].
    pub fn property(mut self, property: PoolProperty) -> Self {
        self.property = property;
        self
    }

    /// The maximum worker crew size. `0` (the default) resolves to
    /// `std::thread::available_parallelism()`, mirroring how the teacher
    /// resolves `WorkerNbCpu = 0` in `async_image.rs`.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// How long an idle worker waits for new work before retiring. Defaults
    /// to 100ms. Clamped to an "infinity" ceiling of ~120 days, the nearest
    /// thing to "never retire" this accepts.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = clamp_idle_timeout(timeout);
        self
    }

    /// Fixed, read-only context handed to every worker via the free function
    /// [`global_data`]. Set once, at construction (unlike the resource
    /// manager, there is no lazy alloc/dealloc pairing to worker lifetime:
    /// `global_data` is just a value the pool holds for its own lifetime).
    pub fn global_data<T: Send + Sync + 'static>(mut self, data: T) -> Self {
        self.global_data = Some(Arc::new(data));
        self
    }

    /// Builds and starts the pool. No worker threads are actually spawned
    /// until the first task is submitted (lazy spawn).
    pub fn create_and_start(self) -> Pool {
        let requested_workers = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        };

        let inner = Arc::new(PoolInner {
            property: self.property,
            requested_workers,
            state: Mutex::new(PoolState {
                queue: TaskQueue::new(),
                continuations: ContinuationRegistry::new(),
                timers: TimerService::new(),
                idle_timeout: self.idle_timeout,
                workers_alive: 0,
                workers_idle: 0,
                workers_spawned_total: 0,
                destroying: false,
                runoff: false,
                outstanding: 0,
                submitted: 0,
                success: 0,
                failure: 0,
                canceled: 0,
            }),
            cv: Condvar::new(),
            started: AtomicBool::new(false),
            created_at: Instant::now(),
            global_data: self.global_data,
            global_resource: Mutex::new(None),
            resource_manager: Mutex::new(None),
            worker_local_factory: Mutex::new(None),
            worker_local_destroy: Mutex::new(None),
            monitor: Mutex::new(None),
            user_guard: Arc::new(Mutex::new(())),
        });
        let handle = handle::register(Arc::clone(&inner));
        debug!(target: targets::POOL, workers = requested_workers, "pool created");
        Pool { inner, handle }
    }
}

impl Pool {
    /// Starts building a new pool.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Submits a task. `work` runs on a worker thread; `deletor`, if given,
    /// runs once regardless of whether `work` ran, and may escalate the
    /// final classification (e.g. treat a logged-but-swallowed error as a
    /// failure).
    pub fn add_task<F, D>(&self, work: F, deletor: Option<D>) -> TaskId
    where
        F: FnOnce() -> TaskResult + Send + 'static,
        D: FnOnce(TaskResult) -> TaskResult + Send + 'static,
    {
        self.add_task_boxed(Box::new(work), deletor.map(|d| Box::new(d) as DeletorFn))
    }

    pub(crate) fn add_task_boxed(&self, work: WorkFn, deletor: Option<DeletorFn>) -> TaskId {
        self.inner.mark_started();
        let mut guard = self.inner.state.lock();
        let id = guard.queue.push(work, deletor, false);
        guard.outstanding += 1;
        guard.submitted += 1;
        let auto_cancel = guard.runoff || guard.destroying;
        if auto_cancel {
            let entry = guard
                .queue
                .cancel_by_id(id)
                .expect("entry just inserted above");
            drop(guard);
            trace!(target: targets::QUEUE, task = %id, "auto-canceled at submit");
            finalize(&self.inner, id, TaskResult::Canceled, entry.deletor);
            return id;
        }
        maybe_spawn_worker(&self.inner, &mut guard, self.handle);
        self.inner.cv.notify_one();
        id
    }

    /// Cancels a task that has not yet started running. Accepts
    /// [`TaskId::CANCEL_ALL_PENDING`], [`TaskId::CANCEL_NEXT_PENDING`], and
    /// [`TaskId::CANCEL_LAST_PENDING`] as well as an ordinary id. Returns
    /// `true` if anything was actually canceled.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let mut guard = self.inner.state.lock();
        if id == TaskId::CANCEL_ALL_PENDING {
            let drained = guard.queue.cancel_all_pending();
            let any = !drained.is_empty();
            drop(guard);
            for e in drained {
                finalize(&self.inner, e.id, TaskResult::Canceled, e.deletor);
            }
            return any;
        }
        let entry = if id == TaskId::CANCEL_NEXT_PENDING {
            guard.queue.cancel_next_pending()
        } else if id == TaskId::CANCEL_LAST_PENDING {
            guard.queue.cancel_last_pending()
        } else {
            guard.queue.cancel_by_id(id)
        };
        match entry {
            Some(e) => {
                drop(guard);
                finalize(&self.inner, e.id, TaskResult::Canceled, e.deletor);
                true
            }
            None => false,
        }
    }

    /// Blocks until every submitted task (including any still-pending
    /// continuation) has reached a terminal state, then retires the crew and
    /// consumes the pool.
    pub fn wait_and_destroy(self) {
        {
            let mut guard = self.inner.state.lock();
            guard.destroying = true;
            self.inner.cv.notify_all();
            while guard.outstanding > 0 || guard.workers_alive > 0 {
                self.inner.cv.wait(&mut guard);
            }
        }
        if let Some(mut monitor) = self.inner.monitor.lock().take() {
            monitor.stop_and_join();
        }
        handle::unregister(self.handle);
        debug!(target: targets::POOL, "pool destroyed");
    }

    /// Installs a periodic monitor: every `interval`, `callback` is handed a
    /// [`PoolSnapshot`] off a dedicated thread. Replaces any previously
    /// installed monitor.
    pub fn set_monitor(
        &self,
        interval: Duration,
        callback: impl FnMut(PoolSnapshot) + Send + 'static,
    ) {
        let monitor = crate::monitor::Monitor::spawn(Arc::clone(&self.inner), interval, callback);
        let mut slot = self.inner.monitor.lock();
        if let Some(mut previous) = slot.replace(monitor) {
            previous.stop_and_join();
        }
    }

    /// A point-in-time snapshot of queue depth and counters.
    pub fn snapshot(&self) -> PoolSnapshot {
        let guard = self.inner.state.lock();
        self.inner.snapshot_locked(&guard)
    }

    /// Sets the idle timeout. Errors if a worker has already started (the
    /// original idle-timeout semantics only make sense configured up front).
    /// Clamped to an "infinity" ceiling of ~120 days.
    pub fn set_idle_timeout(&self, timeout: Duration) -> Result<()> {
        if self.inner.has_started() {
            return Err(PoolError::WorkersAlreadyStarted {
                what: "idle timeout",
            });
        }
        self.inner.state.lock().idle_timeout = clamp_idle_timeout(timeout);
        Ok(())
    }

    /// Installs a factory/destructor pair managing each worker thread's
    /// private data: `make` runs once per worker, the first time it touches
    /// its local data; `destroy` runs once per worker, at its termination
    /// (idle timeout or drain). Must be set before the first task is
    /// submitted.
    pub fn set_worker_local_data_manager<T, F, D>(&self, make: F, destroy: D) -> Result<()>
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        if self.inner.has_started() {
            return Err(PoolError::WorkersAlreadyStarted {
                what: "the worker-local data manager",
            });
        }
        *self.inner.worker_local_factory.lock() =
            Some(Arc::new(move || Box::new(make()) as Box<dyn Any + Send>));
        *self.inner.worker_local_destroy.lock() = Some(Arc::new(move |data: Box<dyn Any + Send>| {
            if let Ok(typed) = data.downcast::<T>() {
                destroy(*typed);
            }
        }));
        Ok(())
    }

    /// Installs the single global resource shared read-only by every
    /// worker: `alloc` runs once, on the thread of whichever worker spawn
    /// finds itself the pool's first live worker; `dealloc` runs once a
    /// retiring worker finds itself the last live one. Workers coming and
    /// going across idle-timeout retirement and respawn reallocate and
    /// deallocate the resource accordingly. Can only be set once, before the
    /// first task is submitted.
    pub fn set_global_resource_manager<T, A, D>(&self, alloc: A, dealloc: D) -> Result<()>
    where
        T: Send + Sync + 'static,
        A: Fn() -> T + Send + Sync + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        if self.inner.has_started() {
            return Err(PoolError::WorkersAlreadyStarted {
                what: "the global resource manager",
            });
        }
        let mut slot = self.inner.resource_manager.lock();
        if slot.is_some() {
            return Err(PoolError::ResourceManagerAlreadyConfigured);
        }
        *slot = Some(ResourceManager {
            alloc: Arc::new(move || Arc::new(alloc()) as Arc<dyn Any + Send + Sync>),
            dealloc: Arc::new(move |resource: Arc<dyn Any + Send + Sync>| {
                if let Ok(typed) = resource.downcast::<T>() {
                    if let Ok(value) = Arc::try_unwrap(typed) {
                        dealloc(value);
                    }
                }
            }),
        });
        Ok(())
    }

    /// Resumes a pending continuation by the uid [`task_continuation`]
    /// returned. Unlike [`task_continuation`] itself, this can be called from
    /// any thread, not just a worker of this pool: the usual caller is
    /// whatever delivers the external event the task was waiting on (a
    /// completion callback, another pool's worker, and so on). Returns
    /// [`PoolError::ContinuationTimedOut`] if the continuation already timed
    /// out, was already resumed, or never existed.
    pub fn task_continue(&self, uid: ContinuationUid) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let claimed = {
            let PoolState {
                continuations,
                timers,
                ..
            } = &mut *guard;
            continuations.resume(uid, timers)
        };
        match claimed {
            Some((task_id, work, deletor)) => {
                guard.queue.push_continuation(task_id, work, deletor);
                maybe_spawn_worker(&self.inner, &mut guard, self.handle);
                self.inner.cv.notify_one();
                Ok(())
            }
            None => Err(PoolError::ContinuationTimedOut),
        }
    }

    pub(crate) fn handle(&self) -> PoolHandle {
        self.handle
    }
}

/// Resolves a stable handle to its live [`Pool`], if it hasn't been
/// destroyed.
pub(crate) fn resolve(handle: PoolHandle) -> Option<Pool> {
    handle::resolve(handle).map(|inner| Pool { inner, handle })
}

fn maybe_spawn_worker(inner: &Arc<PoolInner>, guard: &mut PoolState, handle: PoolHandle) {
    if guard.workers_idle == 0 && guard.workers_alive < inner.requested_workers {
        let is_first_worker = guard.workers_alive == 0;
        guard.workers_alive += 1;
        guard.workers_spawned_total += 1;
        let name = format!("crewpool-worker-{}", guard.workers_spawned_total);
        let inner = Arc::clone(inner);
        std::thread::Builder::new()
            .name(name)
            .spawn(move || worker::worker_loop(inner, handle, is_first_worker))
            .expect("failed to spawn crewpool worker thread");
    }
}

/// Runs `deletor` (if any) over `result`, records the final classification,
/// decrements the outstanding count, possibly trips runoff, and wakes every
/// thread waiting on the pool condvar. Called with the pool mutex released.
pub(crate) fn finalize(
    inner: &Arc<PoolInner>,
    id: TaskId,
    mut result: TaskResult,
    deletor: Option<DeletorFn>,
) {
    if let Some(d) = deletor {
        result = d(result);
    }
    let mut guard = inner.state.lock();
    match result {
        TaskResult::Success => guard.success += 1,
        TaskResult::Failure => guard.failure += 1,
        TaskResult::Canceled => guard.canceled += 1,
    }
    guard.outstanding -= 1;
    let trips = match inner.property {
        PoolProperty::RunUntilFirstFailure => result.is_failure(),
        PoolProperty::RunUntilFirstSuccess => result.is_success(),
        PoolProperty::RunAll => false,
    };
    if trips && !guard.runoff {
        debug!(target: targets::POOL, task = %id, ?result, "runoff tripped");
        guard.runoff = true;
    }
    trace!(target: targets::POOL, task = %id, ?result, "task finalized");
    inner.cv.notify_all();
}

/// `true` if the calling thread is one of this pool's workers.
pub fn in_worker() -> bool {
    worker::in_worker()
}

/// The pool the calling thread is currently a worker of, if any.
pub fn current_pool() -> Option<Pool> {
    worker::current_pool_handle().and_then(resolve)
}

/// Reads the single global resource installed by
/// [`Pool::set_global_resource_manager`], if any and if it is of type `T`.
/// Must be called from a worker thread.
pub fn global_resource<T: Send + Sync + 'static>() -> Result<Arc<T>> {
    let pool = current_pool().ok_or(PoolError::NotInWorker)?;
    let slot = pool.inner.global_resource.lock();
    let resource = slot.as_ref().ok_or_else(|| {
        PoolError::AllocatorFailed("no global resource configured".into())
    })?;
    Arc::clone(resource)
        .downcast::<T>()
        .map_err(|_| PoolError::AllocatorFailed("global resource type mismatch".into()))
}

/// Reads the fixed context installed by [`PoolBuilder::global_data`], if any
/// and if it is of type `T`. Must be called from a worker thread.
pub fn global_data<T: Send + Sync + 'static>() -> Result<Arc<T>> {
    let pool = current_pool().ok_or(PoolError::NotInWorker)?;
    let data = pool.inner.global_data.clone().ok_or_else(|| {
        PoolError::AllocatorFailed("no global data configured".into())
    })?;
    data.downcast::<T>()
        .map_err(|_| PoolError::AllocatorFailed("global data type mismatch".into()))
}

/// An RAII token held by user aggregation code between [`guard_begin`] and
/// the matching [`guard_end`] (or simply its own `Drop`). Serializes
/// concurrent workers' aggregation callbacks against each other; see
/// [`PoolInner::user_guard`](crate::pool::PoolInner) for why this is a
/// dedicated lock rather than the pool's own scheduling mutex.
pub struct PoolGuard {
    _held: ArcMutexGuard<RawMutex, ()>,
}

/// Acquires the pool's aggregation guard, blocking until any other worker's
/// `guard_begin..guard_end` section has ended. Must be called from a worker
/// thread. No-op in effect (never contended) for a single-worker pool.
pub fn guard_begin() -> Result<PoolGuard> {
    let pool = current_pool().ok_or(PoolError::NotInWorker)?;
    Ok(PoolGuard {
        _held: pool.inner.user_guard.lock_arc(),
    })
}

/// Releases a guard acquired by [`guard_begin`]. Equivalent to dropping it;
/// provided for callers that prefer an explicit paired call.
pub fn guard_end(_guard: PoolGuard) {}

/// Runs `f` against this worker's private data, lazily creating it via the
/// factory installed with [`Pool::set_worker_local_data_manager`] the first
/// time any task on this worker touches it. Must be called from a worker
/// thread.
pub fn worker_local_data<T: Send + 'static, R>(f: impl FnOnce(&mut T) -> R) -> Result<R> {
    worker::CONTEXT.with(|c| {
        let mut ctx = c.borrow_mut();
        let ctx = ctx.as_mut().ok_or(PoolError::NotInWorker)?;
        if ctx.worker_local.is_none() {
            let pool = resolve(ctx.pool_handle).ok_or(PoolError::StaleHandle)?;
            let factory = pool.inner.worker_local_factory.lock();
            let factory = factory.as_ref().ok_or(PoolError::AllocatorFailed(
                "no worker-local data manager configured".into(),
            ))?;
            ctx.worker_local = Some(factory());
        }
        let slot = ctx.worker_local.as_mut().expect("initialized above");
        let typed = slot
            .downcast_mut::<T>()
            .ok_or_else(|| PoolError::AllocatorFailed("worker-local data type mismatch".into()))?;
        Ok(f(typed))
    })
}

/// Suspends the currently executing task: instead of being classified when
/// its work function returns, it is parked in the continuation registry
/// until [`task_continue`] resumes it or `timeout` elapses. The original
/// task's deletor (if any) is carried over to fire exactly once, on whichever
/// path eventually claims the continuation. Must be called from within the
/// task's own work function.
pub fn task_continuation<F>(work: F, timeout: Duration) -> Result<ContinuationUid>
where
    F: FnOnce() -> TaskResult + Send + 'static,
{
    worker::CONTEXT.with(|c| {
        let mut ctx = c.borrow_mut();
        let ctx = ctx.as_mut().ok_or(PoolError::NotInWorker)?;
        let current = ctx.current_task.as_mut().ok_or(PoolError::NotInWorker)?;
        if current.has_continuation_pending {
            return Err(PoolError::ContinuationAlreadyPending);
        }
        let task_id = current.id;
        let pool = resolve(ctx.pool_handle).ok_or(PoolError::StaleHandle)?;
        // The deletor moves to the continuation registry; the worker loop
        // sees `suspended` and skips its own post-work deletor call, so it
        // still fires exactly once, on the resume or timeout path.
        let deletor = current.deletor.take();
        current.suspended = true;
        current.has_continuation_pending = true;
        let boxed_work: WorkFn = Box::new(work);
        let mut guard = pool.inner.state.lock();
        let PoolState {
            continuations,
            timers,
            ..
        } = &mut *guard;
        let uid = continuations.declare(task_id, boxed_work, deletor, timeout, timers);
        pool.inner.cv.notify_all();
        Ok(uid)
    })
}

/// Resumes a pending continuation by the uid [`task_continuation`] returned.
/// Returns [`PoolError::ContinuationTimedOut`] if it already timed out, was
/// already resumed, or never existed.
pub fn task_continue(uid: ContinuationUid) -> Result<()> {
    let pool = current_pool().ok_or(PoolError::NotInWorker)?;
    let mut guard = pool.inner.state.lock();
    let claimed = {
        let PoolState {
            continuations,
            timers,
            ..
        } = &mut *guard;
        continuations.resume(uid, timers)
    };
    match claimed {
        Some((task_id, work, deletor)) => {
            guard.queue.push_continuation(task_id, work, deletor);
            maybe_spawn_worker(&pool.inner, &mut guard, pool.handle);
            pool.inner.cv.notify_one();
            Ok(())
        }
        None => Err(PoolError::ContinuationTimedOut),
    }
}
