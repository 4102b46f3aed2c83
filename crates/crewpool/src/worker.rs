//! C2: the worker crew.
//!
//! One OS thread per worker, spawned lazily (on submission, up to the
//! requested crew size) and retired after sitting idle past the configured
//! idle timeout. Generalizes the teacher's single dedicated worker thread to
//! an arbitrary crew sharing one FIFO queue behind one mutex and one condvar,
//! matching the pthread mutex/cond pair in
//! `examples/original_source/wqm.c` rather than the teacher's own
//! single-producer design.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::handle::PoolHandle;
use crate::logging::targets;
use crate::pool::{PoolInner, TaskResult};
use crate::task::CurrentTask;

/// Per-thread state for a worker thread: which pool it serves, its
/// lazily-created worker-local data slot, and bookkeeping for whatever task
/// it is currently running (if any).
pub(crate) struct WorkerContext {
    pub(crate) pool_handle: PoolHandle,
    pub(crate) worker_local: Option<Box<dyn Any + Send>>,
    pub(crate) current_task: Option<CurrentTask>,
}

thread_local! {
    pub(crate) static CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Runs on every worker thread until the thread retires (idle timeout) or
/// the pool is torn down. `is_first_worker` is decided by the caller, under
/// the pool mutex, at the moment this thread was spawned: `true` exactly
/// when no other worker was alive, which is this thread's cue to run the
/// global resource allocator before touching the queue.
pub(crate) fn worker_loop(inner: Arc<PoolInner>, pool_handle: PoolHandle, is_first_worker: bool) {
    CONTEXT.with(|c| {
        *c.borrow_mut() = Some(WorkerContext {
            pool_handle,
            worker_local: None,
            current_task: None,
        })
    });

    if is_first_worker {
        crate::pool::allocate_global_resource(&inner);
    }

    let mut is_last_worker = false;
    loop {
        let mut guard = inner.state.lock();
        let entry = loop {
            if guard.runoff {
                let drained = guard.queue.cancel_all_pending();
                if !drained.is_empty() {
                    drop(guard);
                    for e in drained {
                        crate::pool::finalize(&inner, e.id, TaskResult::Canceled, e.deletor);
                    }
                    guard = inner.state.lock();
                    continue;
                }
            }

            if let Some(entry) = guard.queue.pop_front() {
                break Some(entry);
            }

            if guard.destroying && guard.outstanding == 0 {
                guard.workers_alive -= 1;
                is_last_worker = guard.workers_alive == 0;
                inner.cv.notify_all();
                break None;
            }

            guard.workers_idle += 1;
            let deadline = guard.timers.next_deadline();
            let now = Instant::now();
            let timed_out = match deadline {
                Some(at) if at <= now => true,
                Some(at) => inner.cv.wait_for(&mut guard, at - now).timed_out(),
                None => inner.cv.wait_for(&mut guard, guard.idle_timeout).timed_out(),
            };
            guard.workers_idle -= 1;

            if timed_out {
                let due = guard.timers.pop_due(Instant::now());
                if due.is_empty() {
                    trace!(target: targets::WORKER, "idle timeout, retiring");
                    guard.workers_alive -= 1;
                    is_last_worker = guard.workers_alive == 0;
                    inner.cv.notify_all();
                    break None;
                }
                let claimed = guard.continuations.claim_timed_out(&due);
                drop(guard);
                for (task_id, uid, deletor) in claimed {
                    trace!(target: targets::CONTINUATION, %uid, task = %task_id, "continuation timed out");
                    crate::pool::finalize(&inner, task_id, TaskResult::Canceled, deletor);
                }
                guard = inner.state.lock();
            }
        };

        let Some(entry) = entry else {
            teardown_worker(&inner, is_last_worker);
            return;
        };
        drop(guard);
        run_entry(&inner, entry);
    }
}

/// Runs the worker-local destructor (if any data was ever lazily created on
/// this thread) and, if this was the pool's last live worker, the global
/// resource deallocator.
fn teardown_worker(inner: &Arc<PoolInner>, is_last_worker: bool) {
    let local = CONTEXT.with(|c| {
        c.borrow_mut()
            .as_mut()
            .and_then(|ctx| ctx.worker_local.take())
    });
    if let Some(local) = local {
        crate::pool::destroy_worker_local(inner, local);
    }
    if is_last_worker {
        crate::pool::deallocate_global_resource(inner);
    }
}

fn run_entry(inner: &Arc<PoolInner>, entry: crate::queue::QueueEntry) {
    let id = entry.id;
    CONTEXT.with(|c| {
        let mut ctx = c.borrow_mut();
        let ctx = ctx.as_mut().expect("worker context initialized");
        ctx.current_task = Some(CurrentTask::new(id, entry.deletor));
    });

    let result = match entry.work {
        Some(work) => {
            trace!(target: targets::WORKER, task = %id, "running task");
            work()
        }
        None => TaskResult::Canceled,
    };

    let (suspended, deletor) = CONTEXT.with(|c| {
        let mut ctx = c.borrow_mut();
        let ctx = ctx.as_mut().expect("worker context initialized");
        let current = ctx.current_task.take().expect("current task set above");
        (current.suspended, current.deletor)
    });

    if suspended {
        trace!(target: targets::WORKER, task = %id, "task suspended as a continuation");
        return;
    }

    crate::pool::finalize(inner, id, result, deletor);
}

/// `true` if the calling thread is a worker thread of some pool.
pub(crate) fn in_worker() -> bool {
    CONTEXT.with(|c| c.borrow().is_some())
}

pub(crate) fn current_pool_handle() -> Option<PoolHandle> {
    CONTEXT.with(|c| c.borrow().as_ref().map(|ctx| ctx.pool_handle))
}
