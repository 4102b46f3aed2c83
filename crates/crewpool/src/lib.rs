//! A worker-pool scheduler with virtual/continuation tasks, per-task
//! timeouts, and a configurable early-termination property.
//!
//! A [`Pool`] runs an arbitrary crew of worker threads against one shared
//! FIFO queue. Tasks are ordinary closures (`add_task`); a task may also
//! suspend itself mid-flight as a *continuation* (`task_continuation`) to be
//! resumed later (`task_continue`) or automatically canceled if nobody
//! resumes it in time. The crew is spawned lazily, up to a configured size,
//! and idle workers retire themselves after a configurable timeout.
//!
//! ```no_run
//! use crewpool::{Pool, TaskResult};
//!
//! let pool = Pool::builder().workers(4).create_and_start();
//! pool.add_task(|| TaskResult::Success, None::<fn(TaskResult) -> TaskResult>);
//! pool.wait_and_destroy();
//! ```

mod continuation;
mod error;
mod handle;
mod ids;
mod logging;
mod monitor;
mod ordered_registry;
mod pool;
mod queue;
mod task;
mod timer;
mod worker;

pub use error::{PoolError, Result};
pub use ids::{ContinuationUid, TaskId};
pub use pool::{
    current_pool, global_data, global_resource, guard_begin, guard_end, in_worker,
    task_continuation, task_continue, worker_local_data, Pool, PoolBuilder, PoolGuard,
    PoolProperty, PoolSnapshot,
};
pub use task::TaskResult;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn runs_every_task_to_completion() {
        let pool = Pool::builder().workers(2).create_and_start();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let done = Arc::clone(&done);
            pool.add_task(
                move || {
                    done.fetch_add(1, Ordering::SeqCst);
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        pool.wait_and_destroy();
        assert_eq!(done.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn run_until_first_failure_cancels_the_rest() {
        let pool = Pool::builder()
            .workers(1)
            .property(PoolProperty::RunUntilFirstFailure)
            .create_and_start();
        let ran = Arc::new(AtomicUsize::new(0));
        pool.add_task(
            || TaskResult::Failure,
            None::<fn(TaskResult) -> TaskResult>,
        );
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            pool.add_task(
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        pool.wait_and_destroy();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn deletor_can_escalate_success_to_failure() {
        let pool = Pool::builder().workers(1).create_and_start();
        pool.add_task(
            || TaskResult::Success,
            Some(|result: TaskResult| {
                assert!(result.is_success());
                TaskResult::Failure
            }),
        );
        pool.wait_and_destroy();
    }

    #[test]
    fn continuation_resumes_and_completes() {
        let pool = Pool::builder().workers(1).create_and_start();
        pool.add_task(
            move || {
                let uid = task_continuation(|| TaskResult::Success, Duration::from_secs(5))
                    .expect("declare continuation");
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    task_continue(uid).expect("resume continuation");
                });
                // Discarded by the worker loop: `task_continuation` marked
                // this task suspended, so its terminal result is decided
                // later by whichever of resume/timeout claims it.
                TaskResult::Success
            },
            None::<fn(TaskResult) -> TaskResult>,
        );
        pool.wait_and_destroy();
    }

    #[test]
    fn continuation_auto_cancels_on_timeout() {
        let pool = Pool::builder().workers(1).create_and_start();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        pool.add_task(
            move || {
                let _ = task_continuation(
                    move || {
                        ran2.fetch_add(1, Ordering::SeqCst);
                        TaskResult::Success
                    },
                    Duration::from_millis(10),
                )
                .expect("declare continuation");
                TaskResult::Success
            },
            None::<fn(TaskResult) -> TaskResult>,
        );
        pool.wait_and_destroy();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_all_pending_stops_unstarted_tasks() {
        // A single worker kept busy on a long-sleeping task so the other
        // five can never be dequeued before `cancel_task` runs.
        let pool = Pool::builder().workers(1).create_and_start();
        let started = Arc::new(AtomicUsize::new(0));
        let started_for_block = Arc::clone(&started);
        pool.add_task(
            move || {
                started_for_block.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                TaskResult::Success
            },
            None::<fn(TaskResult) -> TaskResult>,
        );

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            pool.add_task(
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        while started.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }
        assert!(pool.cancel_task(TaskId::CANCEL_ALL_PENDING));
        pool.wait_and_destroy();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn global_data_is_readable_from_any_worker() {
        let pool = Pool::builder()
            .workers(2)
            .global_data(String::from("shared-context"))
            .create_and_start();
        for _ in 0..10 {
            pool.add_task(
                || {
                    let data = global_data::<String>().expect("global data configured");
                    assert_eq!(*data, "shared-context");
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        pool.wait_and_destroy();
    }

    #[test]
    fn guard_begin_serializes_concurrent_aggregation() {
        let pool = Pool::builder().workers(4).create_and_start();
        let total = Arc::new(std::sync::atomic::AtomicI64::new(0));
        for _ in 0..50 {
            let total = Arc::clone(&total);
            pool.add_task(
                move || {
                    let _guard = guard_begin().expect("guard_begin from a worker");
                    let before = total.load(Ordering::SeqCst);
                    std::thread::yield_now();
                    total.store(before + 1, Ordering::SeqCst);
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        pool.wait_and_destroy();
        assert_eq!(total.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn worker_local_data_manager_constructs_and_destroys_once_per_worker() {
        let pool = Pool::builder().workers(1).create_and_start();
        let made = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let made_for_factory = Arc::clone(&made);
        let destroyed_for_destroy = Arc::clone(&destroyed);
        pool.set_worker_local_data_manager(
            move || {
                made_for_factory.fetch_add(1, Ordering::SeqCst);
                0i64
            },
            move |_: i64| {
                destroyed_for_destroy.fetch_add(1, Ordering::SeqCst);
            },
        )
        .expect("configure worker-local data manager before first task");

        for _ in 0..10 {
            pool.add_task(
                || {
                    worker_local_data::<i64, _>(|counter| *counter += 1)
                        .expect("worker-local data available from a worker");
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        pool.wait_and_destroy();
        assert_eq!(made.load(Ordering::SeqCst), 1, "factory runs once for this one worker");
        assert_eq!(
            destroyed.load(Ordering::SeqCst),
            1,
            "destructor runs once, at worker termination"
        );
    }

    #[test]
    fn global_resource_manager_allocates_once_and_deallocates_after_last_worker() {
        let pool = Pool::builder().workers(3).create_and_start();
        let allocated = Arc::new(AtomicUsize::new(0));
        let deallocated = Arc::new(AtomicUsize::new(0));
        let allocated_for_alloc = Arc::clone(&allocated);
        let deallocated_for_dealloc = Arc::clone(&deallocated);
        pool.set_global_resource_manager(
            move || {
                allocated_for_alloc.fetch_add(1, Ordering::SeqCst);
                String::from("resource")
            },
            move |_: String| {
                deallocated_for_dealloc.fetch_add(1, Ordering::SeqCst);
            },
        )
        .expect("configure global resource manager before first task");

        for _ in 0..20 {
            pool.add_task(
                || {
                    let resource = global_resource::<String>().expect("resource configured");
                    assert_eq!(*resource, "resource");
                    TaskResult::Success
                },
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        pool.wait_and_destroy();
        assert_eq!(
            allocated.load(Ordering::SeqCst),
            1,
            "allocator runs once, when the first worker spawns"
        );
        assert_eq!(
            deallocated.load(Ordering::SeqCst),
            1,
            "deallocator runs once, when the last worker retires"
        );
    }

    #[test]
    fn snapshot_reports_submitted_and_terminal_counts() {
        let pool = Pool::builder().workers(1).create_and_start();
        for _ in 0..5 {
            pool.add_task(
                || TaskResult::Success,
                None::<fn(TaskResult) -> TaskResult>,
            );
        }
        let before = pool.snapshot();
        assert_eq!(before.submitted, 5);
        pool.wait_and_destroy();
    }
}
