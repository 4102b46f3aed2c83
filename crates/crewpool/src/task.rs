//! Task types: the work/deletor closures a pool executes, and the terminal
//! result classification.

use crate::ids::TaskId;

/// The terminal classification of a task.
///
/// Mirrors `TP_JOB_SUCCESS`/`TP_JOB_FAILURE`/`TP_JOB_CANCELED` from
/// `examples/original_source/wqm.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    /// The work function ran to completion and reported success.
    Success,
    /// The work function ran to completion and reported failure.
    Failure,
    /// The task was canceled before it ran (or lost a continuation race).
    Canceled,
}

impl TaskResult {
    /// `true` for [`TaskResult::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, TaskResult::Success)
    }

    /// `true` for [`TaskResult::Failure`].
    pub fn is_failure(self) -> bool {
        matches!(self, TaskResult::Failure)
    }

    /// `true` for [`TaskResult::Canceled`].
    pub fn is_canceled(self) -> bool {
        matches!(self, TaskResult::Canceled)
    }
}

/// A task's work closure. Runs with the pool mutex released.
pub(crate) type WorkFn = Box<dyn FnOnce() -> TaskResult + Send>;

/// A task's deletor closure: runs once, after the work function (or instead
/// of it, if the task was canceled before it started), and may escalate the
/// final classification. Runs with the pool mutex released.
pub(crate) type DeletorFn = Box<dyn FnOnce(TaskResult) -> TaskResult + Send>;

/// Bookkeeping for the task currently executing on a worker thread.
///
/// Exposed (in reduced form) to in-worker accessors so that
/// `task_continuation` can move the deletor into a [`crate::continuation::Continuator`]
/// and mark the task suspended.
pub(crate) struct CurrentTask {
    pub(crate) id: TaskId,
    pub(crate) deletor: Option<DeletorFn>,
    pub(crate) suspended: bool,
    pub(crate) has_continuation_pending: bool,
}

impl CurrentTask {
    pub(crate) fn new(id: TaskId, deletor: Option<DeletorFn>) -> Self {
        Self {
            id,
            deletor,
            suspended: false,
            has_continuation_pending: false,
        }
    }
}
