//! C1: the pending-task FIFO.
//!
//! A plain `VecDeque` guarded by the pool mutex (see `pool.rs`), generalizing
//! the teacher's single-slot `ThreadPool` task list to an arbitrary-depth
//! queue the way `examples/original_source/wqm.c`'s submission list works.

use std::collections::VecDeque;

use crate::ids::{TaskId, TaskIdGenerator};
use crate::task::{DeletorFn, WorkFn};

/// One queued-but-not-yet-running task.
pub(crate) struct QueueEntry {
    pub(crate) id: TaskId,
    /// `None` only for an entry that was canceled before it ever ran but
    /// whose deletor must still fire (kept around just long enough for that).
    pub(crate) work: Option<WorkFn>,
    pub(crate) deletor: Option<DeletorFn>,
    pub(crate) is_continuation: bool,
}

/// The FIFO of tasks waiting for a worker. Not internally synchronized.
#[derive(Default)]
pub(crate) struct TaskQueue {
    entries: VecDeque<QueueEntry>,
    id_gen: TaskIdGenerator,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            id_gen: TaskIdGenerator::new(),
        }
    }

    /// Appends a new task, returning its freshly minted id.
    pub(crate) fn push(
        &mut self,
        work: WorkFn,
        deletor: Option<DeletorFn>,
        is_continuation: bool,
    ) -> TaskId {
        let id = self.id_gen.next();
        self.entries.push_back(QueueEntry {
            id,
            work: Some(work),
            deletor,
            is_continuation,
        });
        id
    }

    /// Re-queues a resumed continuation under its original task id, so a
    /// worker picks it up like any other pending task.
    pub(crate) fn push_continuation(
        &mut self,
        id: TaskId,
        work: WorkFn,
        deletor: Option<DeletorFn>,
    ) {
        self.entries.push_back(QueueEntry {
            id,
            work: Some(work),
            deletor,
            is_continuation: true,
        });
    }

    /// Pops the next task to run, in submission order.
    pub(crate) fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Cancels a specific still-pending task by id. Returns the entry so the
    /// caller can run its deletor with `TaskResult::Canceled`.
    pub(crate) fn cancel_by_id(&mut self, id: TaskId) -> Option<QueueEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        self.entries.remove(idx)
    }

    /// Cancels the oldest still-pending task (`TaskId::CANCEL_NEXT_PENDING`).
    pub(crate) fn cancel_next_pending(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Cancels the newest still-pending task (`TaskId::CANCEL_LAST_PENDING`).
    pub(crate) fn cancel_last_pending(&mut self) -> Option<QueueEntry> {
        self.entries.pop_back()
    }

    /// Cancels every still-pending task (`TaskId::CANCEL_ALL_PENDING`),
    /// returning them in submission order.
    pub(crate) fn cancel_all_pending(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskResult;

    fn work() -> WorkFn {
        Box::new(|| TaskResult::Success)
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q = TaskQueue::new();
        let a = q.push(work(), None, false);
        let b = q.push(work(), None, false);
        assert_eq!(q.pop_front().unwrap().id, a);
        assert_eq!(q.pop_front().unwrap().id, b);
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn cancel_by_id_removes_regardless_of_position() {
        let mut q = TaskQueue::new();
        let a = q.push(work(), None, false);
        let b = q.push(work(), None, false);
        let c = q.push(work(), None, false);
        let removed = q.cancel_by_id(b).unwrap();
        assert_eq!(removed.id, b);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_front().unwrap().id, a);
        assert_eq!(q.pop_front().unwrap().id, c);
    }

    #[test]
    fn cancel_all_drains_in_submission_order() {
        let mut q = TaskQueue::new();
        let a = q.push(work(), None, false);
        let b = q.push(work(), None, false);
        let drained = q.cancel_all_pending();
        assert_eq!(drained.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(q.is_empty());
    }
}
