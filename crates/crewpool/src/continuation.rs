//! C3: the continuation registry.
//!
//! A *continuation* is a task that, from inside its own work function, asks
//! to be suspended rather than classified immediately (`task_continuation`),
//! to be woken later either by an explicit resume (`task_continue`) or by a
//! timeout. Grounded on `examples/original_source/examples/continuations/timers.c`
//! for the Declare/Resume/Timeout lifecycle and on the teacher's
//! `invocation.rs` for the closure-capture shape of a suspended call.
//!
//! Resume and Timeout race to claim the same entry; only one wins, because
//! both go through `OrderedRegistry::find_and`, which removes the entry
//! before handing it to the caller. Whichever side observes `Some(..)` is the
//! one that proceeds; the other observes `None` and does nothing.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

use crate::ids::{ContinuationUid, TaskId};
use crate::ordered_registry::{Disposition, OrderedRegistry};
use crate::task::{DeletorFn, WorkFn};
use crate::timer::{TimerId, TimerService};

/// A suspended task, parked until resumed or timed out.
pub(crate) struct Continuator {
    /// The id of the task that suspended itself; carried through so the
    /// eventual resume or timeout still accounts against the same task and
    /// can still be targeted by `cancel_task`.
    pub(crate) task_id: TaskId,
    /// The closure to run once this continuation is resumed.
    pub(crate) work: WorkFn,
    /// The original task's deletor, carried over so it still fires exactly
    /// once regardless of which path (resume or timeout) claims this entry.
    pub(crate) deletor: Option<DeletorFn>,
    timer_id: TimerId,
}

/// Owns every continuation currently pending for one pool.
#[derive(Default)]
pub(crate) struct ContinuationRegistry {
    entries: OrderedRegistry<ContinuationUid, Continuator>,
    by_timer: HashMap<TimerId, ContinuationUid>,
    sequence: u32,
}

impl ContinuationRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: OrderedRegistry::new(),
            by_timer: HashMap::new(),
            sequence: 0,
        }
    }

    fn next_uid(&mut self) -> ContinuationUid {
        self.sequence = self.sequence.wrapping_add(1).max(1);
        let high: u32 = rand::rng().random();
        ContinuationUid(((high as u64) << 32) | self.sequence as u64)
    }

    /// Parks `work`/`deletor` under a freshly minted uid, arming a timeout
    /// `timeout` from now on `timers`. Returns the uid the caller hands back
    /// to the user as the continuation's handle.
    pub(crate) fn declare(
        &mut self,
        task_id: TaskId,
        work: WorkFn,
        deletor: Option<DeletorFn>,
        timeout: Duration,
        timers: &mut TimerService,
    ) -> ContinuationUid {
        let uid = self.next_uid();
        let timer_id = timers.schedule(timeout);
        self.by_timer.insert(timer_id, uid);
        self.entries.insert(
            uid,
            Continuator {
                task_id,
                work,
                deletor,
                timer_id,
            },
        );
        uid
    }

    /// Claims the continuation for `uid`, if it is still pending. Cancels its
    /// timer so the timeout path can never also claim it.
    pub(crate) fn resume(
        &mut self,
        uid: ContinuationUid,
        timers: &mut TimerService,
    ) -> Option<(TaskId, WorkFn, Option<DeletorFn>)> {
        let claimed = self.entries.find_and(uid, |c| {
            Disposition::Remove((c.task_id, c.work, c.deletor, c.timer_id))
        })?;
        let (task_id, work, deletor, timer_id) = claimed;
        self.by_timer.remove(&timer_id);
        timers.cancel(timer_id);
        Some((task_id, work, deletor))
    }

    /// Claims every continuation whose timer id is in `due`, returning their
    /// task id and deletor (the work closure is dropped unran, which is
    /// sufficient to release whatever it captured).
    pub(crate) fn claim_timed_out(
        &mut self,
        due: &[TimerId],
    ) -> Vec<(TaskId, ContinuationUid, Option<DeletorFn>)> {
        let mut out = Vec::with_capacity(due.len());
        for &timer_id in due {
            let Some(uid) = self.by_timer.remove(&timer_id) else {
                continue;
            };
            if let Some((task_id, deletor)) = self
                .entries
                .find_and(uid, |c| Disposition::Remove((c.task_id, c.deletor)))
            {
                out.push((task_id, uid, deletor));
            }
        }
        out
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
