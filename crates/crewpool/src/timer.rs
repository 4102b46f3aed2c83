//! A min-heap deadline scheduler for continuation timeouts.
//!
//! Grounded on the `BinaryHeap<Reverse<_>>` pattern in the teacher's
//! `timer.rs`/`scheduler.rs`, generalized here to a plain deadline registry:
//! this crate has no dedicated timer thread (see `pool.rs`). Instead, any
//! worker that goes idle waits on the pool condvar with a timeout equal to
//! the nearest deadline, so whichever worker wakes first drains every timer
//! that has since come due. That keeps the single mutex+condvar model from
//! `examples/original_source/wqm.c` intact instead of adding a second thread
//! and a second lock.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// An opaque handle to a scheduled deadline, returned by
/// [`TimerService::schedule`] and accepted by [`TimerService::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TimerId(u64);

struct Entry {
    deadline: Instant,
    id: TimerId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.id.0).cmp(&(other.deadline, other.id.0))
    }
}

/// A min-heap of pending deadlines, ordered soonest-first.
///
/// Not internally synchronized: every caller in this crate reaches a
/// `TimerService` only while already holding the pool mutex.
#[derive(Default)]
pub(crate) struct TimerService {
    heap: BinaryHeap<Reverse<Entry>>,
    canceled: std::collections::HashSet<TimerId>,
    next_id: u64,
}

impl TimerService {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            canceled: std::collections::HashSet::new(),
            next_id: 1,
        }
    }

    /// Schedules a deadline `delay` from now, returning a handle that can be
    /// passed to [`TimerService::cancel`] before it fires.
    pub(crate) fn schedule(&mut self, delay: std::time::Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.heap.push(Reverse(Entry {
            deadline: Instant::now() + delay,
            id,
        }));
        id
    }

    /// Cancels a previously scheduled deadline. A no-op if it already fired
    /// or was already canceled.
    pub(crate) fn cancel(&mut self, id: TimerId) {
        self.canceled.insert(id);
    }

    /// The soonest still-live deadline, if any.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_canceled_front();
        self.heap.peek().map(|Reverse(e)| e.deadline)
    }

    /// Removes and returns every timer id whose deadline is `<= now`,
    /// soonest first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due = Vec::new();
        loop {
            self.drop_canceled_front();
            match self.heap.peek() {
                Some(Reverse(e)) if e.deadline <= now => {
                    let Reverse(e) = self.heap.pop().unwrap();
                    due.push(e.id);
                }
                _ => break,
            }
        }
        due
    }

    fn drop_canceled_front(&mut self) {
        while let Some(Reverse(e)) = self.heap.peek() {
            if self.canceled.remove(&e.id) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.len() <= self.canceled.len()
    }
}
