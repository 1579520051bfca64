//! Deferred task queue ordered by due time and scheduling order.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    time::Duration,
};

use restraint_warden_core::{Task, Timestamp};

/// Task waiting in the queue.
///
/// Ordering: `(due ASC, sequence ASC)`. The heap stores `Reverse` so the
/// earliest entry pops first.
#[derive(Clone, Copy, Debug)]
struct Scheduled {
    due: Timestamp,
    sequence: u64,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Min-heap of deferred continuations.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_sequence: u64,
}

impl TaskQueue {
    /// Queues `task` to become due `delay` after `now`.
    pub(crate) fn schedule(&mut self, now: Timestamp, delay: Duration, task: Task) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.heap.push(Reverse(Scheduled {
            due: now.saturating_add(delay),
            sequence,
            task,
        }));
    }

    /// Sequence number the next scheduled task will receive.
    ///
    /// Passing the value read at the start of a step to [`TaskQueue::pop_due`]
    /// keeps tasks queued during that step for a later one.
    pub(crate) fn cutoff(&self) -> u64 {
        self.next_sequence
    }

    /// Pops the earliest task that is due at `now` and was queued before `cutoff`.
    pub(crate) fn pop_due(&mut self, now: Timestamp, cutoff: u64) -> Option<Task> {
        let Reverse(next) = self.heap.peek()?;
        if next.due > now || next.sequence >= cutoff {
            return None;
        }
        self.heap.pop().map(|Reverse(scheduled)| scheduled.task)
    }

    /// Number of queued tasks.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drops every queued task.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}
