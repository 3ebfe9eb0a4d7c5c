//! Ready queue (spec section 3's run queue).
//!
//! The teacher's `PriorityQueue` is a circular buffer of raw `TaskPtr`s
//! sized for an SMP per-CPU run queue. With SMP out of scope and tasks
//! owned by `Arc` in a global table (`sched::TASKS`), a `VecDeque<TaskId>`
//! per priority bucket is simpler and needs no unsafe pointer lifetime
//! reasoning -- the same `alloc`-collection-over-intrusive-list
//! preference the teacher applies elsewhere (`fs::pipe`'s buffer,
//! `process::table`'s task map).

use alloc::collections::VecDeque;

use super::task::{TaskId, Priority, PRIORITY_LEVELS};
use crate::sync::Spinlock;

pub struct ReadyQueue {
    buckets: [Spinlock<VecDeque<TaskId>>; PRIORITY_LEVELS],
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            buckets: [
                Spinlock::new(VecDeque::new()),
                Spinlock::new(VecDeque::new()),
                Spinlock::new(VecDeque::new()),
                Spinlock::new(VecDeque::new()),
            ],
        }
    }

    pub fn push(&self, priority: Priority, id: TaskId) {
        self.buckets[priority.bucket()].lock().push_back(id);
    }

    /// Pop the highest-priority ready task, scanning buckets low-to-high.
    pub fn pop(&self) -> Option<TaskId> {
        for bucket in &self.buckets {
            if let Some(id) = bucket.lock().pop_front() {
                return Some(id);
            }
        }
        None
    }

    pub fn remove(&self, id: TaskId) {
        for bucket in &self.buckets {
            bucket.lock().retain(|&t| t != id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.lock().is_empty())
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
