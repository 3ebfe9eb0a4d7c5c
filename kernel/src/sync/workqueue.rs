//! Work queue (spec section 4.3): defers a unit of work off an interrupt
//! handler onto a task context that can block, allocate, and take
//! ordinary locks.
//!
//! `Mutex<VecDeque<Arc<WorkItem>>>` over an intrusive list, the same
//! `alloc`-collection preference the teacher shows for `fs::pipe`'s ring
//! buffer and `process::pcb`'s task table.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use crate::sync::{Spinlock, WaitQueue};

pub struct WorkItem {
    pub run: fn(),
}

impl WorkItem {
    pub const fn new(run: fn()) -> Self {
        Self { run }
    }
}

pub struct Workqueue {
    queue: Spinlock<VecDeque<Arc<WorkItem>>>,
    waiters: WaitQueue,
}

impl Workqueue {
    pub const fn new() -> Self {
        Self {
            queue: Spinlock::new(VecDeque::new()),
            waiters: WaitQueue::new(),
        }
    }

    pub fn submit(&self, item: Arc<WorkItem>) {
        self.queue.lock().push_back(item);
        self.waiters.wake_one();
    }

    /// Block until work is available, then run exactly one item.
    pub fn run_one(&self) {
        self.waiters.wait_until(|| !self.queue.lock().is_empty());
        if let Some(item) = self.queue.lock().pop_front() {
            (item.run)();
        }
    }

    /// Run every item currently queued without blocking.
    pub fn drain(&self) {
        while let Some(item) = self.queue.lock().pop_front() {
            (item.run)();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for Workqueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static RAN: AtomicUsize = AtomicUsize::new(0);

    fn bump() {
        RAN.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn drain_runs_every_item_fifo() {
        RAN.store(0, Ordering::Relaxed);
        let wq = Workqueue::new();
        wq.submit(Arc::new(WorkItem::new(bump)));
        wq.submit(Arc::new(WorkItem::new(bump)));
        assert!(!wq.is_empty());
        wq.drain();
        assert!(wq.is_empty());
        assert_eq!(RAN.load(Ordering::Relaxed), 2);
    }
}
