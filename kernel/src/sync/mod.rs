//! Synchronization primitives (spec section 4.3).
//!
//! `Spinlock` (IRQ-safe critical sections) and `WaitQueue` (sleep/wake)
//! are the two primitives most of the kernel builds on. `Semaphore`,
//! `Mutex`, and `RwLock` layer blocking (rather than spinning) critical
//! sections over `WaitQueue`; `Workqueue` defers work off interrupt
//! context; `Ktimer`/`KtimerList` back `crate::timer`'s sorted wake-tick
//! list. `GlobalState` covers the teacher's "lazily-initialized global
//! singleton" pattern (e.g. the IRQ manager, the scheduler's task table)
//! on top of `spin::Once` rather than a hand-rolled lock-free cell.

pub mod ktimer;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;
pub mod spinlock;
pub mod wait_queue;
pub mod workqueue;

pub use ktimer::{Ktimer, KtimerList};
pub use mutex::{Mutex, MutexGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use semaphore::Semaphore;
pub use spinlock::{Spinlock, SpinlockGuard};
pub use wait_queue::WaitQueue;
pub use workqueue::{WorkItem, Workqueue};

use spin::Once;

/// A value set exactly once, then read freely. Covers globals whose
/// initializer needs a runtime argument `lazy_static!` can't supply
/// (e.g. the multiboot info pointer).
pub struct GlobalState<T> {
    inner: Once<T>,
}

impl<T> GlobalState<T> {
    pub const fn new() -> Self {
        Self { inner: Once::new() }
    }

    pub fn set(&self, value: T) {
        self.inner.call_once(|| value);
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.get()
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        self.inner.call_once(init)
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init() {
    crate::println!("[SYNC] synchronization primitives ready");
}
