//! Blocking read/write lock (spec section 4.3).
//!
//! Built the same way as [`super::Mutex`]: a task that can't take the lock
//! blocks on a wait queue rather than spinning, unlike `spin::RwLock`
//! (which the VFS table still uses directly where spinning for a short
//! lookup is fine).

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicIsize, Ordering};

use crate::sync::WaitQueue;

/// `state`: 0 = free, -1 = writer held, n > 0 = n readers held.
pub struct RwLock<T> {
    state: AtomicIsize,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicIsize::new(0),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.waiters.wait_until(|| self.try_add_reader());
        RwLockReadGuard { lock: self }
    }

    fn try_add_reader(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current < 0 {
                return false;
            }
            if self
                .state
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.waiters.wait_until(|| {
            self.state
                .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        });
        RwLockWriteGuard { lock: self }
    }
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a read guard guarantees `state > 0`, which
        // excludes any writer from holding `&mut T`.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Ordering::AcqRel);
        self.lock.waiters.wake_all();
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a write guard guarantees exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Deref`.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(0, Ordering::Release);
        self.lock.waiters.wake_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_readers_allowed() {
        let lock = RwLock::new(42);
        let r1 = lock.read();
        let r2 = lock.read();
        assert_eq!(*r1, 42);
        assert_eq!(*r2, 42);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = RwLock::new(0);
        let w = lock.write();
        assert_eq!(lock.state.load(Ordering::Acquire), -1);
        drop(w);
        assert_eq!(lock.state.load(Ordering::Acquire), 0);
    }

    #[test]
    fn write_guard_mutates() {
        let lock = RwLock::new(1);
        *lock.write() += 1;
        assert_eq!(*lock.read(), 2);
    }
}
