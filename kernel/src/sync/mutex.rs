//! Blocking mutex (spec section 4.3).
//!
//! Unlike [`super::Spinlock`], a task that can't take the lock blocks on a
//! wait queue instead of spinning with interrupts disabled -- appropriate
//! for critical sections long enough that holding off interrupts for their
//! whole duration would hurt latency. Built on [`super::Semaphore`] the
//! same way the teacher builds higher-level primitives over `spin::Mutex`.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::sync::Semaphore;

pub struct Mutex<T> {
    sem: Semaphore,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            sem: Semaphore::new(1),
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.sem.acquire();
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.sem.try_acquire() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the semaphore permit held by this guard is the only way
        // to obtain a reference to `data`.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Deref`; the guard has exclusive access while held.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.sem.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_excludes_try_lock() {
        let mutex = Mutex::new(0);
        let guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn guard_gives_mutable_access() {
        let mutex = Mutex::new(5);
        *mutex.lock() += 1;
        assert_eq!(*mutex.lock(), 6);
    }
}
