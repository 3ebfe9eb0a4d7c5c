//! IRQ-safe spinlock.
//!
//! Wraps `spin::Mutex` the way the teacher uses it everywhere (e.g.
//! `fs::pipe::PipeState = Arc<Mutex<PipeInner>>`), but additionally
//! disables interrupts for the critical section and restores the prior
//! `IF` flag on drop. Needed because this kernel runs interrupt
//! handlers on the same stack as the task they preempted: without
//! disabling IRQs, a handler could try to retake a lock its own
//! interrupted task already holds.

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

pub struct Spinlock<T> {
    inner: Mutex<T>,
}

pub struct SpinlockGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    was_enabled: bool,
}

impl<T> Spinlock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        let was_enabled = crate::arch::irq_enabled();
        crate::arch::disable_irq_local();
        SpinlockGuard {
            guard: self.inner.lock(),
            was_enabled,
        }
    }

    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        let was_enabled = crate::arch::irq_enabled();
        crate::arch::disable_irq_local();
        match self.inner.try_lock() {
            Some(guard) => Some(SpinlockGuard {
                guard,
                was_enabled,
            }),
            None => {
                if was_enabled {
                    crate::arch::enable_irq_local();
                }
                None
            }
        }
    }
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        if self.was_enabled {
            crate::arch::enable_irq_local();
        }
    }
}
