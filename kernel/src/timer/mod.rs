//! Kernel timer subsystem (spec sections 4.3 and 8).
//!
//! Layers the `TimerId`/`TimerMode` one-shot/periodic vocabulary over
//! [`crate::sync::{Ktimer, KtimerList}`], so callers keep a small,
//! syscall-friendly API while the underlying sorted wake-tick list
//! satisfies spec section 8's "the global timer list iterates in
//! non-decreasing wake-tick order" invariant directly off
//! [`KtimerList::insert`]'s placement, rather than a flat array scanned
//! every tick.
//!
//! # Usage
//!
//! ```ignore
//! timer::init();
//! let id = timer::create_timer(TimerMode::OneShot, 100, my_callback)?;
//! timer::cancel_timer(id)?;
//! timer::timer_tick(elapsed_ms); // called from the timer interrupt handler
//! let uptime = timer::get_uptime_ms();
//! ```

use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::{KernelError, KernelResult};
use crate::sync::{GlobalState, Ktimer, KtimerList, Spinlock};

/// Opaque timer handle returned by [`create_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Periodic,
}

/// Fired with the expired [`Ktimer`] itself, so a callback can read back
/// its own interval or wake tick without a side lookup table.
pub type TimerCallback = fn(&Ktimer);

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);
static UPTIME_MS: AtomicU64 = AtomicU64::new(0);

// A `Spinlock`, not a blocking `Mutex`: `timer_tick` runs from interrupt
// context, where sleeping to acquire a lock isn't an option.
static TIMERS: GlobalState<Spinlock<KtimerList>> = GlobalState::new();

pub fn init() {
    TIMERS.get_or_init(|| Spinlock::new(KtimerList::new()));
    crate::println!("[TIMER] timer subsystem initialized");
}

/// Arm a new timer `interval_ms` milliseconds from now.
///
/// # Errors
/// - `KernelError::InvalidArgument` if `interval_ms` is zero.
/// - `KernelError::NotFound` if the subsystem hasn't been initialized.
pub fn create_timer(mode: TimerMode, interval_ms: u64, callback: TimerCallback) -> KernelResult<TimerId> {
    if interval_ms == 0 {
        return Err(KernelError::InvalidArgument);
    }
    let timers = TIMERS.get().ok_or(KernelError::NotFound)?;

    let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
    let now = UPTIME_MS.load(Ordering::Relaxed);
    let interval_ticks = match mode {
        TimerMode::OneShot => 0,
        TimerMode::Periodic => interval_ms,
    };

    timers.lock().insert(Ktimer {
        id,
        wake_tick: now + interval_ms,
        interval_ticks,
        callback,
    });

    Ok(TimerId(id))
}

/// Disarm a timer before it fires. A timer that has already fired (and,
/// if one-shot, been dropped from the list) also returns `NotFound` here.
pub fn cancel_timer(id: TimerId) -> KernelResult<()> {
    let timers = TIMERS.get().ok_or(KernelError::NotFound)?;
    if timers.lock().remove(id.0) {
        Ok(())
    } else {
        Err(KernelError::NotFound)
    }
}

/// Advance uptime by `elapsed_ms` and fire every timer whose wake tick has
/// now passed. Called from the architecture timer interrupt handler.
pub fn timer_tick(elapsed_ms: u64) {
    let now = UPTIME_MS.fetch_add(elapsed_ms, Ordering::Relaxed) + elapsed_ms;
    let Some(timers) = TIMERS.get() else {
        return;
    };
    let fired = timers.lock().expire(now);
    for timer in &fired {
        (timer.callback)(timer);
    }
}

/// Monotonic uptime in milliseconds since [`init`].
pub fn get_uptime_ms() -> u64 {
    UPTIME_MS.load(Ordering::Relaxed)
}

/// Number of timers still armed.
pub fn pending_timer_count() -> usize {
    TIMERS.get().map(|timers| timers.lock().len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate alloc;

    fn noop(_: &Ktimer) {}

    fn fresh() -> Spinlock<KtimerList> {
        Spinlock::new(KtimerList::new())
    }

    #[test]
    fn one_shot_fires_once_and_is_removed() {
        let timers = fresh();
        timers.lock().insert(Ktimer { id: 1, wake_tick: 10, interval_ticks: 0, callback: noop });
        let fired = timers.lock().expire(10);
        assert_eq!(fired.len(), 1);
        assert!(timers.lock().is_empty());
    }

    #[test]
    fn periodic_timer_reloads_after_firing() {
        let timers = fresh();
        timers.lock().insert(Ktimer { id: 1, wake_tick: 10, interval_ticks: 10, callback: noop });
        let fired = timers.lock().expire(10);
        assert_eq!(fired.len(), 1);
        assert_eq!(timers.lock().len(), 1);
        assert_eq!(timers.lock().iter().next().unwrap().wake_tick, 20);
    }

    #[test]
    fn cancel_removes_pending_timer() {
        let timers = fresh();
        timers.lock().insert(Ktimer { id: 1, wake_tick: 10, interval_ticks: 0, callback: noop });
        assert!(timers.lock().remove(1));
        assert!(timers.lock().is_empty());
    }

    #[test]
    fn cancel_nonexistent_timer_fails() {
        let timers = fresh();
        assert!(!timers.lock().remove(42));
    }

    #[test]
    fn list_stays_sorted_by_wake_tick_as_timers_expire() {
        let timers = fresh();
        timers.lock().insert(Ktimer { id: 1, wake_tick: 30, interval_ticks: 0, callback: noop });
        timers.lock().insert(Ktimer { id: 2, wake_tick: 10, interval_ticks: 0, callback: noop });
        timers.lock().insert(Ktimer { id: 3, wake_tick: 20, interval_ticks: 0, callback: noop });
        let ticks: alloc::vec::Vec<u64> = timers.lock().iter().map(|t| t.wake_tick).collect();
        assert_eq!(ticks, alloc::vec![10, 20, 30]);
        let fired = timers.lock().expire(20);
        assert_eq!(
            fired.iter().map(|t| t.id).collect::<alloc::vec::Vec<_>>(),
            alloc::vec![2, 3]
        );
    }
}
