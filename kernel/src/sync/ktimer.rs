//! Kernel timer object (spec section 4.3), and the sorted list
//! [`crate::timer`] arms them on.
//!
//! `callback: fn(&Ktimer)` is a plain function pointer rather than a boxed
//! closure, matching `irq::IrqHandler`'s preference for raw fn pointers on
//! hot paths over trait objects.

extern crate alloc;

use alloc::vec::Vec;
use core::cmp::Ordering;

/// A single armed timer. `wake_tick` is an absolute tick value (not a
/// relative delay), so a list of these stays sorted without rescanning it
/// on every tick.
#[derive(Clone, Copy)]
pub struct Ktimer {
    pub id: u64,
    pub wake_tick: u64,
    pub interval_ticks: u64,
    pub callback: fn(&Ktimer),
}

impl Ktimer {
    pub fn is_periodic(&self) -> bool {
        self.interval_ticks > 0
    }
}

impl PartialEq for Ktimer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Ktimer {}

impl PartialOrd for Ktimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Ktimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wake_tick.cmp(&other.wake_tick).then(self.id.cmp(&other.id))
    }
}

/// Sorted list of armed timers, ascending by wake tick -- spec section 8's
/// invariant that the global timer list "iterates in non-decreasing
/// wake-tick order" holds directly off `insert`'s placement, not off a
/// separate sort pass.
pub struct KtimerList {
    timers: Vec<Ktimer>,
}

impl KtimerList {
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    pub fn insert(&mut self, timer: Ktimer) {
        let pos = self.timers.partition_point(|t| t.wake_tick <= timer.wake_tick);
        self.timers.insert(pos, timer);
    }

    pub fn remove(&mut self, id: u64) -> bool {
        match self.timers.iter().position(|t| t.id == id) {
            Some(pos) => {
                self.timers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Pop every timer whose wake tick has passed `now`, reinserting
    /// periodic ones at their next interval. Returns the fired timers so
    /// the caller can run callbacks outside the list's lock.
    pub fn expire(&mut self, now: u64) -> Vec<Ktimer> {
        let split = self.timers.partition_point(|t| t.wake_tick <= now);
        let fired: Vec<Ktimer> = self.timers.drain(..split).collect();
        for timer in &fired {
            if timer.is_periodic() {
                self.insert(Ktimer {
                    wake_tick: now + timer.interval_ticks,
                    ..*timer
                });
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ktimer> {
        self.timers.iter()
    }
}

impl Default for KtimerList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Ktimer) {}

    #[test]
    fn insert_keeps_non_decreasing_wake_ticks() {
        let mut list = KtimerList::new();
        list.insert(Ktimer { id: 1, wake_tick: 50, interval_ticks: 0, callback: noop });
        list.insert(Ktimer { id: 2, wake_tick: 10, interval_ticks: 0, callback: noop });
        list.insert(Ktimer { id: 3, wake_tick: 30, interval_ticks: 0, callback: noop });
        let ticks: Vec<u64> = list.iter().map(|t| t.wake_tick).collect();
        assert_eq!(ticks, alloc::vec![10, 30, 50]);
    }

    #[test]
    fn expire_reinserts_periodic_timers() {
        let mut list = KtimerList::new();
        list.insert(Ktimer { id: 1, wake_tick: 100, interval_ticks: 100, callback: noop });
        let fired = list.expire(100);
        assert_eq!(fired.len(), 1);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().wake_tick, 200);
    }

    #[test]
    fn expire_leaves_future_timers_in_place() {
        let mut list = KtimerList::new();
        list.insert(Ktimer { id: 1, wake_tick: 10, interval_ticks: 0, callback: noop });
        list.insert(Ktimer { id: 2, wake_tick: 200, interval_ticks: 0, callback: noop });
        let fired = list.expire(50);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_drops_timer() {
        let mut list = KtimerList::new();
        list.insert(Ktimer { id: 1, wake_tick: 10, interval_ticks: 0, callback: noop });
        assert!(list.remove(1));
        assert!(!list.remove(1));
        assert_eq!(list.len(), 0);
    }
}
