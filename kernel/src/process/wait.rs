//! `wait4()` (spec section 4.5): block until a child changes state, collect
//! its exit status, and reap it from the scheduler's task table.
//!
//! The teacher's version (`process::wait`, deleted after grounding) tracked
//! waiters in a side `WaitQueue` keyed by parent pid and polled with
//! `sched::yield_cpu()`. `Task::children` already gives every task its own
//! list to scan, so no side table is needed here -- blocking is done through
//! `sched::block_current()`/`sched::wake()` the same way `sync::wait_queue`
//! does it.

extern crate alloc;

use alloc::vec::Vec;

use crate::error::KernelError;
use crate::sched::task::{Task, TaskId, TaskState};
use crate::sched::{self};

/// Options controlling [`wait4`] behavior, modeled after POSIX flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    flags: u32,
}

impl WaitOptions {
    /// Do not block if no child has changed state.
    pub const WNOHANG: u32 = 1;

    pub fn from_flags(flags: u32) -> Self {
        Self { flags }
    }

    pub fn is_nohang(&self) -> bool {
        self.flags & Self::WNOHANG != 0
    }
}

/// Status returned by [`wait4`] describing how a child changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Child exited normally with the given status code.
    Exited(i32),
    /// Child was terminated by a signal.
    Signaled(i32),
}

impl WaitStatus {
    /// Encode the status as a raw `i32` matching POSIX `wstatus` layout.
    pub fn to_raw(self) -> i32 {
        match self {
            Self::Exited(code) => (code & 0xFF) << 8,
            Self::Signaled(sig) => sig & 0x7F,
        }
    }
}

/// Wait for a child of `parent` to exit.
///
/// `target` selects a specific child pid, or `None` for any child. Blocks
/// (unless `options` has `WNOHANG`) until a matching child is a zombie, then
/// reaps it from the scheduler and returns its id and status.
pub fn wait4(
    parent: &Task,
    target: Option<TaskId>,
    options: WaitOptions,
) -> Result<(TaskId, WaitStatus), KernelError> {
    loop {
        let children: Vec<TaskId> = parent.children.lock().clone();
        if let Some(target_id) = target {
            if !children.contains(&target_id) {
                return Err(KernelError::NotFound);
            }
        } else if children.is_empty() {
            return Err(KernelError::NotFound);
        }

        for child_id in &children {
            if let Some(target_id) = target {
                if *child_id != target_id {
                    continue;
                }
            }

            let Some(child) = sched::lookup(*child_id) else {
                continue;
            };
            if child.state() != TaskState::Zombie {
                continue;
            }

            let code = child.exit_code.lock().unwrap_or(0);
            parent.children.lock().retain(|id| id != child_id);
            sched::reap(*child_id);

            return Ok((*child_id, WaitStatus::Exited(code)));
        }

        if options.is_nohang() {
            return Err(KernelError::WouldBlock);
        }

        sched::block_current();
        sched::yield_now();
    }
}

/// Reap every zombie among `init`'s children whose exit status nobody will
/// ever collect. Called periodically so inherited orphans don't pile up in
/// the task table forever.
pub fn reap_orphans(init: &Task) {
    let zombies: Vec<TaskId> = init
        .children
        .lock()
        .iter()
        .filter(|id| {
            sched::lookup(**id)
                .map(|t| t.state() == TaskState::Zombie)
                .unwrap_or(false)
        })
        .copied()
        .collect();

    for id in zombies {
        init.children.lock().retain(|c| *c != id);
        sched::reap(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_options_default() {
        let opts = WaitOptions::default();
        assert!(!opts.is_nohang());
    }

    #[test]
    fn test_wait_options_nohang() {
        let opts = WaitOptions::from_flags(WaitOptions::WNOHANG);
        assert!(opts.is_nohang());
    }

    #[test]
    fn test_wait_status_exited_raw() {
        assert_eq!(WaitStatus::Exited(42).to_raw(), 42 << 8);
    }

    #[test]
    fn test_wait_status_signaled_raw() {
        assert_eq!(WaitStatus::Signaled(11).to_raw(), 11);
    }

    #[test]
    fn test_wait_status_equality() {
        assert_eq!(WaitStatus::Exited(0), WaitStatus::Exited(0));
        assert_ne!(WaitStatus::Exited(0), WaitStatus::Exited(1));
    }
}
