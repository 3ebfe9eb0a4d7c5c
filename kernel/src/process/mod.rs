//! Process management (spec section 4.5): the POSIX-facing operations
//! built on top of `sched::task::Task`.
//!
//! The teacher split this into `lifecycle`/`memory`/`pcb`/`sync`/`table`/
//! `thread` around its `Process`+`Thread`+capability-space model; none of
//! that survives the collapse to a single `Task` per `sched::task`, so this
//! module is just `cwd`/`fork`/`exit`/`wait` plus `init()`.

extern crate alloc;

use alloc::sync::Arc;

use crate::mm::vas::VirtualAddressSpace;
use crate::sched::task::{Task, TaskId};
use crate::sched::{self, Priority};

pub mod cwd;
pub mod exit;
pub mod fork;
pub mod wait;

pub use wait::{WaitOptions, WaitStatus};

/// `TaskId` of the first task, reparented orphans' new parent.
pub const INIT_TASK: TaskId = TaskId(1);

/// Build and spawn the first task.
///
/// `exec::` (ELF loading) doesn't exist yet, so `init` starts out as a bare
/// kernel-side task with its own (otherwise-empty) address space rather
/// than one running a loaded `/sbin/init` binary -- whatever userspace
/// story this kernel ends up with will replace this function's body with
/// a real `exec` of the init binary, not change its signature.
pub fn init() {
    println!("[PROCESS] Initializing process management...");

    let mut space = VirtualAddressSpace::new();
    if let Err(e) = space.init() {
        panic!("[PROCESS] failed to build init task's address space: {e}");
    }

    let kernel_stack = fork::alloc_kernel_stack()
        .unwrap_or_else(|e| panic!("[PROCESS] failed to allocate init task's kernel stack: {e}"));

    let mut init_task = Task::new(
        INIT_TASK,
        None,
        alloc::string::String::from("init"),
        space,
        kernel_stack,
    );
    init_task.priority = Priority::System;

    sched::spawn(Arc::new(init_task));

    println!("[PROCESS] Process management initialized");
}

/// Look up the currently running task. Panics if called before `sched`
/// has a task selected (i.e. before `sched::run()`).
pub fn current() -> Arc<Task> {
    sched::current_task().expect("process::current() called with no task running")
}
