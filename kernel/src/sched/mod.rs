//! The scheduler (spec section 3/4.3): a global task table plus a
//! priority-bucketed ready queue, round-robin within a bucket.
//!
//! There being exactly one CPU keeps this simple: `CURRENT` is a single
//! `TaskId`, not a per-CPU slot, and `schedule()` is only ever entered
//! with interrupts disabled (either because a `Spinlock` is held or
//! because the caller is the timer interrupt handler) so no second
//! invocation can race it.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

pub mod queue;
pub mod task;

pub use queue::ReadyQueue;
pub use task::{Credentials, Priority, Task, TaskContext, TaskId, TaskState};

use crate::sync::Spinlock;

static TASKS: Spinlock<BTreeMap<TaskId, Arc<Task>>> = Spinlock::new(BTreeMap::new());
static READY: ReadyQueue = ReadyQueue::new();
static CURRENT: Spinlock<Option<TaskId>> = Spinlock::new(None);

pub fn init() {
    println!("[SCHED] Initializing scheduler...");
    println!("[SCHED] Scheduler initialized");
}

/// Register `task` in the global table and make it runnable. Used by
/// `process::fork` and by whatever builds the first (`init`) task.
pub fn spawn(task: Arc<Task>) -> TaskId {
    let id = task.id;
    let priority = task.priority;
    task.set_state(TaskState::Ready);
    TASKS.lock().insert(id, task);
    READY.push(priority, id);
    id
}

/// Look up a task by id. Returns `None` once it has been reaped.
pub fn lookup(id: TaskId) -> Option<Arc<Task>> {
    TASKS.lock().get(&id).cloned()
}

/// Remove a task from the table entirely, for `wait4` reaping a zombie.
pub fn reap(id: TaskId) -> Option<Arc<Task>> {
    READY.remove(id);
    TASKS.lock().remove(&id)
}

pub fn current_task_id() -> TaskId {
    CURRENT
        .lock()
        .expect("sched::current_task_id called with no task running")
}

pub fn current_task() -> Option<Arc<Task>> {
    let id = *CURRENT.lock();
    id.and_then(lookup)
}

/// Mark the calling task `Blocked`. The caller is responsible for
/// registering it on whatever queue will `wake` it back up -- this just
/// takes it out of `READY` so `schedule()` won't pick it.
pub fn block_current() {
    if let Some(task) = current_task() {
        task.set_state(TaskState::Blocked);
    }
}

/// Move `id` back to `Ready` and onto the run queue. No-op if it isn't
/// currently blocked or sleeping (e.g. a duplicate wakeup).
pub fn wake(id: TaskId) {
    if let Some(task) = lookup(id) {
        match task.state() {
            TaskState::Blocked | TaskState::Sleeping => {
                task.set_state(TaskState::Ready);
                READY.push(task.priority, id);
            }
            _ => {}
        }
    }
}

/// Voluntarily give up the CPU, re-queuing the caller (if still
/// runnable) behind whatever else is ready.
pub fn yield_now() {
    schedule(true);
}

/// Mark `id` a zombie with the given exit status. The task stays in
/// `TASKS` (a future `wait4` reads `exit_code` from it) but is pulled
/// off the ready queue; if it's the running task, this falls through to
/// `schedule()` immediately since it can never run again.
pub fn exit_task(id: TaskId, code: i32) {
    let Some(task) = lookup(id) else { return };
    *task.exit_code.lock() = Some(code);
    task.set_state(TaskState::Zombie);
    READY.remove(id);

    if CURRENT.lock().as_ref() == Some(&id) {
        schedule(false);
    }
}

/// Pick the next task and switch to it if it differs from the one
/// running. `voluntary` only affects which of `Task::stats`'s two
/// switch counters the outgoing task's stop is attributed to.
fn schedule(voluntary: bool) {
    let current_id = *CURRENT.lock();

    let Some(next_id) = READY.pop() else {
        // Nothing else runnable; let the caller fall through to
        // `arch::idle()` rather than spin here with IRQs disabled.
        return;
    };

    if Some(next_id) == current_id {
        return;
    }

    let Some(next_task) = lookup(next_id) else {
        return;
    };

    let current_task = current_id.and_then(lookup);
    if let Some(task) = &current_task {
        task.mark_scheduled(voluntary);
        if task.state() == TaskState::Running {
            task.set_state(TaskState::Ready);
            READY.push(task.priority, task.id);
        }
    }

    next_task.set_state(TaskState::Running);
    *CURRENT.lock() = Some(next_id);

    // SAFETY: both pointers stay valid across the switch because the
    // `Arc<Task>`s they come from are kept alive in `TASKS` for as long
    // as either task exists; the lock guards are dropped before the
    // switch so the (possibly very long) time spent off-CPU inside
    // `switch_to` never holds them.
    let current_ctx: *mut TaskContext = current_task
        .as_ref()
        .map(|t| &mut *t.context.lock() as *mut TaskContext)
        .unwrap_or(core::ptr::null_mut());
    let next_ctx: *const TaskContext = &*next_task.context.lock();

    if current_ctx.is_null() {
        // First switch out of the boot stack: there is no outgoing
        // context to save into, only one to load.
        let mut throwaway = TaskContext::default();
        unsafe { crate::arch::context::switch_to(&mut throwaway, next_ctx) };
    } else {
        unsafe { crate::arch::context::switch_to(current_ctx, next_ctx) };
    }
}

/// Timer-tick entry point (spec section 4.3's preemption): called from
/// the timer interrupt handler with the outgoing task's runtime already
/// charged, to pick a new task if the time slice ran out.
pub fn tick() {
    if let Some(task) = current_task() {
        task.update_runtime(1);
    }
    schedule(false);
}

pub fn run() -> ! {
    println!("[SCHED] Entering scheduler main loop");
    loop {
        schedule(false);
        crate::arch::idle();
    }
}
