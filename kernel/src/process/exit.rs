//! `exit()` (spec section 4.5): tear down a task's resources, mark it a
//! zombie for its parent to reap, and reparent any orphaned children to
//! `init` (`TaskId(1)`).

extern crate alloc;

use alloc::vec::Vec;

use crate::sched::task::{Task, TaskId, TaskState};
use crate::sched::{self};
use crate::signal::{self, SIGCHLD};

const INIT_TASK: TaskId = TaskId(1);

/// Exit the calling task with `code`. Closes its files, releases its
/// address space, reparents any live children to `init`, wakes a parent
/// blocked in `wait4`, and hands control back to the scheduler -- `exit`
/// never returns.
pub fn exit(task: &Task, code: i32) -> ! {
    println!("[PROCESS] task {} exiting with code {}", task.id, code);

    task.files.close_all();
    task.address_space.lock().clear();

    reparent_children(task);

    if let Some(parent_id) = task.parent {
        // SIGCHLD is best-effort -- a parent with no handler for it still
        // gets woken by `exit_task`'s state transition below.
        let _ = signal::kill(parent_id, SIGCHLD);
    }

    sched::exit_task(task.id, code);

    // `exit_task` only returns once no other task is runnable and this one
    // has been switched away from; it leaves `task.state()` at `Zombie`
    // forever, so this point is unreachable in practice but `exit` must
    // still type as `!`.
    sched::run()
}

// `Task::parent` is set once at construction and never mutated after --
// `wait4` resolves orphans by walking `init`'s own `children` list instead
// of by reading `child.parent`, so reparenting only touches `init`'s list.
fn reparent_children(task: &Task) {
    let children: Vec<TaskId> = task.children.lock().clone();
    if children.is_empty() {
        return;
    }

    let Some(init) = sched::lookup(INIT_TASK) else {
        return;
    };

    for child_id in &children {
        if let Some(child) = sched::lookup(*child_id) {
            if child.state() != TaskState::Zombie {
                init.children.lock().push(*child_id);
            }
        }
    }
    task.children.lock().clear();
}
