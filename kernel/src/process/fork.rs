//! `fork()` (spec section 4.5): clone the caller into a new `Task` with
//! its own address space, inheriting everything else.
//!
//! The teacher's version (`process::fork`, deleted after grounding) captured
//! the live syscall frame off the kernel stack to make the child resume at
//! `fork()`'s return site with `eax = 0`. That frame capture belongs to the
//! `int 0x80` entry/return path, which isn't built yet (`syscall::mod`'s
//! dispatcher is still the capability-IPC one this tree is moving away
//! from) -- so for now the child's saved context is a copy of the parent's,
//! and setting the child's user-visible return value to 0 is the dispatcher's
//! job once it exists, not this function's.

extern crate alloc;

use alloc::sync::Arc;

use crate::error::KernelError;
use crate::mm::{frame_allocator::FrameAllocatorError, FRAME_ALLOCATOR, FRAME_SIZE};
use crate::sched::task::{alloc_task_id, Task, TaskId};
use crate::sched::{self, TaskState};

/// Kernel stacks are physically backed, single contiguous allocation --
/// spec section 3 doesn't call for a guard page and this tree has no demand
/// paging for kernel memory, so none is inserted.
pub const KERNEL_STACK_SIZE: usize = 64 * 1024;

pub(crate) fn alloc_kernel_stack() -> Result<usize, KernelError> {
    let pages = KERNEL_STACK_SIZE.div_ceil(FRAME_SIZE);
    let frame = FRAME_ALLOCATOR
        .lock()
        .allocate_frames(pages, None)
        .map_err(|e| match e {
            FrameAllocatorError::OutOfMemory => KernelError::NoMemory,
            _ => KernelError::InvalidArgument,
        })?;
    let phys = frame.as_addr().as_u64();
    let virt = crate::mm::phys_to_virt_addr(phys);
    // SAFETY: `virt` is the identity-mapped address of frames just taken
    // from the allocator, so nothing else can be reading or writing them.
    unsafe { core::ptr::write_bytes(virt as *mut u8, 0, KERNEL_STACK_SIZE) };
    Ok(virt + KERNEL_STACK_SIZE)
}

/// Fork `parent` into a new, runnable child task. Returns the child's id
/// (what the parent's `fork()` syscall returns).
pub fn fork(parent: &Task) -> Result<TaskId, KernelError> {
    let child_space = parent.address_space.lock().fork()?;
    let kernel_stack = alloc_kernel_stack()?;
    let child_id = alloc_task_id();

    let mut child = Task::new(
        child_id,
        Some(parent.id),
        parent.name.clone(),
        child_space,
        kernel_stack,
    );

    child.priority = parent.priority;
    *child.context.lock() = *parent.context.lock();
    *child.credentials.lock() = *parent.credentials.lock();
    *child.cwd.lock() = parent.cwd.lock().clone();
    child.files = Arc::new(parent.files.clone_for_fork());
    child.set_state(TaskState::Creating);

    parent.children.lock().push(child_id);

    sched::spawn(Arc::new(child));
    Ok(child_id)
}
