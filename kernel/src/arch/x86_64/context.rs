//! Context switching for 32-bit protected mode.
//!
//! `sched::task::TaskContext` holds exactly the state a C-calling-convention
//! function needs to resume another task: the callee-saved registers, the
//! stack pointer, the return address, and the page directory to switch to.
//! `switch_to` is the teacher's `context_switch` shape (raw assembly, save
//! then restore) narrowed from the 64-bit SysV register set to 32-bit
//! `cdecl`'s callee-saved set (`ebx`, `esi`, `edi`, `ebp`).

use core::arch::asm;

use crate::sched::task::TaskContext;

/// Switch the CPU from `current`'s context to `next`'s.
///
/// # Safety
/// Caller must hold the scheduler lock (so no other CPU observes `current`
/// mid-save) and `next` must be a context previously saved by this
/// function or built by [`TaskContext::new`].
#[no_mangle]
pub unsafe extern "C" fn switch_to(current: *mut TaskContext, next: *const TaskContext) {
    // SAFETY: `current`/`next` are valid `TaskContext` pointers per the
    // function's safety contract; the assembly only ever dereferences
    // them at the documented field offsets.
    unsafe {
        asm!(
            // Save callee-saved registers and esp into *current.
            "mov [eax + 0], edi",
            "mov [eax + 4], esi",
            "mov [eax + 8], ebx",
            "mov [eax + 12], ebp",
            "mov [eax + 16], esp",
            "lea ecx, [2f]",
            "mov [eax + 20], ecx", // eip: resume address on next switch-back
            "pushfd",
            "pop ecx",
            "mov [eax + 24], ecx", // eflags

            // Load next's cr3 if it differs, then its callee-saved state.
            "mov ecx, [edx + 28]", // next.cr3
            "mov eax, cr3",
            "cmp eax, ecx",
            "je 1f",
            "mov cr3, ecx",
            "1:",
            "mov edi, [edx + 0]",
            "mov esi, [edx + 4]",
            "mov ebx, [edx + 8]",
            "mov ebp, [edx + 12]",
            "mov esp, [edx + 16]",
            "push dword ptr [edx + 24]", // eflags
            "popfd",
            "jmp dword ptr [edx + 20]", // eip
            "2:",
            "ret",
            in("eax") current,
            in("edx") next,
            options(noreturn),
        )
    }
}
