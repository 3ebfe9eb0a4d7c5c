//! POSIX-style signal delivery (spec section 4.6).
//!
//! Each `Task` owns a `SignalState`: a 32-bit pending set, a 32-bit
//! blocked set, and 32 `SigAction` slots. Delivery happens at a single
//! well-defined boundary -- the return path to user mode, in
//! `deliver_pending` -- rather than asynchronously, so a handler never
//! runs in the middle of kernel code. `SIGKILL`/`SIGSTOP` can never be
//! blocked, caught, or ignored; `sanitize` enforces that on every write
//! to the blocked set or action table.
//!
//! Grounded in the teacher's `process::signal_delivery` (frame layout,
//! trampoline-then-sigreturn shape) but reworked for the 32-bit
//! protected-mode ABI: registers are the `irq_frame` pushed by the
//! `int 0x80` gate, not the x86_64 SysV context the teacher saves.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::x86_64::idt::IrqFrame;
use crate::error::KernelError;
use crate::sync::Spinlock;

pub const NSIG: usize = 32;

pub const SIGHUP: usize = 1;
pub const SIGINT: usize = 2;
pub const SIGQUIT: usize = 3;
pub const SIGILL: usize = 4;
pub const SIGTRAP: usize = 5;
pub const SIGABRT: usize = 6;
pub const SIGBUS: usize = 7;
pub const SIGFPE: usize = 8;
pub const SIGKILL: usize = 9;
pub const SIGUSR1: usize = 10;
pub const SIGSEGV: usize = 11;
pub const SIGUSR2: usize = 12;
pub const SIGPIPE: usize = 13;
pub const SIGALRM: usize = 14;
pub const SIGTERM: usize = 15;
pub const SIGCHLD: usize = 17;
pub const SIGCONT: usize = 18;
pub const SIGSTOP: usize = 19;
pub const SIGTSTP: usize = 20;
pub const SIGURG: usize = 23;
pub const SIGWINCH: usize = 28;

/// Handler value for "apply the default action".
pub const SIG_DFL: usize = 0;
/// Handler value for "ignore".
pub const SIG_IGN: usize = 1;

const UNBLOCKABLE: u32 = (1 << SIGKILL) | (1 << SIGSTOP);

fn bit(signum: usize) -> u32 {
    1u32 << signum
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    TerminateWithCore,
    Stop,
    Continue,
    Ignore,
}

/// Default disposition table, indexed by signal number (spec section 4.6:
/// "terminate, terminate-with-core, stop, continue, or ignore according
/// to signal number").
pub fn default_action(signum: usize) -> DefaultAction {
    match signum {
        SIGCHLD | SIGURG | SIGWINCH => DefaultAction::Ignore,
        SIGCONT => DefaultAction::Continue,
        SIGSTOP | SIGTSTP => DefaultAction::Stop,
        SIGQUIT | SIGILL | SIGABRT | SIGBUS | SIGFPE | SIGSEGV | SIGTRAP => {
            DefaultAction::TerminateWithCore
        }
        _ => DefaultAction::Terminate,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SigAction {
    /// `SIG_DFL`, `SIG_IGN`, or a user-space handler address.
    pub handler: usize,
    /// Additional signals blocked for the duration of the handler.
    pub mask: u32,
}

impl Default for SigAction {
    fn default() -> Self {
        Self {
            handler: SIG_DFL,
            mask: 0,
        }
    }
}

/// Frame pushed onto the user stack on delivery (spec section 4.6): the
/// interrupted `irq_frame`, the blocked set to restore on return, and the
/// trampoline return address the handler's `ret` lands on.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SignalFrame {
    pub trampoline_ret: u32,
    pub signum: u32,
    pub saved_blocked: u32,
    pub irq_frame: IrqFrame,
}

/// Per-task signal state: pending/blocked sets and the 32 action slots.
pub struct SignalState {
    pending: AtomicU32,
    blocked: AtomicU32,
    actions: Spinlock<[SigAction; NSIG]>,
}

impl SignalState {
    pub fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            blocked: AtomicU32::new(0),
            actions: Spinlock::new([SigAction::default(); NSIG]),
        }
    }

    pub fn raise(&self, signum: usize) -> Result<(), KernelError> {
        if signum == 0 || signum >= NSIG {
            return Err(KernelError::InvalidArgument);
        }
        self.pending.fetch_or(bit(signum), Ordering::SeqCst);
        Ok(())
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn blocked(&self) -> u32 {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Unblocked, pending signals -- what `deliver_pending` walks.
    pub fn deliverable(&self) -> u32 {
        self.pending() & !self.blocked()
    }

    pub fn set_blocked(&self, mask: u32) {
        self.blocked.store(mask & !UNBLOCKABLE, Ordering::SeqCst);
    }

    pub fn block(&self, mask: u32) {
        self.blocked
            .fetch_or(mask & !UNBLOCKABLE, Ordering::SeqCst);
    }

    pub fn unblock(&self, mask: u32) {
        self.blocked.fetch_and(!mask, Ordering::SeqCst);
    }

    pub fn clear_pending(&self, signum: usize) {
        self.pending.fetch_and(!bit(signum), Ordering::SeqCst);
    }

    pub fn action(&self, signum: usize) -> SigAction {
        self.actions.lock()[signum]
    }

    pub fn set_action(&self, signum: usize, mut action: SigAction) -> Result<(), KernelError> {
        if signum == 0 || signum >= NSIG {
            return Err(KernelError::InvalidArgument);
        }
        if signum == SIGKILL || signum == SIGSTOP {
            return Err(KernelError::InvalidArgument);
        }
        action.mask &= !UNBLOCKABLE;
        self.actions.lock()[signum] = action;
        Ok(())
    }

    /// Take the lowest-numbered deliverable signal, if any, marking it
    /// no longer pending. Used by both `sigwait` (which stops here) and
    /// `deliver_pending` (which goes on to build a frame or apply the
    /// default action).
    pub fn take_deliverable(&self) -> Option<usize> {
        let mask = self.deliverable();
        if mask == 0 {
            return None;
        }
        let signum = mask.trailing_zeros() as usize;
        self.clear_pending(signum);
        Some(signum)
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

/// `kill(pid, sig)` (spec section 4.5): locate the target, set its
/// pending bit, wake it if `INTERRUPTIBLE_SLEEPING`, and for `SIGCONT`
/// transition `STOPPED` back to `RUNNING`.
pub fn kill(target: crate::sched::TaskId, signum: usize) -> Result<(), KernelError> {
    let task = crate::sched::lookup(target).ok_or(KernelError::NotFound)?;
    task.signals.raise(signum)?;
    if signum == SIGCONT {
        task.set_state(crate::sched::task::TaskState::Ready);
    }
    crate::sched::wake(target);
    Ok(())
}

/// Called on the return path to user mode (spec section 4.6). Builds a
/// signal frame for the first deliverable handler-backed signal and
/// redirects `frame` to it; applies in-kernel default actions
/// (terminate/stop/continue/ignore) for the rest without leaving the
/// kernel.
pub fn deliver_pending(task: &crate::sched::task::Task, frame: &mut IrqFrame) {
    loop {
        let signum = match task.signals.take_deliverable() {
            Some(s) => s,
            None => return,
        };
        let action = task.signals.action(signum);
        match action.handler {
            SIG_IGN => continue,
            SIG_DFL => {
                apply_default_action(task, signum);
                continue;
            }
            handler => {
                deliver_to_handler(task, frame, signum, handler, action.mask);
                return;
            }
        }
    }
}

fn apply_default_action(task: &crate::sched::task::Task, signum: usize) {
    match default_action(signum) {
        DefaultAction::Ignore => {}
        DefaultAction::Continue => task.set_state(crate::sched::task::TaskState::Ready),
        DefaultAction::Stop => task.set_state(crate::sched::task::TaskState::Sleeping),
        DefaultAction::Terminate | DefaultAction::TerminateWithCore => {
            crate::sched::exit_task(task.id, 128 + signum as i32);
        }
    }
}

/// Sigreturn trampoline: `int 0x80` with `eax = Syscall::Sigreturn`,
/// followed by a `ud2` that should never execute (spec section 4.6's
/// "trampoline return address the handler's `ret` lands on").
#[rustfmt::skip]
pub const SIGRETURN_TRAMPOLINE: [u8; 7] = [
    0xb8, crate::uapi::Syscall::Sigreturn as u8, 0, 0, 0, // mov eax, Sigreturn
    0xcd, 0x80,                                           // int 0x80
];

fn deliver_to_handler(
    task: &crate::sched::task::Task,
    frame: &mut IrqFrame,
    signum: usize,
    handler: usize,
    extra_mask: u32,
) {
    let saved_blocked = task.signals.blocked();
    task.signals.block(bit(signum) | extra_mask);

    let sig_frame = SignalFrame {
        trampoline_ret: 0, // patched below once laid out on the stack
        signum: signum as u32,
        saved_blocked,
        irq_frame: *frame,
    };

    let frame_size = core::mem::size_of::<SignalFrame>() as u32;
    let trampoline_size = SIGRETURN_TRAMPOLINE.len() as u32;
    let new_esp = frame.user_esp.wrapping_sub(frame_size + trampoline_size) & !0xf;
    let trampoline_addr = new_esp;
    let frame_addr = new_esp + trampoline_size;

    let mut sig_frame = sig_frame;
    sig_frame.trampoline_ret = trampoline_addr;

    let space = task.address_space.lock();
    // SAFETY: `new_esp` was derived from the current user stack pointer
    // and is within the task's mapped stack region.
    unsafe {
        crate::user::copy_to_user_raw(
            &space,
            trampoline_addr as usize,
            &SIGRETURN_TRAMPOLINE,
        );
        crate::user::copy_to_user_raw(
            &space,
            frame_addr as usize,
            core::slice::from_raw_parts(
                (&sig_frame as *const SignalFrame) as *const u8,
                core::mem::size_of::<SignalFrame>(),
            ),
        );
    }
    drop(space);

    frame.eip = handler as u32;
    frame.user_esp = frame_addr;
}

/// `sys_sigreturn`: restore the frame `deliver_to_handler` built and
/// resume at the instruction the signal interrupted (spec section 4.6).
pub fn sigreturn(task: &crate::sched::task::Task, frame: &mut IrqFrame) -> Result<(), KernelError> {
    let space = task.address_space.lock();
    let mut buf = [0u8; core::mem::size_of::<SignalFrame>()];
    // SAFETY: `frame.user_esp` points at the `SignalFrame` written by
    // `deliver_to_handler`; the handler's `ret` landed on the trampoline
    // which never moves `esp` before trapping back in here.
    unsafe {
        crate::user::copy_from_user_raw(&space, frame.user_esp as usize, &mut buf);
    }
    drop(space);

    // SAFETY: `buf` holds exactly `size_of::<SignalFrame>()` bytes copied
    // from a frame this module wrote with the same layout.
    let sig_frame: SignalFrame = unsafe { core::ptr::read(buf.as_ptr() as *const SignalFrame) };

    task.signals.set_blocked(sig_frame.saved_blocked);
    *frame = sig_frame.irq_frame;
    Ok(())
}

pub fn init() {
    crate::println!("[SIGNAL] signal delivery ready");
}
