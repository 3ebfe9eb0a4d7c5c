//! Numeric constants shared with user space: syscall numbers, `open`
//! flags, signal numbers. Kept in one place the way the teacher keeps
//! its `Syscall` enum and flag `bitflags!` types next to each other, so
//! the ABI surface has a single source of truth.

/// Syscall numbers, dispatched through the `int 0x80` gate (spec
/// section 4.4's vector layout). Numbering is arbitrary but stable once
/// assigned — user space `libc` binds against these values.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Lseek = 4,
    Stat = 5,
    Fstat = 6,
    Ioctl = 7,
    Dup = 8,
    Dup2 = 9,
    Pipe = 10,
    Fork = 11,
    Execve = 12,
    Exit = 13,
    Wait4 = 14,
    Kill = 15,
    Sigaction = 16,
    Sigprocmask = 17,
    Sigreturn = 18,
    Getpid = 19,
    Getppid = 20,
    Getuid = 21,
    Setuid = 22,
    Getgid = 23,
    Setgid = 24,
    Brk = 25,
    Mmap = 26,
    Munmap = 27,
    Chdir = 28,
    Getcwd = 29,
    Mkdir = 30,
    Rmdir = 31,
    Unlink = 32,
    Rename = 33,
    Readdir = 34,
    Mount = 35,
    Umount = 36,
    Nanosleep = 37,
    Yield = 38,
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        use Syscall::*;
        Ok(match value {
            0 => Read,
            1 => Write,
            2 => Open,
            3 => Close,
            4 => Lseek,
            5 => Stat,
            6 => Fstat,
            7 => Ioctl,
            8 => Dup,
            9 => Dup2,
            10 => Pipe,
            11 => Fork,
            12 => Execve,
            13 => Exit,
            14 => Wait4,
            15 => Kill,
            16 => Sigaction,
            17 => Sigprocmask,
            18 => Sigreturn,
            19 => Getpid,
            20 => Getppid,
            21 => Getuid,
            22 => Setuid,
            23 => Getgid,
            24 => Setgid,
            25 => Brk,
            26 => Mmap,
            27 => Munmap,
            28 => Chdir,
            29 => Getcwd,
            30 => Mkdir,
            31 => Rmdir,
            32 => Unlink,
            33 => Rename,
            34 => Readdir,
            35 => Mount,
            36 => Umount,
            37 => Nanosleep,
            38 => Yield,
            _ => return Err(()),
        })
    }
}

/// Interrupt/syscall vector layout (spec section 4.4): 0-31 CPU exceptions,
/// 32-47 remapped 8259 PIC IRQs, 0x80 the syscall gate (DPL 3 so user code
/// may `int 0x80` directly).
pub const VECTOR_EXCEPTION_BASE: u8 = 0;
pub const VECTOR_EXCEPTION_COUNT: u8 = 32;
pub const VECTOR_IRQ_BASE: u8 = 32;
pub const VECTOR_IRQ_COUNT: u8 = 16;
pub const VECTOR_SYSCALL: u8 = 0x80;
