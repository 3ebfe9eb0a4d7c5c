//! POSIX errno-style error type surfaced by every syscall.
//!
//! Kept in the teacher's shape (a `#[must_use]` enum, a `Display` impl,
//! a `KernelResult<T>` alias, and a `kernel_error!` construction macro)
//! but the variant set is now exactly the errno family user space sees,
//! rather than the capability/IPC error hierarchy it replaces.

use core::fmt;

/// Every syscall-visible error, one per POSIX errno name this kernel
/// implements. `errno()` gives the small negative integer a syscall
/// returns; its magnitude is what user space sees in `errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No such file, process, device, or other named resource.
    NotFound,
    /// A path component expected to be a directory was not one.
    NotADirectory,
    /// A path expected to name a file named a directory instead.
    IsADirectory,
    /// File descriptor argument is not open, or not open for the
    /// requested access.
    BadFileDescriptor,
    /// The caller's fd table (`NOFILE`) or a system-wide file table is full.
    TooManyOpenFiles,
    /// No such device, or operation not supported by this device.
    NoSuchDevice,
    /// ioctl or similar was issued against a non-terminal fd.
    NotATty,
    /// `palloc`/`kmalloc` could not satisfy the request.
    NoMemory,
    /// Syscall argument is malformed independent of any other state.
    InvalidArgument,
    /// Credential check failed (uid/gid/mode bits).
    PermissionDenied,
    /// Caller lacks access to an otherwise-existing resource.
    AccessDenied,
    /// Target of a create-exclusive operation already exists.
    FileExists,
    /// Link or rename crossed a mount-point boundary.
    CrossDeviceLink,
    /// A path or component exceeded the maximum supported length.
    NameTooLong,
    /// Directory is not empty (rmdir, rename onto it).
    NotEmpty,
    /// Non-blocking operation has no data/space ready right now.
    WouldBlock,
    /// A blocking syscall was woken by signal delivery before completing.
    Interrupted,
    /// Write end or read end of a pipe/socket is gone.
    BrokenPipe,
    /// Block device or filesystem has no space left.
    NoSpace,
    /// Operation is not implemented for this object type.
    NotSupported,
    /// A user-space pointer passed to the syscall was not accessible.
    Fault,
    /// An arithmetic or buffer-size result would not fit its target type.
    Overflow,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// The negative value a syscall returns for this error (spec section 7).
    pub const fn errno(self) -> isize {
        -(self.magnitude() as isize)
    }

    /// POSIX errno magnitude, matching the numbering glibc/Linux use so
    /// a libc built against this kernel needs no translation table.
    pub const fn magnitude(self) -> u32 {
        match self {
            Self::PermissionDenied => 1,  // EPERM
            Self::NotFound => 2,          // ENOENT
            Self::Interrupted => 4,       // EINTR
            Self::Fault => 14,            // EFAULT
            Self::NoSuchDevice => 19,     // ENODEV
            Self::NotADirectory => 20,    // ENOTDIR
            Self::IsADirectory => 21,     // EISDIR
            Self::InvalidArgument => 22,  // EINVAL
            Self::TooManyOpenFiles => 24, // EMFILE
            Self::NotATty => 25,          // ENOTTY
            Self::FileExists => 17,       // EEXIST
            Self::CrossDeviceLink => 18,  // EXDEV
            Self::NoSpace => 28,          // ENOSPC
            Self::BrokenPipe => 32,       // EPIPE
            Self::NameTooLong => 36,      // ENAMETOOLONG
            Self::NotEmpty => 39,         // ENOTEMPTY
            Self::NotSupported => 95,     // ENOTSUP
            Self::WouldBlock => 11,       // EAGAIN
            Self::AccessDenied => 13,     // EACCES
            Self::NoMemory => 12,         // ENOMEM
            Self::BadFileDescriptor => 9, // EBADF
            Self::Overflow => 75,         // EOVERFLOW
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotFound => "no such file or directory",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::BadFileDescriptor => "bad file descriptor",
            Self::TooManyOpenFiles => "too many open files",
            Self::NoSuchDevice => "no such device",
            Self::NotATty => "not a typewriter",
            Self::NoMemory => "cannot allocate memory",
            Self::InvalidArgument => "invalid argument",
            Self::PermissionDenied => "operation not permitted",
            Self::AccessDenied => "permission denied",
            Self::FileExists => "file exists",
            Self::CrossDeviceLink => "invalid cross-device link",
            Self::NameTooLong => "file name too long",
            Self::NotEmpty => "directory not empty",
            Self::WouldBlock => "resource temporarily unavailable",
            Self::Interrupted => "interrupted system call",
            Self::BrokenPipe => "broken pipe",
            Self::NoSpace => "no space left on device",
            Self::NotSupported => "operation not supported",
            Self::Fault => "bad address",
            Self::Overflow => "value too large for defined data type",
        };
        write!(f, "{}", msg)
    }
}

/// Helper macro for terse error construction at call sites, mirroring the
/// teacher's `kernel_error!` shape.
#[macro_export]
macro_rules! kernel_error {
    ($variant:ident) => {
        $crate::error::KernelError::$variant
    };
}
