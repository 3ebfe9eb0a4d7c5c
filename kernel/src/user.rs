//! Bounds-checked user-space memory access (spec section 4.7/4.5).
//!
//! Replaces the teacher's `mm::user_validation`, which walks the page
//! tables by hand on every access. Here the walk happens once, through
//! `VirtualAddressSpace::translate`, and the kernel-side copy always goes
//! through the physical-memory window (`mm::phys_to_virt_addr`) rather
//! than dereferencing a user pointer directly -- a stray user pointer
//! must never be able to fault the kernel thread with no recovery path.
//! Any failed translation becomes `KernelError::Fault`, which syscalls
//! surface as `-EFAULT` per the propagation policy in spec section 7.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};
use crate::mm::vas::VirtualAddressSpace;

const MAX_PATH_LEN: usize = 4096;

/// Copy `buf.len()` bytes from `vaddr` in `space` into `buf`.
pub fn copy_from_user(
    space: &VirtualAddressSpace,
    vaddr: usize,
    buf: &mut [u8],
) -> KernelResult<()> {
    // SAFETY: `copy_from_user_raw` only reads through mapped, translated
    // physical addresses; a miss returns `Fault` instead of faulting.
    unsafe { copy_from_user_raw(space, vaddr, buf) }
}

/// Copy `buf` into user memory at `vaddr` in `space`.
pub fn copy_to_user(space: &VirtualAddressSpace, vaddr: usize, buf: &[u8]) -> KernelResult<()> {
    // SAFETY: see `copy_from_user`; writes go through the same checked
    // translation.
    unsafe { copy_to_user_raw(space, vaddr, buf) }
}

/// # Safety
/// Caller asserts `buf` is a valid destination for `buf.len()` bytes;
/// the source range within `space` is checked internally.
pub unsafe fn copy_from_user_raw(
    space: &VirtualAddressSpace,
    vaddr: usize,
    buf: &mut [u8],
) -> KernelResult<()> {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = read_user_byte(space, vaddr + i)?;
    }
    Ok(())
}

/// # Safety
/// Caller asserts `buf` is a valid source of `buf.len()` bytes; the
/// destination range within `space` is checked internally.
pub unsafe fn copy_to_user_raw(
    space: &VirtualAddressSpace,
    vaddr: usize,
    buf: &[u8],
) -> KernelResult<()> {
    for (i, byte) in buf.iter().enumerate() {
        write_user_byte(space, vaddr + i, *byte)?;
    }
    Ok(())
}

fn read_user_byte(space: &VirtualAddressSpace, vaddr: usize) -> KernelResult<u8> {
    let phys = space
        .translate(vaddr)
        .ok_or(KernelError::Fault)?;
    // SAFETY: `phys` was produced by a successful page-table translation
    // of a page mapped into this address space.
    Ok(unsafe { core::ptr::read(crate::mm::phys_to_virt_addr(phys) as *const u8) })
}

fn write_user_byte(space: &VirtualAddressSpace, vaddr: usize, value: u8) -> KernelResult<()> {
    let phys = space
        .translate(vaddr)
        .ok_or(KernelError::Fault)?;
    // SAFETY: see `read_user_byte`; the mapping must additionally be
    // writable, which `translate` only returns for writable pages.
    unsafe { core::ptr::write(crate::mm::phys_to_virt_addr(phys) as *mut u8, value) };
    Ok(())
}

/// Read a NUL-terminated path/string out of user space (`open`, `execve`
/// argv/envp, ...), bounded by `MAX_PATH_LEN` (spec's `ENAMETOOLONG`).
pub fn copy_cstr_from_user(space: &VirtualAddressSpace, vaddr: usize) -> KernelResult<String> {
    let mut bytes = Vec::new();
    for i in 0..MAX_PATH_LEN {
        let b = read_user_byte(space, vaddr + i)?;
        if b == 0 {
            return String::from_utf8(bytes).map_err(|_| KernelError::InvalidArgument);
        }
        bytes.push(b);
    }
    Err(KernelError::NameTooLong)
}

/// A typed, bounds-checked pointer into a specific task's address space.
pub struct UserPtr<T> {
    space: *const VirtualAddressSpace,
    addr: usize,
    _marker: core::marker::PhantomData<T>,
}

impl<T: Copy> UserPtr<T> {
    pub fn new(space: &VirtualAddressSpace, addr: usize) -> Self {
        Self {
            space,
            addr,
            _marker: core::marker::PhantomData,
        }
    }

    pub fn read(&self) -> KernelResult<T> {
        let mut buf = alloc::vec![0u8; core::mem::size_of::<T>()];
        // SAFETY: `self.space` outlives `self` by construction (borrowed
        // for the lifetime of `new`'s caller).
        let space = unsafe { &*self.space };
        copy_from_user(space, self.addr, &mut buf)?;
        // SAFETY: `buf` holds exactly `size_of::<T>()` initialized bytes.
        Ok(unsafe { core::ptr::read(buf.as_ptr() as *const T) })
    }

    pub fn write(&self, value: T) -> KernelResult<()> {
        let space = unsafe { &*self.space };
        // SAFETY: `value` is `Copy`, so reinterpreting it as bytes is sound.
        let bytes = unsafe {
            core::slice::from_raw_parts(
                &value as *const T as *const u8,
                core::mem::size_of::<T>(),
            )
        };
        copy_to_user(space, self.addr, bytes)
    }
}
