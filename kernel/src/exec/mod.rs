//! Exec and binfmt (spec section 4.11): walk a fixed-order registry of
//! binary format handlers, tear down the old address space, and have the
//! matching handler populate a new one with the program image plus an
//! argv/envp-laden stack.
//!
//! Two handlers ship: [`elf32`] (required `PT_LOAD` segments) and
//! [`script`] (`#!`-interpreter indirection). Grounded on `elf::ElfLoader`
//! for the parsing shape, narrowed to the static ELF32 case this 32-bit
//! target needs -- no dynamic linking.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

pub mod elf32;
pub mod script;

use crate::error::KernelError;
use crate::fs::get_vfs;
use crate::mm::vas::{MappingType, VirtualAddressSpace};
use crate::mm::VirtualAddress;

/// Script indirection this deep is almost certainly a loop (`a -> b -> a`);
/// the original kernel's binfmt code enforces the same kind of hop limit
/// `namei`'s symlink resolution does.
const MAX_SCRIPT_DEPTH: usize = 4;

const DEFAULT_STACK_TOP: u64 = 0xC000_0000;
const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

pub struct ExecImage {
    pub entry: u32,
    pub stack_pointer: u32,
    pub space: VirtualAddressSpace,
}

/// The binfmt registry (spec section 9: "variants where enumeration is
/// finite" -- exactly `elf`/`script` here, so a plain enum stands in for
/// what the original expressed as an ordered list of handler structs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binfmt {
    Elf,
    Script,
}

impl Binfmt {
    /// Walk the registry in order, returning the first handler whose
    /// magic matches.
    fn detect(data: &[u8]) -> Option<Self> {
        if elf32::matches(data) {
            Some(Self::Elf)
        } else if script::matches(data) {
            Some(Self::Script)
        } else {
            None
        }
    }
}

/// Replace the calling task's program image with the one named by `path`
/// (spec: "tear down the old address space, allocate a new one, have the
/// chosen binfmt populate it ... and switch to it"). Returns the new
/// address space plus entry/stack pointer; the caller installs it on the
/// task and switches to user mode -- this module doesn't touch scheduler
/// state.
pub fn execve(path: &str, argv: &[String], envp: &[String]) -> Result<ExecImage, KernelError> {
    execve_depth(path, argv, envp, 0)
}

fn execve_depth(path: &str, argv: &[String], envp: &[String], depth: usize) -> Result<ExecImage, KernelError> {
    if depth > MAX_SCRIPT_DEPTH {
        return Err(KernelError::NotSupported);
    }

    let data = read_file(path)?;

    match Binfmt::detect(&data).ok_or(KernelError::InvalidArgument)? {
        Binfmt::Script => {
            let (interpreter, arg) = script::parse_shebang(&data).ok_or(KernelError::InvalidArgument)?;
            let new_argv = script::rewrite_argv(&interpreter, arg.as_deref(), path, argv);
            execve_depth(&interpreter, &new_argv, envp, depth + 1)
        }
        Binfmt::Elf => {
            let mut space = VirtualAddressSpace::new();
            space.init()?;
            let entry = elf32::load(&data, &space)?;
            let stack_pointer = build_stack(&space, argv, envp)?;
            Ok(ExecImage {
                entry,
                stack_pointer,
                space,
            })
        }
    }
}

fn read_file(path: &str) -> Result<Vec<u8>, KernelError> {
    let vfs = get_vfs().read();
    let node = vfs.resolve_path(path).map_err(|_| KernelError::NotFound)?;
    let metadata = node.metadata().map_err(|_| KernelError::NotFound)?;
    let mut buffer = alloc::vec![0u8; metadata.size];
    node.read(0, &mut buffer).map_err(|_| KernelError::NotFound)?;
    Ok(buffer)
}

/// Lay out `argv`/`envp` at the top of the new stack the way a
/// freshly-exec'd C runtime expects to find them: a NUL-terminated string
/// table, then `argv[]`/`envp[]` pointer arrays (both NULL-terminated),
/// then `argc`, all below the initial stack pointer.
fn build_stack(space: &VirtualAddressSpace, argv: &[String], envp: &[String]) -> Result<u32, KernelError> {
    space.map_region(
        VirtualAddress(DEFAULT_STACK_TOP - DEFAULT_STACK_SIZE as u64),
        DEFAULT_STACK_SIZE,
        MappingType::Stack,
    )?;
    space.set_stack_top(DEFAULT_STACK_TOP as usize);
    space.set_stack_size(DEFAULT_STACK_SIZE);

    let mut strings = Vec::new();
    for s in argv.iter().chain(envp.iter()) {
        strings.push(s.as_bytes());
    }

    let mut cursor = DEFAULT_STACK_TOP as u32;
    let mut string_addrs = Vec::with_capacity(strings.len());
    for bytes in &strings {
        cursor -= (bytes.len() + 1) as u32;
        write_bytes(space, cursor, bytes)?;
        write_bytes(space, cursor + bytes.len() as u32, &[0u8])?;
        string_addrs.push(cursor);
    }

    cursor &= !0x3; // align pointer arrays

    let argv_addrs = &string_addrs[..argv.len()];
    let envp_addrs = &string_addrs[argv.len()..];

    cursor -= 4; // envp NULL terminator
    write_u32(space, cursor, 0)?;
    for &addr in envp_addrs.iter().rev() {
        cursor -= 4;
        write_u32(space, cursor, addr)?;
    }
    let envp_base = cursor;

    cursor -= 4; // argv NULL terminator
    write_u32(space, cursor, 0)?;
    for &addr in argv_addrs.iter().rev() {
        cursor -= 4;
        write_u32(space, cursor, addr)?;
    }
    let argv_base = cursor;

    cursor -= 4;
    write_u32(space, cursor, envp_base)?;
    cursor -= 4;
    write_u32(space, cursor, argv_base)?;
    cursor -= 4;
    write_u32(space, cursor, argv.len() as u32)?; // argc

    Ok(cursor)
}

fn write_bytes(space: &VirtualAddressSpace, vaddr: u32, bytes: &[u8]) -> Result<(), KernelError> {
    let phys = space.translate(vaddr as usize).ok_or(KernelError::NoMemory)?;
    let dst = crate::mm::phys_to_virt_addr(phys as u64) as *mut u8;
    // SAFETY: `translate` resolved a page `build_stack` just mapped
    // writable, and every write here stays within the stack region sized
    // for exactly this many bytes.
    unsafe {
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
    }
    Ok(())
}

fn write_u32(space: &VirtualAddressSpace, vaddr: u32, value: u32) -> Result<(), KernelError> {
    write_bytes(space, vaddr, &value.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_script_depth_is_finite() {
        assert!(MAX_SCRIPT_DEPTH > 0);
    }
}
