//! ELF32 loader (spec section 4.11): parses an ELF32 executable's program
//! headers and copies each `PT_LOAD` segment into the target address
//! space as a file-backed-then-zero-filled mapping.
//!
//! Grounded on `elf::ElfLoader`'s header layout, narrowed from its
//! ELF64/dynamic-linking scope down to the static ELF32 executables this
//! 32-bit target actually runs -- no `PT_DYNAMIC`, no relocations.

extern crate alloc;

use alloc::vec::Vec;
use core::mem::size_of;

use crate::error::KernelError;
use crate::mm::vas::{MappingType, VirtualAddressSpace};
use crate::mm::{phys_to_virt_addr, VirtualAddress};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;
const PT_LOAD: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf32Header {
    magic: [u8; 4],
    class: u8,
    data: u8,
    version: u8,
    osabi: u8,
    abi_version: u8,
    pad: [u8; 7],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u32,
    e_phoff: u32,
    e_shoff: u32,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf32ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_paddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
    p_align: u32,
}

/// Check the first bytes of a file against the ELF32/x86 magic, the way
/// the binfmt registry (`exec::registry`) probes each handler in order.
pub fn matches(data: &[u8]) -> bool {
    data.len() > 20
        && data[0..4] == ELF_MAGIC
        && data[4] == ELFCLASS32
        && data[5] == ELFDATA2LSB
        && u16::from_le_bytes([data[16], data[17]]) == ET_EXEC
        && u16::from_le_bytes([data[18], data[19]]) == EM_386
}

fn read_header(data: &[u8]) -> Result<Elf32Header, KernelError> {
    if data.len() < size_of::<Elf32Header>() {
        return Err(KernelError::InvalidArgument);
    }
    // SAFETY: the struct is `repr(C)` with only integer fields and the
    // buffer was just bounds-checked to hold at least `size_of` bytes.
    let header = unsafe { (data.as_ptr() as *const Elf32Header).read_unaligned() };
    Ok(header)
}

fn program_headers(data: &[u8], header: &Elf32Header) -> Result<Vec<Elf32ProgramHeader>, KernelError> {
    let ph_size = size_of::<Elf32ProgramHeader>();
    let start = header.e_phoff as usize;
    let count = header.e_phnum as usize;
    let end = start
        .checked_add(count.checked_mul(ph_size).ok_or(KernelError::InvalidArgument)?)
        .ok_or(KernelError::InvalidArgument)?;
    if end > data.len() {
        return Err(KernelError::InvalidArgument);
    }

    let mut headers = Vec::with_capacity(count);
    for i in 0..count {
        let off = start + i * ph_size;
        // SAFETY: bounds-checked above; unaligned read tolerates any offset.
        let ph = unsafe { (data[off..].as_ptr() as *const Elf32ProgramHeader).read_unaligned() };
        headers.push(ph);
    }
    Ok(headers)
}

fn mapping_type_for(flags: u32) -> MappingType {
    const PF_X: u32 = 1;
    const PF_W: u32 = 2;
    if flags & PF_X != 0 {
        MappingType::Code
    } else if flags & PF_W != 0 {
        MappingType::Data
    } else {
        MappingType::Code
    }
}

/// Load every `PT_LOAD` segment of `data` into `space`, returning the
/// entry point (spec's "populate the new address space ... entry point").
pub fn load(data: &[u8], space: &VirtualAddressSpace) -> Result<u32, KernelError> {
    if !matches(data) {
        return Err(KernelError::InvalidArgument);
    }
    let header = read_header(data)?;
    let phdrs = program_headers(data, &header)?;

    for ph in phdrs.iter().filter(|p| p.p_type == PT_LOAD) {
        if ph.p_memsz == 0 {
            continue;
        }
        space.map_region(
            VirtualAddress(ph.p_vaddr as u64),
            ph.p_memsz as usize,
            mapping_type_for(ph.p_flags),
        )?;

        if ph.p_filesz == 0 {
            continue;
        }
        let file_start = ph.p_offset as usize;
        let file_end = file_start
            .checked_add(ph.p_filesz as usize)
            .ok_or(KernelError::InvalidArgument)?;
        if file_end > data.len() {
            return Err(KernelError::InvalidArgument);
        }
        copy_into_segment(space, ph.p_vaddr, &data[file_start..file_end])?;
    }

    Ok(header.e_entry)
}

/// Copy `bytes` into the pages `map_region` just installed at `vaddr`,
/// one page at a time since the destination frames aren't necessarily
/// contiguous with each other in the kernel's own address space.
fn copy_into_segment(space: &VirtualAddressSpace, vaddr: u32, bytes: &[u8]) -> Result<(), KernelError> {
    const PAGE_SIZE: usize = 4096;
    let mut written = 0usize;
    while written < bytes.len() {
        let cur_vaddr = vaddr as usize + written;
        let page_off = cur_vaddr & (PAGE_SIZE - 1);
        let chunk = core::cmp::min(PAGE_SIZE - page_off, bytes.len() - written);

        let phys = space.translate(cur_vaddr).ok_or(KernelError::NoMemory)?;
        let dst = phys_to_virt_addr(phys as u64) as *mut u8;
        // SAFETY: `translate` resolved a page `map_region` just mapped
        // writable in this address space; `chunk` stays within that page.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes[written..written + chunk].as_ptr(), dst, chunk);
        }
        written += chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf32(entry: u32, vaddr: u32, filesz: u32, memsz: u32, payload: &[u8]) -> Vec<u8> {
        let header_size = size_of::<Elf32Header>();
        let ph_size = size_of::<Elf32ProgramHeader>();
        let mut buf = alloc::vec![0u8; header_size + ph_size + payload.len()];

        buf[0..4].copy_from_slice(&ELF_MAGIC);
        buf[4] = ELFCLASS32;
        buf[5] = ELFDATA2LSB;
        buf[6] = 1;
        buf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        buf[18..20].copy_from_slice(&EM_386.to_le_bytes());
        buf[24..28].copy_from_slice(&entry.to_le_bytes());
        buf[28..32].copy_from_slice(&(header_size as u32).to_le_bytes());
        buf[42..44].copy_from_slice(&(ph_size as u16).to_le_bytes());
        buf[44..46].copy_from_slice(&1u16.to_le_bytes());

        let ph_off = header_size;
        buf[ph_off..ph_off + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
        buf[ph_off + 4..ph_off + 8].copy_from_slice(&(header_size as u32 + ph_size as u32).to_le_bytes());
        buf[ph_off + 8..ph_off + 12].copy_from_slice(&vaddr.to_le_bytes());
        buf[ph_off + 16..ph_off + 20].copy_from_slice(&filesz.to_le_bytes());
        buf[ph_off + 20..ph_off + 24].copy_from_slice(&memsz.to_le_bytes());
        buf[ph_off + 24..ph_off + 28].copy_from_slice(&7u32.to_le_bytes()); // RWX

        buf[header_size + ph_size..].copy_from_slice(payload);
        buf
    }

    #[test]
    fn test_matches_rejects_non_elf() {
        assert!(!matches(&[0u8; 64]));
    }

    #[test]
    fn test_matches_accepts_elf32_exec() {
        let buf = minimal_elf32(0x1000, 0x1000, 4, 4, &[1, 2, 3, 4]);
        assert!(matches(&buf));
    }

    #[test]
    fn test_read_header_entry_point() {
        let buf = minimal_elf32(0x4000_1000, 0x4000_1000, 0, 0, &[]);
        let header = read_header(&buf).unwrap();
        assert_eq!(header.e_entry, 0x4000_1000);
        assert_eq!(header.e_phnum, 1);
    }

    #[test]
    fn test_program_headers_parses_load_segment() {
        let buf = minimal_elf32(0x1000, 0x2000, 8, 16, &[0u8; 8]);
        let header = read_header(&buf).unwrap();
        let phdrs = program_headers(&buf, &header).unwrap();
        assert_eq!(phdrs.len(), 1);
        assert_eq!(phdrs[0].p_vaddr, 0x2000);
        assert_eq!(phdrs[0].p_filesz, 8);
        assert_eq!(phdrs[0].p_memsz, 16);
    }
}
