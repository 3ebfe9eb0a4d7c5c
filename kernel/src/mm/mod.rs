//! Memory management (spec section 4.7 and C1 of the expanded design).
//!
//! Physical frames come from `frame_allocator`, the kernel heap from
//! `heap`, per-task address spaces from `vas`, and the Multiboot memory
//! map from `bootloader`. This module ties them together and owns the
//! shared address/flag types every one of them imports via `super::`.

#![allow(dead_code)]

#[allow(unused_imports)]
use crate::println;

pub mod bootloader;
pub mod demand_paging;
pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod page_table;
pub mod vas;

pub use frame_allocator::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};
pub use vas::VirtualAddressSpace;

/// Page size in bytes, used throughout `mm`/`elf`/`syscall::memory` wherever
/// a byte-granularity view of a frame is needed rather than `FrameNumber`'s
/// frame-index granularity. Equal to [`FRAME_SIZE`].
pub const PAGE_SIZE: usize = FRAME_SIZE;

/// Physical memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(pub u64);

impl PhysicalAddress {
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(pub u64);

impl VirtualAddress {
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn add(&self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }
}

#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Small = 4096,
    Large = 2 * 1024 * 1024,
    Huge = 1024 * 1024 * 1024,
}

/// Page protection/attribute bits, shared by `page_table` and `vas`.
#[derive(Debug, Clone, Copy)]
pub struct PageFlags(u64);

impl PageFlags {
    pub const PRESENT: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);
    pub const USER: Self = Self(1 << 2);
    pub const WRITE_THROUGH: Self = Self(1 << 3);
    pub const NO_CACHE: Self = Self(1 << 4);
    pub const ACCESSED: Self = Self(1 << 5);
    pub const DIRTY: Self = Self(1 << 6);
    pub const HUGE: Self = Self(1 << 7);
    pub const GLOBAL: Self = Self(1 << 8);
    pub const NO_EXECUTE: Self = Self(1 << 63);

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for PageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A contiguous run of physical memory reported by the bootloader's
/// memory map, trimmed to `start`/`size`/`usable` (spec C1's minimal
/// view -- `bootloader::BootloaderMemoryRegion` keeps the full E820/UEFI
/// type for the parser, this is what `frame_allocator::init` consumes).
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub start: u64,
    pub size: u64,
    pub usable: bool,
}

/// Translate a physical address to a kernel-accessible virtual address.
///
/// The kernel identity-maps all physical memory below the top of RAM, so
/// this is the identity function; it exists as a named conversion point
/// so callers read as "I need to touch physical memory `phys`" rather
/// than silently relying on identity mapping.
pub fn phys_to_virt_addr(phys: u64) -> usize {
    phys as usize
}

/// Initialize memory management: physical frame allocator from the
/// Multiboot memory map, then the kernel heap.
pub fn init(multiboot_info: usize) {
    println!("[MM] initializing memory management");
    bootloader::init_from_multiboot(multiboot_info);
    if let Err(e) = heap::init() {
        panic!("[MM] heap init failed: {}", e);
    }
    println!("[MM] memory management initialized");
}
