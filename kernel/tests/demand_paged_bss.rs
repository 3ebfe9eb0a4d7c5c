//! End-to-end scenario: a lazily-mapped BSS page only gets a physical
//! frame on first touch, and that frame comes back zero-filled, the way
//! `mm::page_fault` drives `mm::demand_paging` for a process's anonymous
//! BSS region.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use protura_kernel::mm::demand_paging::{BackingType, DemandPagingManager};
use protura_kernel::mm::{phys_to_virt_addr, FrameNumber, PageFlags, FRAME_ALLOCATOR, PAGE_SIZE};
use protura_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

const ARENA_PAGES: usize = 8;

#[repr(align(4096))]
struct Arena([u8; ARENA_PAGES * PAGE_SIZE]);

static ARENA: Arena = Arena([0u8; ARENA_PAGES * PAGE_SIZE]);

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting demand_paged_bss test...");

    seed_frame_allocator();
    test_bss_page_is_zero_filled_on_first_touch();
    test_second_fault_on_same_page_is_rejected();
    test_fault_outside_any_mapping_is_rejected();

    serial_println!("demand_paged_bss: all tests passed!");
    exit_qemu(QemuExitCode::Success)
}

/// The kernel identity-maps physical memory, so the arena's own link
/// address doubles as its physical address.
fn seed_frame_allocator() {
    let base = core::ptr::addr_of!(ARENA.0) as usize;
    let start_frame = FrameNumber::new((base / PAGE_SIZE) as u64);
    FRAME_ALLOCATOR
        .lock()
        .init_numa_node(0, start_frame, ARENA_PAGES)
        .expect("seed frame allocator from arena");
}

fn test_bss_page_is_zero_filled_on_first_touch() {
    let mut mgr = DemandPagingManager::new();
    let base = 0x4000_0000usize;
    mgr.register_lazy(
        base,
        PAGE_SIZE,
        PageFlags::PRESENT | PageFlags::WRITABLE,
        BackingType::Anonymous,
    );

    let (frame, flags) = mgr.try_demand_page(base).expect("demand page resolves");
    assert!(flags.contains(PageFlags::WRITABLE));

    let virt = phys_to_virt_addr(frame.as_u64() * PAGE_SIZE as u64) as *const u8;
    // SAFETY: `frame` was just allocated out of the arena we seeded above,
    // which is identity-mapped kernel memory, and is PAGE_SIZE bytes wide.
    let page = unsafe { core::slice::from_raw_parts(virt, PAGE_SIZE) };
    assert!(page.iter().all(|&b| b == 0));
}

fn test_second_fault_on_same_page_is_rejected() {
    let mut mgr = DemandPagingManager::new();
    let base = 0x5000_0000usize;
    mgr.register_lazy(
        base,
        PAGE_SIZE,
        PageFlags::PRESENT | PageFlags::WRITABLE,
        BackingType::Anonymous,
    );

    mgr.try_demand_page(base).expect("first fault resolves");
    assert!(mgr.try_demand_page(base).is_err());
}

fn test_fault_outside_any_mapping_is_rejected() {
    let mut mgr = DemandPagingManager::new();
    mgr.register_lazy(0x6000_0000, PAGE_SIZE, PageFlags::PRESENT, BackingType::Anonymous);
    assert!(mgr.try_demand_page(0x7000_0000).is_err());
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
