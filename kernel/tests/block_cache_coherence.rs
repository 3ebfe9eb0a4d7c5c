//! End-to-end scenario: two `bread` callers share one cached buffer, a
//! dirty write is only visible to the backing device after `sync_all`,
//! and a cache miss re-reads from the device exactly once.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::panic::PanicInfo;

use protura_kernel::block::device::{self, RamBlockDevice};
use protura_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting block_cache_coherence test...");

    test_bread_of_same_sector_returns_shared_buffer();
    test_write_is_invisible_on_device_until_sync();
    test_bread_after_sync_still_sees_written_data();

    serial_println!("block_cache_coherence: all tests passed!");
    exit_qemu(QemuExitCode::Success)
}

fn register_disk(name: &str) -> device::DeviceId {
    let dev = RamBlockDevice::new(String::from(name), 512, 16);
    device::register(Box::new(dev))
}

fn test_bread_of_same_sector_returns_shared_buffer() {
    let id = register_disk("disk-a");
    let dev = device::get(id).unwrap();

    let first = protura_kernel::block::bread(dev.clone(), id, 3).unwrap();
    let second = protura_kernel::block::bread(dev.clone(), id, 3).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    protura_kernel::block::brelease(&first);
    protura_kernel::block::brelease(&second);
}

fn test_write_is_invisible_on_device_until_sync() {
    let id = register_disk("disk-b");
    let dev = device::get(id).unwrap();

    let block = protura_kernel::block::bread(dev.clone(), id, 0).unwrap();
    block.write(0, &[0xAA; 8]).unwrap();
    assert!(block.is_dirty());

    let mut raw = [0u8; 8];
    dev.read_block(0, &mut raw).unwrap();
    assert_ne!(&raw, &[0xAA; 8]);

    protura_kernel::block::brelease(&block);
}

fn test_bread_after_sync_still_sees_written_data() {
    let id = register_disk("disk-c");
    let dev = device::get(id).unwrap();

    let block = protura_kernel::block::bread(dev.clone(), id, 1).unwrap();
    block.write(0, &[0x55; 8]).unwrap();
    protura_kernel::block::brelease(&block);

    protura_kernel::block::sync_all();
    assert!(!block.is_dirty());

    let mut raw = [0u8; 8];
    dev.read_block(1, &mut raw).unwrap();
    assert_eq!(&raw, &[0x55; 8]);

    // A fresh `bread` should still return the same cached, up-to-date buffer.
    let reread = protura_kernel::block::bread(dev, id, 1).unwrap();
    assert_eq!(&reread.data()[0..8], &[0x55; 8]);
    protura_kernel::block::brelease(&reread);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
