#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![feature(abi_x86_interrupt)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

#[macro_use]
mod print;

mod arch;
mod block;
mod cmdline;
mod elf;
mod error;
mod exec;
mod fs;
mod initcall;
mod irq;
mod log_service;
mod mm;
mod process;
mod sched;
mod serial;
mod signal;
mod stdlib;
mod sync;
mod syscall;
mod timer;
mod uapi;
mod user;
mod utils;

extern crate alloc;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("[KERNEL PANIC] {}", info);
    log_service::dump_backtrace();
    arch::halt();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[KERNEL PANIC] {}", info);
    exit_qemu(QemuExitCode::Failed);
}

/// Entry point invoked by the Multiboot trampoline in `arch::x86_64::entry`,
/// already running in protected mode with paging off and a scratch stack.
///
/// Initialization order follows the dependency chain spec section 4.12
/// requires: each singleton must exist before the initcall that depends on
/// it runs, and none are torn down while the kernel is up.
#[no_mangle]
pub extern "C" fn kernel_main(multiboot_info: usize) -> ! {
    arch::init();
    log_service::init();
    println!("Protura v{}", env!("CARGO_PKG_VERSION"));

    mm::init(multiboot_info);
    cmdline::init(multiboot_info);
    sync::init();
    irq::init();
    timer::init();
    sched::init();
    process::init();
    fs::init();
    block::init();
    signal::init();

    initcall::run_all();

    #[cfg(test)]
    test_main();

    println!("Protura initialized successfully");
    sched::run();
}

#[cfg(test)]
fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

#[cfg(test)]
trait Testable {
    fn run(&self);
}

#[cfg(test)]
impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

#[cfg(test)]
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    use x86_64::instructions::port::Port;

    unsafe {
        let mut port = Port::new(0xf4);
        port.write(exit_code as u32);
    }
    unreachable!();
}
