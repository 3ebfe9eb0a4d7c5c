//! End-to-end scenario: raise signals against a live task the way `kill(2)`
//! would, and drain them through `SignalState` the way the return-to-user
//! path in `signal::deliver_pending` does.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use core::panic::PanicInfo;

use protura_kernel::mm::VirtualAddressSpace;
use protura_kernel::sched::task::{Task, TaskId, TaskState};
use protura_kernel::signal::{self, SigAction, SignalState, SIGKILL, SIGSTOP, SIGTERM, SIGUSR1};
use protura_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting signal_delivery test...");

    test_raise_then_take_deliverable();
    test_blocked_signal_stays_pending_not_deliverable();
    test_sigkill_and_sigstop_cannot_be_blocked_or_caught();
    test_kill_wakes_a_blocked_task();

    serial_println!("signal_delivery: all tests passed!");
    exit_qemu(QemuExitCode::Success)
}

fn test_raise_then_take_deliverable() {
    let state = SignalState::new();
    state.raise(SIGUSR1).unwrap();
    assert_ne!(state.pending() & (1 << SIGUSR1), 0);
    assert_eq!(state.take_deliverable(), Some(SIGUSR1));
    // Taking it clears the pending bit so it isn't delivered twice.
    assert_eq!(state.pending() & (1 << SIGUSR1), 0);
    assert_eq!(state.take_deliverable(), None);
}

fn test_blocked_signal_stays_pending_not_deliverable() {
    let state = SignalState::new();
    state.block(1 << SIGTERM);
    state.raise(SIGTERM).unwrap();
    assert_ne!(state.pending() & (1 << SIGTERM), 0);
    assert_eq!(state.deliverable() & (1 << SIGTERM), 0);

    state.unblock(1 << SIGTERM);
    assert_ne!(state.deliverable() & (1 << SIGTERM), 0);
    assert_eq!(state.take_deliverable(), Some(SIGTERM));
}

fn test_sigkill_and_sigstop_cannot_be_blocked_or_caught() {
    let state = SignalState::new();
    state.set_blocked(1 << SIGKILL | 1 << SIGSTOP | 1 << SIGTERM);
    assert_eq!(state.blocked() & (1 << SIGKILL), 0);
    assert_eq!(state.blocked() & (1 << SIGSTOP), 0);
    assert_ne!(state.blocked() & (1 << SIGTERM), 0);

    let caught = SigAction {
        handler: 0x1000,
        mask: 0,
    };
    assert!(state.set_action(SIGKILL, caught).is_err());
    assert!(state.set_action(SIGSTOP, caught).is_err());
}

fn test_kill_wakes_a_blocked_task() {
    let task = Arc::new(Task::new(
        TaskId(900),
        None,
        String::from("signal-target"),
        VirtualAddressSpace::new(),
        0,
    ));
    protura_kernel::sched::spawn(task.clone());
    task.set_state(TaskState::Blocked);

    signal::kill(TaskId(900), SIGUSR1).unwrap();

    assert_eq!(task.state(), TaskState::Ready);
    assert_ne!(task.signals.deliverable() & (1 << SIGUSR1), 0);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
