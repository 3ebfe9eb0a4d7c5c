//! End-to-end scenario: a writer fills a pipe past one scheduling quantum's
//! worth of data and a reader drains it, exercising `fs::pipe` the way a
//! shell's `producer | consumer` pipeline would.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::vec::Vec;
use core::panic::PanicInfo;

use protura_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting pipe_handoff test...");

    test_single_write_read_roundtrip();
    test_write_then_close_lets_reader_drain_to_eof();
    test_read_after_writer_drop_observes_closed_pipe();

    serial_println!("pipe_handoff: all tests passed!");
    exit_qemu(QemuExitCode::Success)
}

fn test_single_write_read_roundtrip() {
    let (reader, writer) = protura_kernel::fs::pipe::create_pipe().unwrap();

    let sent = b"hello from the writer task";
    let n = writer.write(sent).unwrap();
    assert_eq!(n, sent.len());

    let mut buf = [0u8; 64];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], sent);
}

fn test_write_then_close_lets_reader_drain_to_eof() {
    let (reader, writer) = protura_kernel::fs::pipe::create_pipe_with_capacity(4096).unwrap();

    let chunk = [0xABu8; 1024];
    writer.write_all(&chunk).unwrap();
    writer.close();

    let drained: Vec<u8> = protura_kernel::fs::pipe::drain_pipe(&reader);
    assert_eq!(drained.len(), chunk.len());
    assert!(drained.iter().all(|&b| b == 0xAB));
}

fn test_read_after_writer_drop_observes_closed_pipe() {
    let reader = {
        let (reader, writer) = protura_kernel::fs::pipe::create_pipe().unwrap();
        writer.write(b"x").unwrap();
        reader
        // `writer` dropped here closes the write side.
    };

    let mut buf = [0u8; 8];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(n, 1);

    // Nothing left and no writer -- a second read reports EOF, not a block.
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(n, 0);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
