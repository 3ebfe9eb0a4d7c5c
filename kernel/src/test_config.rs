//! Shared constants for the `cargo test` / QEMU integration-test harness.

/// `isa-debug-exit` I/O port `test_framework::exit_qemu` writes to.
pub const QEMU_EXIT_PORT: u16 = 0xf4;

/// Wall-clock budget for a single `harness = false` integration test
/// before the runner script treats it as hung and kills the QEMU process.
pub const TEST_TIMEOUT_SECS: u64 = 60;

/// Serial port QEMU is told to redirect to stdio for test output
/// (`-serial stdio`), matched against in the runner script's log scraping.
pub const SERIAL_PORT_BASE: u16 = 0x3f8;
