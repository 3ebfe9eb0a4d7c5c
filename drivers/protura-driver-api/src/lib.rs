//! Contracts external device drivers compile against.
//!
//! Concrete drivers (PIC, PIT, IDE/ATA, serial UART, PS/2 keyboard,
//! framebuffer console, loopback, NIC) are out of scope for the kernel
//! core (see spec section 1's external collaborators list) and are not
//! implemented here. This crate only fixes the boundary they must honor:
//! block I/O submission (section 4.8), log sink multicast (section
//! 4.12), and IRQ handler registration (section 4.4).
#![no_std]

/// A device id as used by the block cache (spec section 3, "Block device").
pub type DeviceId = u32;

/// Sector number within a block device, always in units of `SECTOR_SIZE`.
pub type Sector = u64;

/// Fixed physical sector size assumed by the MBR partition layout
/// (spec section 6) and by every `sync_block` implementor.
pub const SECTOR_SIZE: usize = 512;

/// Outcome of a block submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIoError {
    /// The device does not have a sector at that offset.
    OutOfRange,
    /// The underlying hardware reported an I/O fault.
    DeviceFault,
    /// The device is not ready to accept requests (e.g. not yet probed).
    NotReady,
}

/// Direction of a block I/O submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIoDirection {
    Read,
    Write,
}

/// Synchronous block I/O contract (spec section 4.8, "Device submission
/// contract"). A driver either fills `data` from the device (read,
/// caller then marks the buffer valid) or drains `data` to the device
/// (write, caller then clears dirty). The call may be synchronous or
/// complete via a later interrupt; either way it must not return before
/// the transfer either finished or definitively failed.
pub trait BlockDeviceOps: Send + Sync {
    /// Block size this device transfers in, in bytes. Always a multiple
    /// of [`SECTOR_SIZE`].
    fn block_size(&self) -> usize;

    /// Total number of addressable blocks.
    fn block_count(&self) -> u64;

    /// Perform one synchronous block transfer.
    fn sync_block(
        &self,
        dir: BlockIoDirection,
        sector: Sector,
        data: &mut [u8],
    ) -> Result<(), BlockIoError>;
}

/// A single character output sink multiplexed by `kprintf` (spec section
/// 4.12: serial, VT console, in-memory ring, framebuffer console each
/// implement this).
pub trait LogSink: Send + Sync {
    fn putchar(&self, c: u8);

    fn putnstr(&self, s: &[u8]) {
        for &b in s {
            self.putchar(b);
        }
    }
}

/// Tag distinguishing interrupt handlers from syscall gates (spec section
/// 4.4). Syscall gates are DPL 3 so user code may invoke them directly
/// via `int 0x80`; ordinary interrupt handlers are DPL 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Interrupt,
    Syscall,
}

/// Whether a vector's handler chain stops at the first handler that
/// reports "handled", or always runs every registered handler (spec
/// section 4.4, "shared" interrupts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    Exclusive,
    Shared,
}

/// An IRQ handler function. Returns `true` if it serviced the interrupt
/// (stopping a non-shared chain), `false` to let the next handler in a
/// shared chain run.
pub type IrqHandlerFn = fn(vector: u8) -> bool;
