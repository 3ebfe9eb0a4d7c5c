//! 8259 PIC (Programmable Interrupt Controller) driver.
//!
//! This kernel is single-CPU and x86-only (spec section 4.4), so the PIC
//! pair is the only interrupt controller -- no APIC/IOAPIC abstraction is
//! needed. PIC1 handles IRQ 0-7 (vectors 32-39), PIC2 is cascaded onto
//! PIC1's IRQ 2 and handles IRQ 8-15 (vectors 40-47).

use x86_64::instructions::port::Port;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const PIC_EOI: u8 = 0x20;

/// Initialize both PICs (ICW1-ICW4) with all lines masked. Grounded on the
/// inline sequence this replaces in `arch::x86_64::init` -- same ports,
/// same vector offsets (32/40), same cascade wiring.
pub fn init() {
    // SAFETY: I/O port writes to the 8259 PIC (ports 0x20/0x21 for PIC1,
    // 0xA0/0xA1 for PIC2) are required to initialize the interrupt
    // controller. The sequence (ICW1-ICW4) is well-defined by the 8259
    // spec. All interrupts are masked (0xFF) at the end.
    unsafe {
        let mut pic1_cmd = Port::<u8>::new(PIC1_COMMAND);
        let mut pic1_data = Port::<u8>::new(PIC1_DATA);
        let mut pic2_cmd = Port::<u8>::new(PIC2_COMMAND);
        let mut pic2_data = Port::<u8>::new(PIC2_DATA);

        pic1_cmd.write(0x11);
        pic2_cmd.write(0x11);

        pic1_data.write(32);
        pic2_data.write(40);

        pic1_data.write(4);
        pic2_data.write(2);

        pic1_data.write(0x01);
        pic2_data.write(0x01);

        pic1_data.write(0xFF);
        pic2_data.write(0xFF);
    }
}

/// Unmask (enable) the given IRQ line (0-15).
pub fn unmask_irq(irq: u8) {
    // SAFETY: reads the current mask, clears one bit, writes it back --
    // the standard PIC mask-register read-modify-write sequence.
    unsafe {
        if irq < 8 {
            let mut data = Port::<u8>::new(PIC1_DATA);
            let mask = data.read() & !(1 << irq);
            data.write(mask);
        } else {
            let mut data = Port::<u8>::new(PIC2_DATA);
            let mask = data.read() & !(1 << (irq - 8));
            data.write(mask);
        }
    }
}

/// Mask (disable) the given IRQ line (0-15).
pub fn mask_irq(irq: u8) {
    // SAFETY: same read-modify-write sequence as `unmask_irq`, setting
    // the bit instead of clearing it.
    unsafe {
        if irq < 8 {
            let mut data = Port::<u8>::new(PIC1_DATA);
            let mask = data.read() | (1 << irq);
            data.write(mask);
        } else {
            let mut data = Port::<u8>::new(PIC2_DATA);
            let mask = data.read() | (1 << (irq - 8));
            data.write(mask);
        }
    }
}

/// Send end-of-interrupt for the given IRQ line. PIC2-sourced IRQs need
/// an EOI on both controllers since PIC2 is cascaded through PIC1's IRQ 2.
pub fn send_eoi(irq: u8) {
    // SAFETY: writing 0x20 to the command port is the standard
    // non-specific EOI the 8259 expects after handling an interrupt.
    unsafe {
        if irq >= 8 {
            Port::<u8>::new(PIC2_COMMAND).write(PIC_EOI);
        }
        Port::<u8>::new(PIC1_COMMAND).write(PIC_EOI);
    }
}
