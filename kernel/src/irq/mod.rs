//! Interrupt dispatch (spec section 4.4).
//!
//! The 8259 PIC is this kernel's only interrupt controller -- single CPU,
//! x86-only, so there is no APIC/GIC/PLIC abstraction layer to delegate
//! through. `IrqManager` keeps a handler chain per line rather than a
//! single slot: a line can be claimed [`ShareMode::Exclusive`] or shared
//! among cooperating drivers (e.g. cascaded devices on the same IRQ).

extern crate alloc;

use alloc::vec::Vec;

use spin::Mutex;

use crate::arch::x86_64::pic;
use crate::error::{KernelError, KernelResult};
use crate::sync::GlobalState;

// ---------------------------------------------------------------------------
// IRQ number newtype
// ---------------------------------------------------------------------------

/// IRQ line number (0-15 on the 8259 PIC pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrqNumber(pub u32);

impl IrqNumber {
    pub const fn new(irq: u32) -> Self {
        Self(irq)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for IrqNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<IrqNumber> for u32 {
    fn from(irq: IrqNumber) -> u32 {
        irq.0
    }
}

impl core::fmt::Display for IrqNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "IRQ#{}", self.0)
    }
}

/// Type alias for IRQ handler functions: a plain fn pointer so handlers
/// can be registered from static context without boxing a closure.
pub type IrqHandler = fn(IrqNumber);

/// Number of lines on the 8259 pair (PIC1 IRQ 0-7, PIC2 IRQ 8-15).
const MAX_IRQ: u32 = 16;

// ---------------------------------------------------------------------------
// Handler chaining
// ---------------------------------------------------------------------------

/// Whether a handler insists on owning its IRQ line or is willing to
/// coexist with others sharing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// No other handler may register on this line.
    Exclusive,
    /// Coexists with other `Shared` handlers on the same line.
    Shared,
}

struct HandlerEntry {
    handler: IrqHandler,
    share_mode: ShareMode,
}

/// Central IRQ manager: a handler chain per line plus a dispatch counter.
///
/// When an interrupt fires, the architecture entry point calls
/// [`dispatch`], which invokes every handler chained on that line in
/// registration order.
pub struct IrqManager {
    chains: Vec<Vec<HandlerEntry>>,
    dispatch_count: u64,
}

impl IrqManager {
    fn new() -> Self {
        let mut chains = Vec::with_capacity(MAX_IRQ as usize);
        for _ in 0..MAX_IRQ {
            chains.push(Vec::new());
        }
        Self {
            chains,
            dispatch_count: 0,
        }
    }

    /// Register a handler on `irq`. Fails if either the new registration
    /// or an existing one on the same line demands exclusivity.
    fn register(&mut self, irq: IrqNumber, handler: IrqHandler, share_mode: ShareMode) -> KernelResult<()> {
        let chain = self.chains.get_mut(irq.0 as usize).ok_or(KernelError::InvalidArgument)?;

        if let Some(existing) = chain.first() {
            if existing.share_mode == ShareMode::Exclusive || share_mode == ShareMode::Exclusive {
                return Err(KernelError::FileExists);
            }
        }

        chain.push(HandlerEntry { handler, share_mode });
        Ok(())
    }

    /// Remove `handler` from `irq`'s chain.
    fn unregister(&mut self, irq: IrqNumber, handler: IrqHandler) -> KernelResult<()> {
        let chain = self.chains.get_mut(irq.0 as usize).ok_or(KernelError::InvalidArgument)?;
        let before = chain.len();
        chain.retain(|entry| entry.handler != handler);
        if chain.len() == before {
            Err(KernelError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Invoke every handler chained on `irq`. Spurious interrupts (no
    /// handler registered) are silently counted and ignored.
    fn dispatch(&mut self, irq: IrqNumber) {
        self.dispatch_count += 1;
        if let Some(chain) = self.chains.get(irq.0 as usize) {
            for entry in chain {
                (entry.handler)(irq);
            }
        }
    }

    fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }
}

// ---------------------------------------------------------------------------
// Global state
// ---------------------------------------------------------------------------

static IRQ_MANAGER: GlobalState<Mutex<IrqManager>> = GlobalState::new();

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Initialize the IRQ manager. Must be called after [`pic::init`] has run.
/// Idempotent: a second call is a no-op, since `GlobalState::get_or_init`
/// only runs the closure the first time.
pub fn init() {
    IRQ_MANAGER.get_or_init(|| Mutex::new(IrqManager::new()));
    crate::println!("[IRQ] IRQ manager initialized");
}

/// Register `handler` on `irq`.
///
/// # Errors
/// - `KernelError::NotFound` if the IRQ manager has not been initialized.
/// - `KernelError::InvalidArgument` if `irq` is out of range.
/// - `KernelError::FileExists` if the line is already claimed exclusively,
///   or `share_mode` is `Exclusive` and another handler is already there.
pub fn register_handler(irq: IrqNumber, handler: IrqHandler, share_mode: ShareMode) -> KernelResult<()> {
    let manager = IRQ_MANAGER.get().ok_or(KernelError::NotFound)?;
    manager.lock().register(irq, handler, share_mode)
}

/// Remove `handler` from `irq`'s chain.
///
/// # Errors
/// - `KernelError::NotFound` if the manager isn't initialized, `irq` has
///   no chain, or `handler` isn't registered on it.
pub fn unregister_handler(irq: IrqNumber, handler: IrqHandler) -> KernelResult<()> {
    let manager = IRQ_MANAGER.get().ok_or(KernelError::NotFound)?;
    manager.lock().unregister(irq, handler)
}

/// Dispatch an interrupt to every handler chained on `irq`. Called by the
/// architecture-specific interrupt entry point.
pub fn dispatch(irq: IrqNumber) {
    if let Some(manager) = IRQ_MANAGER.get() {
        manager.lock().dispatch(irq);
    }
}

/// Unmask `irq` on the PIC.
pub fn enable_irq(irq: IrqNumber) -> KernelResult<()> {
    if irq.0 >= MAX_IRQ {
        return Err(KernelError::InvalidArgument);
    }
    pic::unmask_irq(irq.0 as u8);
    Ok(())
}

/// Mask `irq` on the PIC.
pub fn disable_irq(irq: IrqNumber) -> KernelResult<()> {
    if irq.0 >= MAX_IRQ {
        return Err(KernelError::InvalidArgument);
    }
    pic::mask_irq(irq.0 as u8);
    Ok(())
}

/// Send end-of-interrupt for `irq`. Must be called after every chained
/// handler has finished processing the interrupt.
pub fn eoi(irq: IrqNumber) -> KernelResult<()> {
    if irq.0 >= MAX_IRQ {
        return Err(KernelError::InvalidArgument);
    }
    pic::send_eoi(irq.0 as u8);
    Ok(())
}

/// Number of interrupts dispatched since [`init`].
pub fn dispatch_count() -> u64 {
    IRQ_MANAGER.get().map(|manager| manager.lock().dispatch_count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler_a(_irq: IrqNumber) {}
    fn handler_b(_irq: IrqNumber) {}

    #[test]
    fn exclusive_rejects_second_handler() {
        let mut manager = IrqManager::new();
        manager.register(IrqNumber(1), handler_a, ShareMode::Exclusive).unwrap();
        assert!(manager.register(IrqNumber(1), handler_b, ShareMode::Shared).is_err());
    }

    #[test]
    fn shared_handlers_chain() {
        let mut manager = IrqManager::new();
        manager.register(IrqNumber(2), handler_a, ShareMode::Shared).unwrap();
        manager.register(IrqNumber(2), handler_b, ShareMode::Shared).unwrap();
        assert_eq!(manager.chains[2].len(), 2);
    }

    #[test]
    fn unregister_removes_only_matching_handler() {
        let mut manager = IrqManager::new();
        manager.register(IrqNumber(3), handler_a, ShareMode::Shared).unwrap();
        manager.register(IrqNumber(3), handler_b, ShareMode::Shared).unwrap();
        manager.unregister(IrqNumber(3), handler_a).unwrap();
        assert_eq!(manager.chains[3].len(), 1);
        assert!(manager.unregister(IrqNumber(3), handler_a).is_err());
    }

    #[test]
    fn dispatch_invokes_every_chained_handler() {
        use core::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn counting_handler(_irq: IrqNumber) {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }

        let mut manager = IrqManager::new();
        manager.register(IrqNumber(4), counting_handler, ShareMode::Shared).unwrap();
        manager.register(IrqNumber(4), counting_handler, ShareMode::Shared).unwrap();
        manager.dispatch(IrqNumber(4));
        assert_eq!(CALLS.load(Ordering::Relaxed), 2);
        assert_eq!(manager.dispatch_count(), 1);
    }

    #[test]
    fn register_out_of_range_rejected() {
        let mut manager = IrqManager::new();
        assert!(manager.register(IrqNumber(MAX_IRQ), handler_a, ShareMode::Shared).is_err());
    }
}
