//! # IRQ Dispatch
//!
//! A fixed table mapping external interrupt numbers to a handler and an
//! opaque user-data pointer. The vector entry for every supported
//! interrupt is a trampoline into [`dispatch`], which flips the system
//! status to `Irq` around the handler call. Registration enables the
//! line at the NVIC; unregistration masks it and drops pending state.
//!
//! Handlers run in handler mode: they must never allocate and never
//! call anything that can block.

use core::ptr::{addr_of, addr_of_mut, null_mut};

use crate::arch;
use crate::config::IRQ_LINES;
use crate::kernel::{self, OsError, OsStatus};

/// Signature of a registered interrupt handler.
pub type IrqHandler = fn(*mut ());

#[derive(Clone, Copy)]
struct Slot {
    handler: Option<IrqHandler>,
    data: *mut (),
}

const EMPTY: Slot = Slot { handler: None, data: null_mut() };

/// One slot per supported external interrupt (0..=91). Kernel-owned.
///
/// # Safety
/// Mutated only by `register`/`unregister` with the line masked at the
/// NVIC, read by `dispatch` in handler mode.
static mut VECTORS: [Slot; IRQ_LINES] = [EMPTY; IRQ_LINES];

/// Install `handler` for interrupt `irq`, clear any pending request and
/// enable the line at the NVIC.
///
/// # Errors
/// [`OsError::IrqOutOfRange`] outside 0..=91,
/// [`OsError::IrqSlotOccupied`] when a handler is already installed.
pub fn register(irq: u16, handler: IrqHandler, data: *mut ()) -> Result<(), OsError> {
    if irq as usize >= IRQ_LINES {
        kernel::note_error(OsError::IrqOutOfRange);
        return Err(OsError::IrqOutOfRange);
    }
    // SAFETY: the line is not yet enabled, so no dispatch races this.
    let slot = unsafe { &mut (*addr_of_mut!(VECTORS))[irq as usize] };
    if slot.handler.is_some() {
        kernel::note_error(OsError::IrqSlotOccupied);
        return Err(OsError::IrqSlotOccupied);
    }
    *slot = Slot { handler: Some(handler), data };
    arch::nvic_clear_pending(irq);
    arch::nvic_enable(irq);
    os_debug!("irq {} registered", irq);
    Ok(())
}

/// Remove the handler for `irq`, mask the line and drop pending state.
pub fn unregister(irq: u16) -> Result<(), OsError> {
    if irq as usize >= IRQ_LINES {
        kernel::note_error(OsError::IrqOutOfRange);
        return Err(OsError::IrqOutOfRange);
    }
    arch::nvic_disable(irq);
    // SAFETY: the line is masked; no dispatch can observe the slot.
    unsafe { (*addr_of_mut!(VECTORS))[irq as usize] = EMPTY };
    arch::nvic_clear_pending(irq);
    os_debug!("irq {} unregistered", irq);
    Ok(())
}

/// Trampoline target for external interrupt `irq`: invoke the
/// registered handler with its user data, with the system status set to
/// `Irq` for the duration. An empty slot is ignored.
pub fn dispatch(irq: u16) {
    if irq as usize >= IRQ_LINES {
        return;
    }
    // SAFETY: slots change only while the line is masked.
    let Slot { handler, data } = unsafe { (*addr_of!(VECTORS))[irq as usize] };
    let Some(handler) = handler else {
        return;
    };
    let previous = kernel::status();
    kernel::set_status(OsStatus::Irq);
    handler(data);
    kernel::set_status(previous);
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
