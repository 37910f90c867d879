//! # Host Simulation Port
//!
//! Stands in for the Cortex-M4 port when the crate is compiled for a
//! hosted target. Every operation records what firmware would have asked
//! the hardware to do; unit tests read that state back while driving the
//! kernel's tick and context hand-off directly, playing the part of the
//! SysTick and PendSV exceptions.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::IRQ_LINES;

static IRQS_ENABLED: AtomicBool = AtomicBool::new(true);
static TICK_MASKED: AtomicBool = AtomicBool::new(false);
static SWITCHES_PENDED: AtomicU32 = AtomicU32::new(0);
static TICK_RELOAD: AtomicU32 = AtomicU32::new(0);
static PENDSV_LOWERED: AtomicBool = AtomicBool::new(false);
static NVIC_ENABLED: [AtomicBool; IRQ_LINES] = [const { AtomicBool::new(false) }; IRQ_LINES];
static NVIC_PENDING: [AtomicBool; IRQ_LINES] = [const { AtomicBool::new(false) }; IRQ_LINES];

// ---------------------------------------------------------------------------
// The port surface (same shape as the Cortex-M4 port)
// ---------------------------------------------------------------------------

#[inline]
pub fn irq_disable() {
    IRQS_ENABLED.store(false, Ordering::SeqCst);
}

#[inline]
pub fn irq_enable() {
    IRQS_ENABLED.store(true, Ordering::SeqCst);
}

#[inline]
pub fn mask_tick() {
    TICK_MASKED.store(true, Ordering::SeqCst);
}

#[inline]
pub fn unmask_tick() {
    TICK_MASKED.store(false, Ordering::SeqCst);
}

/// Record a context-switch request; tests call the hand-off themselves.
#[inline]
pub fn pend_context_switch() {
    SWITCHES_PENDED.fetch_add(1, Ordering::SeqCst);
}

#[inline]
pub fn isb() {}

#[inline]
pub fn dsb() {}

#[inline]
pub fn wait_for_interrupt() {}

pub fn set_pendsv_lowest_priority() {
    PENDSV_LOWERED.store(true, Ordering::SeqCst);
}

pub fn start_tick(reload: u32) {
    TICK_RELOAD.store(reload, Ordering::SeqCst);
}

pub fn nvic_enable(irq: u16) {
    NVIC_ENABLED[irq as usize].store(true, Ordering::SeqCst);
}

pub fn nvic_disable(irq: u16) {
    NVIC_ENABLED[irq as usize].store(false, Ordering::SeqCst);
}

pub fn nvic_clear_pending(irq: u16) {
    NVIC_PENDING[irq as usize].store(false, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// Test observers
// ---------------------------------------------------------------------------

/// Reset everything the port has recorded. Tests touching this state
/// serialize on the kernel test lock first.
pub fn reset_recorder() {
    IRQS_ENABLED.store(true, Ordering::SeqCst);
    TICK_MASKED.store(false, Ordering::SeqCst);
    SWITCHES_PENDED.store(0, Ordering::SeqCst);
    TICK_RELOAD.store(0, Ordering::SeqCst);
    PENDSV_LOWERED.store(false, Ordering::SeqCst);
    for line in &NVIC_ENABLED {
        line.store(false, Ordering::SeqCst);
    }
    for line in &NVIC_PENDING {
        line.store(false, Ordering::SeqCst);
    }
}

pub fn irqs_enabled() -> bool {
    IRQS_ENABLED.load(Ordering::SeqCst)
}

pub fn tick_masked() -> bool {
    TICK_MASKED.load(Ordering::SeqCst)
}

/// Context switches requested since the last recorder reset.
pub fn pend_count() -> u32 {
    SWITCHES_PENDED.load(Ordering::SeqCst)
}

pub fn tick_reload() -> u32 {
    TICK_RELOAD.load(Ordering::SeqCst)
}

pub fn pendsv_priority_lowered() -> bool {
    PENDSV_LOWERED.load(Ordering::SeqCst)
}

pub fn nvic_is_enabled(irq: u16) -> bool {
    NVIC_ENABLED[irq as usize].load(Ordering::SeqCst)
}

pub fn nvic_is_pending(irq: u16) -> bool {
    NVIC_PENDING[irq as usize].load(Ordering::SeqCst)
}

/// Deliver interrupt `irq` the way the NVIC would: dispatch if the line
/// is enabled, otherwise leave it pending.
pub fn raise_irq(irq: u16) {
    if NVIC_ENABLED[irq as usize].load(Ordering::SeqCst) {
        crate::irq::dispatch(irq);
    } else {
        NVIC_PENDING[irq as usize].store(true, Ordering::SeqCst);
    }
}
