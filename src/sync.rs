//! # Critical Sections
//!
//! Nestable critical sections over the port's interrupt mask. All shared
//! kernel state is mutated inside one of these (or with the tick masked),
//! so the scheduler and the tick handler can never observe a partial
//! update.
//!
//! Nesting is counted; only the outermost `exit` re-enables interrupts.
//! Sections must stay short and must never call anything that can yield.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch;

/// Current nesting depth. Single core: plain relaxed counting is enough,
/// interrupts are already off by the time it is incremented.
static DEPTH: AtomicU32 = AtomicU32::new(0);

/// Enter a critical section. Disables interrupts on first entry; calls
/// must pair with [`exit`].
#[inline]
pub fn enter() {
    arch::irq_disable();
    DEPTH.fetch_add(1, Ordering::Relaxed);
}

/// Leave a critical section. Interrupts come back on only at the
/// outermost exit.
#[inline]
pub fn exit() {
    if DEPTH.fetch_sub(1, Ordering::Relaxed) == 1 {
        arch::irq_enable();
    }
}

/// Run `f` inside a critical section.
///
/// # Usage
/// ```ignore
/// sync::with(|| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn with<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    enter();
    let result = f();
    exit();
    result
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
