//! # Hook Table
//!
//! The kernel exposes a small set of application override points: the
//! idle task body, a per-tick callback, a trap for tasks that return
//! from their entry function, and a fatal-error handler. They are plain
//! function pointers with safe defaults, replaceable as a group before
//! `start` (the Rust rendition of a weak-symbol surface).

use crate::arch;

/// Body of the idle task. Runs whenever every registered task is
/// blocked; must never return.
pub type IdleHook = fn() -> !;

/// Invoked from the tick handler after the scheduling decision.
pub type TickHook = fn();

/// Trap for a task that returns from its entry function.
pub type TaskReturnHook = fn() -> !;

/// Invoked on a fatal kernel error with the address of the detecting
/// routine.
pub type ErrorHook = fn(usize) -> !;

/// The hook table. Install a replacement with
/// [`crate::kernel::set_hooks`] before starting the kernel.
#[derive(Clone, Copy)]
pub struct Hooks {
    pub idle: IdleHook,
    pub on_tick: TickHook,
    pub on_task_return: TaskReturnHook,
    pub on_error: ErrorHook,
}

impl Hooks {
    /// The default table: idle and return-trap sleep on WFI, the tick
    /// hook does nothing, a fatal error halts.
    pub const fn new() -> Self {
        Self {
            idle: default_idle,
            on_tick: default_tick,
            on_task_return: default_task_return,
            on_error: default_error,
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_idle() -> ! {
    loop {
        arch::wait_for_interrupt();
    }
}

fn default_tick() {}

fn default_task_return() -> ! {
    loop {
        arch::wait_for_interrupt();
    }
}

fn default_error(_caller: usize) -> ! {
    loop {}
}

// ---------------------------------------------------------------------------
// Trampolines
// ---------------------------------------------------------------------------

/// Entry point of the kernel-created idle task; defers to whatever idle
/// body is installed.
pub(crate) extern "C" fn idle_task_entry() {
    (crate::kernel::active_hooks().idle)()
}

/// Planted in the LR slot of every synthesized first-entry frame. A task
/// that falls off the end of its entry function lands here in Thread
/// mode.
pub(crate) extern "C" fn task_return_trap() {
    (crate::kernel::active_hooks().on_task_return)()
}
