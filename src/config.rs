//! # Tern OS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time — no dynamic allocation anywhere in the kernel.

/// Maximum number of application tasks. The kernel adds one more slot
/// for its own idle task. Increase with care — every registered task
/// carries a `STACK_WORDS` stack in its control block.
pub const MAX_USER_TASKS: usize = 8;

/// Total task-table slots: application tasks plus the idle task.
pub const MAX_TASKS: usize = MAX_USER_TASKS + 1;

/// Per-task stack size in 32-bit words (full descending). Must hold the
/// deepest call chain plus the 8-word hardware exception frame and the
/// 9-word software-saved context.
pub const STACK_WORDS: usize = 256;

/// Task display-name length in bytes. Longer names are truncated.
pub const TASK_NAME_LEN: usize = 10;

/// Number of task priority levels (see [`crate::task::Priority`]).
pub const PRIORITY_LEVELS: usize = 4;

/// Tick frequency in Hz. 1000 gives the 1 ms kernel tick.
pub const TICK_HZ: u32 = 1_000;

/// Core clock in Hz (STM32F4 on the 16 MHz HSI). The tick reload value
/// is derived from this at `start`.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Upper bound on a queue's capacity in elements.
pub const MAX_QUEUE_CAPACITY: usize = 128;

/// Number of external interrupt lines the dispatch table covers (0..=91).
pub const IRQ_LINES: usize = 92;

/// Conventional "block forever" timeout argument for queue operations.
pub const MAX_DELAY: u32 = u32::MAX;
