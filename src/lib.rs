//! # Tern OS
//!
//! A compact preemptive real-time kernel for ARM Cortex-M4
//! microcontrollers.
//!
//! ## Overview
//!
//! Tern OS runs on bare metal: it owns the SysTick and PendSV exception
//! vectors and time-slices a fixed set of application tasks, each with
//! its own stack and priority. Tasks block on delays, bounded queues
//! and semaphores; the scheduler resumes them on ticks and wake events,
//! always preferring the highest-priority runnable task and
//! round-robining among equals.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Tasks                     │
//! ├────────────────────────────────────────────────────────┤
//! │               Kernel API (kernel.rs)                   │
//! │   init() · task_create() · start() · delay() · yield   │
//! ├─────────────┬───────────────────┬──────────────────────┤
//! │  Scheduler  │  Waitables        │  IRQ dispatch        │
//! │ scheduler.rs│  queue.rs         │  irq.rs              │
//! │ ─ policy    │  semaphore.rs     │  ─ register()        │
//! │ ─ hand-off  │  ─ block / wake   │  ─ trampoline        │
//! ├─────────────┴───────────────────┴──────────────────────┤
//! │        Task model (task.rs) · Hooks (hooks.rs)         │
//! │     TCB · first-entry frame · state · wait cause       │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch port (arch/cortex_m4.rs)               │
//! │     PendSV · SysTick · NVIC · barriers · masking       │
//! ├────────────────────────────────────────────────────────┤
//! │          ARM Cortex-M4 hardware (Thumb-2, FPv4)        │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! On a hosted target the arch port is replaced by a recording
//! simulation (`arch/host.rs`), which is how the unit tests drive the
//! scheduler without hardware.
//!
//! ## Memory Model
//!
//! - **No heap**: queue storage, task stacks and the kernel table are
//!   all statically allocated
//! - **Application-owned TCBs**: registered with the kernel by pointer
//! - **Per-task stack**: 256 words inline in the control block
//! - **Critical sections**: nestable, interrupt masking; the tick is
//!   additionally masked around scheduler-state updates
//!
//! The kernel owns the SysTick, PendSV and default interrupt vectors;
//! applications link it together with `cortex-m-rt` (feature `rt` for
//! the bundled demo) and must not install their own handlers for those
//! exceptions.

#![no_std]

#[macro_use]
mod fmt;

pub mod arch;
pub mod config;
pub mod hooks;
pub mod irq;
pub mod kernel;
pub mod queue;
pub mod scheduler;
pub mod semaphore;
pub mod sync;
pub mod task;

pub use config::MAX_DELAY;
pub use hooks::Hooks;
pub use kernel::{OsError, OsStatus};
pub use queue::Queue;
pub use semaphore::Semaphore;
pub use task::{Priority, TaskControlBlock, TaskEntry, TaskId, TaskState};
