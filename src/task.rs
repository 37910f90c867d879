//! # Task Control Block
//!
//! Defines the task model for Tern OS. Each task is a fixed-priority
//! thread of execution with its own private stack; the kernel holds a
//! non-owning pointer to the control block the application allocates in
//! static storage.

use crate::config::{STACK_WORDS, TASK_NAME_LEN};

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the scheduler's state machine.
///
/// ```text
///   ┌──────────┐      dispatch       ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲                                │
///        │       tick / yield             │
///        └───────────────────────────────┘
///        │                                │
///        │       delay / queue / sem      ▼
///        │                          ┌──────────┐
///        └───────────────────────── │ Blocked  │
///            wake / delay expiry    └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Task is currently executing on the CPU.
    Running,
    /// Task is ready to run and waiting for the scheduler.
    Ready,
    /// Task is parked on a delay, a queue or a semaphore.
    Blocked,
    /// Task is not schedulable.
    Suspended,
}

// ---------------------------------------------------------------------------
// Priority levels
// ---------------------------------------------------------------------------

/// Task priority. Lower ordinal means higher priority; the task table is
/// sorted by this at `start`, so "low index" and "high priority" are the
/// same thing everywhere in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    VeryHigh = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

// ---------------------------------------------------------------------------
// Blocking cause
// ---------------------------------------------------------------------------

/// Stable address of the waitable object a task is parked on. Queues and
/// semaphores live in `'static` storage, so their address identifies them
/// for the lifetime of the system.
pub type WaitRef = *const ();

/// Which side of a queue operation a task blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueSide {
    /// Blocked sending into a full queue.
    Send,
    /// Blocked receiving from an empty queue.
    Receive,
}

/// Why a Blocked task is blocked. At most one cause at a time; `None`
/// for every task that is not Blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    None,
    /// Sleeping; the tick handler counts this down and wakes at zero.
    Delay(u32),
    /// Parked on a queue, from the given side.
    Queue { queue: WaitRef, side: QueueSide },
    /// Parked on a semaphore.
    Semaphore(WaitRef),
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Entry point of a task. Tasks normally never return; one that does
/// lands in the return trap hook.
pub type TaskEntry = extern "C" fn();

/// Task identifier, assigned in registration order starting from 1.
pub type TaskId = u8;

/// Words in the synthesized first-entry frame: the 8-word hardware
/// exception frame plus EXC_RETURN and R4–R11.
pub(crate) const FRAME_WORDS: usize = 17;

/// xPSR with only the Thumb bit set — the only mode Armv7-M executes.
const XPSR_THUMB: u32 = 1 << 24;

/// EXC_RETURN selecting "return to Thread mode, main stack, no FPU
/// state". Popped into LR by PendSV on the task's first dispatch.
pub(crate) const EXC_RETURN_THREAD_MSP: u32 = 0xFFFF_FFF9;

/// Task Control Block — the per-task state the kernel knows about.
///
/// Owned by the application (static storage) and registered with the
/// kernel by pointer. The stack is the first field and the struct is
/// 8-byte aligned, so the top of the stack satisfies AAPCS alignment.
#[repr(align(8))]
pub struct TaskControlBlock {
    /// Private task stack, full descending.
    pub(crate) stack: [u32; STACK_WORDS],
    /// Saved stack pointer: top of the task's last-saved frame. Only
    /// current after PendSV has stacked the task, or right after
    /// registration while the synthesized frame is still in place.
    pub(crate) stack_pointer: u32,
    /// Entry point recorded at registration.
    pub(crate) entry: Option<TaskEntry>,
    pub(crate) state: TaskState,
    pub(crate) priority: Priority,
    pub(crate) id: TaskId,
    /// Fixed-width display name, NUL-padded.
    pub(crate) name: [u8; TASK_NAME_LEN],
    /// Blocking cause; `Wait::None` unless `state` is `Blocked`.
    pub(crate) wait: Wait,
}

// SAFETY: the control block carries raw waitable addresses, but every
// access to a registered TCB happens under masked ticks or a critical
// section, on a single core.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unregistered control block. Registration fills in the rest.
    pub const fn new() -> Self {
        Self {
            stack: [0; STACK_WORDS],
            stack_pointer: 0,
            entry: None,
            state: TaskState::Suspended,
            priority: Priority::Low,
            id: 0,
            name: [0; TASK_NAME_LEN],
            wait: Wait::None,
        }
    }

    /// Current execution state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Priority given at registration.
    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Identifier assigned at registration; 0 until registered.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Entry point recorded at registration.
    #[inline]
    pub fn entry(&self) -> Option<TaskEntry> {
        self.entry
    }

    /// Set the display name, truncated to [`TASK_NAME_LEN`] bytes.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; TASK_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(TASK_NAME_LEN);
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    /// The display name, up to the first NUL.
    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(TASK_NAME_LEN);
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Lay out the first-entry frame at the top of the stack.
    ///
    /// From the top downward: xPSR (Thumb bit), PC = entry, LR = the
    /// return trap, R12, R3–R0, then the block PendSV pops on its way
    /// out: EXC_RETURN and R4–R11. The saved stack pointer lands on the
    /// last word of the frame, so the first dispatch unstacks straight
    /// into the entry point.
    pub(crate) fn seed_stack_frame(&mut self, entry: TaskEntry, return_trap: usize) {
        let top = STACK_WORDS;
        for word in &mut self.stack[top - FRAME_WORDS..] {
            *word = 0;
        }
        self.stack[top - 1] = XPSR_THUMB;
        self.stack[top - 2] = entry as usize as u32;
        self.stack[top - 3] = return_trap as u32;
        // R12, R3, R2, R1, R0 stay zero.
        self.stack[top - 9] = EXC_RETURN_THREAD_MSP;
        // R4–R11 stay zero.
        self.stack_pointer = self.stack[top - FRAME_WORDS..].as_ptr() as u32;
        self.entry = Some(entry);
    }
}

impl Default for TaskControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
