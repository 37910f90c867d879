//! # Kernel
//!
//! Top-level kernel state and public API for Tern OS.
//!
//! The hardware is singular, so the kernel control structure is a
//! process-wide instance reached through a raw pointer the exception
//! handlers can use. All public functions are free functions over that
//! instance.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()         ← Reset the kernel instance
//!         ├─► kernel::task_create()  ← Register tasks (×N)
//!         └─► kernel::start()        ← Sort, arm SysTick/PendSV, return
//!               └─► first tick ► first PendSV ► task at slot 0 runs
//! ```

use core::ptr::{addr_of_mut, null_mut};

use crate::hooks::Hooks;
use crate::scheduler::Kernel;
use crate::task::{Priority, QueueSide, TaskControlBlock, TaskEntry, TaskId, Wait, WaitRef};

// ---------------------------------------------------------------------------
// Status and errors
// ---------------------------------------------------------------------------

/// Status of the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OsStatus {
    /// Power-up state: registration is open, nothing is scheduled.
    Reset,
    /// `start` has armed the tick; the first dispatch has not happened.
    Stopped,
    /// The scheduler owns the CPU.
    Running,
    /// A registered interrupt handler is executing.
    Irq,
}

/// Errors returned by configuration-time kernel calls. Runtime
/// conditions (full queue, taken semaphore) are not errors — they block
/// the caller instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OsError {
    /// `init` has not been called.
    NotInitialized,
    /// The operation is only legal before `start`.
    KernelStarted,
    /// All application task slots are in use.
    TooManyTasks,
    /// Interrupt number outside the supported range.
    IrqOutOfRange,
    /// The interrupt slot already holds a handler.
    IrqSlotOccupied,
}

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// The one kernel instance.
///
/// # Safety
/// Reached through `KERNEL_PTR`, which `init` sets before anything is
/// scheduled. Exception handlers read it afterwards; every thread-mode
/// mutation happens with the tick masked or inside a critical section.
static mut KERNEL: Kernel = Kernel::new();

/// Raw pointer to the kernel for exception-context access.
static mut KERNEL_PTR: *mut Kernel = null_mut();

fn with<R>(f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
    // SAFETY: single core; the pointer is either null or the static
    // instance, and callers mutate under the masking rules above.
    unsafe { KERNEL_PTR.as_mut().map(f) }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Initialize (or re-initialize) the kernel. Must be called before any
/// other kernel function, from the main thread.
pub fn init() {
    unsafe {
        KERNEL = Kernel::new();
        KERNEL_PTR = addr_of_mut!(KERNEL);
    }
}

/// Register a task with the kernel.
///
/// The control block lives in application static storage; the kernel
/// keeps a pointer to it. Synthesizes the task's first-entry stack
/// frame, stores the priority and assigns the next identifier.
///
/// # Errors
/// [`OsError::KernelStarted`] after `start`, [`OsError::TooManyTasks`]
/// once all application slots are taken.
pub fn task_create(
    tcb: &'static mut TaskControlBlock,
    priority: Priority,
    entry: TaskEntry,
) -> Result<TaskId, OsError> {
    with(|k| k.create_task(tcb, priority, entry)).unwrap_or(Err(OsError::NotInitialized))
}

/// Finalize registration and hand the CPU to the scheduler: sorts the
/// table by priority, appends the idle task, pins PendSV to the lowest
/// exception priority and programs the 1 ms tick. Returns to the
/// caller; the first tick dispatches the task in slot 0 and the
/// caller's stack is abandoned.
pub fn start() {
    with(|k| k.start());
}

/// Block the calling task for `ticks` tick periods. Task context only;
/// zero returns immediately.
pub fn delay(ticks: u32) {
    with(|k| k.delay(ticks));
}

/// Give up the CPU: run the scheduler and pend a context switch.
pub fn yield_now() {
    with(|k| k.yield_now());
}

/// Current system status.
pub fn status() -> OsStatus {
    with(|k| k.status()).unwrap_or(OsStatus::Reset)
}

/// The most recent configuration error, if any.
pub fn last_error() -> Option<OsError> {
    with(|k| k.last_error()).flatten()
}

/// Replace the hook table. Only possible before `start`.
pub fn set_hooks(hooks: Hooks) -> Result<(), OsError> {
    with(|k| k.set_hooks(hooks)).unwrap_or(Err(OsError::NotInitialized))
}

// ---------------------------------------------------------------------------
// Crate-internal entry points
// ---------------------------------------------------------------------------

pub(crate) fn is_running() -> bool {
    with(|k| k.is_running()).unwrap_or(false)
}

pub(crate) fn set_status(status: OsStatus) {
    with(|k| k.set_status(status));
}

pub(crate) fn note_error(error: OsError) {
    with(|k| {
        k.note_error(error);
    });
}

/// The installed hook table (defaults when the kernel is untouched).
pub(crate) fn active_hooks() -> Hooks {
    with(|k| *k.hooks()).unwrap_or_else(Hooks::new)
}

/// Park the running task on a waitable. Called by queue and semaphore
/// operations with the tick about to be masked on their behalf.
pub(crate) fn block_current(wait: Wait) {
    with(|k| k.block_current(wait));
}

/// Wake the highest-priority task blocked on `queue` from `side`.
pub(crate) fn wake_queue_waiter(queue: WaitRef, side: QueueSide) {
    with(|k| k.wake_queue_waiter(queue, side));
}

/// Wake the highest-priority task blocked on `sem`.
pub(crate) fn wake_sem_waiter(sem: WaitRef) {
    with(|k| k.wake_sem_waiter(sem));
}

/// One system tick. Called from the SysTick handler.
pub(crate) fn kernel_tick() {
    with(|k| k.tick());
}

/// The context hand-off. Called from the PendSV handler with the
/// current MSP; returns the stack pointer to resume on.
#[no_mangle]
pub extern "C" fn kernel_next_context(current_sp: u32) -> u32 {
    with(|k| k.next_context(current_sp)).unwrap_or(current_sp)
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    extern crate std;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that touch the global kernel instance or the
    /// host port's recorded hardware state.
    pub fn serialize() -> MutexGuard<'static, ()> {
        LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Integration tests over the global instance (host-only): queue
// back-pressure and semaphore hand-off, with the test playing PendSV.
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::config::MAX_DELAY;
    use crate::queue::Queue;
    use crate::semaphore::Semaphore;
    use crate::task::TaskState;

    extern crate std;
    use std::boxed::Box;

    extern "C" fn spin() {}

    fn leak_tcb() -> &'static mut TaskControlBlock {
        Box::leak(Box::new(TaskControlBlock::new()))
    }

    /// Register `n` Normal-priority tasks, start the kernel and run the
    /// first dispatch. Returns the task pointers.
    fn boot(n: usize) -> std::vec::Vec<*mut TaskControlBlock> {
        init();
        let mut tasks = std::vec::Vec::new();
        for _ in 0..n {
            let tcb = leak_tcb();
            let ptr: *mut TaskControlBlock = tcb;
            task_create(unsafe { &mut *ptr }, Priority::Normal, spin).unwrap();
            tasks.push(ptr);
        }
        start();
        kernel_tick();
        kernel_next_context(0);
        tasks
    }

    /// Run the pended switch the way PendSV would.
    fn dispatch() {
        kernel_next_context(0);
    }

    fn state_of(task: *mut TaskControlBlock) -> TaskState {
        unsafe { (*task).state }
    }

    #[test]
    fn uninitialized_kernel_reports_not_initialized() {
        let _serial = test_support::serialize();
        unsafe { KERNEL_PTR = null_mut() };
        let tcb = leak_tcb();
        assert_eq!(task_create(tcb, Priority::Normal, spin), Err(OsError::NotInitialized));
        assert_eq!(status(), OsStatus::Reset);
        assert_eq!(kernel_next_context(0xBEEF), 0xBEEF, "hand-off is a no-op");
    }

    #[test]
    fn hooks_are_rejected_after_start() {
        let _serial = test_support::serialize();
        init();
        assert!(set_hooks(Hooks::new()).is_ok());
        start();
        assert_eq!(set_hooks(Hooks::new()), Err(OsError::KernelStarted));
    }

    #[test]
    fn start_arms_the_port() {
        let _serial = test_support::serialize();
        arch::reset_recorder();
        init();
        start();
        assert!(arch::pendsv_priority_lowered());
        assert_eq!(arch::tick_reload(), crate::config::SYSTEM_CLOCK_HZ / crate::config::TICK_HZ);
    }

    #[test]
    fn full_queue_blocks_producers_and_receive_wakes_exactly_one() {
        let _serial = test_support::serialize();
        // Producer 1, producer 2, consumer — equal priority, capacity 1.
        // Every yield is followed by a dispatch, the way PendSV would
        // tail the pend on hardware.
        let tasks = boot(3);
        let queue: &'static Queue<u32, 1> = Box::leak(Box::new(Queue::new()));

        // Producer 1 fills the single slot; the wake-side yield hands
        // the CPU to producer 2.
        assert!(queue.send(&10, MAX_DELAY));
        assert_eq!(queue.len(), 1);
        dispatch();
        assert_eq!(state_of(tasks[1]), TaskState::Running);

        // Producer 2 hits the full queue and parks.
        assert!(!queue.send(&20, MAX_DELAY), "parked sender cannot enqueue yet");
        assert_eq!(state_of(tasks[1]), TaskState::Blocked);
        dispatch();
        assert_eq!(state_of(tasks[2]), TaskState::Running);

        // The consumer round-robins back to producer 1, which parks too.
        yield_now();
        dispatch();
        assert_eq!(state_of(tasks[0]), TaskState::Running);
        assert!(!queue.send(&11, MAX_DELAY));
        assert_eq!(state_of(tasks[0]), TaskState::Blocked);
        dispatch();
        assert_eq!(state_of(tasks[2]), TaskState::Running);

        // One receive wakes exactly one of the two parked producers —
        // the first in the priority-sorted table — and the count never
        // exceeded capacity.
        let mut value = 0;
        assert!(queue.receive(&mut value, MAX_DELAY));
        assert_eq!(value, 10);
        assert_eq!(state_of(tasks[0]), TaskState::Ready);
        assert_eq!(state_of(tasks[1]), TaskState::Blocked);
        assert!(queue.len() <= 1);

        // The woken producer resumes and its send completes.
        dispatch();
        assert_eq!(state_of(tasks[0]), TaskState::Running);
        assert!(queue.send(&11, MAX_DELAY));
        assert_eq!(queue.len(), 1);
        assert_eq!(state_of(tasks[1]), TaskState::Blocked, "the other producer stays parked");
    }

    #[test]
    fn empty_queue_blocks_receiver_until_send() {
        let _serial = test_support::serialize();
        let tasks = boot(2);
        let queue: &'static Queue<u8, 4> = Box::leak(Box::new(Queue::new()));

        let mut value = 0;
        assert!(!queue.receive(&mut value, MAX_DELAY));
        assert_eq!(state_of(tasks[0]), TaskState::Blocked);
        dispatch();

        // The send's 0 → 1 transition wakes the parked receiver.
        assert!(queue.send(&7, MAX_DELAY));
        assert_eq!(state_of(tasks[0]), TaskState::Ready);
        dispatch();
        assert_eq!(state_of(tasks[0]), TaskState::Running);
        assert!(queue.receive(&mut value, MAX_DELAY));
        assert_eq!(value, 7);
    }

    #[test]
    fn semaphore_take_blocks_until_give_then_alternates() {
        let _serial = test_support::serialize();
        let tasks = boot(2);
        let sem: &'static Semaphore = Box::leak(Box::new(Semaphore::new(1, 0)));

        // Initialized taken: the first take parks the caller. On the
        // host port a parked caller returns immediately with `false`;
        // the retry below models its resumption.
        assert!(sem.is_locked());
        assert!(!sem.take());
        assert_eq!(state_of(tasks[0]), TaskState::Blocked);
        dispatch();
        assert_eq!(state_of(tasks[1]), TaskState::Running);

        // The give releases the flag and readies the waiter.
        sem.give();
        assert!(!sem.is_locked());
        assert_eq!(state_of(tasks[0]), TaskState::Ready);
        dispatch();
        assert_eq!(state_of(tasks[0]), TaskState::Running);

        // The woken task acquires; the flag alternates back to taken.
        assert!(sem.take());
        assert!(sem.is_locked());
    }

    #[test]
    fn give_prefers_highest_priority_waiter() {
        let _serial = test_support::serialize();
        init();
        let high = leak_tcb();
        let high_ptr: *mut TaskControlBlock = high;
        task_create(unsafe { &mut *high_ptr }, Priority::High, spin).unwrap();
        let low = leak_tcb();
        let low_ptr: *mut TaskControlBlock = low;
        task_create(unsafe { &mut *low_ptr }, Priority::Low, spin).unwrap();
        let normal = leak_tcb();
        let normal_ptr: *mut TaskControlBlock = normal;
        task_create(unsafe { &mut *normal_ptr }, Priority::Normal, spin).unwrap();
        start();
        kernel_tick();
        dispatch();

        let sem: &'static Semaphore = Box::leak(Box::new(Semaphore::new(1, 0)));
        // High parks first, then normal; low keeps running.
        assert!(!sem.take());
        dispatch();
        assert!(!sem.take());
        dispatch();
        assert_eq!(state_of(low_ptr), TaskState::Running);

        sem.give();
        assert_eq!(state_of(high_ptr), TaskState::Ready, "highest-priority waiter wakes");
        assert_eq!(state_of(normal_ptr), TaskState::Blocked);
        dispatch();
        assert_eq!(state_of(high_ptr), TaskState::Running);
    }
}
