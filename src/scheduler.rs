//! # Scheduler
//!
//! Core scheduling logic for Tern OS: the task table, the priority
//! policy with round-robin among equals, the context hand-off PendSV
//! drives, the tick-driven time base and the block/wake hooks the
//! synchronization primitives call.
//!
//! ## Scheduling Algorithm
//!
//! The table is sorted by priority at `start`, so a low index means a
//! high priority. On every decision the scheduler walks the table from
//! the top:
//!
//! 1. Not running yet → the next dispatch goes to slot 0.
//! 2. Every registered task Blocked → fall back to the idle task, after
//!    marking each waiter in the one-shot wake array.
//! 3. Otherwise, per task: a Ready task below the cursor is taken
//!    immediately (it outranks the current runner, or is next in the
//!    round-robin); a Ready task at or above the cursor is taken only if
//!    its one-shot marker is set (it blocked while outranking the runner
//!    and has come back); a Blocked task at or above the cursor gets its
//!    marker set; the runner in the last slot wraps the cursor back to
//!    the top of the table.
//!
//! The one-shot markers are what give a freshly woken high-priority task
//! the CPU ahead of the round-robin, within one tick of the wake.

use core::ptr::null_mut;

use crate::arch;
use crate::config::{MAX_TASKS, MAX_USER_TASKS, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::hooks::{self, Hooks};
use crate::kernel::{OsError, OsStatus};
use crate::task::{Priority, QueueSide, TaskControlBlock, TaskEntry, TaskId, TaskState, Wait, WaitRef};

type TaskRef = *mut TaskControlBlock;

// ---------------------------------------------------------------------------
// Kernel control structure
// ---------------------------------------------------------------------------

/// The kernel control structure: task table, scheduling state and hook
/// table. One instance exists per system (see [`crate::kernel`]); tests
/// on the host port may build their own, as long as it does not move
/// after [`Kernel::start`] (the idle slot points into the structure).
pub struct Kernel {
    status: OsStatus,
    last_error: Option<OsError>,
    /// Task currently on the CPU. Valid once the kernel is Running.
    current: TaskRef,
    /// Task the next PendSV switches to.
    next: TaskRef,
    /// Registered tasks, priority-sorted at `start`; slot `user_tasks`
    /// holds the idle task after that.
    table: [TaskRef; MAX_TASKS],
    /// Number of registered application tasks.
    user_tasks: usize,
    /// Round-robin cursor: table index of the last scheduling choice.
    last_index: usize,
    /// One-shot wake markers, indexed like `table`: set when a task is
    /// observed Blocked at or above the cursor, cleared when that same
    /// slot is chosen again.
    wake_pending: [bool; MAX_TASKS],
    /// Kernel-owned idle task, appended to the table at `start`.
    idle: TaskControlBlock,
    hooks: Hooks,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            status: OsStatus::Reset,
            last_error: None,
            current: null_mut(),
            next: null_mut(),
            table: [null_mut(); MAX_TASKS],
            user_tasks: 0,
            last_index: 0,
            wake_pending: [false; MAX_TASKS],
            idle: TaskControlBlock::new(),
            hooks: Hooks::new(),
        }
    }

    #[inline]
    pub fn status(&self) -> OsStatus {
        self.status
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        matches!(self.status, OsStatus::Running)
    }

    pub(crate) fn set_status(&mut self, status: OsStatus) {
        self.status = status;
    }

    #[inline]
    pub fn last_error(&self) -> Option<OsError> {
        self.last_error
    }

    pub(crate) fn note_error(&mut self, error: OsError) -> OsError {
        self.last_error = Some(error);
        error
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Replace the hook table. Only possible before `start`.
    pub(crate) fn set_hooks(&mut self, hooks: Hooks) -> Result<(), OsError> {
        if !matches!(self.status, OsStatus::Reset) {
            return Err(self.note_error(OsError::KernelStarted));
        }
        self.hooks = hooks;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registration and startup
    // -----------------------------------------------------------------------

    /// Register a task: synthesize its first-entry frame, mark it Ready
    /// and append it to the table. Only possible before `start`. The
    /// caller hands over exclusive access to the control block for the
    /// lifetime of the kernel.
    pub fn create_task(
        &mut self,
        task: &'static mut TaskControlBlock,
        priority: Priority,
        entry: TaskEntry,
    ) -> Result<TaskId, OsError> {
        if !matches!(self.status, OsStatus::Reset) {
            return Err(self.note_error(OsError::KernelStarted));
        }
        if self.user_tasks == MAX_USER_TASKS {
            return Err(self.note_error(OsError::TooManyTasks));
        }

        let id = (self.user_tasks + 1) as TaskId;
        task.seed_stack_frame(entry, hooks::task_return_trap as usize);
        task.state = TaskState::Ready;
        task.priority = priority;
        task.id = id;
        task.wait = Wait::None;

        self.table[self.user_tasks] = task;
        self.user_tasks += 1;
        os_debug!("task {} registered, priority {}", id, priority as u8);
        Ok(id)
    }

    /// Finalize registration and arm the scheduler.
    ///
    /// Sorts the table by priority, appends the idle task, masks the
    /// tick while PendSV is pinned to the lowest exception priority and
    /// SysTick is programmed for the 1 ms tick, then returns. The first
    /// tick performs the first dispatch, into slot 0.
    pub fn start(&mut self) {
        self.sort_by_priority();
        self.spawn_idle();

        arch::mask_tick();
        self.status = OsStatus::Stopped;
        self.current = null_mut();
        self.next = null_mut();
        arch::set_pendsv_lowest_priority();
        arch::start_tick(SYSTEM_CLOCK_HZ / TICK_HZ);
        arch::unmask_tick();
        os_debug!("kernel armed with {} tasks", self.user_tasks as u32);
    }

    /// Bubble sort by priority, ascending ordinal. N ≤ 8 and this runs
    /// once; stable, so equal priorities keep registration order.
    fn sort_by_priority(&mut self) {
        let n = self.user_tasks;
        for pass in 0..n.saturating_sub(1) {
            for j in 0..n - pass - 1 {
                // SAFETY: slots 0..n hold registered TCBs.
                let swap = unsafe { (*self.table[j]).priority > (*self.table[j + 1]).priority };
                if swap {
                    self.table.swap(j, j + 1);
                }
            }
        }
    }

    /// Build the idle task in the kernel-owned slot after the last
    /// registered task. It never delays and never blocks.
    fn spawn_idle(&mut self) {
        let id = (self.user_tasks + 1) as TaskId;
        let idle: TaskRef = &mut self.idle;
        // SAFETY: `idle` lives inside this structure, which is pinned in
        // static storage (or held in place by tests) once started.
        let task = unsafe { &mut *idle };
        task.seed_stack_frame(hooks::idle_task_entry, hooks::task_return_trap as usize);
        task.state = TaskState::Ready;
        task.priority = Priority::Low;
        task.id = id;
        task.wait = Wait::None;
        task.set_name("idle");
        self.table[self.user_tasks] = idle;
    }

    // -----------------------------------------------------------------------
    // Scheduling policy
    // -----------------------------------------------------------------------

    /// One scheduling decision: choose `next`. PendSV commits it.
    pub(crate) fn schedule(&mut self) {
        if !self.is_running() {
            // First decision after `start`: dispatch goes to slot 0.
            self.current = self.table[0];
            return;
        }

        let n = self.user_tasks;

        let blocked = (0..n).filter(|&i| self.state_at(i) == TaskState::Blocked).count();
        if blocked == n {
            // Everything waits. Each waiter outranks the idle task, so
            // mark them all; the first to wake is honored on the next
            // decision after the wake.
            for marker in &mut self.wake_pending[..n] {
                *marker = true;
            }
            if self.current != self.table[n] {
                self.next = self.table[n];
                self.last_index = n;
            }
            return;
        }

        for i in 0..n {
            match self.state_at(i) {
                TaskState::Running => {
                    if i == n - 1 {
                        // The runner sits in the last slot: wrap the
                        // round-robin. Slot 0 takes over only if it can
                        // actually run.
                        self.last_index = 0;
                        if self.state_at(0) == TaskState::Ready {
                            self.next = self.table[0];
                        }
                    }
                }
                TaskState::Ready if i > self.last_index => {
                    self.next = self.table[i];
                    self.last_index = i;
                    return;
                }
                TaskState::Ready => {
                    // At or above the cursor: take it only on a one-shot
                    // wake, i.e. it blocked while outranking the runner
                    // and is back.
                    if self.wake_pending[i] {
                        self.wake_pending[i] = false;
                        self.next = self.table[i];
                        self.last_index = i;
                        return;
                    }
                }
                TaskState::Blocked => {
                    if i <= self.last_index {
                        self.wake_pending[i] = true;
                    }
                }
                TaskState::Suspended => {}
            }
        }
    }

    #[inline]
    fn state_at(&self, index: usize) -> TaskState {
        // SAFETY: callers stay within the populated part of the table.
        unsafe { (*self.table[index]).state }
    }

    // -----------------------------------------------------------------------
    // Context hand-off
    // -----------------------------------------------------------------------

    /// PendSV's hand-off: save the outgoing stack pointer, return the
    /// incoming one.
    ///
    /// The first call delivers the synthesized frame of the task chosen
    /// by the first decision and moves the system to Running. After
    /// that: the outgoing task keeps Blocked or Suspended if it parked
    /// itself, otherwise drops from Running to Ready; the chosen task
    /// becomes Running.
    pub(crate) fn next_context(&mut self, current_sp: u32) -> u32 {
        if !self.is_running() {
            let Some(task) = (unsafe { self.current.as_mut() }) else {
                // PendSV before any decision: stay on the caller's stack.
                return current_sp;
            };
            task.state = TaskState::Running;
            self.status = OsStatus::Running;
            return task.stack_pointer;
        }

        let Some(outgoing) = (unsafe { self.current.as_mut() }) else {
            // Running with no current task cannot happen in a consistent
            // system; halt through the application's error hook.
            let detector: fn(&mut Kernel, u32) -> u32 = Kernel::next_context;
            (self.hooks.on_error)(detector as usize)
        };

        outgoing.stack_pointer = current_sp;
        if outgoing.state == TaskState::Running {
            outgoing.state = TaskState::Ready;
        }

        if self.next.is_null() {
            // No decision since the last switch; keep running.
            outgoing.state = TaskState::Running;
            return current_sp;
        }

        self.current = self.next;
        // SAFETY: `next` is always a populated table slot.
        let incoming = unsafe { &mut *self.current };
        incoming.state = TaskState::Running;
        incoming.stack_pointer
    }

    // -----------------------------------------------------------------------
    // Time base
    // -----------------------------------------------------------------------

    /// One system tick: scheduling decision, delay aging, tick hook.
    /// The port pends PendSV and issues barriers after this returns.
    pub(crate) fn tick(&mut self) {
        os_trace!("tick");
        self.schedule();
        self.delay_tick();
        (self.hooks.on_tick)();
    }

    /// Age every delay-blocked task, waking those whose delay expires.
    fn delay_tick(&mut self) {
        for i in 0..self.user_tasks {
            // SAFETY: slots 0..user_tasks hold registered TCBs.
            let task = unsafe { &mut *self.table[i] };
            if task.state != TaskState::Blocked {
                continue;
            }
            if let Wait::Delay(ref mut ticks) = task.wait {
                *ticks -= 1;
                if *ticks == 0 {
                    task.wait = Wait::None;
                    task.state = TaskState::Ready;
                }
            }
        }
    }

    /// Block the running task for `ticks` tick periods. Task context
    /// only; a zero delay is a no-op.
    pub(crate) fn delay(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        // The delay field and status must change atomically with respect
        // to the tick handler that ages them. The mask lifts before the
        // yield: the switch must not carry it into the next task.
        arch::mask_tick();
        if let Some(task) = self.find_running() {
            task.wait = Wait::Delay(ticks);
            task.state = TaskState::Blocked;
        }
        arch::unmask_tick();
        self.yield_now();
    }

    /// Run the scheduler and pend a context switch from thread mode.
    pub(crate) fn yield_now(&mut self) {
        self.schedule();
        arch::isb();
        arch::pend_context_switch();
        arch::dsb();
    }

    fn find_running(&mut self) -> Option<&mut TaskControlBlock> {
        for i in 0..self.user_tasks {
            // SAFETY: slots 0..user_tasks hold registered TCBs.
            let task = unsafe { &mut *self.table[i] };
            if task.state == TaskState::Running {
                return Some(task);
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Block / wake hooks for the synchronization primitives
    // -----------------------------------------------------------------------

    /// Park the running task on a waitable and give up the CPU.
    pub(crate) fn block_current(&mut self, wait: Wait) {
        arch::mask_tick();
        if let Some(task) = self.find_running() {
            task.wait = wait;
            task.state = TaskState::Blocked;
        }
        arch::unmask_tick();
        self.yield_now();
    }

    /// Wake the task blocked on `queue` from `side`; the table is
    /// priority-sorted, so the first match is the highest-priority
    /// waiter.
    pub(crate) fn wake_queue_waiter(&mut self, queue: WaitRef, side: QueueSide) {
        self.wake_first(|wait| matches!(wait, Wait::Queue { queue: q, side: s } if q == queue && s == side));
    }

    /// Wake the highest-priority task blocked on `sem`.
    pub(crate) fn wake_sem_waiter(&mut self, sem: WaitRef) {
        self.wake_first(|wait| matches!(wait, Wait::Semaphore(s) if s == sem));
    }

    fn wake_first(&mut self, matches_wait: impl Fn(Wait) -> bool) {
        arch::mask_tick();
        for i in 0..self.user_tasks {
            // SAFETY: slots 0..user_tasks hold registered TCBs.
            let task = unsafe { &mut *self.table[i] };
            if task.state == TaskState::Blocked && matches_wait(task.wait) {
                task.wait = Wait::None;
                task.state = TaskState::Ready;
                break;
            }
        }
        arch::unmask_tick();
        // Yield even when nobody matched, so a freshly runnable
        // higher-priority task preempts the caller promptly.
        self.yield_now();
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only): these drive `tick` and `next_context` directly,
// playing the part of the SysTick and PendSV exceptions.
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STACK_WORDS;
    use crate::task::FRAME_WORDS;

    extern crate std;
    use std::boxed::Box;
    use std::vec::Vec;

    extern "C" fn spin() {}

    fn kernel_with(priorities: &[Priority]) -> (Box<Kernel>, Vec<TaskRef>) {
        let mut kernel = Box::new(Kernel::new());
        let mut tasks = Vec::new();
        for &priority in priorities {
            let tcb: &'static mut TaskControlBlock = Box::leak(Box::new(TaskControlBlock::new()));
            let ptr: TaskRef = tcb;
            kernel.create_task(unsafe { &mut *ptr }, priority, spin).unwrap();
            tasks.push(ptr);
        }
        (kernel, tasks)
    }

    /// Play one SysTick + PendSV round; returns the stack pointer the
    /// switch would load.
    fn run_tick(kernel: &mut Kernel, sp: u32) -> u32 {
        kernel.tick();
        kernel.next_context(sp)
    }

    fn running_id(kernel: &Kernel) -> TaskId {
        let mut found = 0;
        let mut id = 0;
        for i in 0..=kernel.user_tasks {
            let task = unsafe { &*kernel.table[i] };
            if task.state == TaskState::Running {
                found += 1;
                id = task.id;
            }
        }
        assert_eq!(found, 1, "exactly one task must be Running");
        id
    }

    fn state_of(task: TaskRef) -> TaskState {
        unsafe { (*task).state }
    }

    #[test]
    fn first_dispatch_selects_highest_priority() {
        // Registered low-priority first: the sort must move High to slot 0.
        let (mut kernel, tasks) = kernel_with(&[Priority::Normal, Priority::High]);
        kernel.start();
        assert_eq!(kernel.status(), OsStatus::Stopped);
        assert_eq!(unsafe { (*kernel.table[0]).id }, 2, "High sorts to the top");

        let sp = run_tick(&mut kernel, 0);
        assert_eq!(kernel.status(), OsStatus::Running);
        assert_eq!(running_id(&kernel), 2);
        // The delivered frame is the synthesized one: its PC slot holds
        // the entry point.
        let high = unsafe { &*tasks[1] };
        assert_eq!(sp, high.stack_pointer);
        assert_eq!(high.stack[STACK_WORDS - 2], spin as usize as u32);
        let frame_base = high.stack[STACK_WORDS - FRAME_WORDS..].as_ptr() as u32;
        assert_eq!(sp, frame_base);
    }

    #[test]
    fn equal_priorities_round_robin() {
        let (mut kernel, _tasks) = kernel_with(&[Priority::Normal; 3]);
        kernel.start();

        let mut share = [0u32; 3];
        let mut sp = run_tick(&mut kernel, 0);
        for _ in 0..30 {
            share[running_id(&kernel) as usize - 1] += 1;
            sp = run_tick(&mut kernel, sp);
        }
        for count in share {
            assert!(count >= 30 / 3 - 1, "unfair share: {:?}", share);
        }
    }

    #[test]
    fn woken_high_priority_task_preempts_within_a_tick() {
        let (mut kernel, tasks) = kernel_with(&[Priority::High, Priority::Normal]);
        kernel.start();
        let mut sp = run_tick(&mut kernel, 0);
        assert_eq!(running_id(&kernel), 1);

        // The high-priority task parks on a semaphore; the Normal task
        // takes over.
        let sem = 0x1000 as WaitRef;
        kernel.block_current(Wait::Semaphore(sem));
        sp = kernel.next_context(sp);
        assert_eq!(running_id(&kernel), 2);
        assert_eq!(state_of(tasks[0]), TaskState::Blocked);

        // A give from any context wakes it; the very next hand-off runs it.
        kernel.wake_sem_waiter(sem);
        assert_eq!(state_of(tasks[0]), TaskState::Ready);
        kernel.next_context(sp);
        assert_eq!(running_id(&kernel), 1);
        assert_eq!(state_of(tasks[1]), TaskState::Ready);
    }

    #[test]
    fn delay_blocks_for_the_requested_ticks() {
        let (mut kernel, tasks) = kernel_with(&[Priority::High, Priority::Normal]);
        kernel.start();
        let mut sp = run_tick(&mut kernel, 0);
        assert_eq!(running_id(&kernel), 1);

        kernel.delay(3);
        sp = kernel.next_context(sp);
        assert_eq!(running_id(&kernel), 2);

        // Blocked through three ticks, Ready after the third ages the
        // delay to zero, back on the CPU one tick later.
        for tick in 0..3 {
            assert_eq!(state_of(tasks[0]), TaskState::Blocked, "tick {}", tick);
            sp = run_tick(&mut kernel, sp);
        }
        assert_eq!(state_of(tasks[0]), TaskState::Ready);
        assert_eq!(running_id(&kernel), 2, "wake is honored on the next decision");
        run_tick(&mut kernel, sp);
        assert_eq!(running_id(&kernel), 1);
    }

    #[test]
    fn delay_zero_is_a_no_op() {
        let (mut kernel, tasks) = kernel_with(&[Priority::Normal]);
        kernel.start();
        let sp = run_tick(&mut kernel, 0);
        kernel.delay(0);
        kernel.next_context(sp);
        assert_eq!(state_of(tasks[0]), TaskState::Running);
    }

    #[test]
    fn all_blocked_falls_back_to_idle_and_wakes_promptly() {
        let (mut kernel, tasks) = kernel_with(&[Priority::Normal]);
        kernel.start();
        let mut sp = run_tick(&mut kernel, 0);
        assert_eq!(running_id(&kernel), 1);

        kernel.delay(5);
        sp = kernel.next_context(sp);
        // Idle task carries id user_tasks + 1.
        assert_eq!(running_id(&kernel), 2);
        assert_eq!(kernel.idle.name(), "idle");

        for _ in 0..5 {
            assert_eq!(running_id(&kernel), 2);
            sp = run_tick(&mut kernel, sp);
        }
        // Delay expired on the fifth tick; the next decision resumes the
        // newly Ready task.
        assert_eq!(state_of(tasks[0]), TaskState::Ready);
        run_tick(&mut kernel, sp);
        assert_eq!(running_id(&kernel), 1);
    }

    #[test]
    fn wrap_does_not_dispatch_a_blocked_slot() {
        // High delays in a loop; Low must keep the CPU for the whole
        // delay, not just until the round-robin wraps.
        let (mut kernel, tasks) = kernel_with(&[Priority::High, Priority::Low]);
        kernel.start();
        let mut sp = run_tick(&mut kernel, 0);
        assert_eq!(running_id(&kernel), 1);

        kernel.delay(10);
        sp = kernel.next_context(sp);
        for tick in 0..10 {
            sp = run_tick(&mut kernel, sp);
            assert_eq!(running_id(&kernel), 2, "low task holds the CPU on tick {}", tick);
        }
        run_tick(&mut kernel, sp);
        assert_eq!(running_id(&kernel), 1, "high-priority task resumes after its delay");
    }

    #[test]
    fn zero_task_start_runs_idle() {
        let (mut kernel, _) = kernel_with(&[]);
        kernel.start();
        run_tick(&mut kernel, 0);
        assert_eq!(running_id(&kernel), 1, "idle owns the table when nothing is registered");
    }

    #[test]
    fn create_task_rejects_overflow_and_late_registration() {
        let (mut kernel, _tasks) = kernel_with(&[Priority::Normal; MAX_USER_TASKS]);
        let extra: &'static mut TaskControlBlock = Box::leak(Box::new(TaskControlBlock::new()));
        assert_eq!(
            kernel.create_task(extra, Priority::Normal, spin),
            Err(OsError::TooManyTasks)
        );
        assert_eq!(kernel.last_error(), Some(OsError::TooManyTasks));

        kernel.start();
        let late: &'static mut TaskControlBlock = Box::leak(Box::new(TaskControlBlock::new()));
        assert_eq!(
            kernel.create_task(late, Priority::Normal, spin),
            Err(OsError::KernelStarted)
        );
    }

    #[test]
    fn sort_is_stable_for_equal_priorities() {
        let (mut kernel, _tasks) = kernel_with(&[
            Priority::Normal,
            Priority::Low,
            Priority::Normal,
            Priority::VeryHigh,
        ]);
        kernel.start();
        let order: Vec<TaskId> =
            (0..4).map(|i| unsafe { (*kernel.table[i]).id }).collect();
        assert_eq!(order, [4, 1, 3, 2]);
    }

    #[test]
    fn outgoing_sp_is_saved_on_switch() {
        let (mut kernel, tasks) = kernel_with(&[Priority::Normal; 2]);
        kernel.start();
        let sp = run_tick(&mut kernel, 0);
        assert_eq!(running_id(&kernel), 1);

        let marker = 0x2000_1000;
        run_tick(&mut kernel, marker);
        assert_eq!(running_id(&kernel), 2);
        assert_eq!(unsafe { (*tasks[0]).stack_pointer }, marker);
        let _ = sp;
    }
}
