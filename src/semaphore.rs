//! # Semaphore
//!
//! Blocking semaphore with the wake hook woven into the scheduler. The
//! binary case (`max_count` ≤ 1) is gated on the `locked` flag and
//! initializes taken, so producer/consumer patterns start with the
//! producer posting the first give. With `max_count` > 1 the counter is
//! the gate and `give`/`take` move it between 0 and `max_count`.

use core::cell::UnsafeCell;

use crate::kernel;
use crate::sync;
use crate::task::{Wait, WaitRef};

struct State {
    max_count: u32,
    count: u32,
    locked: bool,
}

pub struct Semaphore {
    state: UnsafeCell<State>,
}

// SAFETY: all access to the inner state happens inside critical
// sections on a single core.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// A new semaphore. Starts taken regardless of `count`, so the
    /// first `take` waits for a `give`.
    pub const fn new(max_count: u32, count: u32) -> Self {
        Self {
            state: UnsafeCell::new(State { max_count, count, locked: true }),
        }
    }

    /// Re-initialize in place; the semaphore comes back taken.
    pub fn init(&self, max_count: u32, count: u32) {
        sync::with(|| {
            // SAFETY: inside a critical section.
            let state = unsafe { &mut *self.state.get() };
            *state = State { max_count, count, locked: true };
        });
    }

    pub fn is_locked(&self) -> bool {
        sync::with(|| unsafe { (*self.state.get()).locked })
    }

    pub fn count(&self) -> u32 {
        sync::with(|| unsafe { (*self.state.get()).count })
    }

    pub fn max_count(&self) -> u32 {
        sync::with(|| unsafe { (*self.state.get()).max_count })
    }

    #[inline]
    fn handle(&self) -> WaitRef {
        self as *const Self as WaitRef
    }

    /// Acquire the semaphore.
    ///
    /// Unavailable means the caller parks until a `give`; on resumption
    /// the acquisition is retried once, so `false` means another waiter
    /// won the race. Before the kernel runs this is a startup
    /// convenience that always reports success.
    pub fn take(&self) -> bool {
        if !kernel::is_running() {
            return true;
        }
        if self.max_count() > 1 {
            self.take_counting()
        } else {
            self.take_binary()
        }
    }

    fn take_binary(&self) -> bool {
        if self.is_locked() {
            sync::enter();
            kernel::block_current(Wait::Semaphore(self.handle()));
            sync::exit();
        }
        sync::with(|| {
            // SAFETY: inside a critical section.
            let state = unsafe { &mut *self.state.get() };
            if !state.locked {
                state.locked = true;
                true
            } else {
                false
            }
        })
    }

    fn take_counting(&self) -> bool {
        if self.count() == 0 {
            sync::enter();
            kernel::block_current(Wait::Semaphore(self.handle()));
            sync::exit();
        }
        sync::with(|| {
            // SAFETY: inside a critical section.
            let state = unsafe { &mut *self.state.get() };
            if state.count > 0 {
                state.count -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Release the semaphore and wake its highest-priority waiter; the
    /// yield inside the wake lets that waiter preempt the caller.
    pub fn give(&self) {
        sync::enter();
        {
            // SAFETY: inside a critical section.
            let state = unsafe { &mut *self.state.get() };
            state.locked = false;
            if state.max_count > 1 && state.count < state.max_count {
                state.count += 1;
            }
        }
        kernel::wake_sem_waiter(self.handle());
        sync::exit();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only). Blocking paths are covered by the kernel
// integration tests; these pin the gate state machines.
// ---------------------------------------------------------------------------
