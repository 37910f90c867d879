//! # Bounded Message Queue
//!
//! A fixed-capacity FIFO shared between tasks, with the blocking
//! behavior woven into the scheduler: senders park on a full queue,
//! receivers on an empty one, and every transfer across a limit wakes
//! the highest-priority waiter of the opposite side.
//!
//! ## Index discipline
//!
//! ```text
//! Insert operations (capacity 4)
//! | a |   |   |   |  front = 0 ; back = 0 ; count = 1
//! | a | b |   |   |  front = 0 ; back = 1 ; count = 2
//! | a | b | c | d |  front = 0 ; back = 3 ; count = 4
//!
//! Extract operations
//! |   | b | c | d |  front = 1 ; back = 3 ; count = 3
//! | e |   | c | d |  front = 2 ; back = 0 ; count = 3
//! ```
//!
//! `back` starts on the last slot so the first insert wraps to slot 0;
//! both indices advance modulo the capacity.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use crate::config::MAX_QUEUE_CAPACITY;
use crate::kernel;
use crate::sync;
use crate::task::{QueueSide, Wait, WaitRef};

struct State<T, const N: usize> {
    count: usize,
    front: usize,
    back: usize,
    slots: [MaybeUninit<T>; N],
}

/// Bounded FIFO of `Copy` elements, stored inline.
///
/// `N` is the per-queue capacity, at most [`MAX_QUEUE_CAPACITY`]. The
/// element size is fixed by `T`; elements move by copy, matching the
/// byte-copy contract of the kernel interface.
pub struct Queue<T, const N: usize = MAX_QUEUE_CAPACITY> {
    state: UnsafeCell<State<T, N>>,
}

// SAFETY: all access to the inner state happens inside critical
// sections on a single core, and elements only move by copy.
unsafe impl<T: Copy + Send, const N: usize> Sync for Queue<T, N> {}

impl<T: Copy, const N: usize> Queue<T, N> {
    /// An empty queue, ready for `'static` storage.
    pub const fn new() -> Self {
        const { assert!(N > 0 && N <= MAX_QUEUE_CAPACITY) };
        Self {
            state: UnsafeCell::new(State {
                count: 0,
                front: 0,
                back: N - 1,
                slots: [const { MaybeUninit::uninit() }; N],
            }),
        }
    }

    /// Reset the queue to empty, discarding any contents.
    pub fn init(&self) {
        sync::with(|| {
            // SAFETY: inside a critical section.
            let state = unsafe { &mut *self.state.get() };
            state.count = 0;
            state.front = 0;
            state.back = N - 1;
        });
    }

    /// Elements currently queued.
    pub fn len(&self) -> usize {
        sync::with(|| unsafe { (*self.state.get()).count })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Capacity in elements.
    pub const fn capacity() -> usize {
        N
    }

    #[inline]
    fn handle(&self) -> WaitRef {
        self as *const Self as WaitRef
    }

    /// Copy `data` into the queue.
    ///
    /// Blocks while the queue is full and the kernel is running; the
    /// paired receive that frees a slot wakes the sender and the insert
    /// completes. `timeout` is accepted for interface compatibility and
    /// not yet enforced — pass [`crate::config::MAX_DELAY`]. Returns
    /// whether the element was enqueued; only a kernel that is not yet
    /// running can refuse.
    pub fn send(&self, data: &T, _timeout: u32) -> bool {
        if self.is_full() && kernel::is_running() {
            sync::enter();
            kernel::block_current(Wait::Queue { queue: self.handle(), side: QueueSide::Send });
            sync::exit();
        }

        if !self.is_full() {
            sync::enter();
            // SAFETY: inside a critical section.
            let state = unsafe { &mut *self.state.get() };
            state.back = (state.back + 1) % N;
            state.slots[state.back].write(*data);
            state.count += 1;
            if state.count == 1 {
                // 0 → 1: a receiver may be parked on empty.
                kernel::wake_queue_waiter(self.handle(), QueueSide::Receive);
            }
            sync::exit();
            true
        } else {
            false
        }
    }

    /// Copy the oldest element into `buffer`.
    ///
    /// Blocks while the queue is empty and the kernel is running; the
    /// paired send wakes the receiver. `timeout` is accepted for
    /// interface compatibility and not yet enforced. Returns whether an
    /// element was received.
    pub fn receive(&self, buffer: &mut T, _timeout: u32) -> bool {
        if self.is_empty() && kernel::is_running() {
            sync::enter();
            kernel::block_current(Wait::Queue { queue: self.handle(), side: QueueSide::Receive });
            sync::exit();
        }

        if !self.is_empty() {
            sync::enter();
            // SAFETY: inside a critical section; `front` always indexes
            // an initialized slot while count > 0.
            let state = unsafe { &mut *self.state.get() };
            *buffer = unsafe { state.slots[state.front].assume_init_read() };
            state.front = (state.front + 1) % N;
            state.count -= 1;
            if state.count == N - 1 {
                // Full → one free slot: a sender may be parked.
                kernel::wake_queue_waiter(self.handle(), QueueSide::Send);
            }
            sync::exit();
            true
        } else {
            false
        }
    }
}

impl<T: Copy, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only). Blocking paths are covered by the kernel
// integration tests; these pin the index discipline with the kernel not
// running.
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_DELAY;
    use crate::kernel::test_support;

    #[test]
    fn starts_empty_with_wrapping_back_index() {
        let _serial = test_support::serialize();
        crate::kernel::init();

        let queue: Queue<u32, 4> = Queue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(Queue::<u32, 4>::capacity(), 4);

        // First insert wraps `back` to slot 0; first receive reads it.
        assert!(queue.send(&1, MAX_DELAY));
        let mut value = 0;
        assert!(queue.receive(&mut value, MAX_DELAY));
        assert_eq!(value, 1);
    }

    #[test]
    fn fifo_order_survives_wraparound() {
        let _serial = test_support::serialize();
        crate::kernel::init();

        let queue: Queue<u32, 4> = Queue::new();
        for value in 1..=4 {
            assert!(queue.send(&value, MAX_DELAY));
        }
        assert!(queue.is_full());
        // Kernel not running: a full queue refuses instead of blocking.
        assert!(!queue.send(&5, MAX_DELAY));
        assert_eq!(queue.len(), 4);

        let mut value = 0;
        assert!(queue.receive(&mut value, MAX_DELAY));
        assert_eq!(value, 1);
        // The freed slot wraps; order is preserved across it.
        assert!(queue.send(&5, MAX_DELAY));
        for expected in 2..=5 {
            assert!(queue.receive(&mut value, MAX_DELAY));
            assert_eq!(value, expected);
        }
        assert!(queue.is_empty());
        assert!(!queue.receive(&mut value, MAX_DELAY));
    }

    #[test]
    fn init_discards_contents() {
        let _serial = test_support::serialize();
        crate::kernel::init();

        let queue: Queue<u8, 2> = Queue::new();
        assert!(queue.send(&9, MAX_DELAY));
        queue.init();
        assert!(queue.is_empty());
        // The index discipline restarts from scratch.
        assert!(queue.send(&3, MAX_DELAY));
        let mut value = 0;
        assert!(queue.receive(&mut value, MAX_DELAY));
        assert_eq!(value, 3);
    }

    #[test]
    fn single_slot_queue_alternates() {
        let _serial = test_support::serialize();
        crate::kernel::init();

        let queue: Queue<u16, 1> = Queue::new();
        let mut value = 0;
        for round in 0..300u16 {
            assert!(queue.send(&round, MAX_DELAY));
            assert_eq!(queue.len(), 1);
            assert!(queue.receive(&mut value, MAX_DELAY));
            assert_eq!(value, round);
        }
        assert_eq!(queue.len(), 0);
    }
}
