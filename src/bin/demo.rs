//! # Tern OS Demo Firmware
//!
//! Exercises the kernel end to end with four tasks:
//!
//! | Task       | Priority | Behavior                                   |
//! |------------|----------|--------------------------------------------|
//! | `sampler`  | High     | Produces a sample every 10 ms via `delay`  |
//! | `filter`   | Normal   | Receives samples, averages a window        |
//! | `reporter` | Normal   | Waits on a semaphore the filter gives      |
//! | `counter`  | Low      | Free-running background work               |
//!
//! The sampler paces itself on the tick, back-pressures through the
//! 4-deep queue when the filter falls behind, and the reporter shows the
//! semaphore hand-off: it stays blocked until the filter completes a
//! window.

#![no_std]
#![no_main]

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use ternos::{kernel, Priority, Queue, Semaphore, TaskControlBlock, MAX_DELAY};

// ---------------------------------------------------------------------------
// Shared objects
// ---------------------------------------------------------------------------

static SAMPLES: Queue<u32, 4> = Queue::new();
static WINDOW_DONE: Semaphore = Semaphore::new(1, 0);
static BACKGROUND_TICKS: AtomicU32 = AtomicU32::new(0);
static LAST_AVERAGE: AtomicU32 = AtomicU32::new(0);

static mut SAMPLER_TCB: TaskControlBlock = TaskControlBlock::new();
static mut FILTER_TCB: TaskControlBlock = TaskControlBlock::new();
static mut REPORTER_TCB: TaskControlBlock = TaskControlBlock::new();
static mut COUNTER_TCB: TaskControlBlock = TaskControlBlock::new();

// ---------------------------------------------------------------------------
// Task bodies
// ---------------------------------------------------------------------------

/// Produce a synthetic sample every 10 ticks. Blocks on the queue when
/// the filter falls behind.
extern "C" fn sampler() {
    let mut sequence: u32 = 0;
    loop {
        sequence = sequence.wrapping_add(1);
        let sample = sequence.wrapping_mul(7) & 0x3FF;
        SAMPLES.send(&sample, MAX_DELAY);
        kernel::delay(10);
    }
}

/// Average samples in windows of eight; each full window releases the
/// reporter.
extern "C" fn filter() {
    let mut accumulator: u32 = 0;
    let mut window: u32 = 0;
    loop {
        let mut sample = 0;
        if SAMPLES.receive(&mut sample, MAX_DELAY) {
            accumulator += sample;
            window += 1;
        }
        if window == 8 {
            LAST_AVERAGE.store(accumulator / 8, Ordering::Relaxed);
            accumulator = 0;
            window = 0;
            WINDOW_DONE.give();
        }
    }
}

/// Sleep on the window semaphore; one wake per completed window.
extern "C" fn reporter() {
    loop {
        if WINDOW_DONE.take() {
            // A debugger watching LAST_AVERAGE sees one update per wake.
            let _ = LAST_AVERAGE.load(Ordering::Relaxed);
        }
    }
}

/// Lowest-priority busywork; runs only when everything else waits.
extern "C" fn counter() {
    loop {
        BACKGROUND_TICKS.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    kernel::init();

    // SAFETY: the TCB statics are handed to the kernel exactly once,
    // before the scheduler starts.
    unsafe {
        let sampler_tcb = &mut *addr_of_mut!(SAMPLER_TCB);
        sampler_tcb.set_name("sampler");
        kernel::task_create(sampler_tcb, Priority::High, sampler).unwrap();

        let filter_tcb = &mut *addr_of_mut!(FILTER_TCB);
        filter_tcb.set_name("filter");
        kernel::task_create(filter_tcb, Priority::Normal, filter).unwrap();

        let reporter_tcb = &mut *addr_of_mut!(REPORTER_TCB);
        reporter_tcb.set_name("reporter");
        kernel::task_create(reporter_tcb, Priority::Normal, reporter).unwrap();

        let counter_tcb = &mut *addr_of_mut!(COUNTER_TCB);
        counter_tcb.set_name("counter");
        kernel::task_create(counter_tcb, Priority::Low, counter).unwrap();
    }

    kernel::start();

    // The first tick dispatches the sampler and this stack is abandoned.
    loop {
        cortex_m::asm::wfi();
    }
}
