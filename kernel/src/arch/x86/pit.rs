//! 8254 Programmable Interval Timer (PIT) driver.
//!
//! Configures channel 0 in square-wave mode at the tick rate the kernel
//! schedules with ([`crate::config::TICK_LENGTH_MS`], 10 ms / 100 Hz, per
//! spec.md §9's tick-period note — not the 1000 Hz this driver's ancestor
//! used, since that resolution has no consumer here).

use super::port::outb;
use core::sync::atomic::{AtomicU32, Ordering};

const PIT_CHANNEL0: u16 = 0x40;
const PIT_CMD: u16 = 0x43;
const PIT_FREQUENCY: u32 = 1_193_182;

/// Monotonic tick counter, incremented once per timer interrupt.
static TICK_COUNT: AtomicU32 = AtomicU32::new(0);

/// Program PIT channel 0 to fire every `tick_ms` milliseconds.
pub fn init(tick_ms: u32) {
    let hz = 1000 / tick_ms;
    let divisor = PIT_FREQUENCY / hz;
    unsafe {
        outb(PIT_CMD, 0x36); // channel 0, lobyte/hibyte, mode 3, binary
        outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0, ((divisor >> 8) & 0xFF) as u8);
    }
}

/// Called from the timer interrupt handler exactly once per tick.
pub fn on_tick() {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Current tick count since boot.
pub fn ticks() -> u32 {
    TICK_COUNT.load(Ordering::Relaxed)
}
