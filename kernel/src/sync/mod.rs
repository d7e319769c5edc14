//! Synchronization primitives for the kernel.
//!
//! The kernel body is non-reentrant by construction: interrupt entry
//! disables interrupts and they stay disabled across the entire kernel side
//! of a context switch (spec.md §5). The only primitive needed is an
//! IRQ-safe spinlock guarding the handful of global tables (PCB table,
//! queues, allocator, keyboard state) from a nested interrupt observing
//! half-updated state.

pub mod spinlock;
