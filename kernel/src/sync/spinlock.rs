//! IRQ-safe spinlock with automatic interrupt disable/restore.
//!
//! Disables interrupts before acquiring the lock and restores the previous
//! interrupt state on drop. On a single CPU this is the only thing that can
//! actually race with the kernel: the lock itself is never contended by
//! another core, only by an interrupt handler that preempts the holder.
//! Disabling interrupts before spinning removes that race entirely; the
//! `compare_exchange` loop below only ever iterates at all in a debug build
//! where re-entrant locking is a logic bug worth detecting.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// An IRQ-safe spinlock protecting data of type `T`.
///
/// Disables interrupts while held and restores the previous interrupt state
/// when the guard is dropped. Safe to use from both normal kernel code and
/// interrupt handlers via [`try_lock`](Spinlock::try_lock).
pub struct Spinlock<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

/// RAII guard for a held [`Spinlock`].
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
    irq_was_enabled: bool,
}

impl<T> Spinlock<T> {
    /// Create a new unlocked spinlock wrapping the given data.
    pub const fn new(data: T) -> Self {
        Spinlock {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, disabling interrupts first.
    ///
    /// On a single CPU the `compare_exchange` below cannot actually spin
    /// against another holder in normal operation — interrupts are already
    /// disabled by the time we try. If it does spin, the lock is held
    /// re-entrantly somewhere, which is a kernel bug; looping here (rather
    /// than deadlocking silently) makes that bug visible under a debugger.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        let was_enabled = crate::arch::hal::interrupts_enabled();
        crate::arch::hal::disable_interrupts();

        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        SpinlockGuard { lock: self, irq_was_enabled: was_enabled }
    }

    /// Try to acquire the lock without blocking. Used from interrupt context
    /// where spinning is never correct (the holder cannot make progress
    /// until the interrupt handler returns).
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        let was_enabled = crate::arch::hal::interrupts_enabled();
        crate::arch::hal::disable_interrupts();

        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinlockGuard { lock: self, irq_was_enabled: was_enabled })
        } else {
            if was_enabled {
                crate::arch::hal::enable_interrupts();
            }
            None
        }
    }

    /// Check if this lock is currently held.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl<'a, T> Deref for SpinlockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> SpinlockGuard<'a, T> {
    /// Release the lock without restoring the saved interrupt state.
    /// Used by the dispatcher to keep interrupts disabled from lock
    /// acquisition straight through `context_switch` (spec.md §4.3: the
    /// kernel body is not interrupted across the entire switch).
    pub fn release_no_irq_restore(self) {
        self.lock.lock.store(false, Ordering::Release);
        core::mem::forget(self);
    }
}

impl<'a, T> Drop for SpinlockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.lock.store(false, Ordering::Release);
        if self.irq_was_enabled {
            crate::arch::hal::enable_interrupts();
        }
    }
}
