//! Signal delivery (spec.md §4.7). Grounded in
//! `original_source/c/signal.c` for the stack-frame-injection mechanics,
//! with one deliberate deviation spec.md §8 property 8 requires: this
//! variant of `signal.c` delivers whichever pending bit happens to be
//! lowest; spec.md calls for priority order, highest signal number first,
//! so [`maybe_deliver`] picks via `leading_zeros` instead of a linear scan
//! from zero.

use crate::abi::{EINVAL, INVALID_FUNCPTR, INVALID_SIGNAL, PROC_SIGNALLED};
use crate::config::N_SIG;
use crate::context::Context32;
use crate::process::pcb::{ProcessTable, State};
use crate::process::queue;
use crate::usrptr;

/// `SIGHANDLER` syscall: install `new_handler` for `signo`, writing the
/// previously-installed handler to `*old_handler_ptr`. A null `new_handler`
/// means "ignore this signal" (it can never become pending — see
/// [`kill`]). Only `old_handler_ptr` is validated as a user pointer: in
/// this kernel every process shares the kernel's own code and address
/// space (`arch::x86::gdt`'s module doc), so a handler address is never
/// anything other than a valid function in this binary.
pub fn set_handler(table: &mut ProcessTable, slot: usize, signo: i32, new_handler: u32, old_handler_ptr: u32) -> i32 {
    if signo < 0 || signo as usize >= N_SIG {
        return INVALID_SIGNAL;
    }
    if usrptr::verify_usrptr(old_handler_ptr as usize, 4).is_err() {
        return INVALID_FUNCPTR;
    }
    let old = table.slots[slot].signal_table[signo as usize];
    unsafe {
        (old_handler_ptr as *mut u32).write(old as u32);
    }
    table.slots[slot].signal_table[signo as usize] = new_handler as usize;
    0
}

/// `KILL` syscall: mark `signo` pending on `target` if (and only if) a
/// handler is installed for it — an unhandled signal is simply dropped,
/// matching the PCB data model's invariant that "bit `i` is only settable
/// when `signal_table[i] != null`". If `target` is currently BLOCKED, the
/// signal is delivered immediately by cross-removing it from whatever it
/// is blocked on and waking it with [`PROC_SIGNALLED`] rather than waiting
/// for its next kernel/user transition, since a blocked process never
/// reaches one on its own (spec.md §8 property 9).
pub fn kill(table: &mut ProcessTable, target: usize, signo: i32) -> i32 {
    if signo < 0 || signo as usize >= N_SIG {
        return INVALID_SIGNAL;
    }
    if table.slots[target].signal_table[signo as usize] == 0 {
        return 0;
    }
    table.slots[target].signals_pending |= 1 << signo;

    if table.slots[target].state == State::Blocked {
        crate::process::remove_blocked_wherever(table, target);
        table.slots[target].signals_pending &= !(1 << signo);
        table.slots[target].return_value = PROC_SIGNALLED;
        queue::add_pcb_to_queue(table, target, State::Ready);
    }
    0
}

/// Called by the dispatcher right before resuming whichever process
/// `get_next_proc` selected (spec.md §4.3, last step): if signals are
/// enabled and any are pending, clear the highest-numbered one and inject
/// a call to its handler ahead of the process's normal resumption point.
pub fn maybe_deliver(table: &mut ProcessTable) {
    let slot = match table.current {
        Some(s) => s,
        None => return,
    };
    let pcb = &table.slots[slot];
    if !pcb.signals_enabled || pcb.signals_pending == 0 {
        return;
    }
    let signo = 31 - pcb.signals_pending.leading_zeros() as usize;
    table.slots[slot].signals_pending &= !(1 << signo);
    inject_frame(table, slot, signo);
}

/// Rewrite `slot`'s saved stack pointer so it resumes inside [`sigtramp`]
/// instead of wherever it actually was. The frame sigtramp resumes into is
/// laid out, from low to high address, as: a fresh [`Context32`] with
/// `eip = sigtramp`, a dummy return address, the handler pointer, the old
/// stack pointer (sigtramp's two cdecl arguments), and finally the
/// process's pre-signal `return_value` — which `sigreturn` restores
/// (`signal.c`'s `signal()`).
fn inject_frame(table: &mut ProcessTable, slot: usize, signo: usize) {
    let handler = table.slots[slot].signal_table[signo] as u32;
    let old_sp = table.slots[slot].stack_pointer;
    let saved_ret = table.slots[slot].return_value;

    let mut sp = old_sp as usize;
    sp -= 4;
    unsafe {
        (sp as *mut i32).write(saved_ret);
    }
    sp -= 4;
    unsafe {
        (sp as *mut u32).write(old_sp);
    }
    sp -= 4;
    unsafe {
        (sp as *mut u32).write(handler);
    }
    sp -= 4;
    unsafe {
        (sp as *mut u32).write(0xCAFE_CAFE);
    }

    sp -= core::mem::size_of::<Context32>();
    unsafe {
        (sp as *mut Context32).write(Context32::fresh(sigtramp as usize as u32));
    }

    table.slots[slot].stack_pointer = sp as u32;
    table.slots[slot].signals_enabled = false;
}

/// `SIGRETURN` syscall: undo exactly what [`inject_frame`] did. `old_sp` is
/// sigtramp's second argument — the stack pointer the process had at the
/// moment the signal interrupted it. Re-enabling `signals_enabled` here
/// (rather than leaving it to the handler) matches `signal.c`: a handler
/// cannot forget to re-arm delivery.
pub fn sigreturn(table: &mut ProcessTable, slot: usize, old_sp: u32) -> i32 {
    if usrptr::verify_usrptr(old_sp as usize, 4).is_err() {
        crate::process::cleanup_proc(table, slot);
        return EINVAL;
    }
    let saved_ret = unsafe { *((old_sp - 4) as *const i32) };
    table.slots[slot].return_value = saved_ret;
    table.slots[slot].stack_pointer = old_sp;
    table.slots[slot].signals_enabled = true;
    saved_ret
}

/// Entered via `iretd` with the stack arranged by [`inject_frame`]: calls
/// `handler(cntx)` cdecl-style, then issues the `SIGRETURN` syscall with
/// `cntx` as its argument and never returns. `cntx` is kept in `ebx`
/// (callee-saved) across the call to `handler`, whose code is outside our
/// control and may clobber caller-saved registers.
#[unsafe(naked)]
unsafe extern "C" fn sigtramp() -> ! {
    core::arch::naked_asm!(
        "mov eax, [esp + 4]",
        "mov ebx, [esp + 8]",
        "push ebx",
        "call eax",
        "add esp, 4",
        "mov eax, {sigreturn}",
        "int 50",
        "2:",
        "jmp 2b",
        sigreturn = const crate::abi::request::SIGRETURN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::pcb::ProcessTable;

    extern "C" fn dummy_handler() {}

    fn install(table: &mut ProcessTable, slot: usize, signo: i32) {
        table.slots[slot].signal_table[signo as usize] = dummy_handler as usize;
    }

    /// spec.md §8 property 8 / scenario E: with 0, 15, and 31 all pending,
    /// `maybe_deliver` injects a frame for 31 first, then (after that
    /// delivery's `sigreturn`) for 15, then 0 — never a linear low-to-high
    /// scan. Exercised against a real backing stack since `inject_frame`
    /// writes through the saved stack pointer.
    #[test]
    fn maybe_deliver_picks_highest_numbered_pending_first() {
        let mut stack = [0u8; 256];
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        table.current = Some(slot);
        table.slots[slot].stack_pointer = unsafe { stack.as_mut_ptr().add(128) as u32 };
        table.slots[slot].return_value = 0xAAAA;

        install(&mut table, slot, 0);
        install(&mut table, slot, 15);
        install(&mut table, slot, 31);
        table.slots[slot].signals_pending = (1 << 0) | (1 << 15) | (1 << 31);

        let mut delivered = [-1i32; 3];
        for entry in delivered.iter_mut() {
            let before = table.slots[slot].signals_pending;
            let pre_sp = table.slots[slot].stack_pointer;

            maybe_deliver(&mut table);
            let sigtramp_frame = table.slots[slot].stack_pointer as *const Context32;
            assert_eq!(unsafe { (*sigtramp_frame).eip }, sigtramp as usize as u32);
            assert!(!table.slots[slot].signals_enabled);

            let after = table.slots[slot].signals_pending;
            *entry = (before & !after).trailing_zeros() as i32;

            // Undo inject_frame exactly as sigreturn does, using the old_sp
            // it stashed, so the next-highest pending bit gets its turn.
            let rc = sigreturn(&mut table, slot, pre_sp);
            assert_eq!(rc, 0xAAAA);
            assert!(table.slots[slot].signals_enabled);
        }
        assert_eq!(delivered, [31, 15, 0]);
    }

    /// `kill` on a signal with no installed handler is a silent no-op
    /// (spec.md §3: "bit i only settable when signal_table[i] != null").
    #[test]
    fn kill_without_handler_is_ignored() {
        let mut table = ProcessTable::new();
        let target = table.alloc_slot().unwrap();
        let rc = kill(&mut table, target, 5);
        assert_eq!(rc, 0);
        assert_eq!(table.slots[target].signals_pending, 0);
    }

    /// spec.md §8 property 9: killing a process blocked in send/recv/recv-any
    /// cross-removes it and resumes it with `PROC_SIGNALLED`.
    #[test]
    fn kill_on_blocked_target_wakes_with_proc_signalled() {
        let mut table = ProcessTable::new();
        let owner = table.alloc_slot().unwrap();
        let target = table.alloc_slot().unwrap();
        install(&mut table, target, 7);
        queue::add_proc_to_blocking_queue(&mut table, target, owner, crate::process::pcb::BlockKind::Sender);

        let rc = kill(&mut table, target, 7);
        assert_eq!(rc, 0);
        assert_eq!(table.slots[target].state, State::Ready);
        assert_eq!(table.slots[target].return_value, PROC_SIGNALLED);
        assert_eq!(table.slots[target].blocking_queue_kind, crate::process::pcb::BlockKind::None);
    }

    /// Invalid signal numbers are rejected uniformly by both syscalls that
    /// take one.
    #[test]
    fn out_of_range_signo_is_rejected() {
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        assert_eq!(kill(&mut table, slot, -1), INVALID_SIGNAL);
        assert_eq!(kill(&mut table, slot, N_SIG as i32), INVALID_SIGNAL);
    }
}
