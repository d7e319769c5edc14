//! Process control subsystem (spec.md §3, §4.2): the PCB table, its two
//! global queues, per-process blocking queues, and process creation —
//! grounded throughout in `original_source/c/pcb.c`.

pub mod create;
pub mod pcb;
pub mod queue;

use crate::context::Context32;
use crate::sync::spinlock::Spinlock;
use pcb::{BlockKind, ProcessTable, State};

/// The single process table. All process-subsystem state lives here;
/// reached from interrupt context, so every access goes through the
/// IRQ-safe spinlock (spec.md §5: the kernel body is non-reentrant).
pub static TABLE: Spinlock<Option<ProcessTable>> = Spinlock::new(None);

pub fn init() {
    *TABLE.lock() = Some(ProcessTable::new());
    crate::serial_println!("[OK] process table initialized");
}

/// Run `f` with the table locked. Panics if called before [`init`].
pub fn with_table<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("process table not initialized");
    f(table)
}

/// Dequeue the READY head and mark it RUNNING, or the idle PCB if READY is
/// empty (spec.md §4.2 `get_next_proc`). Returns the new current slot, or
/// `None` if idle is now running.
pub fn get_next_proc(table: &mut ProcessTable) -> Option<usize> {
    let next = queue::pop_head(table, queue::ListRef::Ready);
    match next {
        Some(slot) => {
            table.slots[slot].state = State::Running;
            table.current = Some(slot);
        }
        None => {
            table.current = None;
        }
    }
    queue::verify_pcb_queues(table);
    next
}

/// Terminate `slot`: free its stack, close its open devices, wake every peer
/// parked on its three owned queues (SEND/RECV peers with `SYSPID_DNE`, WAIT
/// peers with `SYSPID_OK` — spec.md §4.4), cross-remove it from wherever it
/// is itself blocked, and return it to STOPPED (spec.md §3 lifecycle,
/// `pcb.c`'s `cleanup_proc`). Closing fds isn't in the original's
/// `cleanup_proc` but is the ambient counterpart of every other resource it
/// already releases (stack, signal state) — spec.md §4.9's device layer
/// would otherwise leak a keyboard open across every process that dies
/// without calling `close`.
pub fn cleanup_proc(table: &mut ProcessTable, slot: usize) {
    create::free_stack(table, slot);
    crate::dev::close_all_fds(table, slot);

    // SEND/RECV peers parked on us were promised SYSPID_DNE if we die before
    // they resolve; WAIT peers were promised SYSPID_OK (spec.md §4.4's
    // table: "0 when target terminates" — the original `disp.c`'s
    // `dispatch_syscall_wait` pre-sets its own `ret = 0` for exactly this
    // reason, unlike SEND/RECV's DNE pre-set).
    for kind in [BlockKind::Sender, BlockKind::Receiver] {
        fail_all_blocked_peers(table, slot, kind, crate::abi::SYSPID_DNE);
    }
    fail_all_blocked_peers(table, slot, BlockKind::Waiting, crate::abi::SYSPID_OK);

    if table.slots[slot].state == State::Blocked {
        remove_blocked_wherever(table, slot);
    }

    queue::add_pcb_to_queue(table, slot, State::Stopped);
}

/// Cross-remove `slot` from whatever blocking mechanism currently holds it
/// blocked — one of the three generic peer queues, the sleep delta-list, a
/// bare `ReceiveAny` flag, or the keyboard driver's task queue — and leave
/// it unlinked everywhere (spec.md §4.7: signal delivery to a BLOCKED
/// process "cross-removed from whatever queue it was on"). Does not change
/// `state`; the caller sets it to `Ready` once it has also set a return
/// value.
pub fn remove_blocked_wherever(table: &mut ProcessTable, slot: usize) {
    match table.slots[slot].blocking_queue_kind {
        BlockKind::Sender | BlockKind::Receiver | BlockKind::Waiting => {
            queue::remove_proc_from_blocking_queue(table, slot);
        }
        BlockKind::Sleep => {
            crate::sleep::wake(table, slot);
        }
        BlockKind::ReceiveAny => {
            table.slots[slot].blocking_queue_kind = BlockKind::None;
        }
        BlockKind::DeviceRead => {
            crate::dev::keyboard::cancel_task_for(table, slot);
            table.slots[slot].blocking_queue_kind = BlockKind::None;
        }
        BlockKind::None => {}
    }
}

/// Record the frame an interrupt/trap just saved for whichever process was
/// running when it fired (spec.md §4.3, step 1 of the context switcher).
/// `None` means the idle PCB was running. On the timer/keyboard paths the
/// caller still owes the process its `eax` back into `return_value` (the
/// "out of" half of step 1 — `save_current_frame` only captures where the
/// frame lives, not its contents) before requeuing it, or `eax` is lost.
pub fn save_current_frame(table: &mut ProcessTable, frame: *mut Context32) {
    match table.current {
        Some(slot) => table.slots[slot].stack_pointer = frame as u32,
        None => table.idle.stack_pointer = frame as u32,
    }
}

/// The frame to resume: whichever process `get_next_proc` most recently
/// selected, or the idle PCB.
pub fn resume_frame(table: &ProcessTable) -> *mut Context32 {
    match table.current {
        Some(slot) => table.slots[slot].stack_pointer as *mut Context32,
        None => table.idle.stack_pointer as *mut Context32,
    }
}

/// Write the about-to-resume process's `return_value` into its saved
/// frame's `eax` so it sees the result of whatever blocked it (spec.md
/// §4.3, step 1: "copies ... into/out of the PCB's return_value"). Idle has
/// no return value to restore.
pub fn writeback_return_value(table: &ProcessTable) {
    if let Some(slot) = table.current {
        let frame = resume_frame(table);
        unsafe {
            (*frame).eax = table.slots[slot].return_value as u32;
        }
    }
}

/// Wire format for the `CPUTIMES` syscall (spec.md §4.4): a snapshot of
/// every non-STOPPED PCB's pid, encoded state, and accumulated tick count.
/// Matches `original_source/c/pcb.h`'s `processStatuses` layout (struct of
/// parallel arrays rather than an array of structs, so a single bounds
/// check covers the whole copy).
#[repr(C)]
pub struct ProcessStatuses {
    pub pid: [i32; crate::config::PCB_TABLE_SIZE],
    pub status: [i32; crate::config::PCB_TABLE_SIZE],
    pub cpu_time: [u32; crate::config::PCB_TABLE_SIZE],
}

fn state_code(state: State) -> i32 {
    match state {
        State::Ready => 0,
        State::Running => 1,
        State::Blocked => 2,
        State::Stopped => 3,
    }
}

/// Fill `ps` with every live PCB and return the count written. The caller
/// (the `CPUTIMES` dispatch handler) has already validated `ps` with
/// [`crate::usrptr::verify_usrptr`].
pub fn get_all_proc_info(table: &ProcessTable, ps: *mut ProcessStatuses) -> i32 {
    let mut count = 0usize;
    for i in 0..crate::config::PCB_TABLE_SIZE {
        let p = &table.slots[i];
        if p.state == State::Stopped {
            continue;
        }
        unsafe {
            (*ps).pid[count] = p.pid;
            (*ps).status[count] = state_code(p.state);
            (*ps).cpu_time[count] = p.cpu_time;
        }
        count += 1;
    }
    count as i32
}

/// Wake every peer parked on `owner`'s queue of kind `kind` with
/// `return_value` and make it READY (`pcb.c`'s `fail_msg_blocked_procs`).
/// The caller picks the return value per spec.md §4.4's table: SEND/RECV
/// peers get `SYSPID_DNE`, WAIT peers get `SYSPID_OK`.
fn fail_all_blocked_peers(table: &mut ProcessTable, owner: usize, kind: BlockKind, return_value: i32) {
    loop {
        let idx = kind.queue_index().expect("fail_all_blocked_peers needs an owned-queue kind");
        let head = table.slots[owner].blocking_heads[idx];
        let peer = match head {
            Some(p) => p,
            None => break,
        };
        queue::remove_proc_from_blocking_queue(table, peer);
        table.slots[peer].return_value = return_value;
        queue::add_pcb_to_queue(table, peer, State::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec.md §8 property 7 / §4.4's table: terminating B wakes SEND/RECV
    /// peers with `SYSPID_DNE` but WAIT peers with `SYSPID_OK` (WAIT's
    /// contract is "0 when target terminates", not DNE), and B itself goes
    /// back to STOPPED.
    #[test]
    fn cleanup_wakes_every_blocked_peer_with_the_right_return_value() {
        let mut table = ProcessTable::new();
        let b = table.alloc_slot().unwrap();
        let sender = table.alloc_slot().unwrap();
        let receiver = table.alloc_slot().unwrap();
        let waiter = table.alloc_slot().unwrap();

        queue::add_proc_to_blocking_queue(&mut table, sender, b, BlockKind::Sender);
        queue::add_proc_to_blocking_queue(&mut table, receiver, b, BlockKind::Receiver);
        queue::add_proc_to_blocking_queue(&mut table, waiter, b, BlockKind::Waiting);

        cleanup_proc(&mut table, b);

        for peer in [sender, receiver] {
            assert_eq!(table.slots[peer].state, State::Ready);
            assert_eq!(table.slots[peer].return_value, crate::abi::SYSPID_DNE);
            assert_eq!(table.slots[peer].blocking_queue_kind, BlockKind::None);
        }
        assert_eq!(table.slots[waiter].state, State::Ready);
        assert_eq!(table.slots[waiter].return_value, crate::abi::SYSPID_OK);
        assert_eq!(table.slots[waiter].blocking_queue_kind, BlockKind::None);
        assert_eq!(table.slots[b].state, State::Stopped);
    }

    /// A process that is itself BLOCKED when it's torn down (e.g. killed
    /// while parked on a peer) is cross-removed from that queue too.
    #[test]
    fn cleanup_cross_removes_a_blocked_victim() {
        let mut table = ProcessTable::new();
        let owner = table.alloc_slot().unwrap();
        let victim = table.alloc_slot().unwrap();
        queue::add_proc_to_blocking_queue(&mut table, victim, owner, BlockKind::Receiver);

        cleanup_proc(&mut table, victim);

        assert_eq!(table.slots[victim].state, State::Stopped);
        assert_eq!(table.slots[owner].blocking_heads[BlockKind::Receiver.queue_index().unwrap()], None);
    }
}
