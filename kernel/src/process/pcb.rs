//! Process Control Block and the fixed-capacity process table (spec.md §3,
//! §4.2). Grounded in `original_source/c/pcb.c`, reworked per spec.md §9's
//! redesign guidance: queue links are arena indices into the table rather
//! than raw pointers, so "a PCB is in at most one queue" is a property of
//! the `InQueue` tag instead of a convention enforced by hand.

use crate::config::{N_SIG, PCB_NUM_FDS, PCB_TABLE_SIZE};

/// A process's run state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Ready,
    Stopped,
    Running,
    Blocked,
}

/// Why a process is parked on another process's queue.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockKind {
    Sender,
    Receiver,
    Waiting,
    ReceiveAny,
    Sleep,
    /// Parked on the keyboard driver's own pending-read-task queue
    /// (spec.md §4.9) rather than one of the three generic peer queues.
    DeviceRead,
    None,
}

impl BlockKind {
    /// Index into a PCB's three owned queues (`blocking_heads`/`tails`).
    /// `ReceiveAny`/`Sleep`/`None` never own a peer queue slot.
    pub fn queue_index(self) -> Option<usize> {
        match self {
            BlockKind::Sender => Some(0),
            BlockKind::Receiver => Some(1),
            BlockKind::Waiting => Some(2),
            _ => None,
        }
    }
}

/// Which list currently holds this PCB's generic `prev`/`next` links.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InQueue {
    None,
    Ready,
    Stopped,
    /// The global sleep delta-list (spec.md §4.5).
    Sleep,
    /// Parked on `owner`'s queue of kind `kind` (`Sender`/`Receiver`/`Waiting`).
    Peer { owner: usize, kind: BlockKind },
}

/// Heap allocation backing a process's stack, freed exactly once on
/// termination (spec.md §3).
pub struct StackRegion {
    pub base: *mut u8,
    pub len: usize,
}

pub struct Pcb {
    pub pid: i32,
    /// Reuse counter: `pid = (slot + 1) + generation * TABLE_SIZE`, wrapping
    /// to `slot % TABLE_SIZE` when that would go non-positive (pcb.c's
    /// scheme, spec.md §9 Open Question — any scheme keeping
    /// `(pid-1) mod TABLE_SIZE == slot` for live PCBs is conformant).
    pub generation: i32,
    pub state: State,
    pub stack_region: Option<StackRegion>,
    pub stack_pointer: u32,
    pub return_value: i32,
    pub cpu_time: u32,
    /// Remaining delta-list ticks, valid only while `in_queue == InQueue::Sleep`
    /// (spec.md §4.5, `crate::sleep`).
    pub sleep_ticks: u32,
    pub signal_table: [usize; N_SIG],
    pub signals_pending: u32,
    pub signals_enabled: bool,
    pub fd_table: [Option<u8>; PCB_NUM_FDS],
    pub blocking_proc: Option<usize>,
    pub blocking_queue_kind: BlockKind,
    pub blocking_heads: [Option<usize>; 3],
    pub blocking_tails: [Option<usize>; 3],
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub in_queue: InQueue,
}

impl Pcb {
    const fn empty(slot: usize) -> Pcb {
        Pcb {
            pid: (slot + 1) as i32,
            generation: 0,
            state: State::Stopped,
            stack_region: None,
            stack_pointer: 0,
            return_value: 0,
            cpu_time: 0,
            sleep_ticks: 0,
            signal_table: [0; N_SIG],
            signals_pending: 0,
            signals_enabled: true,
            fd_table: [None; PCB_NUM_FDS],
            blocking_proc: None,
            blocking_queue_kind: BlockKind::None,
            blocking_heads: [None; 3],
            blocking_tails: [None; 3],
            prev: None,
            next: None,
            in_queue: InQueue::None,
        }
    }

    /// Reset to a freshly-allocatable state, advancing `pid` per the reuse
    /// scheme above. Leaves the PCB in `Stopped`/`InQueue::None` — the
    /// caller links it into whatever queue it needs.
    fn reinit(&mut self, slot: usize) {
        let old_pid = self.pid;
        *self = Pcb::empty(slot);
        self.generation = self.generation.wrapping_add(1);
        let candidate = old_pid + PCB_TABLE_SIZE as i32;
        self.pid = if candidate >= 1 {
            candidate
        } else {
            old_pid.rem_euclid(PCB_TABLE_SIZE as i32)
        };
    }
}

/// The idle PCB: `pid = 0`, never enqueued on READY, selected when no other
/// process is runnable.
fn idle_pcb() -> Pcb {
    let mut p = Pcb::empty(0);
    p.pid = 0;
    p
}

pub struct ProcessTable {
    pub slots: [Pcb; PCB_TABLE_SIZE],
    pub idle: Pcb,
    pub ready_head: Option<usize>,
    pub ready_tail: Option<usize>,
    pub stopped_head: Option<usize>,
    pub stopped_tail: Option<usize>,
    /// Head of the sleep delta-list (spec.md §4.5). Sorted by wakeup order,
    /// not FIFO, so it is threaded through the generic queue machinery only
    /// for removal; insertion is custom (see `crate::sleep`).
    pub sleep_head: Option<usize>,
    pub sleep_tail: Option<usize>,
    /// Slot index of the RUNNING process, or `None` while the idle PCB runs.
    pub current: Option<usize>,
}

impl ProcessTable {
    /// Every slot starts life linked onto STOPPED with its baseline pid
    /// (`pcb.c`'s `pcb_table_init`).
    pub fn new() -> ProcessTable {
        const EMPTY: Pcb = Pcb::empty(0);
        let mut slots = [EMPTY; PCB_TABLE_SIZE];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = Pcb::empty(i);
        }
        let mut table = ProcessTable {
            slots,
            idle: idle_pcb(),
            ready_head: None,
            ready_tail: None,
            stopped_head: None,
            stopped_tail: None,
            sleep_head: None,
            sleep_tail: None,
            current: None,
        };
        for i in 0..PCB_TABLE_SIZE {
            super::queue::link_tail(&mut table, super::queue::ListRef::Stopped, i);
            table.slots[i].in_queue = InQueue::Stopped;
            table.slots[i].state = State::Stopped;
        }
        table
    }

    /// O(1) lookup by pid (spec.md §8 property 3). Returns `None` if the
    /// owning slot is STOPPED or holds a different generation's pid.
    pub fn pid_to_slot(&self, pid: i32) -> Option<usize> {
        if pid < 1 {
            return None;
        }
        let slot = ((pid - 1) as usize) % PCB_TABLE_SIZE;
        let p = &self.slots[slot];
        if p.pid == pid && p.state != State::Stopped {
            Some(slot)
        } else {
            None
        }
    }

    /// Dequeue the STOPPED head, reinit it with a fresh pid, and return its
    /// slot index. `None` means the table is full (`EPROCLIMIT`).
    pub fn alloc_slot(&mut self) -> Option<usize> {
        let slot = self.stopped_head?;
        super::queue::unlink(self, slot);
        self.slots[slot].reinit(slot);
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PCB_TABLE_SIZE;

    /// spec.md §8 property 2: filling the table returns distinct positive
    /// pids for all `TABLE_SIZE` slots, and the next `alloc_slot` is `None`
    /// (the `CREATE` handler turns that into `EPROCLIMIT`).
    #[test]
    fn table_exhausts_after_table_size_allocations() {
        let mut table = ProcessTable::new();
        let mut pids = [0i32; PCB_TABLE_SIZE];
        for pid_slot in pids.iter_mut() {
            let slot = table.alloc_slot().expect("table should not be full yet");
            let pid = table.slots[slot].pid;
            assert!(pid > 0);
            assert!(!pids[..].contains(&pid));
            *pid_slot = pid;
        }
        assert!(table.alloc_slot().is_none());
    }

    /// spec.md §8 property 3: a live pid's slot is found in O(1), and a
    /// stopped slot's last pid no longer resolves.
    #[test]
    fn pid_to_slot_finds_live_and_rejects_stopped() {
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        let pid = table.slots[slot].pid;
        table.slots[slot].state = State::Ready;
        assert_eq!(table.pid_to_slot(pid), Some(slot));
        assert_eq!((pid - 1) as usize % PCB_TABLE_SIZE, slot);

        table.slots[slot].state = State::Stopped;
        assert_eq!(table.pid_to_slot(pid), None);
    }

    /// Reuse keeps `(pid-1) mod TABLE_SIZE == slot` across many generations
    /// (spec.md §9 Open Question on the pid-reuse wrap scheme).
    #[test]
    fn pid_reuse_keeps_slot_invariant_across_generations() {
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        queue::add_pcb_to_queue(&mut table, slot, State::Stopped);
        for _ in 0..(PCB_TABLE_SIZE * 3) {
            let s = table.alloc_slot().unwrap();
            assert_eq!(s, slot);
            let pid = table.slots[s].pid;
            assert_eq!((pid - 1).rem_euclid(PCB_TABLE_SIZE as i32) as usize, slot);
            queue::add_pcb_to_queue(&mut table, s, State::Stopped);
        }
    }
}
