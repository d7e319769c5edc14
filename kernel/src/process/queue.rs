//! Generic FIFO queue operations over process-table slot indices
//! (spec.md §4.2). Every PCB reuses the same `prev`/`next` link pair no
//! matter which list currently holds it — READY, STOPPED, or a peer's
//! blocking queue — mirroring `pcb.c`'s `add_proc_to_queue`/
//! `remove_proc_from_queue` but replacing pointer pairs with a `ListRef`
//! selector so the borrow checker proves only one queue is touched at a
//! time.

use super::pcb::{BlockKind, InQueue, Pcb, ProcessTable, State};

/// Identifies a concrete list: the two globals, or one of a PCB's three
/// owned peer queues.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ListRef {
    Ready,
    Stopped,
    Sleep,
    Owned { owner: usize, kind: BlockKind },
}

fn head_tail(table: &ProcessTable, list: ListRef) -> (Option<usize>, Option<usize>) {
    match list {
        ListRef::Ready => (table.ready_head, table.ready_tail),
        ListRef::Stopped => (table.stopped_head, table.stopped_tail),
        ListRef::Sleep => (table.sleep_head, table.sleep_tail),
        ListRef::Owned { owner, kind } => {
            let idx = kind.queue_index().expect("ListRef::Owned requires a peer-queue kind");
            (table.slots[owner].blocking_heads[idx], table.slots[owner].blocking_tails[idx])
        }
    }
}

fn set_head_tail(table: &mut ProcessTable, list: ListRef, head: Option<usize>, tail: Option<usize>) {
    match list {
        ListRef::Ready => {
            table.ready_head = head;
            table.ready_tail = tail;
        }
        ListRef::Stopped => {
            table.stopped_head = head;
            table.stopped_tail = tail;
        }
        ListRef::Sleep => {
            table.sleep_head = head;
            table.sleep_tail = tail;
        }
        ListRef::Owned { owner, kind } => {
            let idx = kind.queue_index().expect("ListRef::Owned requires a peer-queue kind");
            table.slots[owner].blocking_heads[idx] = head;
            table.slots[owner].blocking_tails[idx] = tail;
        }
    }
}

fn in_queue_tag(list: ListRef) -> InQueue {
    match list {
        ListRef::Ready => InQueue::Ready,
        ListRef::Stopped => InQueue::Stopped,
        ListRef::Sleep => InQueue::Sleep,
        ListRef::Owned { owner, kind } => InQueue::Peer { owner, kind },
    }
}

/// Append `slot` to the tail of `list`. `slot` must not already be linked
/// anywhere (`InQueue::None`).
pub fn link_tail(table: &mut ProcessTable, list: ListRef, slot: usize) {
    debug_assert_eq!(slot_pcb(table, slot).in_queue, InQueue::None);
    let (head, tail) = head_tail(table, list);
    slot_pcb_mut(table, slot).prev = tail;
    slot_pcb_mut(table, slot).next = None;
    slot_pcb_mut(table, slot).in_queue = in_queue_tag(list);
    match tail {
        Some(t) => slot_pcb_mut(table, t).next = Some(slot),
        None => {}
    }
    let new_head = head.or(Some(slot));
    set_head_tail(table, list, new_head, Some(slot));
}

/// Remove `slot` from whatever list its `in_queue` tag says it's on.
/// Leaves `in_queue = None`; does not change `state`.
pub fn unlink(table: &mut ProcessTable, slot: usize) {
    let list = match slot_pcb(table, slot).in_queue {
        InQueue::None => return,
        InQueue::Ready => ListRef::Ready,
        InQueue::Stopped => ListRef::Stopped,
        InQueue::Sleep => ListRef::Sleep,
        InQueue::Peer { owner, kind } => ListRef::Owned { owner, kind },
    };
    let (head, tail) = head_tail(table, list);
    let prev = slot_pcb(table, slot).prev;
    let next = slot_pcb(table, slot).next;

    match prev {
        Some(p) => slot_pcb_mut(table, p).next = next,
        None => {}
    }
    match next {
        Some(n) => slot_pcb_mut(table, n).prev = prev,
        None => {}
    }
    let new_head = if head == Some(slot) { next } else { head };
    let new_tail = if tail == Some(slot) { prev } else { tail };
    set_head_tail(table, list, new_head, new_tail);

    let p = slot_pcb_mut(table, slot);
    p.prev = None;
    p.next = None;
    p.in_queue = InQueue::None;
}

pub fn pop_head(table: &mut ProcessTable, list: ListRef) -> Option<usize> {
    let (head, _) = head_tail(table, list);
    if let Some(h) = head {
        unlink(table, h);
    }
    head
}

/// Move `proc` onto READY/STOPPED, updating `state` (spec.md §4.2
/// `add_pcb_to_queue`). The idle PCB (pid 0) is never linked onto a queue.
pub fn add_pcb_to_queue(table: &mut ProcessTable, slot: usize, new_state: State) {
    debug_assert!(new_state == State::Ready || new_state == State::Stopped);
    if slot_pcb(table, slot).in_queue != InQueue::None {
        unlink(table, slot);
    }
    slot_pcb_mut(table, slot).state = new_state;
    if slot_pcb(table, slot).pid == 0 {
        return;
    }
    let list = if new_state == State::Ready { ListRef::Ready } else { ListRef::Stopped };
    link_tail(table, list, slot);
}

pub fn remove_pcb_from_queue(table: &mut ProcessTable, slot: usize) {
    unlink(table, slot);
}

/// Park `peer` on `owner`'s queue of kind `kind` (spec.md §4.2
/// `add_proc_to_blocking_queue`). Sets `peer.state = Blocked` and records
/// `blocking_proc`/`blocking_queue_kind` for O(1) cross-removal later.
pub fn add_proc_to_blocking_queue(table: &mut ProcessTable, peer: usize, owner: usize, kind: BlockKind) {
    link_tail(table, ListRef::Owned { owner, kind }, peer);
    let p = slot_pcb_mut(table, peer);
    p.state = State::Blocked;
    p.blocking_proc = Some(owner);
    p.blocking_queue_kind = kind;
}

/// Cross-remove `peer` from whichever blocking queue it is parked on. Does
/// not change `state` — the caller sets it (usually to `Ready`).
pub fn remove_proc_from_blocking_queue(table: &mut ProcessTable, peer: usize) {
    unlink(table, peer);
    let p = slot_pcb_mut(table, peer);
    p.blocking_proc = None;
    p.blocking_queue_kind = BlockKind::None;
}

fn slot_pcb(table: &ProcessTable, slot: usize) -> &Pcb {
    &table.slots[slot]
}

fn slot_pcb_mut(table: &mut ProcessTable, slot: usize) -> &mut Pcb {
    &mut table.slots[slot]
}

/// Debug-only consistency check: every READY-linked PCB is reachable by
/// walking from `ready_head` to `ready_tail` and no cycle exceeds the table
/// size (`pcb.c`'s `verify_pcb_queues`, kept as an assertion rather than a
/// runtime check — spec.md §4.2 treats invariant breaks as fatal).
#[cfg(debug_assertions)]
pub fn verify_pcb_queues(table: &ProcessTable) {
    use crate::config::PCB_TABLE_SIZE;
    let mut steps = 0;
    let mut cur = table.ready_head;
    let mut last = None;
    while let Some(slot) = cur {
        steps += 1;
        assert!(steps <= PCB_TABLE_SIZE, "READY queue cycle detected");
        assert_eq!(table.slots[slot].in_queue, InQueue::Ready);
        last = cur;
        cur = table.slots[slot].next;
    }
    assert_eq!(last, table.ready_tail);
}

#[cfg(not(debug_assertions))]
pub fn verify_pcb_queues(_table: &ProcessTable) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::pcb::ProcessTable;

    /// spec.md §8 property 4: with no blocking, processes that repeatedly
    /// queue up run in strict FIFO order — insertion at tail, removal at
    /// head, no reordering.
    #[test]
    fn ready_queue_is_strict_fifo() {
        let mut table = ProcessTable::new();
        let a = table.alloc_slot().unwrap();
        let b = table.alloc_slot().unwrap();
        let c = table.alloc_slot().unwrap();
        add_pcb_to_queue(&mut table, a, State::Ready);
        add_pcb_to_queue(&mut table, b, State::Ready);
        add_pcb_to_queue(&mut table, c, State::Ready);

        assert_eq!(pop_head(&mut table, ListRef::Ready), Some(a));
        assert_eq!(pop_head(&mut table, ListRef::Ready), Some(b));
        assert_eq!(pop_head(&mut table, ListRef::Ready), Some(c));
        assert_eq!(pop_head(&mut table, ListRef::Ready), None);
    }

    /// A PCB requeued after running goes to the tail, behind anything
    /// already waiting — the round-robin behavior property 4 also exercises.
    #[test]
    fn requeue_after_run_goes_to_tail() {
        let mut table = ProcessTable::new();
        let a = table.alloc_slot().unwrap();
        let b = table.alloc_slot().unwrap();
        add_pcb_to_queue(&mut table, a, State::Ready);
        add_pcb_to_queue(&mut table, b, State::Ready);

        let ran = pop_head(&mut table, ListRef::Ready).unwrap();
        assert_eq!(ran, a);
        add_pcb_to_queue(&mut table, ran, State::Ready); // a yields, rejoins tail

        assert_eq!(pop_head(&mut table, ListRef::Ready), Some(b));
        assert_eq!(pop_head(&mut table, ListRef::Ready), Some(a));
    }

    /// A peer parked on an owner's blocking queue is recorded precisely
    /// enough for O(1) cross-removal (spec.md §4.2
    /// `add_proc_to_blocking_queue`/`remove_proc_from_blocking_queue`).
    #[test]
    fn blocking_queue_park_and_cross_remove() {
        let mut table = ProcessTable::new();
        let owner = table.alloc_slot().unwrap();
        let peer = table.alloc_slot().unwrap();

        add_proc_to_blocking_queue(&mut table, peer, owner, BlockKind::Sender);
        assert_eq!(table.slots[peer].state, State::Blocked);
        assert_eq!(table.slots[peer].blocking_proc, Some(owner));
        assert_eq!(table.slots[peer].blocking_queue_kind, BlockKind::Sender);
        assert_eq!(table.slots[owner].blocking_heads[0], Some(peer));

        remove_proc_from_blocking_queue(&mut table, peer);
        assert_eq!(table.slots[peer].blocking_proc, None);
        assert_eq!(table.slots[peer].blocking_queue_kind, BlockKind::None);
        assert_eq!(table.slots[owner].blocking_heads[0], None);
    }

    /// Multiple peers parked on the same owner/kind queue stay FIFO — the
    /// ordering spec.md §4.6 relies on for `recv_any`.
    #[test]
    fn blocking_queue_preserves_fifo_arrival_order() {
        let mut table = ProcessTable::new();
        let owner = table.alloc_slot().unwrap();
        let first = table.alloc_slot().unwrap();
        let second = table.alloc_slot().unwrap();

        add_proc_to_blocking_queue(&mut table, first, owner, BlockKind::Sender);
        add_proc_to_blocking_queue(&mut table, second, owner, BlockKind::Sender);

        assert_eq!(pop_head(&mut table, ListRef::Owned { owner, kind: BlockKind::Sender }), Some(first));
        assert_eq!(pop_head(&mut table, ListRef::Owned { owner, kind: BlockKind::Sender }), Some(second));
    }
}
