//! The sleep delta-list (spec.md §4.5). Grounded in
//! `original_source/c/sleep.c`: each sleeping PCB stores not its absolute
//! wakeup tick but the number of ticks *after its predecessor* expires, so
//! a timer tick only ever touches the head of the list — O(1) per tick
//! regardless of how many processes are sleeping.
//!
//! Reuses a PCB's generic `prev`/`next` links (same trick `sleep.c` plays
//! with `next_proc`/`prev_proc`) rather than a dedicated field, since
//! `InQueue` already guarantees a PCB sits on at most one list at a time.

use crate::config::TICK_LENGTH_MS;
use crate::process::pcb::{BlockKind, InQueue, ProcessTable, State};
use crate::process::queue;

/// Park `slot` on the delta-list for `ms` milliseconds, rounded up to whole
/// ticks. Does not select a new `current` — the caller (the `SLEEP` syscall
/// handler) does that once it has also updated `table.current`.
pub fn sleep(table: &mut ProcessTable, slot: usize, ms: u32) {
    let ticks = (ms + TICK_LENGTH_MS - 1) / TICK_LENGTH_MS;
    insert(table, slot, ticks.max(1));
}

/// Walk from the head, accumulating deltas, until the running total would
/// meet or exceed `ticks`; insert `slot` there, subtracting the predecessor
/// chain's total from it and, if there is a successor, subtracting the
/// inserted node's value back out of it (`sleep.c`'s
/// `add_to_sleeping_list`).
fn insert(table: &mut ProcessTable, slot: usize, ticks: u32) {
    let mut target = ticks;
    let mut prev: Option<usize> = None;
    let mut entry = table.sleep_head;
    while let Some(e) = entry {
        let e_val = table.slots[e].sleep_ticks;
        if target <= e_val {
            break;
        }
        target -= e_val;
        prev = Some(e);
        entry = table.slots[e].next;
    }

    match prev {
        Some(p) => table.slots[p].next = Some(slot),
        None => table.sleep_head = Some(slot),
    }
    table.slots[slot].prev = prev;
    table.slots[slot].next = entry;
    match entry {
        Some(e) => {
            table.slots[e].prev = Some(slot);
            table.slots[e].sleep_ticks -= target;
        }
        None => table.sleep_tail = Some(slot),
    }

    table.slots[slot].sleep_ticks = target;
    table.slots[slot].in_queue = InQueue::Sleep;
    table.slots[slot].state = State::Blocked;
    table.slots[slot].blocking_queue_kind = BlockKind::Sleep;
    table.slots[slot].blocking_proc = None;
}

/// Remove `slot` from the delta-list, folding its remaining value into its
/// successor so every other sleeper's absolute wakeup time is undisturbed
/// (spec.md §8 property 5), and set `return_value` to the elapsed-ms
/// shortfall (0 for a normal full-duration wakeup). Returns that shortfall.
/// Does not enqueue `slot` onto READY — callers that want that call
/// [`queue::add_pcb_to_queue`] themselves.
pub fn wake(table: &mut ProcessTable, slot: usize) -> i32 {
    let remaining = table.slots[slot].sleep_ticks;
    let prev = table.slots[slot].prev;
    let next = table.slots[slot].next;

    match prev {
        Some(p) => table.slots[p].next = next,
        None => table.sleep_head = next,
    }
    match next {
        Some(n) => {
            table.slots[n].prev = prev;
            table.slots[n].sleep_ticks += remaining;
        }
        None => table.sleep_tail = prev,
    }

    table.slots[slot].prev = None;
    table.slots[slot].next = None;
    table.slots[slot].in_queue = InQueue::None;
    table.slots[slot].blocking_queue_kind = BlockKind::None;
    table.slots[slot].blocking_proc = None;

    let shortfall = (remaining * TICK_LENGTH_MS) as i32;
    table.slots[slot].return_value = shortfall;
    shortfall
}

/// Called once per timer tick (spec.md §4.5 `tick`): decrement the head's
/// delta, then wake and re-ready every node whose delta has reached zero —
/// there can be more than one if several sleepers share a wakeup tick.
pub fn tick(table: &mut ProcessTable) {
    let head = match table.sleep_head {
        Some(h) => h,
        None => return,
    };
    table.slots[head].sleep_ticks = table.slots[head].sleep_ticks.saturating_sub(1);

    while let Some(h) = table.sleep_head {
        if table.slots[h].sleep_ticks > 0 {
            break;
        }
        wake(table, h);
        queue::add_pcb_to_queue(table, h, State::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::pcb::ProcessTable;

    fn fresh_table() -> ProcessTable {
        ProcessTable::new()
    }

    #[test]
    fn single_sleeper_wakes_after_its_ticks() {
        let mut table = fresh_table();
        let slot = table.alloc_slot().unwrap();
        sleep(&mut table, slot, 30); // 3 ticks at 10ms
        assert_eq!(table.slots[slot].sleep_ticks, 3);
        for _ in 0..2 {
            tick(&mut table);
            assert_eq!(table.slots[slot].state, State::Blocked);
        }
        tick(&mut table);
        assert_eq!(table.slots[slot].state, State::Ready);
        assert_eq!(table.slots[slot].return_value, 0);
    }

    #[test]
    fn later_sleeper_does_not_disturb_earlier_wakeup() {
        let mut table = fresh_table();
        let a = table.alloc_slot().unwrap();
        let b = table.alloc_slot().unwrap();
        sleep(&mut table, a, 10); // 1 tick
        sleep(&mut table, b, 50); // 5 ticks, inserted after a
        assert_eq!(table.slots[a].sleep_ticks, 1);
        assert_eq!(table.slots[b].sleep_ticks, 4); // 5 - 1

        tick(&mut table);
        assert_eq!(table.slots[a].state, State::Ready);
        assert_eq!(table.slots[b].state, State::Blocked);
        assert_eq!(table.slots[b].sleep_ticks, 4);
    }

    #[test]
    fn early_wake_folds_remaining_into_successor() {
        let mut table = fresh_table();
        let a = table.alloc_slot().unwrap();
        let b = table.alloc_slot().unwrap();
        sleep(&mut table, a, 20); // 2 ticks
        sleep(&mut table, b, 50); // 5 ticks total, delta 3 after a

        let shortfall = wake(&mut table, a);
        assert!(shortfall > 0);
        assert_eq!(table.sleep_head, Some(b));
        assert_eq!(table.slots[b].sleep_ticks, 5); // 3 + 2 folded back in
    }
}
