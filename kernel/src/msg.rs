//! Synchronous rendezvous IPC (spec.md §4.6). Grounded in
//! `original_source/c/msg.c`: `send`/`recv`/`recv_any` never buffer a
//! message — whichever side arrives second does the copy directly out of
//! the first side's own saved register frame, using [`frame_args`] to read
//! a peer's original syscall arguments even though that peer isn't
//! currently running.

use crate::abi::{SYSMSG_BLOCKED, SYSPID_OK};
use crate::context::Context32;
use crate::process::pcb::{BlockKind, ProcessTable, State};
use crate::process::queue;

/// Read `slot`'s saved `ebx`/`ecx`/`edx`/`esi` straight out of its own
/// stack frame (spec.md §4.4: "args — view into the current syscall's
/// argument block within the saved frame"). Valid whether or not `slot` is
/// the process currently running, since a blocked process's frame sits
/// untouched on its own stack until it resumes.
fn frame_args(table: &ProcessTable, slot: usize) -> [u32; 4] {
    let frame = table.slots[slot].stack_pointer as *const Context32;
    unsafe { [(*frame).ebx, (*frame).ecx, (*frame).edx, (*frame).esi] }
}

fn is_blocked_on(table: &ProcessTable, peer: usize, owner: usize, kind: BlockKind) -> bool {
    table.slots[peer].state == State::Blocked
        && table.slots[peer].blocking_proc == Some(owner)
        && table.slots[peer].blocking_queue_kind == kind
}

fn copy_to_user(dst: u32, src: u32, len: usize) {
    unsafe {
        core::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
    }
}

/// `src` sends `len` bytes from `buf` to `dest`. If `dest` is already
/// parked waiting (either `recv`-ing specifically from `src`, or blocked in
/// `recv_any`), the message is delivered immediately and `dest` is made
/// READY. Otherwise `src` is parked on `dest`'s `Sender` queue and
/// `SYSMSG_BLOCKED` is returned so the caller can park itself.
pub fn send(table: &mut ProcessTable, src: usize, dest: usize, buf: u32, len: usize) -> i32 {
    let dest_is_any =
        table.slots[dest].state == State::Blocked && table.slots[dest].blocking_queue_kind == BlockKind::ReceiveAny;
    let dest_waiting_for_src = is_blocked_on(table, dest, src, BlockKind::Receiver);

    if !dest_is_any && !dest_waiting_for_src {
        queue::add_proc_to_blocking_queue(table, src, dest, BlockKind::Sender);
        return SYSMSG_BLOCKED;
    }

    if dest_waiting_for_src {
        queue::remove_proc_from_blocking_queue(table, dest);
    } else {
        table.slots[dest].blocking_queue_kind = BlockKind::None;
    }

    let dest_args = frame_args(table, dest);
    if dest_is_any {
        let from_pid_ptr = dest_args[0];
        unsafe {
            (from_pid_ptr as *mut i32).write(table.slots[src].pid);
        }
    }
    let dest_buf = dest_args[1];
    let dest_len = dest_args[2] as usize;
    copy_to_user(dest_buf, buf, core::cmp::min(dest_len, len));

    table.slots[dest].return_value = SYSPID_OK;
    queue::add_pcb_to_queue(table, dest, State::Ready);
    SYSPID_OK
}

/// `dest` receives into `buf` from exactly `src`. If `src` is already
/// parked trying to send to `dest`, the message is delivered immediately.
/// Otherwise `dest` is parked on `src`'s `Receiver` queue.
pub fn recv(table: &mut ProcessTable, src: usize, dest: usize, buf: u32, len: usize) -> i32 {
    if !is_blocked_on(table, src, dest, BlockKind::Sender) {
        queue::add_proc_to_blocking_queue(table, dest, src, BlockKind::Receiver);
        return SYSMSG_BLOCKED;
    }

    queue::remove_proc_from_blocking_queue(table, src);
    let sender_args = frame_args(table, src);
    let sender_buf = sender_args[1];
    let sender_len = sender_args[2] as usize;
    copy_to_user(buf, sender_buf, core::cmp::min(sender_len, len));

    table.slots[src].return_value = SYSPID_OK;
    queue::add_pcb_to_queue(table, src, State::Ready);
    SYSPID_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::pcb::ProcessTable;

    /// Point `slot`'s saved stack pointer at a frame with `ecx`/`edx` set to
    /// `buf`/`len`, the two fields `frame_args` reads off a parked peer
    /// (spec.md §4.3: "args — view into the current syscall's argument
    /// block within the saved frame").
    fn park_frame(frame: &mut Context32, buf: u32, len: u32) {
        frame.ecx = buf;
        frame.edx = len;
    }

    fn blank_frame() -> Context32 {
        Context32 { edi: 0, esi: 0, ebp: 0, esp_dummy: 0, ebx: 0, edx: 0, ecx: 0, eax: 0, eip: 0, cs: 0, eflags: 0 }
    }

    /// spec.md §8 property 6: `send` followed by a matching `recv` delivers
    /// `min(send_len, recv_len)` bytes and unblocks both with success.
    #[test]
    fn send_then_recv_delivers_min_len_bytes() {
        let mut table = ProcessTable::new();
        let sender = table.alloc_slot().unwrap();
        let receiver = table.alloc_slot().unwrap();

        let send_buf: [u8; 4] = [0xCA, 0xFE, 0xCA, 0xFE];
        let mut sender_frame = blank_frame();
        park_frame(&mut sender_frame, send_buf.as_ptr() as u32, send_buf.len() as u32);
        table.slots[sender].stack_pointer = &sender_frame as *const Context32 as u32;

        let rc = send(&mut table, sender, receiver, send_buf.as_ptr() as u32, send_buf.len());
        assert_eq!(rc, SYSMSG_BLOCKED);
        assert_eq!(table.slots[sender].state, State::Blocked);
        assert_eq!(table.slots[sender].blocking_queue_kind, BlockKind::Sender);

        let mut recv_buf = [0u8; 2]; // shorter than the sender's 4 bytes
        let rc = recv(&mut table, sender, receiver, recv_buf.as_mut_ptr() as u32, recv_buf.len());
        assert_eq!(rc, SYSPID_OK);
        assert_eq!(recv_buf, [0xCA, 0xFE]);
        assert_eq!(table.slots[sender].return_value, SYSPID_OK);
        assert_eq!(table.slots[sender].state, State::Ready);
    }

    /// spec.md §8 property 6 / scenario B: `recv_any` pairs with the
    /// earliest-queued sender and reports its pid.
    #[test]
    fn recv_any_pairs_with_earliest_sender() {
        let mut table = ProcessTable::new();
        let first = table.alloc_slot().unwrap();
        let second = table.alloc_slot().unwrap();
        let receiver = table.alloc_slot().unwrap();

        let buf_a: [u8; 4] = *b"aaaa";
        let buf_b: [u8; 4] = *b"bbbb";
        let mut frame_a = blank_frame();
        park_frame(&mut frame_a, buf_a.as_ptr() as u32, buf_a.len() as u32);
        table.slots[first].stack_pointer = &frame_a as *const Context32 as u32;
        let mut frame_b = blank_frame();
        park_frame(&mut frame_b, buf_b.as_ptr() as u32, buf_b.len() as u32);
        table.slots[second].stack_pointer = &frame_b as *const Context32 as u32;

        assert_eq!(send(&mut table, first, receiver, buf_a.as_ptr() as u32, buf_a.len()), SYSMSG_BLOCKED);
        assert_eq!(send(&mut table, second, receiver, buf_b.as_ptr() as u32, buf_b.len()), SYSMSG_BLOCKED);

        let mut from_pid = 0i32;
        let mut recv_buf = [0u8; 4];
        let rc = recv_any(&mut table, receiver, &mut from_pid as *mut i32 as u32, recv_buf.as_mut_ptr() as u32, 4);
        assert_eq!(rc, SYSPID_OK);
        assert_eq!(from_pid, table.slots[first].pid);
        assert_eq!(&recv_buf, b"aaaa");
        assert_eq!(table.slots[first].state, State::Ready);
        assert_eq!(table.slots[second].state, State::Blocked);
    }

    /// spec.md §7/§8 property 7 groundwork: a `recv` with nothing queued
    /// parks the caller rather than resolving immediately.
    #[test]
    fn recv_with_no_sender_blocks() {
        let mut table = ProcessTable::new();
        let src = table.alloc_slot().unwrap();
        let dest = table.alloc_slot().unwrap();
        let mut buf = [0u8; 4];
        let rc = recv(&mut table, src, dest, buf.as_mut_ptr() as u32, buf.len());
        assert_eq!(rc, SYSMSG_BLOCKED);
        assert_eq!(table.slots[dest].state, State::Blocked);
        assert_eq!(table.slots[dest].blocking_queue_kind, BlockKind::Receiver);
    }
}

/// `dest` receives from whichever process is already queued trying to send
/// to it, writing that sender's pid to `*from_pid_ptr`. If none is queued,
/// `dest` is parked in the bare `ReceiveAny` state — not linked onto any of
/// the three generic peer queues, since it has no specific owner to park
/// on (`msg.c`'s recv-any path).
pub fn recv_any(table: &mut ProcessTable, dest: usize, from_pid_ptr: u32, buf: u32, len: usize) -> i32 {
    let sender_idx = BlockKind::Sender.queue_index().unwrap();
    let src = match table.slots[dest].blocking_heads[sender_idx] {
        Some(s) => s,
        None => {
            table.slots[dest].state = State::Blocked;
            table.slots[dest].blocking_queue_kind = BlockKind::ReceiveAny;
            table.slots[dest].blocking_proc = None;
            return SYSMSG_BLOCKED;
        }
    };

    queue::remove_proc_from_blocking_queue(table, src);
    unsafe {
        (from_pid_ptr as *mut i32).write(table.slots[src].pid);
    }
    let sender_args = frame_args(table, src);
    let sender_buf = sender_args[1];
    let sender_len = sender_args[2] as usize;
    copy_to_user(buf, sender_buf, core::cmp::min(sender_len, len));

    table.slots[src].return_value = SYSPID_OK;
    queue::add_pcb_to_queue(table, src, State::Ready);
    SYSPID_OK
}
