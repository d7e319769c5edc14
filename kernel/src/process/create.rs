//! `create(entry, stack_bytes)` (spec.md §4.2). Grounded in
//! `original_source/c/pcb.c`'s `get_next_available_pcb` plus `ctsw.c`'s
//! stack priming for a never-before-run process.

use crate::abi::{EINVAL, ENOMEM, EPROCLIMIT};
use crate::context::Context32;
use crate::memory::allocator::{kfree, kmalloc};

use super::pcb::{ProcessTable, StackRegion, State};
use super::queue::{self, ListRef};

/// Bytes reserved at the top of a new stack: the saved register frame plus
/// one word for the synthetic return address to [`proc_exit`].
const RESERVED: usize = core::mem::size_of::<Context32>() + 4;

/// Create a new process. Returns its pid, or a negative error code
/// (`EINVAL` for a null entry point, `ENOMEM` on allocation failure,
/// `EPROCLIMIT` when the table is full).
pub fn create(table: &mut ProcessTable, entry: u32, stack_bytes: usize) -> i32 {
    if entry == 0 {
        return EINVAL;
    }
    let stack_bytes = stack_bytes.max(crate::config::DEFAULT_STACK_SIZE);

    let slot = match table.alloc_slot() {
        Some(s) => s,
        None => return EPROCLIMIT,
    };

    let base = kmalloc(stack_bytes);
    if base.is_null() {
        // Slot was already dequeued from STOPPED; put it back untouched.
        queue::add_pcb_to_queue(table, slot, State::Stopped);
        return ENOMEM;
    }

    let stack_top = base as usize + stack_bytes;
    let return_addr_addr = stack_top - 4;
    let frame_addr = stack_top - RESERVED;

    unsafe {
        (return_addr_addr as *mut u32).write(proc_exit as usize as u32);
        (frame_addr as *mut Context32).write(Context32::fresh(entry));
    }

    let pcb = &mut table.slots[slot];
    pcb.stack_region = Some(StackRegion { base, len: stack_bytes });
    pcb.stack_pointer = frame_addr as u32;

    let pid = pcb.pid;
    queue::add_pcb_to_queue(table, slot, State::Ready);
    pid
}

/// Release `slot`'s stack. Called by `cleanup_proc`; not used directly by
/// `create`'s own failure paths (those never allocated a stack).
pub fn free_stack(table: &mut ProcessTable, slot: usize) {
    if let Some(region) = table.slots[slot].stack_region.take() {
        kfree(region.base);
        let _ = region.len;
    }
}

/// Synthetic return address planted at the top of every new stack. A user
/// entry point that returns instead of calling `stop` lands here, which
/// performs the `STOP` syscall itself (spec.md §7: "a returning user
/// function automatically invokes `stop`").
#[unsafe(naked)]
unsafe extern "C" fn proc_exit() -> ! {
    core::arch::naked_asm!(
        "mov eax, {stop}",
        "int 50",
        "2:",
        "jmp 2b",
        stop = const crate::abi::request::STOP,
    )
}
