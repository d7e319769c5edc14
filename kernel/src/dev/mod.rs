//! Device abstraction layer (spec.md §4.9). Grounded in
//! `original_source/c/di_calls.c`: a small device table indexed by device
//! id, a per-process fd table that's just a `[Option<device id>; N]`, and
//! syscall handlers that validate the fd/device id before delegating to
//! the one real driver this kernel has.
//!
//! `di_calls.c` itself stubs `OPEN`'s refcount/echo bookkeeping and leaves
//! `CLOSE`/`READ`/`WRITE`/`IOCTL` as `TODO`s; spec.md §4.9 is authoritative
//! here and is fully implemented in [`keyboard`].

pub mod keyboard;

use crate::abi::{EBADF, ENODEV};
use crate::config::PCB_NUM_FDS;
use crate::process::pcb::ProcessTable;

/// `OPEN` syscall: find a free fd slot and hand it to the keyboard driver.
/// The slot is reserved only once the driver itself accepts the open
/// (`keyboard::open` may refuse with `EBUSY` if the other minor is active).
pub fn open(table: &mut ProcessTable, slot: usize, device_id: u8) -> i32 {
    if device_id > crate::abi::KEYBOARD {
        return ENODEV;
    }
    let fd = table.slots[slot].fd_table.iter().position(|f| f.is_none());
    let fd = match fd {
        Some(i) => i,
        None => return crate::abi::EMFILE,
    };
    let result = keyboard::open(device_id);
    if result != 0 {
        return result;
    }
    table.slots[slot].fd_table[fd] = Some(device_id);
    fd as i32
}

/// `CLOSE` syscall.
pub fn close(table: &mut ProcessTable, slot: usize, fd: i32) -> i32 {
    if fd < 0 || fd as usize >= PCB_NUM_FDS || table.slots[slot].fd_table[fd as usize].is_none() {
        return EBADF;
    }
    let device_id = table.slots[slot].fd_table[fd as usize].take().unwrap();
    keyboard::close(table, slot, device_id)
}

/// `READ` syscall. May return [`crate::abi::SYSMSG_BLOCKED`], in which case
/// the caller parks `slot` as `Blocked`/`BlockKind::DeviceRead` and selects
/// a new `current` — the keyboard ISR resumes it later directly, without
/// going through any of the three generic peer queues.
pub fn read(table: &mut ProcessTable, slot: usize, fd: i32, buf: u32, len: usize) -> i32 {
    if fd < 0 || fd as usize >= PCB_NUM_FDS {
        return EBADF;
    }
    match table.slots[slot].fd_table[fd as usize] {
        None => EBADF,
        Some(_device_id) => keyboard::read(table, slot, buf, len),
    }
}

/// `WRITE` syscall. The keyboard is the only device and is read-only.
pub fn write(table: &ProcessTable, slot: usize, fd: i32, _buf: u32, _len: usize) -> i32 {
    if fd < 0 || fd as usize >= PCB_NUM_FDS || table.slots[slot].fd_table[fd as usize].is_none() {
        return EBADF;
    }
    keyboard::write()
}

/// `IOCTL` syscall.
pub fn ioctl(table: &mut ProcessTable, slot: usize, fd: i32, cmd: i32, arg: u32) -> i32 {
    if fd < 0 || fd as usize >= PCB_NUM_FDS || table.slots[slot].fd_table[fd as usize].is_none() {
        return EBADF;
    }
    keyboard::ioctl(cmd, arg)
}

/// Release every fd a terminating process still holds open (the ambient
/// resource-cleanup counterpart of `process::cleanup_proc` freeing a
/// stack — spec.md doesn't say a dying process's open devices release
/// themselves, but nothing else would ever clear `keyboard`'s refcount
/// once such a process exists).
pub fn close_all_fds(table: &mut ProcessTable, slot: usize) {
    for fd in 0..PCB_NUM_FDS {
        if let Some(device_id) = table.slots[slot].fd_table[fd].take() {
            keyboard::close(table, slot, device_id);
        }
    }
}
