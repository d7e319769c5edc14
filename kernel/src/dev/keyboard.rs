//! The keyboard driver (spec.md §4.9). Grounded in
//! `original_source/c/kbd.c`: scancode decode tables, a bounded circular
//! pre-read buffer for characters that arrive before anyone is reading,
//! and a bounded queue of pending read tasks for reads that arrive before
//! enough characters have. `kbd.c`'s exclusivity model ("only 1 keyboard
//! is allowed to be open at a time", tracked with a single `g_kbd_in_use`
//! flag) is widened here to the two-minor refcount/BUSY model spec.md
//! §4.9 actually specifies.

use crate::abi::{self, EBADF, EBUSY};
use crate::config::{KBD_BUFFER_SIZE, KBD_TASK_QUEUE_SIZE};
use crate::process::pcb::{BlockKind, ProcessTable, State};
use crate::process::queue;
use crate::sync::spinlock::Spinlock;

const DEFAULT_EOF: u8 = 0x04;

const STATE_SHIFT: u8 = 0;
const STATE_CTRL: u8 = 1;
const STATE_CAPSLOCK: u8 = 2;

#[derive(Clone, Copy)]
struct ReadTask {
    slot: usize,
    buf: u32,
    len: usize,
    progress: usize,
}

struct KeyboardState {
    open_count: u32,
    active_minor: Option<u8>,
    buffer: [u8; KBD_BUFFER_SIZE],
    buf_head: usize,
    buf_tail: usize,
    tasks: [Option<ReadTask>; KBD_TASK_QUEUE_SIZE],
    task_head: usize,
    task_tail: usize,
    keystate: u8,
    eof: u8,
    echo: bool,
    done: bool,
    last_completed_slot: Option<usize>,
    last_completed_count: usize,
}

impl KeyboardState {
    const fn new() -> KeyboardState {
        KeyboardState {
            open_count: 0,
            active_minor: None,
            buffer: [0; KBD_BUFFER_SIZE],
            buf_head: 0,
            buf_tail: 0,
            tasks: [None; KBD_TASK_QUEUE_SIZE],
            task_head: 0,
            task_tail: 0,
            keystate: 0,
            eof: DEFAULT_EOF,
            echo: false,
            done: false,
            last_completed_slot: None,
            last_completed_count: 0,
        }
    }
}

static STATE: Spinlock<KeyboardState> = Spinlock::new(KeyboardState::new());

/// Reset all driver state (spec.md §9 boot sequence, `kbd_init`).
pub fn init() {
    let mut st = STATE.lock();
    *st = KeyboardState::new();
    crate::serial_println!("[OK] keyboard driver initialized");
}

/// `dvopen`: the first open of either minor arms the driver and unmasks
/// IRQ1; a later open of the *other* minor while the first is still open
/// fails with `EBUSY` (spec.md §4.9), otherwise the refcount just grows.
pub fn open(device_id: u8) -> i32 {
    let mut st = STATE.lock();
    if let Some(active) = st.active_minor {
        if active != device_id && st.open_count > 0 {
            return EBUSY;
        }
    }
    if st.open_count == 0 {
        st.active_minor = Some(device_id);
        st.done = false;
        st.buf_head = 0;
        st.buf_tail = 0;
        st.task_head = 0;
        st.task_tail = 0;
        st.keystate = 0;
        st.eof = DEFAULT_EOF;
        st.echo = device_id == abi::KEYBOARD;
        crate::arch::x86::pic::unmask(1);
    }
    st.open_count += 1;
    0
}

/// `dvclose`: drop this process's in-flight task (if any — spec.md §4.9
/// requires this even though a process can realistically only reach
/// `close` while not itself blocked reading), decrement the refcount, and
/// mask IRQ1 again once the last open goes away.
pub fn close(table: &mut ProcessTable, slot: usize, _device_id: u8) -> i32 {
    let mut st = STATE.lock();
    if st.open_count == 0 {
        return EBADF;
    }
    purge_tasks_for(&mut st, slot);
    st.open_count -= 1;
    if st.open_count == 0 {
        st.active_minor = None;
        crate::arch::x86::pic::mask(1);
    }
    0
}

/// `dvread` (`kbd_read`): queue a task, drain anything already buffered
/// into it (and any older still-pending tasks ahead of it), then report
/// however many bytes it now holds, or block if it's still short and EOF
/// hasn't been seen.
pub fn read(table: &mut ProcessTable, slot: usize, buf: u32, len: usize) -> i32 {
    let mut st = STATE.lock();
    if enqueue_task(&mut st, slot, buf, len).is_err() {
        return EBUSY;
    }
    st.last_completed_slot = None;
    flush_buffer(&mut st, table);

    if st.last_completed_slot == Some(slot) {
        return st.last_completed_count as i32;
    }
    if st.done {
        return 0;
    }
    table.slots[slot].state = State::Blocked;
    table.slots[slot].blocking_queue_kind = BlockKind::DeviceRead;
    abi::SYSMSG_BLOCKED
}

/// `dvwrite` (`kbd_write`): the keyboard is input-only.
pub fn write() -> i32 {
    -1
}

/// `dvioctl` (`kbd_ioctl`).
pub fn ioctl(cmd: i32, arg: u32) -> i32 {
    let mut st = STATE.lock();
    match cmd {
        c if c == abi::kbd_ioctl::SET_EOF => {
            st.eof = arg as u8;
            0
        }
        c if c == abi::kbd_ioctl::ENABLE_ECHO => {
            st.echo = true;
            0
        }
        c if c == abi::kbd_ioctl::DISABLE_ECHO => {
            st.echo = false;
            0
        }
        c if c == abi::kbd_ioctl::GET_EOF => st.eof as i32,
        c if c == abi::kbd_ioctl::GET_ECHO => st.echo as i32,
        _ => abi::SYSERR,
    }
}

/// Keyboard IRQ handler (`keyboard_isr`): read one scancode, decode it,
/// echo it if enabled, and either hand it to the oldest pending task or
/// stash it in the pre-read buffer if there is room.
pub fn isr(table: &mut ProcessTable) {
    let mut st = STATE.lock();
    let (status, data) = unsafe {
        (crate::arch::x86::port::inb(0x64), crate::arch::x86::port::inb(0x60) as u32)
    };
    if st.open_count == 0 || status & 0x01 == 0 {
        return;
    }

    let c = process_scancode(&mut st, data);
    if c == 0 {
        return;
    }
    if st.echo {
        crate::drivers::serial::write_byte(c);
    }

    if st.task_head != st.task_tail {
        process_char(&mut st, table, c);
    } else {
        let next_head = (st.buf_head + 1) % KBD_BUFFER_SIZE;
        if next_head != st.buf_tail {
            st.buffer[st.buf_head] = c;
            st.buf_head = next_head;
        }
    }
}

/// Remove `slot`'s pending task, wherever it sits in the circular queue
/// (O(n) compaction — spec.md §4.9), without waking it; the caller
/// (`signal::kill`/`process::cleanup_proc`) handles that.
pub fn cancel_task_for(table: &mut ProcessTable, slot: usize) {
    let mut st = STATE.lock();
    purge_tasks_for(&mut st, slot);
    let _ = table;
}

fn purge_tasks_for(st: &mut KeyboardState, slot: usize) {
    let mut remaining = [None; KBD_TASK_QUEUE_SIZE];
    let mut count = 0;
    let mut i = st.task_tail;
    while i != st.task_head {
        if let Some(task) = st.tasks[i] {
            if task.slot != slot {
                remaining[count] = Some(task);
                count += 1;
            }
        }
        i = (i + 1) % KBD_TASK_QUEUE_SIZE;
    }
    st.tasks = [None; KBD_TASK_QUEUE_SIZE];
    for (idx, task) in remaining.iter().take(count).enumerate() {
        st.tasks[idx] = *task;
    }
    st.task_tail = 0;
    st.task_head = count;
}

fn enqueue_task(st: &mut KeyboardState, slot: usize, buf: u32, len: usize) -> Result<(), ()> {
    let next_head = (st.task_head + 1) % KBD_TASK_QUEUE_SIZE;
    if next_head == st.task_tail {
        return Err(());
    }
    st.tasks[st.task_head] = Some(ReadTask { slot, buf, len, progress: 0 });
    st.task_head = next_head;
    Ok(())
}

/// Drain the pre-read buffer into whatever task is oldest, as long as both
/// have something left to give/take (`keyboard_flush_buffer`).
fn flush_buffer(st: &mut KeyboardState, table: &mut ProcessTable) {
    while st.task_head != st.task_tail && st.buf_head != st.buf_tail {
        let c = st.buffer[st.buf_tail];
        st.buf_tail = (st.buf_tail + 1) % KBD_BUFFER_SIZE;
        process_char(st, table, c);
    }
}

/// Feed one decoded character to the oldest pending task
/// (`keyboard_process_char`): EOF ends the session for everyone currently
/// waiting; otherwise the character is appended and the task completes
/// once its buffer is full or a newline arrives.
fn process_char(st: &mut KeyboardState, table: &mut ProcessTable, c: u8) {
    if c == st.eof {
        handle_eof(st, table);
        return;
    }

    let idx = st.task_tail;
    let mut task = match st.tasks[idx] {
        Some(t) => t,
        None => return,
    };
    unsafe {
        ((task.buf as *mut u8).add(task.progress)).write(c);
    }
    task.progress += 1;
    st.tasks[idx] = Some(task);

    if task.progress == task.len || c == b'\n' {
        st.task_tail = (st.task_tail + 1) % KBD_TASK_QUEUE_SIZE;
        st.tasks[idx] = None;
        complete(st, table, task.slot, task.progress);
    }
}

/// EOF arrived: stop delivering further input, mask the hardware
/// interrupt, and flush every pending task with whatever it has
/// accumulated so far (`keyboard_handle_eof`).
fn handle_eof(st: &mut KeyboardState, table: &mut ProcessTable) {
    crate::serial_println!("[kbd] EOF: 0x{:02x}", st.eof);
    crate::arch::x86::pic::mask(1);
    st.done = true;

    while st.task_tail != st.task_head {
        let idx = st.task_tail;
        st.task_tail = (st.task_tail + 1) % KBD_TASK_QUEUE_SIZE;
        if let Some(task) = st.tasks[idx].take() {
            complete(st, table, task.slot, task.progress);
        }
    }
}

/// Record a task's outcome and, if its owner is actually blocked waiting
/// for it, make it READY (`keyboard_unblock_proc` — a task completing for
/// the process that is synchronously calling `read` right now is left
/// running; [`read`] picks up `last_completed_slot` itself).
fn complete(st: &mut KeyboardState, table: &mut ProcessTable, slot: usize, count: usize) {
    st.last_completed_slot = Some(slot);
    st.last_completed_count = count;
    table.slots[slot].return_value = count as i32;
    if table.slots[slot].state == State::Blocked {
        queue::add_pcb_to_queue(table, slot, State::Ready);
    }
}

fn process_scancode(st: &mut KeyboardState, data: u32) -> u8 {
    const LOWER: [u8; 0x54] = [
        0, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t', b'q', b'w',
        b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's', b'd', b'f', b'g', b'h',
        b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0,
        0x2A, 0, b' ', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x2D, 0, 0, 0, 0x2B, 0, 0, 0, 0, 0,
    ];
    const UPPER: [u8; 0x54] = [
        0, 0x1B, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t', b'Q', b'W',
        b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S', b'D', b'F', b'G', b'H',
        b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0,
        0, 0, b' ', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x37, 0x38, 0x39, 0x2D, 0x34, 0x35, 0x36, 0x2B, 0x31, 0x32,
        0x33, 0x30, 0x2E,
    ];
    const CTRL: [u8; 0x54] = [
        0, 0x1B, 0, 0, 0, 0, 0, 0x1E, 0, 0, 0, 0, 0x1F, 0, 0x7F, 0, 0x11, 0x17, 0x05, 0x12, 0x14, 0x19, 0x15, 0x09,
        0x0F, 0x10, 0x1B, 0x1D, 0x0A, 0, 0x01, 0x13, 0x04, 0x06, 0x07, 0x08, 0x0A, 0x0B, 0x0C, 0, 0, 0, 0, 0x1C,
        0x1A, 0x18, 0x03, 0x16, 0x02, 0x0E, 0x0D, 0, 0, 0, 0, 0x10, 0, b' ', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 0,
    ];

    let mut c = 0u8;
    if data < 0x54 {
        c = if st.keystate & (1 << STATE_CTRL) != 0 {
            CTRL[data as usize]
        } else if ((st.keystate >> STATE_SHIFT) & 1) ^ ((st.keystate >> STATE_CAPSLOCK) & 1) != 0 {
            UPPER[data as usize]
        } else {
            LOWER[data as usize]
        };
    }

    if c == 0 {
        match data {
            0x2A | 0x36 => st.keystate |= 1 << STATE_SHIFT,
            0xAA | 0xB6 => st.keystate &= !(1 << STATE_SHIFT),
            0x1D => st.keystate |= 1 << STATE_CTRL,
            0x9D => st.keystate &= !(1 << STATE_CTRL),
            0x3A => st.keystate ^= 1 << STATE_CAPSLOCK,
            _ => {}
        }
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_letter_decodes_lowercase() {
        let mut st = KeyboardState::new();
        assert_eq!(process_scancode(&mut st, 0x1E), b'a');
    }

    #[test]
    fn shift_press_then_letter_is_uppercase() {
        let mut st = KeyboardState::new();
        assert_eq!(process_scancode(&mut st, 0x2A), 0);
        assert_eq!(process_scancode(&mut st, 0x1E), b'A');
        assert_eq!(process_scancode(&mut st, 0xAA), 0);
        assert_eq!(process_scancode(&mut st, 0x1E), b'a');
    }

    #[test]
    fn capslock_toggle_persists_across_keys() {
        let mut st = KeyboardState::new();
        assert_eq!(process_scancode(&mut st, 0x3A), 0);
        assert_eq!(process_scancode(&mut st, 0x1E), b'A');
        assert_eq!(process_scancode(&mut st, 0x3A), 0);
        assert_eq!(process_scancode(&mut st, 0x1E), b'a');
    }

    #[test]
    fn ctrl_takes_precedence_over_shift() {
        let mut st = KeyboardState::new();
        st.keystate = 1 << STATE_CTRL;
        assert_eq!(process_scancode(&mut st, 0x1E), 0x01);
    }

    fn deliver(c: u8, table: &mut ProcessTable) {
        let mut st = STATE.lock();
        process_char(&mut st, table, c);
    }

    /// spec.md §8 property 10: a read that can already be satisfied from
    /// buffered input resolves synchronously; one that can't blocks until
    /// enough characters (or a newline) arrive.
    #[test]
    fn read_blocks_then_completes_on_newline() {
        init();
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        assert_eq!(open(abi::KEYBOARD), 0);

        let mut buf = [0u8; 8];
        let rc = read(&mut table, slot, buf.as_mut_ptr() as u32, buf.len());
        assert_eq!(rc, abi::SYSMSG_BLOCKED);
        assert_eq!(table.slots[slot].state, State::Blocked);
        assert_eq!(table.slots[slot].blocking_queue_kind, BlockKind::DeviceRead);

        for &c in b"hi\n" {
            deliver(c, &mut table);
        }
        assert_eq!(table.slots[slot].state, State::Ready);
        assert_eq!(table.slots[slot].return_value, 3);
        assert_eq!(&buf[..3], b"hi\n");

        close(&mut table, slot, abi::KEYBOARD);
    }

    /// A read for exactly `len` bytes completes once the buffer fills, with
    /// no newline required.
    #[test]
    fn read_completes_when_buffer_fills() {
        init();
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        assert_eq!(open(abi::KEYBOARD), 0);

        let mut buf = [0u8; 3];
        let rc = read(&mut table, slot, buf.as_mut_ptr() as u32, buf.len());
        assert_eq!(rc, abi::SYSMSG_BLOCKED);

        for &c in b"abc" {
            deliver(c, &mut table);
        }
        assert_eq!(table.slots[slot].return_value, 3);
        assert_eq!(&buf, b"abc");

        close(&mut table, slot, abi::KEYBOARD);
    }

    /// spec.md §4.9's EOF handling: once EOF arrives every still-pending
    /// task is completed with whatever it had accumulated, and any
    /// subsequent read resolves immediately with 0 rather than blocking.
    #[test]
    fn eof_completes_pending_read_and_future_reads_return_zero() {
        init();
        let mut table = ProcessTable::new();
        let slot = table.alloc_slot().unwrap();
        assert_eq!(open(abi::KEYBOARD), 0);

        let mut buf = [0u8; 8];
        let rc = read(&mut table, slot, buf.as_mut_ptr() as u32, buf.len());
        assert_eq!(rc, abi::SYSMSG_BLOCKED);

        deliver(b'h', &mut table);
        deliver(b'i', &mut table);
        deliver(DEFAULT_EOF, &mut table);

        assert_eq!(table.slots[slot].state, State::Ready);
        assert_eq!(table.slots[slot].return_value, 2);
        assert_eq!(&buf[..2], b"hi");

        let mut buf2 = [0u8; 4];
        let rc = read(&mut table, slot, buf2.as_mut_ptr() as u32, buf2.len());
        assert_eq!(rc, 0);

        close(&mut table, slot, abi::KEYBOARD);
    }

    /// spec.md §4.9 minor exclusion: a second open of the *other* minor
    /// fails BUSY while the first is still held, and becomes available the
    /// instant the first closes.
    #[test]
    fn other_minor_is_busy_until_first_closes() {
        init();
        let mut table = ProcessTable::new();
        let holder = table.alloc_slot().unwrap();
        let other = table.alloc_slot().unwrap();

        assert_eq!(open(abi::KEYBOARD), 0);
        assert_eq!(open(abi::KEYBOARD_NO_ECHO), EBUSY);

        assert_eq!(close(&mut table, holder, abi::KEYBOARD), 0);
        assert_eq!(open(abi::KEYBOARD_NO_ECHO), 0);

        close(&mut table, other, abi::KEYBOARD_NO_ECHO);
    }

    /// Reopening the same minor while it's already held just grows the
    /// refcount; both opens must close before the driver releases IRQ1.
    #[test]
    fn same_minor_reopen_grows_refcount() {
        init();
        let mut table = ProcessTable::new();
        let a = table.alloc_slot().unwrap();
        let b = table.alloc_slot().unwrap();

        assert_eq!(open(abi::KEYBOARD), 0);
        assert_eq!(open(abi::KEYBOARD), 0);
        assert_eq!(close(&mut table, a, abi::KEYBOARD), 0);
        // still held by b, so the other minor remains BUSY
        assert_eq!(open(abi::KEYBOARD_NO_ECHO), EBUSY);
        assert_eq!(close(&mut table, b, abi::KEYBOARD), 0);
        assert_eq!(open(abi::KEYBOARD_NO_ECHO), 0);
        close(&mut table, a, abi::KEYBOARD_NO_ECHO);
    }
}
