//! Build-time kernel configuration constants.
//!
//! The system is diskless (spec.md §6) so there is no runtime configuration
//! parsing; everything that would otherwise be a config file is a `const`
//! here. Numeric values match the defaults spec.md §9 calls out as
//! configurable (table size 32, tick period 10 ms, vectors 32/33/50).

/// Fixed capacity of the process table.
pub const PCB_TABLE_SIZE: usize = 32;

/// Number of signal slots per process.
pub const N_SIG: usize = 32;

/// Number of file-descriptor slots per process.
pub const PCB_NUM_FDS: usize = 4;

/// Timer tick period in milliseconds.
pub const TICK_LENGTH_MS: u32 = 10;

/// Minimum process stack size in bytes, enforced by `create`.
pub const DEFAULT_STACK_SIZE: usize = 8192;

/// Size of the keyboard's bounded pre-read circular buffer.
pub const KBD_BUFFER_SIZE: usize = 8;

/// Size of the keyboard's bounded pending-read-task queue.
pub const KBD_TASK_QUEUE_SIZE: usize = 8;

/// Bytes reserved for the boot-time stack that `kernel_main` runs on before
/// the first process is dispatched. Sits directly below `freemem`; user
/// pointer validation (spec.md §4.8) treats `[freemem - KERNEL_STACK,
/// freemem)` as off-limits the same way the original kernel's kernel-stack
/// region was.
pub const KERNEL_STACK: usize = 16 * 1024;

/// Hardware-mandated hole the allocator must never hand out: legacy VGA
/// memory and the BIOS ROM area, 640 KiB-1 MiB on a real x86 PC. Matches
/// spec.md §4.1/§4.8's `[HOLE_LO, HOLE_HI)`.
pub const HOLE_LO: usize = 0xA0000;
pub const HOLE_HI: usize = 0x100000;

/// Top of the allocator's high free region. Assumes at least 4 MiB of
/// installed RAM, true of any QEMU/Bochs default configuration.
pub const MAXADDR: usize = 0x400000;
