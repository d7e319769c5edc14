//! Global Descriptor Table (GDT) for flat 32-bit protected mode.
//!
//! Three entries: null, kernel code, kernel data, plus a single TSS
//! descriptor. Every process runs at CPL 0 — spec.md §4.3 describes the
//! context switcher saving and restoring only EIP/CS/EFLAGS/general
//! registers, never SS:ESP, which only makes sense if no privilege
//! transition ever happens on interrupt entry. Segmentation provides a flat
//! 4 GiB view, not a protection boundary; the "protected mode" in spec.md §1
//! refers to the CPU mode (32-bit, paging disabled), not a ring boundary.
//! The TSS is kept anyway (spec.md §4.10 HAL boundary) to give the kernel a
//! stable `esp0` slot if a future revision adds a ring.

use core::arch::asm;
use core::mem::size_of;

pub const KERNEL_CODE_SEL: u16 = 0x08;
pub const KERNEL_DATA_SEL: u16 = 0x10;
pub const TSS_SEL: u16 = 0x18;

const GDT_ENTRIES: usize = 4;

#[repr(C, packed)]
#[derive(Copy, Clone)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    flags_limit_high: u8,
    base_high: u8,
}

#[repr(C, packed)]
struct GdtDescriptor {
    size: u16,
    offset: u32,
}

static mut GDT: [GdtEntry; GDT_ENTRIES] = [GdtEntry {
    limit_low: 0,
    base_low: 0,
    base_mid: 0,
    access: 0,
    flags_limit_high: 0,
    base_high: 0,
}; GDT_ENTRIES];

static mut GDT_DESC: GdtDescriptor = GdtDescriptor { size: 0, offset: 0 };

fn make_entry(base: u32, limit: u32, access: u8, flags: u8) -> GdtEntry {
    GdtEntry {
        limit_low: (limit & 0xFFFF) as u16,
        base_low: (base & 0xFFFF) as u16,
        base_mid: ((base >> 16) & 0xFF) as u8,
        access,
        flags_limit_high: ((limit >> 16) & 0x0F) as u8 | (flags << 4),
        base_high: ((base >> 24) & 0xFF) as u8,
    }
}

/// Install the TSS descriptor (entry 3, selector 0x18) into the GDT.
pub fn set_tss_entry(base: u32, limit: u32) {
    unsafe {
        // Access 0x89: Present, DPL=0, 32-bit TSS (available).
        GDT[3] = make_entry(base, limit, 0x89, 0x0);
    }
}

/// Initialize the GDT with the flat kernel code/data segments and load it
/// via `lgdt`.
pub fn init() {
    unsafe {
        GDT[0] = make_entry(0, 0, 0, 0);
        // Kernel code: access 0x9A (present, ring0, code, exec/read), flags 0xC (4K gran, 32-bit).
        GDT[1] = make_entry(0, 0xFFFFF, 0x9A, 0xC);
        // Kernel data: access 0x92 (present, ring0, data, r/w).
        GDT[2] = make_entry(0, 0xFFFFF, 0x92, 0xC);
        // GDT[3] (TSS) is installed by tss::init() after this returns.

        GDT_DESC = GdtDescriptor {
            size: (GDT_ENTRIES * size_of::<GdtEntry>() - 1) as u16,
            offset: GDT.as_ptr() as u32,
        };

        asm!("lgdt [{}]", in(reg) &GDT_DESC as *const GdtDescriptor, options(nostack, preserves_flags));

        asm!(
            "mov ax, 0x10",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            out("ax") _,
            options(nostack),
        );

        asm!(
            "push 0x08",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            tmp = out(reg) _,
            options(nostack),
        );
    }
}
