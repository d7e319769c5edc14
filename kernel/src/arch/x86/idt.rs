//! Interrupt Descriptor Table (IDT) for 32-bit protected mode.
//!
//! Installs gates for the CPU exception vectors (0-31, routed to a common
//! fatal handler — this kernel has no fault recovery, spec.md §1 non-goal),
//! the timer (vector 32), the keyboard (vector 33, PIC-mapped IRQ1), and the
//! syscall software-interrupt gate (vector 50), per spec.md §6. Every gate is
//! DPL 0: the kernel never runs code outside ring 0 (see `gdt`'s module
//! doc), so `int 50` is always executed at the same privilege level the gate
//! requires. The three entry points this kernel actually cares about are
//! implemented in [`crate::context`] — this module only wires vector numbers
//! to them.

use core::arch::asm;
use core::mem::size_of;

const IDT_ENTRIES: usize = 256;

pub const VEC_TIMER: u8 = 32;
pub const VEC_KEYBOARD: u8 = 33;
pub const VEC_SYSCALL: u8 = 50;

const GATE_INTERRUPT_RING0: u8 = 0x8E; // present, ring0, 32-bit interrupt gate

#[repr(C, packed)]
#[derive(Copy, Clone)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

#[repr(C, packed)]
struct IdtDescriptor {
    size: u16,
    offset: u32,
}

const NULL_ENTRY: IdtEntry = IdtEntry { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 };

static mut IDT: [IdtEntry; IDT_ENTRIES] = [NULL_ENTRY; IDT_ENTRIES];
static mut IDT_DESC: IdtDescriptor = IdtDescriptor { size: 0, offset: 0 };

fn set_gate(vector: u8, handler: unsafe extern "C" fn(), selector: u16, type_attr: u8) {
    let addr = handler as u32;
    unsafe {
        IDT[vector as usize] = IdtEntry {
            offset_low: (addr & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: ((addr >> 16) & 0xFFFF) as u16,
        };
    }
}

/// Fallback handler for any exception vector the kernel does not otherwise
/// service. There is no fault-recovery story (no paging, no SMP) so this is
/// fatal by design.
unsafe extern "C" fn default_exception_stub() {
    panic!("unhandled CPU exception");
}

/// Install all 256 gates (unused ones point at the fatal default) and load
/// the IDT via `lidt`.
pub fn init() {
    unsafe {
        for v in 0..IDT_ENTRIES {
            set_gate(v as u8, default_exception_stub, super::gdt::KERNEL_CODE_SEL, GATE_INTERRUPT_RING0);
        }

        set_gate(VEC_TIMER, crate::context::timer_entry, super::gdt::KERNEL_CODE_SEL, GATE_INTERRUPT_RING0);
        set_gate(VEC_KEYBOARD, crate::context::keyboard_entry, super::gdt::KERNEL_CODE_SEL, GATE_INTERRUPT_RING0);
        set_gate(VEC_SYSCALL, crate::context::syscall_entry, super::gdt::KERNEL_CODE_SEL, GATE_INTERRUPT_RING0);

        IDT_DESC = IdtDescriptor {
            size: (IDT_ENTRIES * size_of::<IdtEntry>() - 1) as u16,
            offset: IDT.as_ptr() as u32,
        };
        asm!("lidt [{}]", in(reg) &IDT_DESC as *const IdtDescriptor, options(nostack, preserves_flags));
    }
}
