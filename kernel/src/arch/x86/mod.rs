//! x86 (i686) protected-mode architecture support.
//!
//! Provides the GDT, IDT, TSS, 8259 PIC, 8254 PIT, and raw port I/O. No
//! paging, no APIC, no SMP startup — all non-goals (spec.md §1).

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod pit;
pub mod port;
pub mod tss;
