//! Task State Segment (TSS).
//!
//! Every process in this kernel runs at CPL 0 (see `gdt`'s module doc), so
//! the CPU never consults `esp0` to switch stacks on a ring transition.
//! The TSS is still loaded via `ltr` because the x86 task register must
//! point at a valid descriptor before the first far jump/call that touches
//! it, and because it is part of the minimal HAL boundary spec.md §4.10
//! names; `esp0` is kept up to date regardless, at no cost, in case a
//! future revision adds a user ring.

use core::arch::asm;
use core::mem::size_of;

#[repr(C, packed)]
pub struct Tss {
    pub link: u16,
    _r0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _r1: u16,
    pub esp1: u32,
    pub ss1: u16,
    _r2: u16,
    pub esp2: u32,
    pub ss2: u16,
    _r3: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _r4: u16,
    pub cs: u16,
    _r5: u16,
    pub ss: u16,
    _r6: u16,
    pub ds: u16,
    _r7: u16,
    pub fs: u16,
    _r8: u16,
    pub gs: u16,
    _r9: u16,
    pub ldt: u16,
    _r10: u16,
    _r11: u16,
    pub iomap_base: u16,
}

static mut TSS: Tss = Tss {
    link: 0, _r0: 0, esp0: 0, ss0: super::gdt::KERNEL_DATA_SEL, _r1: 0,
    esp1: 0, ss1: 0, _r2: 0, esp2: 0, ss2: 0, _r3: 0, cr3: 0, eip: 0,
    eflags: 0, eax: 0, ecx: 0, edx: 0, ebx: 0, esp: 0, ebp: 0, esi: 0,
    edi: 0, es: 0, _r4: 0, cs: 0, _r5: 0, ss: 0, _r6: 0, ds: 0, _r7: 0,
    fs: 0, _r8: 0, gs: 0, _r9: 0, ldt: 0, _r10: 0, _r11: 0, iomap_base: 0,
};

/// Initialize the TSS, install its descriptor in the GDT, and load `TR`.
pub fn init() {
    unsafe {
        TSS.iomap_base = size_of::<Tss>() as u16;
        TSS.ss0 = super::gdt::KERNEL_DATA_SEL;

        let tss_base = core::ptr::addr_of!(TSS) as u32;
        let tss_limit = (size_of::<Tss>() - 1) as u32;
        super::gdt::set_tss_entry(tss_base, tss_limit);

        asm!("ltr ax", in("ax") super::gdt::TSS_SEL, options(nostack, preserves_flags));
    }
    crate::serial_println!("[OK] TSS initialized (selector {:#x})", super::gdt::TSS_SEL);
}

/// Update the kernel stack pointer loaded on the next ring transition.
/// Called by the dispatcher before switching to a process.
pub fn set_kernel_stack(esp0: u32) {
    unsafe { TSS.esp0 = esp0; }
}
