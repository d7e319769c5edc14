//! The context switcher (spec.md §4.3).
//!
//! Every process shares the flat address space and runs at the same
//! privilege level as the kernel (see `arch::x86::gdt`'s module doc), so a
//! "context switch" is nothing more than swapping which stack ESP points at
//! before the shared [`timer_entry`]/[`keyboard_entry`]/[`syscall_entry`]
//! trampolines execute their interrupt return. There is no separate kernel
//! stack distinct from a process's own stack: the trampoline below runs on
//! whichever stack was interrupted, the Rust-side trap handler in
//! [`crate::dispatch`] decides which process's saved frame to resume, and
//! the trampoline repoints ESP there before `popa`/`iretd`.
//!
//! [`Context32`] is the exact layout `pusha` produces, with the CPU's own
//! EIP/CS/EFLAGS push sitting just above it — together this is "the user
//! register frame" spec.md §4.3 describes saving and restoring.

use core::arch::naked_asm;

/// Saved register frame: the `pusha` layout (low to high address) followed
/// by the CPU-pushed EIP/CS/EFLAGS. `esp_dummy` is the original ESP value
/// `pusha` records and `popa` never restores from it; it is read by nothing
/// and kept only so the struct's size matches the real stack layout.
#[repr(C)]
pub struct Context32 {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

const EFLAGS_IF: u32 = 0x0000_0200;

impl Context32 {
    /// Build the frame for a brand-new process about to run for the first
    /// time: all general registers zero, interrupts enabled, entry point
    /// and segment as given. Written at the top of the process's stack by
    /// `process::create` (spec.md §4.2).
    pub fn fresh(entry: u32) -> Context32 {
        Context32 {
            edi: 0, esi: 0, ebp: 0, esp_dummy: 0,
            ebx: 0, edx: 0, ecx: 0, eax: 0,
            eip: entry,
            cs: crate::arch::x86::gdt::KERNEL_CODE_SEL as u32,
            eflags: EFLAGS_IF,
        }
    }
}

/// Timer interrupt entry (vector 32). Saves the interrupted process's
/// frame, hands its address to [`crate::dispatch::on_timer_tick`], and
/// resumes whichever frame it returns — the same process if no preemption
/// was due, otherwise the next scheduled one.
#[unsafe(naked)]
pub unsafe extern "C" fn timer_entry() {
    naked_asm!(
        "pusha",
        "push esp",
        "call {handler}",
        "add esp, 4",
        "mov esp, eax",
        "popa",
        "iretd",
        handler = sym timer_trap,
    )
}

extern "C" fn timer_trap(frame: *mut Context32) -> *mut Context32 {
    crate::arch::x86::pit::on_tick();
    let next = crate::dispatch::on_timer_tick(frame);
    crate::arch::x86::pic::end_of_interrupt(0);
    next
}

/// Keyboard IRQ entry (vector 33, PIC-remapped IRQ1).
#[unsafe(naked)]
pub unsafe extern "C" fn keyboard_entry() {
    naked_asm!(
        "pusha",
        "push esp",
        "call {handler}",
        "add esp, 4",
        "mov esp, eax",
        "popa",
        "iretd",
        handler = sym keyboard_trap,
    )
}

extern "C" fn keyboard_trap(frame: *mut Context32) -> *mut Context32 {
    let next = crate::dispatch::on_keyboard_irq(frame);
    crate::arch::x86::pic::end_of_interrupt(1);
    next
}

/// Syscall software-interrupt entry (vector 50). The saved frame already
/// holds the syscall number in `eax` and up to four arguments in
/// `ebx`/`ecx`/`edx`/`esi` (spec.md §6's calling convention); the dispatcher
/// writes the return value back into `frame.eax` before this resumes.
#[unsafe(naked)]
pub unsafe extern "C" fn syscall_entry() {
    naked_asm!(
        "pusha",
        "push esp",
        "call {handler}",
        "add esp, 4",
        "mov esp, eax",
        "popa",
        "iretd",
        handler = sym syscall_trap,
    )
}

extern "C" fn syscall_trap(frame: *mut Context32) -> *mut Context32 {
    crate::dispatch::on_syscall(frame)
}

/// Repoint ESP at `frame` and resume it directly, without having arrived
/// via an interrupt first. Used exactly once, by `kernel_main`, to enter
/// the first process (spec.md §9's boot sequence ends by dispatching into
/// a root process rather than returning).
#[unsafe(naked)]
pub unsafe extern "C" fn dispatch_to(frame: *mut Context32) -> ! {
    naked_asm!(
        "mov eax, [esp + 4]",
        "mov esp, eax",
        "popa",
        "iretd",
    )
}
