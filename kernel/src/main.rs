#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(dead_code, static_mut_refs)]

mod abi;
mod arch;
mod config;
mod context;
mod demo;
mod dev;
mod dispatch;
mod drivers;
mod memory;
mod msg;
mod panic;
mod process;
mod signal;
mod sleep;
mod sync;
mod syscall;
mod usrptr;

/// The stack `kernel_main` itself runs on while bringing the machine up.
/// Its end address becomes `freemem` (spec.md §4.1): the kernel image and
/// this array are assumed, as on the xerox-kernel heritage this project is
/// grounded in, to load entirely below [`config::HOLE_LO`], so a BSS-
/// resident array's end address is a valid low-memory free-list origin.
/// `usrptr` treats the `KERNEL_STACK` bytes below it as off-limits for the
/// same reason real hardware reserves the region below `freemem` for the
/// kernel's own stack.
static mut BOOT_STACK: [u8; config::KERNEL_STACK] = [0; config::KERNEL_STACK];

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    drivers::serial::init();
    serial_println!("");
    serial_println!("==============================");
    serial_println!("  microkernel");
    serial_println!("==============================");

    arch::x86::gdt::init();
    serial_println!("[OK] GDT initialized");

    arch::x86::idt::init();
    serial_println!("[OK] IDT initialized (vectors 32/33/50 wired)");

    arch::x86::tss::init();

    arch::x86::pic::init();
    serial_println!("[OK] PIC remapped (IRQ0 -> 32, IRQ1 -> 33)");

    arch::x86::pit::init(config::TICK_LENGTH_MS);
    serial_println!("[OK] PIT configured at {} ms/tick", config::TICK_LENGTH_MS);

    let freemem = unsafe { BOOT_STACK.as_ptr().add(config::KERNEL_STACK) as usize };
    memory::kmeminit(freemem, config::MAXADDR, config::HOLE_LO, config::HOLE_HI);
    serial_println!(
        "[OK] kernel allocator initialized: freemem={:#x} maxaddr={:#x} hole=[{:#x},{:#x})",
        freemem, config::MAXADDR, config::HOLE_LO, config::HOLE_HI
    );

    process::init();
    dev::keyboard::init();
    serial_println!("[OK] keyboard driver initialized");

    let root_pid = process::with_table(|table| {
        process::create::create(table, demo::root_proc as usize as u32, config::DEFAULT_STACK_SIZE)
    });
    serial_println!("[OK] root process created, pid={}", root_pid);

    let frame = process::with_table(|table| {
        process::get_next_proc(table);
        process::resume_frame(table)
    });

    serial_println!("[OK] entering dispatcher");
    unsafe { context::dispatch_to(frame) }
}
