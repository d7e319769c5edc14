//! User-pointer validation (spec.md §4.8). Grounded verbatim in
//! `original_source/c/copyinout.c`: every pointer argument a syscall
//! dereferences is checked against three forbidden zones before use — past
//! the top of installed memory, inside the hardware hole the allocator
//! also avoids (`crate::config::HOLE_LO`/`HOLE_HI`), or inside the
//! kernel's own boot stack — rather than trusting the caller.

use crate::abi::EINVAL;
use crate::config::{HOLE_HI, HOLE_LO, KERNEL_STACK};
use crate::memory::allocator::{kmem_freemem, kmem_maxaddr};

/// Check that the `len`-byte range `[ptr, ptr+len)` is entirely addressable
/// kernel memory outside the hole and the boot stack. `len == 0` or
/// `ptr == 0` are always rejected (`copyinout.c` treats a null/zero-length
/// pointer as invalid rather than a no-op).
pub fn verify_usrptr(ptr: usize, len: usize) -> Result<(), i32> {
    if ptr == 0 || len == 0 {
        return Err(EINVAL);
    }
    let end = match ptr.checked_add(len - 1) {
        Some(e) => e,
        None => return Err(EINVAL),
    };
    if end > kmem_maxaddr() {
        return Err(EINVAL);
    }
    if in_hole(ptr) || in_hole(end) || in_kernel_stack(ptr) || in_kernel_stack(end) {
        return Err(EINVAL);
    }
    Ok(())
}

/// Walk a NUL-terminated string one byte at a time, validating each byte's
/// address as it goes (`copyinout.c`'s `verify_usrstr` — no way to know the
/// length up front, so there is no shortcut).
pub fn verify_usrstr(ptr: usize) -> Result<(), i32> {
    let mut p = ptr;
    loop {
        verify_usrptr(p, 1)?;
        let byte = unsafe { *(p as *const u8) };
        if byte == 0 {
            return Ok(());
        }
        p += 1;
    }
}

fn in_hole(addr: usize) -> bool {
    addr >= HOLE_LO && addr < HOLE_HI
}

fn in_kernel_stack(addr: usize) -> bool {
    let freemem = kmem_freemem();
    addr >= freemem.saturating_sub(KERNEL_STACK) && addr < freemem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::allocator::kmeminit;

    fn init() {
        kmeminit(0x20000, 0x400000, 0xA0000, 0x100000);
    }

    #[test]
    fn rejects_null_and_zero_length() {
        init();
        assert!(verify_usrptr(0, 4).is_err());
        assert!(verify_usrptr(0x30000, 0).is_err());
    }

    #[test]
    fn rejects_hole_and_kernel_stack() {
        init();
        assert!(verify_usrptr(0xA0000, 4).is_err());
        assert!(verify_usrptr(0x20000 - 8, 4).is_err());
    }

    #[test]
    fn accepts_ordinary_heap_pointer() {
        init();
        assert!(verify_usrptr(0x30000, 16).is_ok());
    }
}
