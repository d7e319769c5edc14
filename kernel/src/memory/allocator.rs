//! Paragraph-aligned, first-fit, doubly-linked free-list allocator.
//!
//! Grounded in `original_source/c/mem.c`'s `kmeminit`/`kmalloc`/`kfree`. The
//! kernel owns two disjoint free byte regions, `[freemem, HOLE_LO)` and
//! `[HOLE_HI, maxaddr)`, split by a hardware-mandated hole the allocator
//! must never hand out (spec.md §4.1). Not reentrant — the kernel is
//! single-threaded while holding the allocator lock (the lock itself exists
//! only to keep an interrupt handler from observing a torn free list, per
//! spec.md §5).

use core::ptr::NonNull;

use crate::sync::spinlock::Spinlock;

/// All allocations are rounded up to a multiple of this many bytes, and the
/// header itself occupies exactly one paragraph.
const PARAGRAPH: usize = 16;

/// Header prefixing every block, free or allocated. `sanity_check` is null
/// while free and equal to the payload address while allocated; `kfree`
/// checks it to detect double-free and wild pointers (spec.md §4.1).
#[repr(C, align(16))]
struct Header {
    size: usize,
    prev: Option<NonNull<Header>>,
    next: Option<NonNull<Header>>,
    sanity_check: usize,
}

fn header_ptr(addr: usize) -> *mut Header {
    addr as *mut Header
}

fn payload_addr(header: NonNull<Header>) -> usize {
    header.as_ptr() as usize + PARAGRAPH
}

fn round_to_paragraph(payload_len: usize) -> usize {
    let total = payload_len + PARAGRAPH;
    (total + PARAGRAPH - 1) & !(PARAGRAPH - 1)
}

struct AllocatorState {
    free_head: Option<NonNull<Header>>,
    freemem: usize,
    maxaddr: usize,
    hole_lo: usize,
    hole_hi: usize,
}

unsafe impl Send for AllocatorState {}

static STATE: Spinlock<Option<AllocatorState>> = Spinlock::new(None);

/// Establish the initial two free blocks: `[freemem, hole_lo)` and
/// `[hole_hi, maxaddr)`. Must run once before any `kmalloc`/`kfree`.
pub fn kmeminit(freemem: usize, maxaddr: usize, hole_lo: usize, hole_hi: usize) {
    unsafe {
        let low = header_ptr(freemem);
        (*low).size = hole_lo - freemem;
        (*low).prev = None;
        (*low).sanity_check = 0;

        let high = header_ptr(hole_hi);
        (*high).size = maxaddr - hole_hi;
        (*high).sanity_check = 0;

        (*low).next = NonNull::new(high);
        (*high).prev = NonNull::new(low);
        (*high).next = None;

        let mut guard = STATE.lock();
        *guard = Some(AllocatorState {
            free_head: NonNull::new(low),
            freemem,
            maxaddr,
            hole_lo,
            hole_hi,
        });
    }
    crate::serial_println!(
        "[OK] kmeminit: free=[{:#x},{:#x}) hole=[{:#x},{:#x}) free=[{:#x},{:#x})",
        freemem, hole_lo, hole_lo, hole_hi, hole_hi, maxaddr
    );
}

/// Highest valid address, used by user-pointer validation (spec.md §4.8).
pub fn kmem_maxaddr() -> usize {
    STATE.lock().as_ref().map(|s| s.maxaddr).unwrap_or(0)
}

/// Low bound of the kernel's own free region (the base of the kernel
/// stack area in the original layout), used by user-pointer validation.
pub fn kmem_freemem() -> usize {
    STATE.lock().as_ref().map(|s| s.freemem).unwrap_or(0)
}

/// First-fit allocation. Splits the tail of the chosen block if the
/// remainder is at least one header's worth of bytes. Returns null on
/// exhaustion.
pub fn kmalloc(payload_len: usize) -> *mut u8 {
    let need = round_to_paragraph(payload_len);
    let mut guard = STATE.lock();
    let state = match guard.as_mut() {
        Some(s) => s,
        None => return core::ptr::null_mut(),
    };

    let mut cursor = state.free_head;
    while let Some(mut block) = cursor {
        let block_size = unsafe { block.as_ref().size };
        if block_size >= need {
            unsafe {
                let remainder = block_size - need;
                if remainder >= PARAGRAPH {
                    // Split: shrink this block, carve a new free block off
                    // the tail and keep it in the free list in its place.
                    let tail_addr = block.as_ptr() as usize + need;
                    let tail = header_ptr(tail_addr);
                    (*tail).size = remainder;
                    (*tail).sanity_check = 0;
                    (*tail).prev = block.as_ref().prev;
                    (*tail).next = block.as_ref().next;
                    if let Some(mut p) = block.as_ref().prev {
                        p.as_mut().next = NonNull::new(tail);
                    } else {
                        state.free_head = NonNull::new(tail);
                    }
                    if let Some(mut n) = block.as_ref().next {
                        n.as_mut().prev = NonNull::new(tail);
                    }
                    block.as_mut().size = need;
                } else {
                    // Exact fit (within slack of one header): unlink whole block.
                    let prev = block.as_ref().prev;
                    let next = block.as_ref().next;
                    if let Some(mut p) = prev {
                        p.as_mut().next = next;
                    } else {
                        state.free_head = next;
                    }
                    if let Some(mut n) = next {
                        n.as_mut().prev = prev;
                    }
                }
                block.as_mut().prev = None;
                block.as_mut().next = None;
                block.as_mut().sanity_check = payload_addr(block);
                return payload_addr(block) as *mut u8;
            }
        }
        cursor = unsafe { block.as_ref().next };
    }
    core::ptr::null_mut()
}

/// Free a pointer previously returned by `kmalloc`. Inserts in address
/// order and coalesces with adjacent free neighbours. Double-free, a
/// non-allocator pointer, or a misaligned pointer are detected via the
/// sanity-check mismatch and treated as fatal (spec.md §4.1 — undefined
/// behavior for a correctly-implemented allocator to tolerate silently).
pub fn kfree(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let header_addr = ptr as usize - PARAGRAPH;
    let mut block = match NonNull::new(header_ptr(header_addr)) {
        Some(b) => b,
        None => return,
    };

    unsafe {
        if block.as_ref().sanity_check != ptr as usize {
            panic!("kfree: sanity check mismatch (double free or bad pointer)");
        }
    }

    let mut guard = STATE.lock();
    let state = match guard.as_mut() {
        Some(s) => s,
        None => return,
    };

    unsafe {
        block.as_mut().sanity_check = 0;

        // Find insertion point in address order.
        let mut prev: Option<NonNull<Header>> = None;
        let mut next = state.free_head;
        while let Some(n) = next {
            if n.as_ptr() as usize > block.as_ptr() as usize {
                break;
            }
            prev = Some(n);
            next = n.as_ref().next;
        }

        block.as_mut().prev = prev;
        block.as_mut().next = next;
        if let Some(mut p) = prev {
            p.as_mut().next = Some(block);
        } else {
            state.free_head = Some(block);
        }
        if let Some(mut n) = next {
            n.as_mut().prev = Some(block);
        }

        // Coalesce forward: if this block's end touches `next`'s start.
        if let Some(n) = block.as_ref().next {
            if block.as_ptr() as usize + block.as_ref().size == n.as_ptr() as usize {
                block.as_mut().size += n.as_ref().size;
                let n_next = n.as_ref().next;
                block.as_mut().next = n_next;
                if let Some(mut nn) = n_next {
                    nn.as_mut().prev = Some(block);
                }
            }
        }

        // Coalesce backward: if `prev`'s end touches this block's start.
        if let Some(mut p) = block.as_ref().prev {
            if p.as_ptr() as usize + p.as_ref().size == block.as_ptr() as usize {
                p.as_mut().size += block.as_ref().size;
                let b_next = block.as_ref().next;
                p.as_mut().next = b_next;
                if let Some(mut bn) = b_next {
                    bn.as_mut().prev = Some(p);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_region() -> ([u8; 4096], usize, usize, usize, usize) {
        let buf = [0u8; 4096];
        let base = buf.as_ptr() as usize;
        // No real hole inside a host-allocated test buffer; put a
        // zero-width hole at the very end so both regions are nonempty.
        (buf, base, base + 4096, base + 2048, base + 2048)
    }

    #[test]
    fn alloc_is_paragraph_aligned() {
        let (_buf, freemem, maxaddr, hole_lo, hole_hi) = fresh_region();
        kmeminit(freemem, maxaddr, hole_lo, hole_hi);
        let p = kmalloc(40);
        assert!(!p.is_null());
        assert_eq!((p as usize) % PARAGRAPH, 0);
        kfree(p);
    }

    #[test]
    fn split_and_coalesce_round_trip() {
        let (_buf, freemem, maxaddr, hole_lo, hole_hi) = fresh_region();
        kmeminit(freemem, maxaddr, hole_lo, hole_hi);
        let a = kmalloc(32);
        let b = kmalloc(32);
        assert!(!a.is_null() && !b.is_null());
        kfree(a);
        kfree(b);
        // After freeing everything back, a new request for the whole
        // first region should succeed again, proving the blocks coalesced.
        let c = kmalloc(hole_lo - freemem - PARAGRAPH - 64);
        assert!(!c.is_null());
        kfree(c);
    }
}
