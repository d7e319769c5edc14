//! Kernel memory management: the paragraph-aligned free-list allocator
//! (spec.md §4.1) that backs process stack allocation. Every other kernel
//! structure (the PCB table, queues, the sleep list, device state) is a
//! fixed-size array or an intrusive list over it, so this allocator is
//! reached directly via `kmalloc`/`kfree` rather than through a
//! `#[global_allocator]`/`alloc::Vec`/`Box` indirection.

pub mod allocator;

pub use allocator::{kmem_freemem, kmem_maxaddr, kmeminit};
