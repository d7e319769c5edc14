//! Architecture-specific modules.
//!
//! Platform-agnostic code should use `arch::hal::*` instead of directly
//! referencing `arch::x86::*`. There is only one supported architecture
//! (i686 protected mode); the HAL indirection is kept anyway because it is
//! where the boundary described in spec.md §2 ("Low-level HAL boundary,
//! external") actually lives in the source tree.

pub mod hal;
pub mod x86;
