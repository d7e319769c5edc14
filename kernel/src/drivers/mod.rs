//! Ambient hardware drivers that are not part of the user-facing device
//! table (spec.md §3's "Device table"). Currently just the serial port used
//! as the kernel's own diagnostic transport.

pub mod serial;
