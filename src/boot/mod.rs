//! Boot sequence (SPEC_FULL §4.11, §6 "Boot").
//!
//! [`args`] and [`multiboot`] are thin, ambient surfaces: the multiboot info structure
//! handed over by the bootloader, and the `-live`/`-silent`/`-root=` command-line tokens
//! carried inside it, consumed exactly once at boot into a [`args::BootConfig`].
//! [`kmain`] is the actual wiring: it consumes both to bring every other subsystem up in
//! dependency order and hand off to pid 1.

pub mod args;
pub mod kmain;
pub mod multiboot;
