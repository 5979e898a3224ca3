//! Ambient logging façade (SPEC_FULL §2a).
//!
//! Wires the `log` crate to the VGA console so the rest of the kernel calls
//! `log::info!`/`log::warn!`/`log::error!` instead of a bespoke `kprintf`-style macro,
//! matching the logging approach surveyed in `doublegate-VeridianOS`'s Cargo.toml for a
//! comparable `no_std` kernel (the teacher itself centralizes no logging facility).

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::drivers::console::{Color, CONSOLE};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let color = match record.level() {
            Level::Error => Color::Red,
            Level::Warn => Color::White,
            _ => Color::Green,
        };
        let mut console = CONSOLE.lock();
        console.set_color(color);
        let _ = core::fmt::Write::write_fmt(
            &mut *console,
            format_args!("[{}] {}\n", record.level(), record.args()),
        );
        console.set_color(Color::LightGrey);
    }

    fn flush(&self) {}
}

/// Installs the global logger; must run once, before any `log::` macro is used.
pub fn init(filter: LevelFilter) {
    log::set_logger(&LOGGER).expect("logger already installed");
    log::set_max_level(filter);
}
