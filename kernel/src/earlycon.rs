//! Early console.
//!
//! Writes straight to the firmware console. Usable from the first Rust
//! instruction, before the logger is installed, and from the panic handler.

use core::fmt::Write;

use crate::arch::early_putc;
use crate::traits::console::Console;

#[macro_export]
macro_rules! early_print {
    ($($arg:tt)*) => ($crate::earlycon::print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! early_println {
    ($fmt:expr) => ($crate::early_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::early_print!(concat!($fmt, "\n"), $($arg)*));
}

pub fn print(args: core::fmt::Arguments) {
    let _ = EarlyConsole.write_fmt(args);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EarlyConsole;

impl Console for EarlyConsole {
    fn put_byte(&self, byte: u8) {
        early_putc(byte);
    }
}

impl Write for EarlyConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}
