//! Early console for riscv64: the SBI legacy console.

use super::instruction::sbi::sbi_console_putchar;

pub fn early_putc(c: u8) {
    sbi_console_putchar(c);
}
