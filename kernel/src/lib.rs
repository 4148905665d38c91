//! # Ember Kernel
//!
//! Ember is the boot handoff of a multi-hart RISC-V kernel: the part that
//! runs between the SBI firmware jumping to the image and every hart reaching
//! steady state.
//!
//! ## Boot Process
//!
//! The firmware starts each hart at `_entry` with `a0 = hart id` and
//! `a1 = device tree`, possibly all at once and in any order.
//!
//! 1. `_entry` loads the global pointer, masks interrupts and switches to the
//!    hart's own stack slot.
//! 2. The hart claims its slot and installs its thread-local block.
//! 3. Hart 0 clears `.bss`, installs the logger, checks the image layout,
//!    reads the device tree, sets up the heap and publishes a [`kinit::SystemInfo`].
//! 4. Hart 0 arms the release barrier and wakes the others, which have been
//!    parked in `wfi` since step 2.
//!
//! ## Development Notes
//!
//! Everything except the riscv64 port is plain `no_std` Rust and is tested on
//! the host with `cargo test`. The kernel binary is built with
//! `cargo build --features image --target riscv64gc-unknown-none-elf`.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod boot;
pub mod device;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod earlycon;
pub mod environment;
pub mod firmware;
pub mod kinit;
pub mod layout;
pub mod logger;
pub mod mem;
pub mod traits;

#[cfg(all(target_arch = "riscv64", target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    early_println!("[ember] panic: {}", info);
    arch::instruction::idle()
}
