//! Architecture-specific code for the Ember kernel.
//!
//! Only the riscv64 bare-metal port exists. Everything else in the crate is
//! architecture-neutral and builds on the host for tests.

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod riscv64;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub use riscv64::*;
