pub mod boot;
pub mod csr;
pub mod earlycon;
pub mod instruction;
pub mod platform;
pub mod symbols;

pub use earlycon::*;
