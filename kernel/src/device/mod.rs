//! Hardware discovery.

pub mod fdt;
