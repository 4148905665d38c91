//! Ember kernel image.
//!
//! The library provides `_entry`, the panic handler and the global allocator;
//! the generated linker script keeps `_entry` as the first byte of `.text`.

#![no_std]
#![no_main]

use ember as _;
