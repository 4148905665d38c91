//! Multi-hart boot handoff.
//!
//! The firmware jumps to `_entry` once per hart, all of them concurrently. The
//! assembly entry gives each hart its own stack, then [`sequencer::Sequencer`]
//! decides which hart initializes the kernel and parks the rest on
//! [`barrier::HartBarrier`] until that is done.
//!
//! The statics in this module are shared before `.bss` is cleared, so they are
//! linked into `.data.boot` on the target.

pub mod barrier;
pub mod cell;
pub mod hart;
pub mod sequencer;
pub mod stack;

use thiserror::Error;

pub use barrier::{BarrierError, EventWait, HartBarrier, SpinWait};
pub use cell::{AlreadyPublished, BootCell};
pub use hart::{HartId, HartMask, HartState, HartTable, SlotError};
pub use sequencer::{BootHooks, HartContext, Platform, Role, Sequencer};
pub use stack::{StackRegion, StackSlot};

use crate::environment::{BOOT_HART_ID, NUM_OF_HARTS};
use crate::kinit::{InitError, SystemInfo};
use crate::layout::LayoutError;

/// What the firmware hands every hart: `a0` and `a1` at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootArgs {
    pub hart: HartId,
    /// Physical address of the flattened device tree.
    pub dtb: usize,
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Barrier(#[from] BarrierError),
    #[error("thread-local storage: {0}")]
    Layout(#[from] LayoutError),
    #[error("kernel initialization failed: {0}")]
    Init(#[from] InitError),
}

#[cfg_attr(target_os = "none", unsafe(link_section = ".data.boot"))]
pub static HARTS: HartTable<NUM_OF_HARTS> = HartTable::new();

#[cfg_attr(target_os = "none", unsafe(link_section = ".data.boot"))]
pub static BARRIER: HartBarrier = HartBarrier::new(HartId::new(BOOT_HART_ID));

/// Machine description published by the boot hart.
#[cfg_attr(target_os = "none", unsafe(link_section = ".data.boot"))]
pub static SYSTEM: BootCell<SystemInfo<'static>> = BootCell::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_errors_name_thread_local_storage() {
        let err = BootError::from(LayoutError::TlsTooLarge {
            size: 0x2000,
            area: 0x1000,
        });
        assert_eq!(
            err.to_string(),
            "thread-local storage: thread-local data of 0x2000 bytes does not fit a 0x1000 byte block"
        );
    }
}
