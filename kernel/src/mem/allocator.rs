use log::info;
use slab_allocator_rs::LockedHeap;

use super::PhysRange;

#[global_allocator]
pub static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hands `range` to the global allocator.
///
/// # Safety
///
/// `range` must be unused RAM, page aligned and a multiple of
/// [`super::HEAP_GRANULE`] long. Called once, by the boot hart, before any
/// allocation.
pub unsafe fn init_heap(range: PhysRange) {
    unsafe {
        ALLOCATOR.init(range.start, range.len());
    }
    info!("heap: {range} ({} KiB)", range.len() / 1024);
}
