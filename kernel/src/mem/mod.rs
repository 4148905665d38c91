//! Physical memory ranges and the boot-time heap plan.

#[cfg(target_os = "none")]
pub mod allocator;

use core::fmt;

use thiserror::Error;

use crate::layout::PAGE_SIZE;

/// Heap sizes must be a multiple of this; it is the slab heap's minimum.
pub const HEAP_GRANULE: usize = 8 * PAGE_SIZE;

pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Half-open physical address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysRange {
    pub start: usize,
    pub end: usize,
}

impl PhysRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn from_len(start: usize, len: usize) -> Self {
        Self::new(start, start.saturating_add(len))
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }

    pub const fn overlaps(&self, other: &PhysRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for PhysRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("heap start {addr:#x} is outside RAM {memory}")]
    OutsideMemory { addr: usize, memory: PhysRange },
    #[error("no room for a heap of at least {granule:#x} bytes after {after:#x}")]
    NoSpace { after: usize, granule: usize },
}

/// Places the heap in the first free RAM at or after `after`, skipping every
/// `reserved` range, and caps it at `limit` bytes.
pub fn plan_heap(
    memory: PhysRange,
    reserved: &[PhysRange],
    after: usize,
    limit: usize,
) -> Result<PhysRange, MemoryError> {
    let mut start = align_up(after, PAGE_SIZE);
    // each pass can only move past one more reserved range
    for _ in 0..=reserved.len() {
        match reserved.iter().find(|range| range.contains(start)) {
            Some(range) => start = align_up(range.end, PAGE_SIZE),
            None => break,
        }
    }
    if !memory.contains(start) {
        return Err(MemoryError::OutsideMemory { addr: start, memory });
    }

    let end = reserved
        .iter()
        .filter(|range| range.start > start)
        .map(|range| range.start)
        .fold(memory.end, usize::min);
    let size = align_down(end.saturating_sub(start).min(limit), HEAP_GRANULE);
    if size == 0 {
        return Err(MemoryError::NoSpace {
            after,
            granule: HEAP_GRANULE,
        });
    }
    Ok(PhysRange::from_len(start, size))
}
