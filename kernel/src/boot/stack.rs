//! Per-hart stack slots carved out of the image's stack region.
//!
//! Each reserved hart owns `region size / harts` bytes. The hart-local block
//! sits at the low end of the slot and the stack grows down from the top
//! towards it.

use super::hart::{HartId, SlotError};
use crate::layout::ImagePlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    base: usize,
    size: usize,
    harts: usize,
    tls_area: usize,
}

impl StackRegion {
    pub const fn new(base: usize, size: usize, harts: usize, tls_area: usize) -> Self {
        Self {
            base,
            size,
            harts,
            tls_area,
        }
    }

    /// The region the plan reserves, starting at `base`.
    pub const fn from_plan(base: usize, plan: &ImagePlan) -> Self {
        Self::new(base, plan.stack_region_size, plan.harts, plan.tls_area_size)
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn end(&self) -> usize {
        self.base + self.size
    }

    pub const fn harts(&self) -> usize {
        self.harts
    }

    pub const fn slot_size(&self) -> usize {
        if self.harts == 0 { 0 } else { self.size / self.harts }
    }

    pub fn slot(&self, hart: HartId) -> Result<StackSlot, SlotError> {
        if hart.raw() >= self.harts {
            return Err(SlotError::OutOfRange {
                hart,
                slots: self.harts,
            });
        }
        let size = self.slot_size();
        Ok(StackSlot {
            hart,
            base: self.base + hart.raw() * size,
            size,
            tls_area: self.tls_area,
        })
    }

    pub fn slots(&self) -> impl Iterator<Item = StackSlot> + '_ {
        (0..self.harts).filter_map(|idx| self.slot(HartId::new(idx)).ok())
    }
}

/// The slot owned by a single hart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    hart: HartId,
    base: usize,
    size: usize,
    tls_area: usize,
}

impl StackSlot {
    pub const fn hart(&self) -> HartId {
        self.hart
    }

    /// Lowest address of the slot.
    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    /// Initial stack pointer, one past the highest byte of the slot.
    pub const fn top(&self) -> usize {
        self.base + self.size
    }

    /// Start of the hart-local block; this is the thread pointer value.
    pub const fn tls_base(&self) -> usize {
        self.base
    }

    pub const fn tls_len(&self) -> usize {
        self.tls_area
    }

    /// Lowest address the stack may grow down to.
    pub const fn stack_limit(&self) -> usize {
        self.base + self.tls_area
    }

    pub const fn contains(&self, addr: usize) -> bool {
        self.base <= addr && addr < self.top()
    }

    pub const fn overlaps(&self, other: &StackSlot) -> bool {
        self.base < other.top() && other.base < self.top()
    }
}
