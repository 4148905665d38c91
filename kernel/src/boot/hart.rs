//! Hart identity and per-hart boot state.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

use crate::layout::MAX_HARTS;

/// Identity of a hardware thread as reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HartId(usize);

impl HartId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for HartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a hart is in its boot sequence.
///
/// ```text
/// Absent -> Entered -> StackReady -> Running                        (boot hart)
/// Absent -> Entered -> StackReady -> Parked -> Released -> Running  (secondary)
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HartState {
    /// Not entered the kernel yet.
    Absent = 0,
    Entered = 1,
    StackReady = 2,
    Parked = 3,
    Released = 4,
    Running = 5,
}

impl HartState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => HartState::Entered,
            2 => HartState::StackReady,
            3 => HartState::Parked,
            4 => HartState::Released,
            5 => HartState::Running,
            _ => HartState::Absent,
        }
    }

    /// Whether `self -> to` is an edge of the boot state machine.
    pub const fn can_advance_to(self, to: HartState) -> bool {
        matches!(
            (self, to),
            (HartState::Absent, HartState::Entered)
                | (HartState::Entered, HartState::StackReady)
                | (HartState::StackReady, HartState::Running)
                | (HartState::StackReady, HartState::Parked)
                | (HartState::Parked, HartState::Released)
                | (HartState::Released, HartState::Running)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("hart {hart} is outside the {slots} reserved hart slots")]
    OutOfRange { hart: HartId, slots: usize },
    #[error("hart {hart} entered the kernel twice")]
    AlreadyEntered { hart: HartId },
    #[error("hart {hart} cannot move from {found:?} to {to:?}, expected {expected:?}")]
    BadTransition {
        hart: HartId,
        expected: HartState,
        found: HartState,
        to: HartState,
    },
}

/// Boot state of one hart. Only the hart it describes writes to it.
#[derive(Debug)]
pub struct HartSlot {
    state: AtomicU8,
}

impl HartSlot {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(HartState::Absent as u8),
        }
    }

    pub fn state(&self) -> HartState {
        HartState::from_raw(self.state.load(Ordering::Acquire))
    }
}

impl Default for HartSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// One [`HartSlot`] per reserved hart, indexed by hart id.
#[derive(Debug)]
pub struct HartTable<const N: usize> {
    slots: [HartSlot; N],
}

impl<const N: usize> HartTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { HartSlot::new() }; N],
        }
    }

    pub fn slot(&self, hart: HartId) -> Result<&HartSlot, SlotError> {
        self.slots
            .get(hart.raw())
            .ok_or(SlotError::OutOfRange { hart, slots: N })
    }

    pub fn state(&self, hart: HartId) -> Result<HartState, SlotError> {
        self.slot(hart).map(HartSlot::state)
    }

    /// Records the first entry of `hart`.
    pub fn claim(&self, hart: HartId) -> Result<(), SlotError> {
        match self.advance(hart, HartState::Absent, HartState::Entered) {
            Err(SlotError::BadTransition { .. }) => Err(SlotError::AlreadyEntered { hart }),
            other => other,
        }
    }

    /// Moves `hart` along one edge of the state machine.
    pub fn advance(&self, hart: HartId, from: HartState, to: HartState) -> Result<(), SlotError> {
        let slot = self.slot(hart)?;
        if !from.can_advance_to(to) {
            return Err(SlotError::BadTransition {
                hart,
                expected: from,
                found: slot.state(),
                to,
            });
        }
        slot.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|found| SlotError::BadTransition {
                hart,
                expected: from,
                found: HartState::from_raw(found),
                to,
            })
    }

    /// Harts currently in `state`.
    pub fn in_state(&self, state: HartState) -> HartMask {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state() == state)
            .fold(HartMask::EMPTY, |mask, (idx, _)| mask.with(HartId::new(idx)))
    }
}

impl<const N: usize> Default for HartTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of harts, one bit per hart id. This is also the SBI `hart_mask` format
/// with a base of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HartMask(usize);

impl HartMask {
    pub const EMPTY: HartMask = HartMask(0);

    pub const fn from_bits(bits: usize) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> usize {
        self.0
    }

    /// Harts `0..count`.
    pub const fn below(count: usize) -> Self {
        if count >= MAX_HARTS {
            Self(usize::MAX)
        } else {
            Self((1 << count) - 1)
        }
    }

    /// Adds `hart`; ids that do not fit the mask are dropped.
    pub const fn with(self, hart: HartId) -> Self {
        if hart.raw() < MAX_HARTS {
            Self(self.0 | 1 << hart.raw())
        } else {
            self
        }
    }

    pub const fn without(self, hart: HartId) -> Self {
        if hart.raw() < MAX_HARTS {
            Self(self.0 & !(1 << hart.raw()))
        } else {
            self
        }
    }

    pub const fn contains(self, hart: HartId) -> bool {
        hart.raw() < MAX_HARTS && self.0 & (1 << hart.raw()) != 0
    }

    pub const fn intersect(self, other: HartMask) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: HartMask) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = HartId> {
        (0..MAX_HARTS)
            .filter(move |&idx| self.0 & (1 << idx) != 0)
            .map(HartId::new)
    }
}

impl FromIterator<HartId> for HartMask {
    fn from_iter<I: IntoIterator<Item = HartId>>(iter: I) -> Self {
        iter.into_iter().fold(HartMask::EMPTY, HartMask::with)
    }
}
