//! Single-shot release barrier between the boot hart and its secondaries.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use thiserror::Error;

use super::hart::HartId;

const UNARMED: u8 = 0;
const ARMED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BarrierError {
    #[error("hart {caller} tried to arm the barrier owned by boot hart {boot}")]
    NotBootHart { caller: HartId, boot: HartId },
    #[error("the barrier is already armed")]
    AlreadyArmed,
}

/// How a parked hart passes time until the barrier may have changed.
pub trait EventWait {
    /// Blocks until some event arrives or returns early. Spurious returns are
    /// fine since waiters re-check the barrier.
    fn wait(&self);
}

/// Busy-waits with a spin hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinWait;

impl EventWait for SpinWait {
    fn wait(&self) {
        core::hint::spin_loop();
    }
}

/// Armed exactly once by the boot hart after kernel initialization. Arming is
/// a release store and waiting ends with an acquire load, so everything the
/// boot hart wrote before arming is visible to a released hart.
#[derive(Debug)]
pub struct HartBarrier {
    boot_hart: HartId,
    state: AtomicU8,
    observed: AtomicUsize,
}

impl HartBarrier {
    pub const fn new(boot_hart: HartId) -> Self {
        Self {
            boot_hart,
            state: AtomicU8::new(UNARMED),
            observed: AtomicUsize::new(0),
        }
    }

    pub fn boot_hart(&self) -> HartId {
        self.boot_hart
    }

    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::Acquire) == ARMED
    }

    /// Number of harts that have reached [`HartBarrier::wait_for_release`].
    pub fn observed(&self) -> usize {
        self.observed.load(Ordering::Acquire)
    }

    pub fn arm(&self, caller: HartId) -> Result<(), BarrierError> {
        if caller != self.boot_hart {
            return Err(BarrierError::NotBootHart {
                caller,
                boot: self.boot_hart,
            });
        }
        self.state
            .compare_exchange(UNARMED, ARMED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BarrierError::AlreadyArmed)
    }

    /// Parks the caller until the barrier is armed.
    pub fn wait_for_release<W: EventWait + ?Sized>(&self, waiter: &W) {
        self.observed.fetch_add(1, Ordering::AcqRel);
        while !self.is_armed() {
            waiter.wait();
        }
    }
}
