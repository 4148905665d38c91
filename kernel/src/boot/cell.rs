use spin::Once;
use thiserror::Error;

use super::barrier::HartBarrier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("boot value already published")]
pub struct AlreadyPublished;

/// A value the boot hart fills in during initialization and every hart reads
/// once the barrier has released it.
///
/// The first publish wins; later ones are refused so released harts never see
/// the value change under them.
pub struct BootCell<T> {
    value: Once<T>,
}

impl<T> BootCell<T> {
    pub const fn new() -> Self {
        Self { value: Once::new() }
    }

    /// Stores `value` unless something was published before.
    pub fn publish(&self, value: T) -> Result<(), AlreadyPublished> {
        let mut stored = false;
        self.value.call_once(|| {
            stored = true;
            value
        });
        if stored { Ok(()) } else { Err(AlreadyPublished) }
    }

    /// The published value, once `barrier` has been armed.
    pub fn get(&self, barrier: &HartBarrier) -> Option<&T> {
        if !barrier.is_armed() {
            return None;
        }
        self.value.get()
    }

    pub fn is_published(&self) -> bool {
        self.value.is_completed()
    }
}

impl<T> Default for BootCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
