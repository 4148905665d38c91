//! Per-hart copies of the thread-local data region.

use super::image::LayoutError;

/// Initialization image for a hart's thread-local block: the `.tdata`
/// contents followed by `size - init.len()` zero bytes of `.tbss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsTemplate<'a> {
    init: &'a [u8],
    size: usize,
}

impl<'a> TlsTemplate<'a> {
    pub const EMPTY: TlsTemplate<'static> = TlsTemplate { init: &[], size: 0 };

    /// `size` covers the whole block, `.tbss` included.
    pub fn new(init: &'a [u8], size: usize) -> Result<Self, LayoutError> {
        if size < init.len() {
            return Err(LayoutError::TlsTooLarge {
                size: init.len(),
                area: size,
            });
        }
        Ok(Self { init, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Writes a fresh copy of the template to the start of `block`.
    pub fn install(&self, block: &mut [u8]) -> Result<(), LayoutError> {
        if block.len() < self.size {
            return Err(LayoutError::TlsTooLarge {
                size: self.size,
                area: block.len(),
            });
        }
        let (init, zeroed) = block[..self.size].split_at_mut(self.init.len());
        init.copy_from_slice(self.init);
        zeroed.fill(0);
        Ok(())
    }
}
