//! Runtime view of the image, built from the linker's boundary symbols.

use thiserror::Error;

use super::plan::{GLOBAL_POINTER_OFFSET, ImagePlan, PAGE_SIZE, Section};

/// One contiguous region of the loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRegion {
    pub section: Section,
    pub start: usize,
    pub end: usize,
    pub align: usize,
}

impl SectionRegion {
    /// A page-aligned region.
    pub const fn new(section: Section, start: usize, end: usize) -> Self {
        Self {
            section,
            start,
            end,
            align: PAGE_SIZE,
        }
    }

    pub const fn size(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// Ways the linked image can disagree with its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("expected the {expected:?} region at this position, found {found:?}")]
    OutOfOrder { expected: Section, found: Section },
    #[error("{section:?} region {start:#x}..{end:#x} ends before it starts")]
    Inverted {
        section: Section,
        start: usize,
        end: usize,
    },
    #[error("{section:?} region boundary {addr:#x} is not aligned to {align:#x}")]
    Misaligned {
        section: Section,
        addr: usize,
        align: usize,
    },
    #[error("{previous:?} ends at {end:#x} but {next:?} starts at {start:#x}")]
    NotContiguous {
        previous: Section,
        end: usize,
        next: Section,
        start: usize,
    },
    #[error("image starts at {found:#x}, expected {expected:#x}")]
    WrongBase { expected: usize, found: usize },
    #[error("stack region is {found:#x} bytes, expected {expected:#x}")]
    StackSize { expected: usize, found: usize },
    #[error("global pointer is {found:#x}, expected {expected:#x}")]
    GlobalPointer { expected: usize, found: usize },
    #[error("image of {size:#x} bytes exceeds the {window:#x} byte load window")]
    TooLarge { size: usize, window: usize },
    #[error("thread-local data of {size:#x} bytes does not fit a {area:#x} byte block")]
    TlsTooLarge { size: usize, area: usize },
}

/// All regions of the image plus the global pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    regions: [SectionRegion; Section::ALL.len()],
    global_pointer: usize,
}

impl ImageLayout {
    pub const fn new(regions: [SectionRegion; Section::ALL.len()], global_pointer: usize) -> Self {
        Self {
            regions,
            global_pointer,
        }
    }

    pub fn region(&self, section: Section) -> &SectionRegion {
        &self.regions[section as usize]
    }

    pub fn regions(&self) -> &[SectionRegion] {
        &self.regions
    }

    pub fn global_pointer(&self) -> usize {
        self.global_pointer
    }

    pub fn start(&self) -> usize {
        self.regions[0].start
    }

    pub fn end(&self) -> usize {
        self.regions[self.regions.len() - 1].end
    }

    /// Bytes of memory the image occupies once loaded, stacks included.
    pub fn footprint(&self) -> usize {
        self.end().saturating_sub(self.start())
    }

    /// Checks the linked image against the plan it was built from.
    pub fn validate(&self, plan: &ImagePlan) -> Result<(), LayoutError> {
        for (region, expected) in self.regions.iter().zip(Section::ALL) {
            if region.section != expected {
                return Err(LayoutError::OutOfOrder {
                    expected,
                    found: region.section,
                });
            }
            if region.end < region.start {
                return Err(LayoutError::Inverted {
                    section: region.section,
                    start: region.start,
                    end: region.end,
                });
            }
            if let Some(addr) = [region.start, region.end]
                .into_iter()
                .find(|addr| addr % region.align != 0)
            {
                return Err(LayoutError::Misaligned {
                    section: region.section,
                    addr,
                    align: region.align,
                });
            }
        }

        if let Some(pair) = self
            .regions
            .windows(2)
            .find(|pair| pair[0].end != pair[1].start)
        {
            return Err(LayoutError::NotContiguous {
                previous: pair[0].section,
                end: pair[0].end,
                next: pair[1].section,
                start: pair[1].start,
            });
        }

        if self.start() != plan.image_base {
            return Err(LayoutError::WrongBase {
                expected: plan.image_base,
                found: self.start(),
            });
        }

        let stack = self.region(Section::Stack);
        if stack.size() != plan.stack_region_size {
            return Err(LayoutError::StackSize {
                expected: plan.stack_region_size,
                found: stack.size(),
            });
        }

        let tls = self.region(Section::Tls);
        if tls.size() > plan.tls_area_size {
            return Err(LayoutError::TlsTooLarge {
                size: tls.size(),
                area: plan.tls_area_size,
            });
        }

        let expected = self.region(Section::Data).start + GLOBAL_POINTER_OFFSET;
        if self.global_pointer != expected {
            return Err(LayoutError::GlobalPointer {
                expected,
                found: self.global_pointer,
            });
        }

        if self.footprint() > plan.window() {
            return Err(LayoutError::TooLarge {
                size: self.footprint(),
                window: plan.window(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays regions of the given sizes back to back from the plan's base.
    fn contiguous(plan: &ImagePlan, sizes: [usize; 6]) -> ImageLayout {
        let mut cursor = plan.image_base;
        let regions = core::array::from_fn(|idx| {
            let start = cursor;
            cursor += sizes[idx];
            SectionRegion::new(Section::ALL[idx], start, cursor)
        });
        let data_start = plan.image_base + sizes[0] + sizes[1];
        ImageLayout::new(regions, data_start + GLOBAL_POINTER_OFFSET)
    }

    fn typical_sizes() -> [usize; 6] {
        [0x4000, 0x2000, 0x1000, 0x1000, 0x3000, 0x8_0000]
    }

    #[test]
    fn test_valid_layout() {
        let plan = ImagePlan::DEFAULT;
        let layout = contiguous(&plan, typical_sizes());
        assert_eq!(layout.validate(&plan), Ok(()));
        assert_eq!(layout.start(), 0x8020_0000);
        assert_eq!(layout.footprint(), 0x8_b000);
        assert!(layout.region(Section::Stack).contains(layout.end() - 1));
        assert!(!layout.region(Section::Stack).contains(layout.end()));
    }

    #[test]
    fn test_global_pointer_must_match_data() {
        let plan = ImagePlan::DEFAULT;
        let good = contiguous(&plan, typical_sizes());
        let layout = ImageLayout::new(good.regions, good.global_pointer() + 8);
        assert!(matches!(
            layout.validate(&plan),
            Err(LayoutError::GlobalPointer { .. })
        ));
    }

    #[test]
    fn test_gap_between_regions_is_rejected() {
        let plan = ImagePlan::DEFAULT;
        let mut layout = contiguous(&plan, typical_sizes());
        layout.regions[1].end += PAGE_SIZE;
        assert_eq!(
            layout.validate(&plan),
            Err(LayoutError::NotContiguous {
                previous: Section::Rodata,
                end: layout.regions[1].end,
                next: Section::Data,
                start: layout.regions[2].start,
            })
        );
    }

    #[test]
    fn test_misaligned_boundary_is_rejected() {
        let plan = ImagePlan::DEFAULT;
        let mut sizes = typical_sizes();
        sizes[0] = 0x4010;
        let layout = contiguous(&plan, sizes);
        assert!(matches!(
            layout.validate(&plan),
            Err(LayoutError::Misaligned {
                section: Section::Text,
                ..
            })
        ));
    }

    #[test]
    fn test_stack_size_is_fixed() {
        let plan = ImagePlan::DEFAULT;
        let mut sizes = typical_sizes();
        sizes[5] = 0x4_0000;
        let layout = contiguous(&plan, sizes);
        assert_eq!(
            layout.validate(&plan),
            Err(LayoutError::StackSize {
                expected: 0x8_0000,
                found: 0x4_0000
            })
        );
    }

    #[test]
    fn test_image_must_fit_window() {
        let plan = ImagePlan {
            memory_size: 0x30_0000,
            ..ImagePlan::DEFAULT
        };
        let mut sizes = typical_sizes();
        sizes[4] = 0x10_0000;
        let layout = contiguous(&plan, sizes);
        assert!(matches!(
            layout.validate(&plan),
            Err(LayoutError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_regions_out_of_order() {
        let plan = ImagePlan::DEFAULT;
        let mut layout = contiguous(&plan, typical_sizes());
        layout.regions.swap(3, 4);
        assert!(matches!(
            layout.validate(&plan),
            Err(LayoutError::OutOfOrder {
                expected: Section::Tls,
                found: Section::Bss
            })
        ));
    }
}
