//! Build-time plan of the kernel image.
//!
//! This file is compiled twice: into the kernel as `layout::plan`, and into
//! `build.rs`, which validates the plan and renders the linker script from it.
//! It may only depend on `core` and `thiserror`.

use core::fmt;

use thiserror::Error;

/// Page granularity of the platform (4 KiB).
pub const PAGE_SIZE: usize = 0x1000;

/// Distance of `__global_pointer$` past the start of `.data`.
///
/// `gp`-relative loads and stores take a signed 12-bit offset, so a pointer
/// 2 KiB into the region reaches the first 4 KiB of initialized data.
pub const GLOBAL_POINTER_OFFSET: usize = 0x800;

/// Harts are tracked in a single machine word bitmap.
pub const MAX_HARTS: usize = usize::BITS as usize;

/// Symbol the firmware jumps to.
pub const ENTRY_SYMBOL: &str = "_entry";

/// Symbol holding the value loaded into `gp`.
pub const GLOBAL_POINTER_SYMBOL: &str = "__global_pointer$";

/// Every region of the image, in link order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Text,
    Rodata,
    Data,
    Tls,
    Bss,
    Stack,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Text,
        Section::Rodata,
        Section::Data,
        Section::Tls,
        Section::Bss,
        Section::Stack,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Section::Text => "text",
            Section::Rodata => "rodata",
            Section::Data => "data",
            Section::Tls => "tls",
            Section::Bss => "bss",
            Section::Stack => "stack",
        }
    }

    pub const fn start_symbol(self) -> &'static str {
        match self {
            Section::Text => "__text_start",
            Section::Rodata => "__rodata_start",
            Section::Data => "__data_start",
            Section::Tls => "__tls_start",
            Section::Bss => "__bss_start",
            Section::Stack => "__stack_start",
        }
    }

    pub const fn end_symbol(self) -> &'static str {
        match self {
            Section::Text => "__text_end",
            Section::Rodata => "__rodata_end",
            Section::Data => "__data_end",
            Section::Tls => "__tls_end",
            Section::Bss => "__bss_end",
            Section::Stack => "__stack_end",
        }
    }
}

/// Reasons a plan cannot produce a bootable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("at least one hart must be reserved")]
    NoHarts,
    #[error("{harts} harts requested, at most {max} are supported")]
    TooManyHarts { harts: usize, max: usize },
    #[error("image base {base:#x} is not page aligned")]
    MisalignedBase { base: usize },
    #[error("image base {base:#x} lies outside memory {start:#x}..{end:#x}")]
    BaseOutsideMemory { base: usize, start: usize, end: usize },
    #[error("stack region of {size:#x} bytes cannot be split evenly across {harts} harts")]
    StackNotDivisible { size: usize, harts: usize },
    #[error("per-hart stack of {size:#x} bytes is not a non-zero multiple of the page size")]
    UnalignedHartStack { size: usize },
    #[error("thread-local area of {size:#x} bytes is not page aligned")]
    UnalignedTlsArea { size: usize },
    #[error("thread-local area of {tls:#x} bytes leaves no room in a {slot:#x} byte hart slot")]
    TlsAreaTooLarge { tls: usize, slot: usize },
    #[error("stack region of {required:#x} bytes does not fit the {window:#x} byte load window")]
    WindowTooSmall { required: usize, window: usize },
}

/// Everything the image layout is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePlan {
    /// Start of physical memory.
    pub memory_base: usize,
    /// Size of physical memory the image may be loaded into.
    pub memory_size: usize,
    /// Fixed load address the firmware jumps to.
    pub image_base: usize,
    /// Number of reserved hart slots.
    pub harts: usize,
    /// Size of the whole stack region, split evenly across harts.
    pub stack_region_size: usize,
    /// Bytes at the low end of every hart slot reserved for thread-local data.
    pub tls_area_size: usize,
    /// Upper bound for the kernel heap planned at boot.
    pub heap_size: usize,
}

impl ImagePlan {
    /// QEMU `virt` with 128 MiB of memory, 4 harts and OpenSBI in the first 2 MiB.
    pub const DEFAULT: ImagePlan = ImagePlan {
        memory_base: 0x8000_0000,
        memory_size: 0x800_0000,
        image_base: 0x8020_0000,
        harts: 4,
        stack_region_size: 0x8_0000,
        tls_area_size: PAGE_SIZE,
        heap_size: 0x80_0000,
    };

    pub const fn hart_stack_size(&self) -> usize {
        if self.harts == 0 {
            0
        } else {
            self.stack_region_size / self.harts
        }
    }

    pub const fn memory_end(&self) -> usize {
        self.memory_base.saturating_add(self.memory_size)
    }

    /// Bytes available to the image from its base to the end of memory.
    pub const fn window(&self) -> usize {
        self.memory_end().saturating_sub(self.image_base)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.harts == 0 {
            return Err(PlanError::NoHarts);
        }
        if self.harts > MAX_HARTS {
            return Err(PlanError::TooManyHarts {
                harts: self.harts,
                max: MAX_HARTS,
            });
        }
        if self.image_base % PAGE_SIZE != 0 {
            return Err(PlanError::MisalignedBase {
                base: self.image_base,
            });
        }
        if self.image_base < self.memory_base || self.image_base >= self.memory_end() {
            return Err(PlanError::BaseOutsideMemory {
                base: self.image_base,
                start: self.memory_base,
                end: self.memory_end(),
            });
        }
        if self.stack_region_size % self.harts != 0 {
            return Err(PlanError::StackNotDivisible {
                size: self.stack_region_size,
                harts: self.harts,
            });
        }
        let slot = self.hart_stack_size();
        if slot == 0 || slot % PAGE_SIZE != 0 {
            return Err(PlanError::UnalignedHartStack { size: slot });
        }
        if self.tls_area_size % PAGE_SIZE != 0 {
            return Err(PlanError::UnalignedTlsArea {
                size: self.tls_area_size,
            });
        }
        if self.tls_area_size >= slot {
            return Err(PlanError::TlsAreaTooLarge {
                tls: self.tls_area_size,
                slot,
            });
        }
        if self.stack_region_size >= self.window() {
            return Err(PlanError::WindowTooSmall {
                required: self.stack_region_size,
                window: self.window(),
            });
        }
        Ok(())
    }
}

/// Renders the linker script for a plan.
pub struct LinkerScript<'a>(pub &'a ImagePlan);

impl LinkerScript<'_> {
    fn region(
        f: &mut fmt::Formatter<'_>,
        section: Section,
        noload: bool,
        body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
    ) -> fmt::Result {
        let kind = if noload { " (NOLOAD)" } else { "" };
        writeln!(f, "    .{}{} : ALIGN({:#x}) {{", section.name(), kind, PAGE_SIZE)?;
        writeln!(f, "        {} = .;", section.start_symbol())?;
        body(f)?;
        writeln!(f, "        . = ALIGN({:#x});", PAGE_SIZE)?;
        writeln!(f, "        {} = .;", section.end_symbol())?;
        writeln!(f, "    }} > RAM")?;
        writeln!(f)
    }

    fn inputs(f: &mut fmt::Formatter<'_>, patterns: &[&str]) -> fmt::Result {
        patterns
            .iter()
            .try_for_each(|pattern| writeln!(f, "        {}", pattern))
    }
}

impl fmt::Display for LinkerScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.0;

        writeln!(f, "/* Generated by build.rs, do not edit. */")?;
        writeln!(f, "OUTPUT_ARCH(riscv)")?;
        writeln!(f, "ENTRY({})", ENTRY_SYMBOL)?;
        writeln!(f, "EXTERN({})", ENTRY_SYMBOL)?;
        writeln!(f)?;
        writeln!(f, "MEMORY")?;
        writeln!(f, "{{")?;
        writeln!(
            f,
            "    RAM (rwx) : ORIGIN = {:#x}, LENGTH = {:#x}",
            plan.image_base,
            plan.window()
        )?;
        writeln!(f, "}}")?;
        writeln!(f)?;
        writeln!(f, "SECTIONS")?;
        writeln!(f, "{{")?;
        writeln!(f, "    . = {:#x};", plan.image_base)?;
        writeln!(f, "    __kernel_start = .;")?;
        writeln!(f)?;

        Self::region(f, Section::Text, false, |f| {
            Self::inputs(f, &["KEEP(*(.text.entry))", "*(.text .text.*)"])
        })?;
        Self::region(f, Section::Rodata, false, |f| {
            Self::inputs(f, &["*(.srodata .srodata.*)", "*(.rodata .rodata.*)"])
        })?;
        Self::region(f, Section::Data, false, |f| {
            writeln!(
                f,
                "        {} = . + {:#x};",
                GLOBAL_POINTER_SYMBOL, GLOBAL_POINTER_OFFSET
            )?;
            Self::inputs(
                f,
                &["*(.sdata .sdata.*)", "*(.data .data.*)", "*(.got .got.*)"],
            )
        })?;

        // .tbss does not advance the location counter, so the region end is
        // taken from whichever thread-local section reaches further.
        let tls = Section::Tls;
        writeln!(f, "    .tdata : ALIGN({:#x}) {{", PAGE_SIZE)?;
        writeln!(f, "        {} = .;", tls.start_symbol())?;
        writeln!(f, "        *(.tdata .tdata.*)")?;
        writeln!(f, "        __tdata_end = .;")?;
        writeln!(f, "    }} > RAM")?;
        writeln!(f)?;
        writeln!(f, "    .tbss : {{")?;
        writeln!(f, "        __tbss_start = .;")?;
        writeln!(f, "        *(.tbss .tbss.*)")?;
        writeln!(f, "        *(.tcommon)")?;
        writeln!(f, "        __tbss_end = .;")?;
        writeln!(f, "    }} > RAM")?;
        writeln!(
            f,
            "    {} = ALIGN(MAX(__tdata_end, __tbss_end), {:#x});",
            tls.end_symbol(),
            PAGE_SIZE
        )?;
        writeln!(f, "    . = {};", tls.end_symbol())?;
        writeln!(f)?;

        Self::region(f, Section::Bss, true, |f| {
            Self::inputs(f, &["*(.sbss .sbss.*)", "*(.bss .bss.*)", "*(COMMON)"])
        })?;
        Self::region(f, Section::Stack, true, |f| {
            writeln!(f, "        . += {:#x};", plan.stack_region_size)
        })?;

        writeln!(f, "    __kernel_end = .;")?;
        writeln!(f)?;
        writeln!(f, "    /DISCARD/ : {{")?;
        writeln!(f, "        *(.eh_frame .eh_frame.* .eh_frame_hdr)")?;
        writeln!(f, "        *(.debug .debug.* .debug_*)")?;
        writeln!(f, "        *(.comment .comment.*)")?;
        writeln!(f, "        *(.note .note.*)")?;
        writeln!(f, "    }}")?;
        writeln!(f, "}}")?;
        writeln!(f)?;

        writeln!(
            f,
            "ASSERT({} == {} + {:#x}, \"global pointer must sit {:#x} past the start of .data\");",
            GLOBAL_POINTER_SYMBOL,
            Section::Data.start_symbol(),
            GLOBAL_POINTER_OFFSET,
            GLOBAL_POINTER_OFFSET
        )?;
        writeln!(
            f,
            "ASSERT(__tbss_end - {} <= {:#x}, \"thread-local data does not fit the per-hart TLS area\");",
            tls.start_symbol(),
            plan.tls_area_size
        )?;
        writeln!(
            f,
            "ASSERT({} - {} == {:#x}, \"stack region size changed\");",
            Section::Stack.end_symbol(),
            Section::Stack.start_symbol(),
            plan.stack_region_size
        )?;
        writeln!(
            f,
            "ASSERT(__kernel_end - __kernel_start <= {:#x}, \"kernel image exceeds the loadable memory window\");",
            plan.window()
        )
    }
}
