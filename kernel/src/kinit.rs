//! Kernel initialization run by the boot hart before secondaries are released.

use fdt::Fdt;
use thiserror::Error;

use crate::boot::{AlreadyPublished, HartMask};
use crate::device::fdt::{DeviceInfo, DeviceTreeError};
use crate::layout::{ImageLayout, ImagePlan, LayoutError};
use crate::mem::{self, MemoryError, PhysRange};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("image layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("device tree: {0}")]
    DeviceTree(#[from] DeviceTreeError),
    #[error("memory: {0}")]
    Memory(#[from] MemoryError),
    #[error("a logger is already installed")]
    Logger,
    #[error("system information: {0}")]
    Publish(#[from] AlreadyPublished),
}

/// Machine description published to every hart at release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo<'a> {
    pub harts: HartMask,
    /// Enabled harts with an id too large to track.
    pub untracked_harts: usize,
    pub memory: PhysRange,
    pub image: PhysRange,
    pub dtb: PhysRange,
    pub heap: PhysRange,
    pub bootargs: Option<&'a str>,
}

/// Checks the linked image and derives the machine description from the
/// device tree. RAM below the image belongs to the firmware.
pub fn discover<'a>(
    plan: &ImagePlan,
    layout: &ImageLayout,
    fdt: &Fdt<'a>,
    dtb_addr: usize,
) -> Result<SystemInfo<'a>, InitError> {
    layout.validate(plan)?;
    let devices = DeviceInfo::from_fdt(fdt, dtb_addr)?;

    let image = PhysRange::new(layout.start(), layout.end());
    let firmware = PhysRange::new(devices.memory.start, image.start);
    let heap = mem::plan_heap(
        devices.memory,
        &[firmware, image, devices.dtb],
        image.end,
        plan.heap_size,
    )?;

    Ok(SystemInfo {
        harts: devices.harts,
        untracked_harts: devices.untracked_harts,
        memory: devices.memory,
        image,
        dtb: devices.dtb,
        heap,
        bootargs: devices.bootargs,
    })
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod machine {
    use fdt::Fdt;
    use log::{debug, info, warn};

    use super::{InitError, discover};
    use crate::arch::instruction::{idle, sbi};
    use crate::arch::platform::RiscvPlatform;
    use crate::arch::symbols;
    use crate::boot::{
        BARRIER, BootArgs, BootError, BootHooks, HARTS, HartContext, HartId, HartMask, SYSTEM,
        Sequencer,
    };
    use crate::device::fdt::DeviceTreeError;
    use crate::earlycon::EarlyConsole;
    use crate::environment::{IMAGE_PLAN, LOG_LEVEL};
    use crate::layout::MAX_HARTS;
    use crate::firmware::{ResetReason, ResetType};
    use crate::logger::{self, KernelLogger};
    use crate::mem::allocator;
    use crate::early_println;

    #[unsafe(link_section = ".data.boot")]
    static LOGGER: KernelLogger<EarlyConsole> = KernelLogger::new(EarlyConsole, LOG_LEVEL);

    struct KernelInit;

    impl BootHooks for KernelInit {
        fn init_kernel(&self, args: &BootArgs) -> Result<HartMask, InitError> {
            // SAFETY: boot hart, nothing released yet. State shared with
            // early secondaries lives in .data.boot.
            unsafe { symbols::clear_bss() };
            logger::init(&LOGGER).map_err(|_| InitError::Logger)?;
            info!("boot hart {}, device tree at {:#x}", args.hart, args.dtb);

            // SAFETY: the firmware passes a valid blob that stays in place.
            let fdt = unsafe { Fdt::from_ptr(args.dtb as *const u8) }
                .map_err(DeviceTreeError::from)?;
            let system = discover(&IMAGE_PLAN, &symbols::image_layout(), &fdt, args.dtb)?;
            info!(
                "memory {}, image {}, device tree {}",
                system.memory, system.image, system.dtb
            );
            if system.untracked_harts > 0 {
                warn!(
                    "{} enabled harts have ids past {} and stay parked",
                    system.untracked_harts,
                    MAX_HARTS
                );
            }
            if let Some(bootargs) = system.bootargs {
                info!("bootargs: {bootargs}");
            }

            // SAFETY: the heap range excludes firmware, image and blob.
            unsafe { allocator::init_heap(system.heap) };

            let harts = system.harts;
            SYSTEM.publish(system)?;
            Ok(harts)
        }

        fn init_secondary(&self, ctx: &HartContext) {
            debug!(
                "hart {}: stack {:#x}..{:#x}",
                ctx.args.hart,
                ctx.slot.stack_limit(),
                ctx.slot.top()
            );
        }
    }

    fn boot(args: BootArgs) -> Result<HartContext, BootError> {
        let platform = RiscvPlatform::new()?;
        Sequencer::new(symbols::stack_region(), &HARTS, &BARRIER, &platform)
            .enter(args, &KernelInit)
    }

    fn kmain(ctx: HartContext) -> ! {
        match SYSTEM.get(&BARRIER) {
            Some(system) => info!(
                "hart {}: running ({:?}), {} harts present",
                ctx.args.hart,
                ctx.role,
                system.harts.count()
            ),
            None => warn!("hart {}: running without system info", ctx.args.hart),
        }
        idle()
    }

    /// Called once per hart from the assembly entry.
    pub fn start_kernel(hart_id: usize, dtb: usize) -> ! {
        let args = BootArgs {
            hart: HartId::new(hart_id),
            dtb,
        };
        match boot(args) {
            Ok(ctx) => kmain(ctx),
            Err(err) => {
                early_println!("[ember] hart {}: boot failed: {}", hart_id, err);
                // Secondaries would wait forever on a boot hart that gave up.
                if args.hart == BARRIER.boot_hart() && !BARRIER.is_armed() {
                    let err = sbi::system_reset(ResetType::Shutdown, ResetReason::SystemFailure);
                    early_println!("[ember] shutdown failed: {}", err);
                }
                idle()
            }
        }
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub use machine::start_kernel;
