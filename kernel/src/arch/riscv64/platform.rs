//! [`Platform`] for riscv64 under an SBI firmware.

use log::debug;

use super::boot::entry::_entry;
use super::csr;
use super::instruction::{fence, sbi, wfi};
use super::symbols;
use crate::boot::{BootArgs, EventWait, HartId, HartMask, Platform, StackSlot};
use crate::firmware::{Extension, HartStatus, SbiError};
use crate::layout::{LayoutError, TlsTemplate};

pub struct RiscvPlatform {
    tls: TlsTemplate<'static>,
    hsm: bool,
}

impl RiscvPlatform {
    pub fn new() -> Result<Self, LayoutError> {
        Ok(Self {
            tls: symbols::tls_template()?,
            hsm: sbi::probe_extension(Extension::Hsm),
        })
    }
}

impl EventWait for RiscvPlatform {
    fn wait(&self) {
        // A pending software interrupt ends wfi even with sstatus.SIE clear.
        csr::enable_software_interrupt_only();
        wfi();
        csr::disable_interrupts();
        csr::clear_software_pending();
    }
}

impl Platform for RiscvPlatform {
    fn wake(&self, harts: HartMask) {
        if harts.is_empty() {
            return;
        }
        // The release store must be visible before any IPI lands.
        fence();
        if let Err(err) = sbi::send_ipi(harts) {
            debug!("send_ipi({:#x}) failed: {err}", harts.bits());
        }
    }

    fn start_hart(&self, hart: HartId, args: &BootArgs) -> Result<bool, SbiError> {
        if !self.hsm {
            return Ok(false);
        }
        match sbi::hart_status(hart)? {
            HartStatus::Stopped => {
                sbi::hart_start(hart, _entry as *const () as usize, args.dtb)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn prepare_hart_local(&self, slot: &StackSlot) -> Result<(), LayoutError> {
        // SAFETY: the low end of the slot belongs to this hart alone and lies
        // below the stack limit, so the running stack never reaches it.
        let block = unsafe {
            core::slice::from_raw_parts_mut(slot.tls_base() as *mut u8, slot.tls_len())
        };
        self.tls.install(block)?;
        unsafe { csr::set_thread_pointer(slot.tls_base()) };
        Ok(())
    }
}
