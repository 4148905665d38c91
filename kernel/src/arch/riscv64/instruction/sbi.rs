use core::arch::asm;

use crate::boot::{HartId, HartMask};
use crate::firmware::{
    Extension, HartStatus, ResetReason, ResetType, SbiError, base, hsm, ipi, sbi_result, srst,
};

pub fn sbi_call(
    extension: Extension,
    function: usize,
    arg0: usize,
    arg1: usize,
    arg2: usize,
) -> Result<usize, SbiError> {
    let error: usize;
    let ret: usize;

    unsafe {
        asm!(
            "ecall",
            inout("a0") arg0 => error,
            inout("a1") arg1 => ret,
            in("a2") arg2,
            in("a3") 0,
            in("a4") 0,
            in("a5") 0,
            in("a6") function,
            in("a7") extension as usize,
            options(nostack),
        );
    }

    sbi_result(error, ret)
}

/// Legacy putchar. Its only return is clobbered `a0`, so nothing is reported.
pub fn sbi_console_putchar(c: u8) {
    unsafe {
        asm!(
            "ecall",
            inout("a0") c as usize => _,
            in("a7") Extension::ConsolePutChar as usize,
            options(nostack),
        );
    }
}

pub fn probe_extension(extension: Extension) -> bool {
    sbi_call(Extension::Base, base::PROBE_EXTENSION, extension as usize, 0, 0)
        .is_ok_and(|available| available != 0)
}

pub fn send_ipi(harts: HartMask) -> Result<(), SbiError> {
    sbi_call(Extension::Ipi, ipi::SEND_IPI, harts.bits(), 0, 0).map(|_| ())
}

/// Starts a stopped hart at `start_addr` with `a0 = hart`, `a1 = opaque`.
pub fn hart_start(hart: HartId, start_addr: usize, opaque: usize) -> Result<(), SbiError> {
    sbi_call(Extension::Hsm, hsm::HART_START, hart.raw(), start_addr, opaque).map(|_| ())
}

pub fn hart_status(hart: HartId) -> Result<HartStatus, SbiError> {
    sbi_call(Extension::Hsm, hsm::HART_GET_STATUS, hart.raw(), 0, 0).map(HartStatus::from_raw)
}

/// Only returns if the firmware refused.
pub fn system_reset(kind: ResetType, reason: ResetReason) -> SbiError {
    match sbi_call(
        Extension::Srst,
        srst::SYSTEM_RESET,
        kind as usize,
        reason as usize,
        0,
    ) {
        Ok(_) => SbiError::Failed,
        Err(err) => err,
    }
}
