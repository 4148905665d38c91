//! Supervisor control and status registers used during boot.

use core::arch::asm;

/// Supervisor software interrupt bit in `sie` and `sip`.
pub const SSI: usize = 1 << 1;

pub fn disable_interrupts() {
    unsafe {
        asm!("csrw sie, zero", options(nomem, nostack));
    }
}

/// Enables only the supervisor software interrupt in `sie`. With
/// `sstatus.SIE` clear this lets `wfi` wake on an IPI without trapping.
pub fn enable_software_interrupt_only() {
    unsafe {
        asm!("csrw sie, {0}", in(reg) SSI, options(nomem, nostack));
    }
}

pub fn clear_software_pending() {
    unsafe {
        asm!("csrc sip, {0}", in(reg) SSI, options(nomem, nostack));
    }
}

/// Points `tp` at the hart-local block.
///
/// # Safety
///
/// `tp` must stay valid for as long as thread-locals are accessed.
pub unsafe fn set_thread_pointer(addr: usize) {
    unsafe {
        asm!("mv tp, {0}", in(reg) addr, options(nomem, nostack));
    }
}
