use core::arch::asm;

pub mod sbi;

pub fn wfi() {
    unsafe {
        asm!("wfi", options(nomem, nostack));
    }
}

/// Orders all earlier memory accesses before all later ones, IPIs included.
pub fn fence() {
    unsafe {
        asm!("fence rw, rw", options(nostack));
    }
}

pub fn idle() -> ! {
    loop {
        wfi();
    }
}
