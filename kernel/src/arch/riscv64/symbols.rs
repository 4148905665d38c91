//! Boundary symbols defined by the generated linker script.

use crate::boot::StackRegion;
use crate::environment::IMAGE_PLAN;
use crate::layout::{ImageLayout, LayoutError, Section, SectionRegion, TlsTemplate};

unsafe extern "C" {
    static __text_start: u8;
    static __text_end: u8;
    static __rodata_start: u8;
    static __rodata_end: u8;
    static __data_start: u8;
    static __data_end: u8;
    static __tls_start: u8;
    static __tdata_end: u8;
    static __tbss_end: u8;
    static __tls_end: u8;
    static __bss_start: u8;
    static __bss_end: u8;
    static __stack_start: u8;
    static __stack_end: u8;
    #[link_name = "__global_pointer$"]
    static GLOBAL_POINTER: u8;
}

macro_rules! addr {
    ($sym:ident) => {
        unsafe { &raw const $sym as usize }
    };
}

pub fn image_layout() -> ImageLayout {
    let regions = [
        SectionRegion::new(Section::Text, addr!(__text_start), addr!(__text_end)),
        SectionRegion::new(Section::Rodata, addr!(__rodata_start), addr!(__rodata_end)),
        SectionRegion::new(Section::Data, addr!(__data_start), addr!(__data_end)),
        SectionRegion::new(Section::Tls, addr!(__tls_start), addr!(__tls_end)),
        SectionRegion::new(Section::Bss, addr!(__bss_start), addr!(__bss_end)),
        SectionRegion::new(Section::Stack, addr!(__stack_start), addr!(__stack_end)),
    ];
    ImageLayout::new(regions, addr!(GLOBAL_POINTER))
}

pub fn stack_region() -> StackRegion {
    StackRegion::from_plan(addr!(__stack_start), &IMAGE_PLAN)
}

/// `.tdata` image plus the size of `.tdata` and `.tbss` together.
pub fn tls_template() -> Result<TlsTemplate<'static>, LayoutError> {
    let start = addr!(__tls_start);
    let tdata_end = addr!(__tdata_end);
    let size = addr!(__tbss_end).max(tdata_end) - start;
    // SAFETY: .tdata is loaded with the image and never written.
    let init = unsafe { core::slice::from_raw_parts(start as *const u8, tdata_end - start) };
    TlsTemplate::new(init, size)
}

/// Zeroes `.bss`.
///
/// # Safety
///
/// Boot hart only, before anything in `.bss` is used and before any other
/// hart is released.
pub unsafe fn clear_bss() {
    let start = addr!(__bss_start);
    let end = addr!(__bss_end);
    unsafe {
        core::ptr::write_bytes(start as *mut u8, 0, end - start);
    }
}
