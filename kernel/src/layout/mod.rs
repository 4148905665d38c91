//! Kernel image layout.
//!
//! The layout is fixed when the image is linked. [`plan`] describes it and
//! renders the linker script, [`ImageLayout`] is the view the running kernel
//! gets from the boundary symbols, and [`TlsTemplate`] is used to hand every
//! hart its own copy of the thread-local region.

mod image;
pub mod plan;
mod tls;

pub use image::{ImageLayout, LayoutError, SectionRegion};
pub use plan::{
    GLOBAL_POINTER_OFFSET, ImagePlan, LinkerScript, MAX_HARTS, PAGE_SIZE, PlanError, Section,
};
pub use tls::TlsTemplate;
