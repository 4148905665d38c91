use crate::layout::ImagePlan;

include!(concat!(env!("OUT_DIR"), "/image_plan.rs"));

pub const NUM_OF_HARTS: usize = IMAGE_PLAN.harts;
pub const HART_STACK_SIZE: usize = IMAGE_PLAN.hart_stack_size(); // 128KB
pub const TLS_AREA_SIZE: usize = IMAGE_PLAN.tls_area_size;
pub const BOOT_HART_ID: usize = 0;

const _: () = assert!(NUM_OF_HARTS > 0 && HART_STACK_SIZE > TLS_AREA_SIZE);
