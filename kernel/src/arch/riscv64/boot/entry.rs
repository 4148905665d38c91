use core::arch::naked_asm;

use crate::environment::{HART_STACK_SIZE, NUM_OF_HARTS};
use crate::kinit::start_kernel;

/// Entry point for every hart, `a0 = hart id`, `a1 = device tree`.
///
/// Harts enter concurrently and in any order. The stack pointer is derived
/// from the hart id alone so no two harts ever share a slot. A hart id past
/// the reserved slots parks here without touching memory.
#[unsafe(naked)]
#[unsafe(link_section = ".text.entry")]
#[unsafe(export_name = "_entry")]
pub extern "C" fn _entry() -> ! {
    naked_asm!(
        "
        .option push
        .option norelax
                la      gp, __global_pointer$
        .option pop
                csrw    sie, zero

                li      t0, {harts}
                bgeu    a0, t0, 2f

                // sp = __stack_start + (hartid + 1) * HART_STACK_SIZE
                li      t0, {stack_size}
                addi    t1, a0, 1
                mul     t0, t0, t1
                la      sp, __stack_start
                add     sp, sp, t0

                tail    {hart_entry}
        2:
                wfi
                j       2b
        ",
        harts = const NUM_OF_HARTS,
        stack_size = const HART_STACK_SIZE,
        hart_entry = sym hart_entry,
    )
}

extern "C" fn hart_entry(hart_id: usize, dtb: usize) -> ! {
    start_kernel(hart_id, dtb)
}
