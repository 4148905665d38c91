//! Per-hart boot sequence from the first Rust instruction to steady state.
//!
//! Every hart that the firmware hands to the kernel runs [`Sequencer::enter`]
//! on its own stack. The boot hart initializes the kernel and arms the
//! barrier; every other hart parks until then.

use log::{debug, info, trace, warn};

use super::barrier::{EventWait, HartBarrier};
use super::hart::{HartId, HartMask, HartState, HartTable};
use super::stack::{StackRegion, StackSlot};
use super::{BootArgs, BootError};
use crate::firmware::SbiError;
use crate::kinit::InitError;
use crate::layout::LayoutError;

/// What the sequencer needs from the machine it runs on.
pub trait Platform: EventWait {
    /// Wakes harts that may be waiting in [`EventWait::wait`].
    fn wake(&self, harts: HartMask);

    /// Asks the firmware to start `hart` at the kernel entry if it is stopped.
    /// Returns whether a start was requested.
    fn start_hart(&self, hart: HartId, args: &BootArgs) -> Result<bool, SbiError>;

    /// Fills the hart-local block of `slot` and points the thread pointer at it.
    fn prepare_hart_local(&self, slot: &StackSlot) -> Result<(), LayoutError>;
}

/// Kernel-side work done during the boot sequence.
pub trait BootHooks {
    /// One-time initialization on the boot hart before any other hart is
    /// released. Returns the harts present on the machine.
    fn init_kernel(&self, args: &BootArgs) -> Result<HartMask, InitError>;

    /// Per-hart initialization on a released secondary.
    fn init_secondary(&self, _ctx: &HartContext) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Boot,
    Secondary,
}

/// Everything a hart knows about itself once its boot sequence is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HartContext {
    pub args: BootArgs,
    pub slot: StackSlot,
    pub role: Role,
}

pub struct Sequencer<'a, P: ?Sized, const N: usize> {
    stacks: StackRegion,
    harts: &'a HartTable<N>,
    barrier: &'a HartBarrier,
    platform: &'a P,
}

impl<'a, P: Platform + ?Sized, const N: usize> Sequencer<'a, P, N> {
    pub fn new(
        stacks: StackRegion,
        harts: &'a HartTable<N>,
        barrier: &'a HartBarrier,
        platform: &'a P,
    ) -> Self {
        Self {
            stacks,
            harts,
            barrier,
            platform,
        }
    }

    pub fn enter<H: BootHooks + ?Sized>(
        &self,
        args: BootArgs,
        hooks: &H,
    ) -> Result<HartContext, BootError> {
        let hart = args.hart;
        let slot = self.stacks.slot(hart)?;
        self.harts.claim(hart)?;
        trace!(
            "hart {hart}: entered, stack {:#x}..{:#x}",
            slot.stack_limit(),
            slot.top()
        );

        self.platform.prepare_hart_local(&slot)?;
        self.harts
            .advance(hart, HartState::Entered, HartState::StackReady)?;

        if hart == self.barrier.boot_hart() {
            self.boot(&args, hooks)?;
            return Ok(HartContext {
                args,
                slot,
                role: Role::Boot,
            });
        }

        self.park(&args)?;
        let ctx = HartContext {
            args,
            slot,
            role: Role::Secondary,
        };
        hooks.init_secondary(&ctx);
        self.harts
            .advance(hart, HartState::Released, HartState::Running)?;
        Ok(ctx)
    }

    fn boot<H: BootHooks + ?Sized>(&self, args: &BootArgs, hooks: &H) -> Result<(), BootError> {
        let hart = args.hart;
        self.harts
            .advance(hart, HartState::StackReady, HartState::Running)?;

        let present = hooks.init_kernel(args)?;
        let reserved = HartMask::below(self.stacks.harts());
        let unusable = present.difference(reserved);
        if !unusable.is_empty() {
            warn!(
                "harts {:#x} have no reserved stack and stay parked",
                unusable.bits()
            );
        }

        self.barrier.arm(hart)?;
        info!("hart {hart}: kernel initialized, releasing secondaries");

        let others = present.intersect(reserved).without(hart);
        self.platform.wake(others);
        for other in others.iter() {
            match self.platform.start_hart(other, args) {
                Ok(true) => debug!("hart {hart}: requested start of hart {other}"),
                Ok(false) => {}
                Err(err) => warn!("hart {hart}: could not start hart {other}: {err}"),
            }
        }
        Ok(())
    }

    fn park(&self, args: &BootArgs) -> Result<(), BootError> {
        let hart = args.hart;
        let boot = self.barrier.boot_hart();
        if !self.barrier.is_armed() && self.harts.state(boot)? == HartState::Absent {
            match self.platform.start_hart(boot, args) {
                Ok(true) => info!("hart {hart}: requested start of boot hart {boot}"),
                Ok(false) => {}
                Err(err) => warn!("hart {hart}: could not start boot hart {boot}: {err}"),
            }
        }

        self.harts
            .advance(hart, HartState::StackReady, HartState::Parked)?;
        self.barrier.wait_for_release(self.platform);
        self.harts
            .advance(hart, HartState::Parked, HartState::Released)?;
        trace!("hart {hart}: released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::barrier::{BarrierError, SpinWait};
    use crate::boot::cell::BootCell;
    use crate::boot::hart::SlotError;
    use crate::device::fdt::DeviceTreeError;
    use crate::layout::ImagePlan;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    const STACK_BASE: usize = 0x8030_0000;

    fn stacks() -> StackRegion {
        StackRegion::from_plan(STACK_BASE, &ImagePlan::DEFAULT)
    }

    fn args(hart: usize) -> BootArgs {
        BootArgs {
            hart: HartId::new(hart),
            dtb: 0x8220_0000,
        }
    }

    #[derive(Default)]
    struct HostPlatform {
        woken: Mutex<Vec<HartMask>>,
        start_requests: Mutex<Vec<HartId>>,
        locals: Mutex<Vec<StackSlot>>,
    }

    impl EventWait for HostPlatform {
        fn wait(&self) {
            SpinWait.wait();
            thread::yield_now();
        }
    }

    impl Platform for HostPlatform {
        fn wake(&self, harts: HartMask) {
            self.woken.lock().unwrap().push(harts);
        }

        fn start_hart(&self, hart: HartId, _args: &BootArgs) -> Result<bool, SbiError> {
            self.start_requests.lock().unwrap().push(hart);
            Ok(true)
        }

        fn prepare_hart_local(&self, slot: &StackSlot) -> Result<(), LayoutError> {
            self.locals.lock().unwrap().push(*slot);
            Ok(())
        }
    }

    /// Publishes a canary table that released harts must see in full.
    struct CanaryHooks<'a> {
        present: HartMask,
        barrier: &'a HartBarrier,
        table: BootCell<[u64; 32]>,
        seen: Mutex<Vec<(HartId, bool)>>,
        init_runs: Mutex<usize>,
        slow_init: bool,
    }

    impl<'a> CanaryHooks<'a> {
        fn new(present: HartMask, barrier: &'a HartBarrier, slow_init: bool) -> Self {
            Self {
                present,
                barrier,
                table: BootCell::new(),
                seen: Mutex::new(Vec::new()),
                init_runs: Mutex::new(0),
                slow_init,
            }
        }
    }

    impl BootHooks for CanaryHooks<'_> {
        fn init_kernel(&self, _args: &BootArgs) -> Result<HartMask, InitError> {
            *self.init_runs.lock().unwrap() += 1;
            if self.slow_init {
                thread::sleep(Duration::from_millis(20));
            }
            unsafe {
                self.table
                    .publish(core::array::from_fn(|idx| 0xc0de_0000 + idx as u64))
            };
            Ok(self.present)
        }

        fn init_secondary(&self, ctx: &HartContext) {
            let intact = self.table.get(self.barrier).is_some_and(|table| {
                table
                    .iter()
                    .enumerate()
                    .all(|(idx, v)| *v == 0xc0de_0000 + idx as u64)
            });
            self.seen.lock().unwrap().push((ctx.args.hart, intact));
        }
    }

    struct FailingHooks;

    impl BootHooks for FailingHooks {
        fn init_kernel(&self, _args: &BootArgs) -> Result<HartMask, InitError> {
            Err(InitError::DeviceTree(DeviceTreeError::MissingCpus))
        }
    }

    fn boot_all(order: [usize; 4]) {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let hooks = CanaryHooks::new(HartMask::below(4), &barrier, false);
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        let contexts: Vec<HartContext> = thread::scope(|s| {
            let handles: Vec<_> = order
                .iter()
                .map(|&hart| {
                    let sequencer = &sequencer;
                    let hooks = &hooks;
                    s.spawn(move || sequencer.enter(args(hart), hooks).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(*hooks.init_runs.lock().unwrap(), 1);
        assert_eq!(harts.in_state(HartState::Running), HartMask::below(4));
        assert_eq!(barrier.observed(), 3);

        let mut seen = hooks.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            [1, 2, 3].map(|h| (HartId::new(h), true)).to_vec(),
            "entry order {order:?}"
        );

        for ctx in &contexts {
            let expected = if ctx.args.hart.raw() == 0 {
                Role::Boot
            } else {
                Role::Secondary
            };
            assert_eq!(ctx.role, expected);
            assert_eq!(ctx.slot, stacks().slot(ctx.args.hart).unwrap());
        }
        for (i, a) in contexts.iter().enumerate() {
            for b in &contexts[i + 1..] {
                assert!(!a.slot.overlaps(&b.slot));
            }
        }
        assert_eq!(
            *platform.woken.lock().unwrap(),
            vec![HartMask::from_bits(0b1110)]
        );
    }

    #[test]
    fn test_four_harts_any_entry_order() {
        for order in [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]] {
            boot_all(order);
        }
    }

    #[test]
    fn test_secondaries_wait_for_slow_init() {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let hooks = CanaryHooks::new(HartMask::below(4), &barrier, true);
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        thread::scope(|s| {
            for hart in 1..4 {
                let sequencer = &sequencer;
                let hooks = &hooks;
                s.spawn(move || sequencer.enter(args(hart), hooks).unwrap());
            }
            while barrier.observed() < 3 {
                thread::yield_now();
            }
            assert_eq!(harts.in_state(HartState::Parked).bits(), 0b1110);
            assert!(hooks.seen.lock().unwrap().is_empty());

            let ctx = sequencer.enter(args(0), &hooks).unwrap();
            assert_eq!(ctx.role, Role::Boot);
        });

        let seen = hooks.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, intact)| *intact));
    }

    #[test]
    fn test_secondary_first_starts_boot_hart() {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let hooks = CanaryHooks::new(HartMask::below(2), &barrier, false);
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        thread::scope(|s| {
            let secondary = s.spawn(|| sequencer.enter(args(1), &hooks).unwrap());
            while barrier.observed() < 1 {
                thread::yield_now();
            }
            assert_eq!(
                *platform.start_requests.lock().unwrap(),
                vec![HartId::new(0)]
            );
            sequencer.enter(args(0), &hooks).unwrap();
            assert_eq!(secondary.join().unwrap().role, Role::Secondary);
        });

        // after release the boot hart starts the remaining present hart
        assert_eq!(
            *platform.start_requests.lock().unwrap(),
            vec![HartId::new(0), HartId::new(1)]
        );
    }

    #[test]
    fn test_hart_past_reserved_slots() {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let hooks = CanaryHooks::new(HartMask::below(4), &barrier, false);
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        let err = sequencer.enter(args(4), &hooks).unwrap_err();
        assert!(matches!(
            err,
            BootError::Slot(SlotError::OutOfRange { slots: 4, .. })
        ));
        assert!(platform.locals.lock().unwrap().is_empty());
        assert_eq!(harts.in_state(HartState::Absent), HartMask::below(4));
    }

    #[test]
    fn test_boot_hart_enters_twice() {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let hooks = CanaryHooks::new(HartMask::below(1), &barrier, false);
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        sequencer.enter(args(0), &hooks).unwrap();
        let err = sequencer.enter(args(0), &hooks).unwrap_err();
        assert!(matches!(
            err,
            BootError::Slot(SlotError::AlreadyEntered { .. })
        ));
        assert_eq!(*hooks.init_runs.lock().unwrap(), 1);
        assert_eq!(barrier.arm(HartId::new(0)), Err(BarrierError::AlreadyArmed));
    }

    #[test]
    fn test_failed_init_keeps_barrier_unarmed() {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        let err = sequencer.enter(args(0), &FailingHooks).unwrap_err();
        assert!(matches!(err, BootError::Init(_)));
        assert!(!barrier.is_armed());
        assert!(platform.woken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hart_local_block_prepared_before_release() {
        let harts = HartTable::<4>::new();
        let barrier = HartBarrier::new(HartId::new(0));
        let platform = HostPlatform::default();
        let hooks = CanaryHooks::new(HartMask::below(4), &barrier, false);
        let sequencer = Sequencer::new(stacks(), &harts, &barrier, &platform);

        sequencer.enter(args(0), &hooks).unwrap();
        sequencer.enter(args(3), &hooks).unwrap();
        let locals = platform.locals.lock().unwrap();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[1].tls_base(), STACK_BASE + 3 * 0x2_0000);
    }
}
