//! Platform initialization sequencer.
//!
//! The boot hart runs [`plf_init_generic`] once out of reset. Each step
//! relies on the ones before it: globals must sit at their run addresses
//! before TLS is copied, caches come up before heavy stack use, memory
//! protection before peripherals, and secondary harts are brought up
//! last so they inherit a fully configured platform.

use core::ops::Range;

use crate::arch;
use crate::cache::CacheMaintenance;
use crate::config::SMP_SUPPORT;
use crate::error::{HalError, HalResult};
use crate::features::{self, FeatureSet};
use crate::hls::{self, BumpArena, TlsImage};
use crate::platform::{AppHooks, PlatformOps};
use crate::reloc::Relocations;
use crate::smp::{BringupReport, ShutdownAction, SmpContext};
use crate::sync::poll::{Spin, SpinPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Relocate,
    BootTls,
    PerfCounters,
    ZeroBss,
    PmpEarly,
    EarlyInitHook,
    L3Cache,
    L2Cache,
    L1Cache,
    Mpu,
    Pmp,
    Mrt,
    Features,
    Console,
    Rtc,
    Leds,
    SmpBringup,
    SmpBarrier,
}

/// Boot hart order.
pub const BOOT_SEQUENCE: [InitStep; 17] = [
    InitStep::Relocate,
    InitStep::BootTls,
    InitStep::PerfCounters,
    InitStep::ZeroBss,
    InitStep::PmpEarly,
    InitStep::EarlyInitHook,
    InitStep::L3Cache,
    InitStep::L2Cache,
    InitStep::L1Cache,
    InitStep::Mpu,
    InitStep::Pmp,
    InitStep::Mrt,
    InitStep::Features,
    InitStep::Console,
    InitStep::Rtc,
    InitStep::Leds,
    InitStep::SmpBringup,
];

/// Secondary hart order. The shared L3 and the peripherals are left to
/// the boot hart; L2 is only touched when it is private to the hart.
pub const SECONDARY_SEQUENCE: [InitStep; 9] = [
    InitStep::PerfCounters,
    InitStep::PmpEarly,
    InitStep::EarlyInitHook,
    InitStep::L2Cache,
    InitStep::L1Cache,
    InitStep::Mpu,
    InitStep::Pmp,
    InitStep::Features,
    InitStep::SmpBarrier,
];

/// Link-time layout of the firmware image.
#[derive(Debug, Clone)]
pub struct BootImage<'a> {
    pub relocations: Relocations,
    pub tls: TlsImage<'a>,
    /// Absolute address range of `.bss`.
    pub bss: Range<usize>,
    /// Leave `.bss` alone (the loader already cleared it).
    pub skip_bss: bool,
    /// Features to enable on every hart.
    pub features: FeatureSet,
}

impl BootImage<'_> {
    pub const EMPTY: Self = Self {
        relocations: Relocations::NONE,
        tls: TlsImage::EMPTY,
        bss: 0..0,
        skip_bss: true,
        features: FeatureSet::empty(),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootStats {
    /// Cycle counter right after `.bss` was cleared.
    pub bss_complete_cycles: u64,
    /// Sections copied by relocation.
    pub relocated: usize,
    pub features: FeatureSet,
    /// Present on the master when multi-hart support is built in.
    pub bringup: Option<BringupReport>,
}

/// Boot-hart platform initialization.
///
/// `tp` is the hart's thread pointer (zero when it has no TLS block).
/// Clearing `.bss` and the secondary bring-up only happen on the master
/// hart; any other hart running this path just configures itself.
///
/// # Safety
///
/// Must run once, before anything reads global state. `image` has to
/// describe memory this hart may overwrite: the relocation targets, the
/// `.bss` range and `[tp, tp + image.tls.size())`.
pub unsafe fn plf_init_generic<const N: usize, C, P, H>(
    ctx: &SmpContext<N, C>,
    hartid: usize,
    tp: usize,
    image: &BootImage,
    arena: &mut BumpArena,
    ops: &P,
    hooks: &H,
) -> HalResult<BootStats>
where
    C: CacheMaintenance,
    P: PlatformOps + ?Sized,
    H: AppHooks + ?Sized,
{
    let config = *ctx.config();
    config.validate()?;
    config.index_of(hartid)?;
    let master = config.is_master(hartid);

    let mut stats = BootStats::default();
    for step in BOOT_SEQUENCE {
        ops.on_step(hartid, step);
        match step {
            InitStep::Relocate => stats.relocated = unsafe { image.relocations.apply() },
            InitStep::BootTls => {
                if tp != 0 {
                    unsafe { hls::init_tls_at::<C>(tp, &image.tls, config.flush_tls) };
                }
            }
            InitStep::PerfCounters => ops.perf_init_hpm(),
            InitStep::ZeroBss => {
                if master && !image.skip_bss {
                    unsafe { zero_range(image.bss.clone()) };
                }
                stats.bss_complete_cycles = arch::cycle();
            }
            InitStep::PmpEarly => ops.pmp_early_init(),
            InitStep::EarlyInitHook => hooks.early_init(master),
            InitStep::L3Cache => ops.l3cache_init(),
            InitStep::L2Cache => ops.l2cache_init(),
            InitStep::L1Cache => ops.l1cache_init(),
            InitStep::Mpu => ops.mpu_init(),
            InitStep::Pmp => ops.pmp_init(),
            InitStep::Mrt => ops.mrt_init(),
            InitStep::Features => stats.features = features::init_features(ops, image.features),
            InitStep::Console => ops.console_init(),
            InitStep::Rtc => ops.rtc_init(),
            InitStep::Leds => ops.leds_init(),
            InitStep::SmpBringup => {
                if SMP_SUPPORT && master {
                    stats.bringup = Some(ctx.smp_init(hartid, arena, &image.tls)?);
                }
            }
            InitStep::SmpBarrier => {}
        }
        debug!("init: {:?} done", step);
    }
    info!("hart {}: platform init complete", hartid);
    Ok(stats)
}

/// [`plf_init_generic`] for the calling hart, with its own hart id and
/// thread pointer.
///
/// # Safety
///
/// Same contract as [`plf_init_generic`].
pub unsafe fn plf_init<const N: usize, C, P, H>(
    ctx: &SmpContext<N, C>,
    image: &BootImage,
    arena: &mut BumpArena,
    ops: &P,
    hooks: &H,
) -> HalResult<BootStats>
where
    C: CacheMaintenance,
    P: PlatformOps + ?Sized,
    H: AppHooks + ?Sized,
{
    unsafe {
        plf_init_generic(ctx, arch::hart_id(), arch::thread_pointer(), image, arena, ops, hooks)
    }
}

unsafe fn zero_range(range: Range<usize>) {
    if range.end > range.start {
        unsafe { core::ptr::write_bytes(range.start as *mut u8, 0, range.end - range.start) };
    }
}

/// What a secondary hart got out of [`secondary_main`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryBoot {
    /// Thread pointer of the hart-local block the master published.
    pub tp: usize,
    pub features: FeatureSet,
}

/// Secondary hart path: claim the published block, run the secondary
/// setup and the barrier, then hand over to the application.
///
/// Returns `Ok(None)` for a hart the master could not give storage to;
/// it must park without touching shared state.
pub fn secondary_main<const N: usize, C, P, H, S>(
    ctx: &SmpContext<N, C>,
    hartid: usize,
    wanted: FeatureSet,
    ops: &P,
    hooks: &H,
    policy: &mut S,
) -> HalResult<Option<SecondaryBoot>>
where
    C: CacheMaintenance,
    P: PlatformOps + ?Sized,
    H: AppHooks + ?Sized,
    S: SpinPolicy + ?Sized,
{
    let Some(tp) = ctx.claim_hls(hartid)? else {
        warn!("hart {}: no hart-local storage, parking", hartid);
        return Ok(None);
    };
    let features = ctx.slave_init(hartid, ops, hooks, wanted, policy)?;
    debug!("hart {}: released, entering application", hartid);
    hooks.slave_entry(hartid);
    Ok(Some(SecondaryBoot { tp, features }))
}

/// Final exit for `hartid`. The master waits for every running hart and
/// writes `code` to the power-off device; every other hart parks.
pub fn plf_exit<const N: usize, C, P, H>(
    ctx: &SmpContext<N, C>,
    hartid: usize,
    code: i32,
    ops: &P,
    hooks: &H,
) -> !
where
    C: CacheMaintenance,
    P: PlatformOps + ?Sized,
    H: AppHooks + ?Sized,
{
    match exit_action(ctx, hartid, code, hooks, &mut Spin) {
        Ok(ShutdownAction::PowerOff(code)) => ops.poweroff(code),
        Ok(ShutdownAction::Park) => {}
        Err(err) => error!("hart {}: exit failed: {}", hartid, err),
    }
    arch::park()
}

/// Exit bookkeeping without the final halt, for callers that own the
/// halt themselves. Without multi-hart support the only hart powers off
/// directly.
pub fn exit_action<const N: usize, C, H, S>(
    ctx: &SmpContext<N, C>,
    hartid: usize,
    code: i32,
    hooks: &H,
    policy: &mut S,
) -> HalResult<ShutdownAction>
where
    C: CacheMaintenance,
    H: AppHooks + ?Sized,
    S: SpinPolicy + ?Sized,
{
    if !SMP_SUPPORT {
        hooks.app_exit();
        return if ctx.config().is_master(hartid) {
            Ok(ShutdownAction::PowerOff(code))
        } else {
            Err(HalError::NotMaster(hartid))
        };
    }
    ctx.shutdown(hartid, code, hooks, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Coherent;
    use crate::config::PlfConfig;
    use crate::platform::{DefaultHooks, NullPlatform};
    use crate::smp::HartSlot;
    use crate::sync::poll::Bounded;
    use std::sync::Mutex;
    use std::vec;
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<(usize, InitStep)>>,
        l2_inits: Mutex<usize>,
        dedicated_l2: bool,
    }

    impl Recorder {
        fn steps_of(&self, hartid: usize) -> Vec<InitStep> {
            self.steps
                .lock()
                .unwrap()
                .iter()
                .filter(|(h, _)| *h == hartid)
                .map(|(_, s)| *s)
                .collect()
        }
    }

    impl PlatformOps for Recorder {
        fn on_step(&self, hartid: usize, step: InitStep) {
            self.steps.lock().unwrap().push((hartid, step));
        }

        fn l2cache_init(&self) {
            *self.l2_inits.lock().unwrap() += 1;
        }

        fn l2_dedicated(&self) -> bool {
            self.dedicated_l2
        }

        fn feature_available(&self, feature: FeatureSet) -> bool {
            feature == FeatureSet::PAGE_PREFETCHER
        }
    }

    struct EarlyFlags(Mutex<Vec<bool>>);

    impl AppHooks for EarlyFlags {
        fn early_init(&self, boot_hart: bool) {
            self.0.lock().unwrap().push(boot_hart);
        }
    }

    fn config() -> PlfConfig {
        PlfConfig {
            hls_min_stack: 128,
            ..PlfConfig::with_harts(2)
        }
    }

    #[test]
    #[cfg(feature = "smp")]
    fn test_boot_steps_run_in_order() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let ops = Recorder::default();
        let hooks = EarlyFlags(Mutex::new(Vec::new()));
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        let image = BootImage {
            features: FeatureSet::PAGE_PREFETCHER,
            ..BootImage::EMPTY
        };

        let stats =
            unsafe { plf_init_generic(&ctx, 0, 0, &image, &mut arena, &ops, &hooks) }.unwrap();
        assert_eq!(ops.steps_of(0), BOOT_SEQUENCE);
        assert_eq!(*hooks.0.lock().unwrap(), [true]);
        assert_eq!(stats.features, FeatureSet::PAGE_PREFETCHER);
        assert_eq!(stats.bringup.map(|r| r.published), Some(1));
        assert!(stats.bss_complete_cycles > 0);
        assert_eq!(*ops.l2_inits.lock().unwrap(), 1);
    }

    #[test]
    fn test_boot_clears_bss_and_tls() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut bss = [0x5Au8; 32];
        let mut tls = [0xFFu8; 16];
        let tdata = [7u8; 4];
        let image = BootImage {
            tls: TlsImage::new(&tdata, 4),
            bss: {
                let start = bss.as_mut_ptr() as usize;
                start..start + bss.len()
            },
            skip_bss: false,
            ..BootImage::EMPTY
        };
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        let tp = tls.as_mut_ptr() as usize;

        let stats =
            unsafe { plf_init_generic(&ctx, 0, tp, &image, &mut arena, &NullPlatform, &DefaultHooks) };
        assert!(stats.is_ok());
        assert!(bss.iter().all(|b| *b == 0));
        assert_eq!(tls[..8], [7, 7, 7, 7, 0, 0, 0, 0]);
        assert_eq!(tls[8], 0xFF);
    }

    #[test]
    #[cfg(feature = "smp")]
    fn test_skip_bss_leaves_memory() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut bss = [0x5Au8; 8];
        let start = bss.as_mut_ptr() as usize;
        let image = BootImage {
            bss: start..start + 8,
            skip_bss: true,
            ..BootImage::EMPTY
        };
        let mut empty: [u8; 0] = [];
        let mut arena = BumpArena::new(&mut empty);
        let stats = unsafe {
            plf_init_generic(&ctx, 0, 0, &image, &mut arena, &NullPlatform, &DefaultHooks)
        }
        .unwrap();
        assert_eq!(bss, [0x5A; 8]);
        assert_eq!(stats.bringup, Some(BringupReport { published: 0, unallocated: 1 }));
    }

    #[test]
    #[cfg(feature = "smp")]
    fn test_plf_init_uses_calling_hart() {
        let ctx = SmpContext::<{ crate::config::SMP_HART_NUM }, Coherent>::new(PlfConfig::BUILD);
        let mut empty: [u8; 0] = [];
        let mut arena = BumpArena::new(&mut empty);
        let stats = unsafe {
            plf_init(&ctx, &BootImage::EMPTY, &mut arena, &NullPlatform, &DefaultHooks)
        }
        .unwrap();
        let secondaries = crate::config::SMP_HART_NUM - 1;
        assert_eq!(
            stats.bringup,
            Some(BringupReport { published: 0, unallocated: secondaries })
        );
    }

    #[test]
    fn test_rejects_unknown_hart() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut empty: [u8; 0] = [];
        let mut arena = BumpArena::new(&mut empty);
        let res = unsafe {
            plf_init_generic(&ctx, 5, 0, &BootImage::EMPTY, &mut arena, &NullPlatform, &DefaultHooks)
        };
        assert_eq!(res, Err(HalError::InvalidHart(5)));
    }

    #[test]
    fn test_secondary_runs_its_sequence() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
        ctx.release_secondaries();

        let ops = Recorder {
            dedicated_l2: true,
            ..Recorder::default()
        };
        let hooks = EarlyFlags(Mutex::new(Vec::new()));
        let boot = secondary_main(&ctx, 1, FeatureSet::all(), &ops, &hooks, &mut Bounded::new(0))
            .unwrap()
            .unwrap();
        assert_eq!(boot.features, FeatureSet::PAGE_PREFETCHER);
        assert_eq!(ops.steps_of(1), SECONDARY_SEQUENCE);
        assert_eq!(*hooks.0.lock().unwrap(), [false]);
        assert_eq!(*ops.l2_inits.lock().unwrap(), 1);
        assert_eq!(ctx.slot(1), Ok(HartSlot::Running));
    }

    #[test]
    fn test_shared_l2_not_initialized_by_secondary() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
        ctx.release_secondaries();

        let ops = Recorder::default();
        secondary_main(&ctx, 1, FeatureSet::empty(), &ops, &DefaultHooks, &mut Spin).unwrap();
        assert_eq!(*ops.l2_inits.lock().unwrap(), 0);
    }

    #[test]
    fn test_secondary_without_storage_parks() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut empty: [u8; 0] = [];
        let mut arena = BumpArena::new(&mut empty);
        ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
        let ops = Recorder::default();
        assert_eq!(
            secondary_main(&ctx, 1, FeatureSet::empty(), &ops, &DefaultHooks, &mut Spin),
            Ok(None)
        );
        assert!(ops.steps_of(1).is_empty());
    }

    #[test]
    fn test_unreleased_barrier_aborts_with_bounded_policy() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
        let res = secondary_main(
            &ctx,
            1,
            FeatureSet::empty(),
            &NullPlatform,
            &DefaultHooks,
            &mut Bounded::new(3),
        );
        assert_eq!(res, Err(HalError::SpinAborted));
    }

    #[test]
    #[cfg(feature = "smp")]
    fn test_exit_action_master_waits_for_running_harts() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
        ctx.claim_hls(1).unwrap();

        assert_eq!(
            exit_action(&ctx, 0, 3, &DefaultHooks, &mut Bounded::new(5)),
            Err(HalError::SpinAborted)
        );
        assert_eq!(
            exit_action(&ctx, 1, 0, &DefaultHooks, &mut Spin),
            Ok(ShutdownAction::Park)
        );
        assert_eq!(
            exit_action(&ctx, 0, 3, &DefaultHooks, &mut Spin),
            Ok(ShutdownAction::PowerOff(3))
        );
    }

    #[test]
    #[cfg(feature = "smp")]
    fn test_master_halts_with_secondary_exit_code() {
        let ctx = SmpContext::<2, Coherent>::new(config());
        let mut mem = vec![0u8; 1024];
        let mut arena = BumpArena::new(&mut mem);
        ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
        ctx.claim_hls(1).unwrap();

        assert_eq!(
            exit_action(&ctx, 1, 3, &DefaultHooks, &mut Spin),
            Ok(ShutdownAction::Park)
        );
        assert_eq!(
            exit_action(&ctx, 0, 0, &DefaultHooks, &mut Spin),
            Ok(ShutdownAction::PowerOff(3))
        );
    }
}
