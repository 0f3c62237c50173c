//! Full master/secondary lifecycle with host threads standing in for harts.

#![cfg(feature = "smp")]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use scr_hal::cache::Coherent;
use scr_hal::sync::{Amo, Bounded, RawLock, Spin, TicketLock};
use scr_hal::{
    AppHooks, BootImage, BumpArena, FeatureSet, HalError, HartSlot, InitStep, NullPlatform,
    PlatformOps, PlfConfig, ShutdownAction, SmpContext, TlsImage,
};

const HARTS: usize = 4;

struct Board {
    steps: Mutex<Vec<(usize, InitStep)>>,
}

impl PlatformOps for Board {
    fn on_step(&self, hartid: usize, step: InitStep) {
        self.steps.lock().unwrap().push((hartid, step));
    }

    fn feature_available(&self, feature: FeatureSet) -> bool {
        feature.intersects(FeatureSet::L1D_PREFETCHER | FeatureSet::BPU_LOOP_PREDICTOR)
    }
}

#[derive(Default)]
struct App {
    entered: AtomicUsize,
    exits: AtomicUsize,
}

impl AppHooks for App {
    fn slave_entry(&self, _hartid: usize) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    fn app_exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

fn config(base: usize, master: usize) -> PlfConfig {
    PlfConfig {
        hartid_base: base,
        master_hartid: master,
        hls_min_stack: 256,
        ..PlfConfig::with_harts(HARTS)
    }
}

#[test]
fn boot_run_and_shutdown_all_harts() {
    let ctx = SmpContext::<HARTS, Coherent>::new(config(0x10, 0x11));
    let board = Board {
        steps: Mutex::new(Vec::new()),
    };
    let app = App::default();
    let tdata = [0xC3u8; 24];
    let image = BootImage {
        tls: TlsImage::new(&tdata, 40),
        features: FeatureSet::L1D_PREFETCHER,
        ..BootImage::EMPTY
    };
    let mut mem = vec![0u8; 8192];
    let mut arena = BumpArena::new(&mut mem);

    let stats = unsafe { scr_hal::plf_init_generic(&ctx, 0x11, 0, &image, &mut arena, &board, &app) }
        .unwrap();
    let report = stats.bringup.unwrap();
    assert_eq!(report.published, HARTS - 1);
    assert_eq!(stats.features, FeatureSet::L1D_PREFETCHER);

    // Published blocks carry the TLS template.
    for hartid in [0x10, 0x12, 0x13] {
        let HartSlot::Published(tp) = ctx.slot(hartid).unwrap() else {
            panic!("hart {:#x} not published", hartid);
        };
        let tls = unsafe { std::slice::from_raw_parts(tp as *const u8, 64) };
        assert!(tls[..24].iter().all(|b| *b == 0xC3));
        assert!(tls[24..].iter().all(|b| *b == 0));
    }

    let critical = TicketLock::<Amo, Coherent>::new();
    let inside = AtomicUsize::new(0);
    let work_done = AtomicUsize::new(0);

    thread::scope(|s| {
        let secondaries: Vec<_> = [0x10, 0x12, 0x13]
            .into_iter()
            .map(|hartid| {
                let (ctx, board, app) = (&ctx, &board, &app);
                let (critical, inside, work_done) = (&critical, &inside, &work_done);
                s.spawn(move || {
                    let boot = scr_hal::secondary_main(
                        ctx,
                        hartid,
                        FeatureSet::L1D_PREFETCHER,
                        board,
                        app,
                        &mut Spin,
                    )
                    .unwrap()
                    .unwrap();
                    assert_eq!(boot.features, FeatureSet::L1D_PREFETCHER);

                    for _ in 0..100 {
                        critical.lock();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        critical.unlock();
                    }
                    work_done.fetch_add(1, Ordering::SeqCst);

                    scr_hal::init::exit_action(ctx, hartid, 0, app, &mut Spin).unwrap()
                })
            })
            .collect();

        while ![0x10, 0x12, 0x13]
            .iter()
            .all(|h| ctx.slot(*h) == Ok(HartSlot::Running))
        {
            thread::yield_now();
        }
        // Nobody gets past the barrier before the release.
        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(app.entered.load(Ordering::SeqCst), 0);
        assert_eq!(work_done.load(Ordering::SeqCst), 0);
        ctx.release_secondaries();

        let action = scr_hal::init::exit_action(&ctx, 0x11, 42, &app, &mut Spin).unwrap();
        assert_eq!(action, ShutdownAction::PowerOff(42));
        // The master only powers off once every secondary has finished.
        assert_eq!(work_done.load(Ordering::SeqCst), HARTS - 1);

        for h in secondaries {
            assert_eq!(h.join().unwrap(), ShutdownAction::Park);
        }
    });

    assert_eq!(app.entered.load(Ordering::SeqCst), HARTS - 1);
    assert_eq!(app.exits.load(Ordering::SeqCst), HARTS);
    assert!(ctx.slots().iter().all(|s| *s == HartSlot::Finished));

    let steps = board.steps.lock().unwrap();
    let barrier_steps = steps
        .iter()
        .filter(|(_, step)| *step == InitStep::SmpBarrier)
        .count();
    assert_eq!(barrier_steps, HARTS - 1);
}

#[test]
fn degraded_boot_leaves_unstarted_harts_out_of_shutdown() {
    let ctx = SmpContext::<HARTS, Coherent>::new(config(0, 0));
    let block = scr_hal::hls::compute_hls_size(&TlsImage::EMPTY, ctx.config());
    let mut mem = vec![0u8; block + block / 2];
    let mut arena = BumpArena::new(&mut mem);

    let report = ctx.smp_init(0, &mut arena, &TlsImage::EMPTY).unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(report.unallocated, 2);
    ctx.release_secondaries();

    thread::scope(|s| {
        let started = s.spawn(|| {
            let boot = scr_hal::secondary_main(
                &ctx,
                1,
                FeatureSet::empty(),
                &NullPlatform,
                &scr_hal::DefaultHooks,
                &mut Spin,
            );
            assert!(matches!(boot, Ok(Some(_))));
            ctx.hart_finit(1)
        });
        let orphan = s.spawn(|| {
            scr_hal::secondary_main(
                &ctx,
                3,
                FeatureSet::empty(),
                &NullPlatform,
                &scr_hal::DefaultHooks,
                &mut Spin,
            )
        });
        assert_eq!(started.join().unwrap(), Ok(()));
        assert_eq!(orphan.join().unwrap(), Ok(None));
    });

    ctx.hart_finit(0).unwrap();
    assert_eq!(ctx.wait_finit(&mut Bounded::new(0)), Ok(()));
    assert_eq!(ctx.hart_finit(2), Err(HalError::InvalidState(2)));
}
