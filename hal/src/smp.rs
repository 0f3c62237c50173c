//! Multi-hart bring-up and shutdown handshake.
//!
//! The master hart owns an [`SmpContext`]: the hart start table plus the
//! barrier flag secondaries spin on. A slot moves strictly forward:
//!
//! ```text
//! Unallocated -> Published(tp) -> Running -> Finished
//! ```
//!
//! The master writes every slot during [`SmpContext::smp_init`] (its own
//! slot goes straight to `Running`). Afterwards each secondary writes only
//! its own slot: `claim_hls` on entry and `hart_finit` on exit. All
//! cross-hart visibility goes through the context's cache strategy, so
//! the same code runs on coherent and software-managed platforms.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{self, CacheMaintenance, PlfCache};
use crate::config::{PlfConfig, SMP_HART_NUM};
use crate::error::{HalError, HalResult};
use crate::features::{self, FeatureSet};
use crate::hls::{self, BumpArena, TlsImage};
use crate::init::{InitStep, SECONDARY_SEQUENCE};
use crate::platform::{AppHooks, PlatformOps};
use crate::sync::atomic::{ArchAtomic, PlfAtomicMode};
use crate::sync::poll::{SpinPolicy, spin_until};

const SLOT_UNALLOCATED: usize = 0;
const SLOT_FINISHED: usize = 1;
const SLOT_RUNNING: usize = usize::MAX;

/// Decoded state of one start-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HartSlot {
    Unallocated,
    /// Thread pointer of the hart-local block waiting for its hart.
    Published(usize),
    Running,
    Finished,
}

impl HartSlot {
    const fn encode(self) -> usize {
        match self {
            HartSlot::Unallocated => SLOT_UNALLOCATED,
            HartSlot::Published(tp) => tp,
            HartSlot::Running => SLOT_RUNNING,
            HartSlot::Finished => SLOT_FINISHED,
        }
    }

    const fn decode(raw: usize) -> Self {
        match raw {
            SLOT_UNALLOCATED => HartSlot::Unallocated,
            SLOT_RUNNING => HartSlot::Running,
            SLOT_FINISHED => HartSlot::Finished,
            tp => HartSlot::Published(tp),
        }
    }

    /// The hart has been started, whether or not it has finished since.
    pub fn is_present(&self) -> bool {
        matches!(self, HartSlot::Running | HartSlot::Finished)
    }
}

/// Hart start table: one word per hart, laid out like the array early
/// startup code reads before any Rust runs.
#[repr(C)]
pub struct HartStartTable<const N: usize> {
    slots: [AtomicUsize; N],
}

impl<const N: usize> HartStartTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicUsize::new(SLOT_UNALLOCATED) }; N],
        }
    }

    fn load(&self, idx: usize) -> HartSlot {
        HartSlot::decode(self.slots[idx].load(Ordering::Acquire))
    }

    fn store(&self, idx: usize, slot: HartSlot) {
        self.slots[idx].store(slot.encode(), Ordering::Release);
    }

    pub fn as_ptr(&self) -> *const usize {
        self.slots.as_ptr() as *const usize
    }
}

impl<const N: usize> Default for HartStartTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of the master's allocation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BringupReport {
    /// Secondary harts that received a hart-local block.
    pub published: usize,
    /// Secondary harts left without one because the arena ran out.
    pub unallocated: usize,
}

/// What a hart does after its exit bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAction {
    /// Master: every started hart has finished; halt with the first
    /// nonzero exit code any hart reported.
    PowerOff(i32),
    /// Secondary: stop here without waiting for anyone.
    Park,
}

/// Shared bring-up state for `N` harts.
pub struct SmpContext<const N: usize, C: CacheMaintenance = PlfCache> {
    config: PlfConfig,
    table: HartStartTable<N>,
    sync_var: AtomicUsize,
    exit_code: ArchAtomic<PlfAtomicMode, C>,
    _cache: PhantomData<fn() -> C>,
}

/// Context sized by the build configuration.
pub type PlfSmp = SmpContext<SMP_HART_NUM, PlfCache>;

impl<const N: usize, C: CacheMaintenance> SmpContext<N, C> {
    pub const fn new(config: PlfConfig) -> Self {
        assert!(config.hart_count == N, "hart count does not match table size");
        Self {
            config,
            table: HartStartTable::new(),
            sync_var: AtomicUsize::new(0),
            exit_code: ArchAtomic::new(0),
            _cache: PhantomData,
        }
    }

    pub fn config(&self) -> &PlfConfig {
        &self.config
    }

    pub fn table(&self) -> &HartStartTable<N> {
        &self.table
    }

    fn refresh_table(&self) {
        cache::refresh::<C, _>(&self.table);
    }

    fn publish_table(&self) {
        cache::publish::<C, _>(&self.table);
    }

    /// Current state of `hartid`'s slot as seen by this hart.
    pub fn slot(&self, hartid: usize) -> HalResult<HartSlot> {
        let idx = self.config.index_of(hartid)?;
        self.refresh_table();
        Ok(self.table.load(idx))
    }

    /// Snapshot of every slot, in hart index order.
    pub fn slots(&self) -> [HartSlot; N] {
        self.refresh_table();
        core::array::from_fn(|idx| self.table.load(idx))
    }

    /// Allocate, initialize and publish a hart-local block for every
    /// secondary hart, then mark the master running.
    ///
    /// Running out of arena stops the allocation pass; the harts not yet
    /// served stay `Unallocated` and never start. That is a degraded boot,
    /// reported in the returned [`BringupReport`], not an error.
    pub fn smp_init(
        &self,
        hartid: usize,
        arena: &mut BumpArena,
        image: &TlsImage,
    ) -> HalResult<BringupReport> {
        if !self.config.is_master(hartid) {
            return Err(HalError::NotMaster(hartid));
        }
        let master = self.config.master_index();
        self.refresh_table();
        if let Some(idx) = (0..N).find(|idx| self.table.load(*idx) != HartSlot::Unallocated) {
            return Err(HalError::InvalidState(idx));
        }

        let mut report = BringupReport::default();
        let mut exhausted = false;
        for idx in (0..N).filter(|idx| *idx != master) {
            if exhausted {
                report.unallocated += 1;
                continue;
            }
            match hls::allocate_thread_block(arena, image, &self.config) {
                Ok(block) => {
                    hls::init_tls::<C>(arena, &block, image, &self.config);
                    let tp = arena.thread_pointer(&block);
                    self.table.store(idx, HartSlot::Published(tp));
                    report.published += 1;
                    debug!("hart {}: HLS published, tp={:#x}", self.config.hartid_of(idx), tp);
                }
                Err(err) => {
                    warn!(
                        "hart {}: {} allocating HLS, remaining harts stay offline",
                        self.config.hartid_of(idx),
                        err
                    );
                    exhausted = true;
                    report.unallocated += 1;
                }
            }
        }
        self.table.store(master, HartSlot::Running);
        self.publish_table();

        info!(
            "smp: {} of {} secondary harts published",
            report.published,
            self.config.secondary_count()
        );
        Ok(report)
    }

    /// Take ownership of the block published for `hartid` and mark the
    /// hart running. Returns the thread pointer to install, or `None` when
    /// the master had no storage to give this hart.
    pub fn claim_hls(&self, hartid: usize) -> HalResult<Option<usize>> {
        let idx = self.config.index_of(hartid)?;
        if self.config.is_master(hartid) {
            return Err(HalError::InvalidState(idx));
        }
        self.refresh_table();
        match self.table.load(idx) {
            HartSlot::Unallocated => Ok(None),
            HartSlot::Published(tp) => {
                self.table.store(idx, HartSlot::Running);
                self.publish_table();
                Ok(Some(tp))
            }
            HartSlot::Running | HartSlot::Finished => Err(HalError::InvalidState(idx)),
        }
    }

    /// Secondary-hart setup, ending at the rendezvous barrier.
    ///
    /// Returns the features enabled on this hart once the master has
    /// released the barrier.
    pub fn slave_init<P, H, S>(
        &self,
        hartid: usize,
        ops: &P,
        hooks: &H,
        wanted: FeatureSet,
        policy: &mut S,
    ) -> HalResult<FeatureSet>
    where
        P: PlatformOps + ?Sized,
        H: AppHooks + ?Sized,
        S: SpinPolicy + ?Sized,
    {
        self.config.index_of(hartid)?;
        let mut enabled = FeatureSet::empty();
        for step in SECONDARY_SEQUENCE {
            ops.on_step(hartid, step);
            match step {
                InitStep::PerfCounters => ops.perf_init_hpm(),
                InitStep::PmpEarly => ops.pmp_early_init(),
                InitStep::EarlyInitHook => hooks.early_init(false),
                InitStep::L2Cache => {
                    if ops.l2_dedicated() {
                        ops.l2cache_init();
                    }
                }
                InitStep::L1Cache => ops.l1cache_init(),
                InitStep::Mpu => ops.mpu_init(),
                InitStep::Pmp => ops.pmp_init(),
                InitStep::Features => enabled = features::init_features(ops, wanted),
                InitStep::SmpBarrier => self.wait_release(policy)?,
                _ => {}
            }
        }
        Ok(enabled)
    }

    /// Let secondary harts past the barrier.
    pub fn release_secondaries(&self) {
        self.sync_var.store(1, Ordering::Release);
        cache::publish::<C, _>(&self.sync_var);
        debug!("smp: secondaries released");
    }

    pub fn is_released(&self) -> bool {
        cache::refresh::<C, _>(&self.sync_var);
        self.sync_var.load(Ordering::Acquire) != 0
    }

    /// Spin until the master calls [`release_secondaries`](Self::release_secondaries).
    pub fn wait_release<S: SpinPolicy + ?Sized>(&self, policy: &mut S) -> HalResult<()> {
        spin_until(policy, || self.is_released())
    }

    /// Mark `hartid` finished. Finishing twice is harmless; finishing a
    /// hart that was never given a slot is not.
    pub fn hart_finit(&self, hartid: usize) -> HalResult<()> {
        let idx = self.config.index_of(hartid)?;
        self.refresh_table();
        match self.table.load(idx) {
            HartSlot::Finished => Ok(()),
            HartSlot::Unallocated => Err(HalError::InvalidState(idx)),
            HartSlot::Published(_) | HartSlot::Running => {
                self.table.store(idx, HartSlot::Finished);
                self.publish_table();
                Ok(())
            }
        }
    }

    /// Whether no slot is still `Running`.
    pub fn all_finished(&self) -> bool {
        self.refresh_table();
        (0..N).all(|idx| self.table.load(idx) != HartSlot::Running)
    }

    /// Spin until every running hart has called [`hart_finit`](Self::hart_finit).
    /// Harts that were published but never claimed are not waited for.
    pub fn wait_finit<S: SpinPolicy + ?Sized>(&self, policy: &mut S) -> HalResult<()> {
        spin_until(policy, || self.all_finished())
    }

    /// Keep `code` as the platform exit code unless some hart already
    /// reported a nonzero one. Zero never overrides.
    pub fn record_exit_code(&self, code: i32) {
        if code != 0 && self.exit_code.cas(0, code) {
            cache::publish::<C, _>(&self.exit_code);
        }
    }

    /// First nonzero code recorded by any hart, or zero.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.read()
    }

    /// Exit bookkeeping for `hartid`: record the exit code, run the exit
    /// hook and mark the hart finished. The master then waits for every
    /// running hart.
    ///
    /// Calling this again for a hart that already finished (after a
    /// bounded wait gave up) only repeats the wait.
    pub fn shutdown<H, S>(
        &self,
        hartid: usize,
        code: i32,
        hooks: &H,
        policy: &mut S,
    ) -> HalResult<ShutdownAction>
    where
        H: AppHooks + ?Sized,
        S: SpinPolicy + ?Sized,
    {
        if self.slot(hartid)? != HartSlot::Finished {
            self.record_exit_code(code);
            hooks.app_exit();
            self.hart_finit(hartid)?;
        }
        if !self.config.is_master(hartid) {
            return Ok(ShutdownAction::Park);
        }
        self.wait_finit(policy)?;
        let code = self.exit_code();
        info!("smp: all harts finished, exit code {}", code);
        Ok(ShutdownAction::PowerOff(code))
    }
}
