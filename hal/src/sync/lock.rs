//! Raw spinlocks for multi-hart critical sections.
//!
//! All variants spin without a timeout. A hart that never releases a lock
//! hangs every other hart waiting on it; recovering from that is a watchdog
//! concern.
//!
//! | type           | needs            | fairness          |
//! |----------------|------------------|-------------------|
//! | `TicketLock`   | `amoadd`, lr/sc  | FIFO by ticket    |
//! | `FlagLock`     | `amoswap`        | none              |
//! | `HartMaskLock` | loads and stores | lower hart first  |
//! | `NoSmpLock`    | nothing          | single hart only  |

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU8, Ordering};

#[cfg(target_has_atomic = "32")]
use core::sync::atomic::AtomicI32;

use super::atomic::{ArchAtomic, AtomicMode, PlfAtomicMode};
use crate::arch;
use crate::cache::{CacheMaintenance, PlfCache};
use crate::config::SMP_HARTID_BASE;

pub trait RawLock {
    /// Unlocked state, usable in `static` initializers.
    const INIT: Self;

    /// Whether a successful `lock` excludes every other taker. False for
    /// locks that never block, whose users must track ownership themselves.
    const EXCLUSIVE: bool = true;

    fn lock(&self);

    /// Single attempt; never blocks.
    fn try_lock(&self) -> bool;

    fn unlock(&self);

    fn is_locked(&self) -> bool;

    /// Spin until the lock is observed free, without taking it.
    fn unlock_wait(&self) {
        loop {
            arch::cpu_relax();
            if !self.is_locked() {
                break;
            }
        }
    }
}

/// Ticket spinlock: two counters, the FIFO head (`owner`) and tail.
///
/// A hart takes a ticket by atomically incrementing `tail` and spins until
/// `owner` reaches it. Release hands the lock to the next ticket by
/// incrementing `owner`.
pub struct TicketLock<M: AtomicMode = PlfAtomicMode, C: CacheMaintenance = PlfCache> {
    owner: ArchAtomic<M, C>,
    tail: ArchAtomic<M, C>,
}

impl<M: AtomicMode, C: CacheMaintenance> TicketLock<M, C> {
    pub const fn new() -> Self {
        Self {
            owner: ArchAtomic::new(0),
            tail: ArchAtomic::new(0),
        }
    }

    /// Acquire and return the ticket this hart was served under.
    pub fn lock_ticket(&self) -> i32 {
        let ticket = self.tail.add(1);
        while ticket != self.owner.read() {
            arch::cpu_relax();
        }
        arch::fence_acquire();
        ticket
    }

    /// Ticket currently being served.
    pub fn owner(&self) -> i32 {
        self.owner.read()
    }
}

impl<M: AtomicMode, C: CacheMaintenance> RawLock for TicketLock<M, C> {
    const INIT: Self = Self::new();

    #[inline]
    fn lock(&self) {
        self.lock_ticket();
    }

    fn try_lock(&self) -> bool {
        let owner = self.owner.read();
        let taken = self.tail.cas(owner, owner.wrapping_add(1));
        arch::fence_acquire();
        taken
    }

    #[inline]
    fn unlock(&self) {
        arch::fence_release();
        self.owner.add(1);
    }

    fn is_locked(&self) -> bool {
        let owner = self.owner.read();
        !self.tail.cas(owner, owner)
    }
}

/// Test-and-set lock on a single word (`amoswap.w.aq` / `amoswap.w.rl`).
#[cfg(target_has_atomic = "32")]
pub struct FlagLock<C: CacheMaintenance = PlfCache> {
    lock: AtomicI32,
    _cache: PhantomData<fn() -> C>,
}

#[cfg(target_has_atomic = "32")]
impl<C: CacheMaintenance> FlagLock<C> {
    pub const fn new() -> Self {
        Self {
            lock: AtomicI32::new(0),
            _cache: PhantomData,
        }
    }
}

#[cfg(target_has_atomic = "32")]
impl<C: CacheMaintenance> RawLock for FlagLock<C> {
    const INIT: Self = Self::new();

    fn lock(&self) {
        loop {
            if self.is_locked() {
                arch::cpu_relax();
                continue;
            }
            if self.try_lock() {
                break;
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.lock.swap(1, Ordering::Acquire) == 0
    }

    #[inline]
    fn unlock(&self) {
        self.lock.swap(0, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        if C::SOFTWARE_MANAGED {
            C::invalidate_range(self.lock.as_ptr() as usize, size_of::<i32>());
        }
        self.lock.load(Ordering::Relaxed) != 0
    }
}

/// Lock for cores without atomic read-modify-write instructions.
///
/// Each hart owns one byte flag (eight bits per hart, packed into xlen
/// words in memory) and only ever writes its own. Acquisition follows the
/// one-bit mutual exclusion scheme: a hart raises its flag only when no
/// lower-numbered hart has raised one, backs off if one appears, and then
/// waits for every higher-numbered hart to drop its flag. Lower hart
/// indices win ties, so there is no fairness guarantee.
pub struct HartMaskLock<const N: usize, C: CacheMaintenance = PlfCache> {
    flags: [AtomicU8; N],
    _cache: PhantomData<fn() -> C>,
}

impl<const N: usize, C: CacheMaintenance> HartMaskLock<N, C> {
    pub const fn new() -> Self {
        Self {
            flags: [const { AtomicU8::new(0) }; N],
            _cache: PhantomData,
        }
    }

    #[inline]
    fn raised(&self, hart: usize) -> bool {
        let flag = &self.flags[hart];
        if C::SOFTWARE_MANAGED {
            C::invalidate_range(flag.as_ptr() as usize, 1);
        }
        flag.load(Ordering::SeqCst) != 0
    }

    #[inline]
    fn raise(&self, hart: usize, up: bool) {
        let flag = &self.flags[hart];
        flag.store(up as u8, Ordering::SeqCst);
        if C::SOFTWARE_MANAGED {
            C::flush_range(flag.as_ptr() as usize, 1);
        }
        arch::fence();
    }

    /// Acquire on behalf of the hart with normalized index `hart`.
    pub fn lock_as(&self, hart: usize) {
        'retry: loop {
            self.raise(hart, false);
            for other in 0..hart {
                if self.raised(other) {
                    arch::cpu_relax();
                    continue 'retry;
                }
            }
            self.raise(hart, true);
            for other in 0..hart {
                if self.raised(other) {
                    continue 'retry;
                }
            }
            break;
        }
        for other in hart + 1..N {
            while self.raised(other) {
                arch::cpu_relax();
            }
        }
        arch::fence_acquire();
    }

    pub fn try_lock_as(&self, hart: usize) -> bool {
        self.raise(hart, true);
        if self.held_by_other(hart) {
            self.raise(hart, false);
            return false;
        }
        arch::fence_acquire();
        true
    }

    pub fn unlock_as(&self, hart: usize) {
        arch::fence_release();
        self.raise(hart, false);
    }

    /// Whether any hart other than `hart` has its flag raised.
    pub fn held_by_other(&self, hart: usize) -> bool {
        (0..N).any(|other| other != hart && self.raised(other))
    }

    /// Whether any flag is raised. A hart that is still contending also
    /// counts, so this may briefly report true for an unheld lock.
    pub fn any_raised(&self) -> bool {
        (0..N).any(|hart| self.raised(hart))
    }
}

#[inline]
fn current_hart_index() -> usize {
    arch::hart_id() - SMP_HARTID_BASE
}

/// Takes the flag of the calling hart. Host builds have no hart register
/// and every thread maps to the master's flag, so there the lock is not
/// exclusive: threads must use [`HartMaskLock::lock_as`] with their own
/// index.
impl<const N: usize, C: CacheMaintenance> RawLock for HartMaskLock<N, C> {
    const INIT: Self = Self::new();
    const EXCLUSIVE: bool = cfg!(any(target_arch = "riscv32", target_arch = "riscv64"));

    fn lock(&self) {
        self.lock_as(current_hart_index());
    }

    fn try_lock(&self) -> bool {
        self.try_lock_as(current_hart_index())
    }

    fn unlock(&self) {
        self.unlock_as(current_hart_index());
    }

    fn is_locked(&self) -> bool {
        self.any_raised()
    }
}

/// Lock for single-hart platforms. Every operation is a no-op.
///
/// [`SpinLock`](super::SpinLock) over this lock still refuses a second
/// guard while one is alive.
pub struct NoSmpLock;

impl RawLock for NoSmpLock {
    const INIT: Self = NoSmpLock;
    const EXCLUSIVE: bool = false;

    #[inline(always)]
    fn lock(&self) {}

    #[inline(always)]
    fn try_lock(&self) -> bool {
        true
    }

    #[inline(always)]
    fn unlock(&self) {}

    #[inline(always)]
    fn is_locked(&self) -> bool {
        false
    }

    #[inline(always)]
    fn unlock_wait(&self) {}
}

/// Platform lock selected by the `smp`, `no-atomics` and `ticket-spinlocks`
/// features.
#[cfg(not(feature = "smp"))]
pub type ArchLock = NoSmpLock;

#[cfg(all(
    feature = "smp",
    any(feature = "no-atomics", not(target_has_atomic = "32"))
))]
pub type ArchLock = HartMaskLock<{ crate::config::SMP_HART_NUM }, PlfCache>;

#[cfg(all(
    feature = "smp",
    feature = "ticket-spinlocks",
    not(feature = "no-atomics"),
    target_has_atomic = "32"
))]
pub type ArchLock = TicketLock<PlfAtomicMode, PlfCache>;

#[cfg(all(
    feature = "smp",
    not(feature = "ticket-spinlocks"),
    not(feature = "no-atomics"),
    target_has_atomic = "32"
))]
pub type ArchLock = FlagLock<PlfCache>;
