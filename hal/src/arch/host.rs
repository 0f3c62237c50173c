use core::sync::atomic::{AtomicU64, Ordering, fence as atomic_fence};

use crate::config::SMP_MASTER_HARTID;

static CYCLES: AtomicU64 = AtomicU64::new(0);

/// Without a hart register every caller is the master hart. Multi-hart
/// code paths take the hart id as an explicit argument instead.
#[inline(always)]
pub fn hart_id() -> usize {
    SMP_MASTER_HARTID
}

/// Monotonic stand-in for `mcycle`.
#[inline]
pub fn cycle() -> u64 {
    CYCLES.fetch_add(1, Ordering::Relaxed) + 1
}

#[inline(always)]
pub fn fence() {
    atomic_fence(Ordering::SeqCst);
}

#[inline(always)]
pub fn fence_acquire() {
    atomic_fence(Ordering::Acquire);
}

#[inline(always)]
pub fn fence_release() {
    atomic_fence(Ordering::Release);
}

#[inline(always)]
pub fn cpu_relax() {
    core::hint::spin_loop();
}

#[inline(always)]
pub fn wfi() {
    core::hint::spin_loop();
}

#[inline(always)]
pub fn thread_pointer() -> usize {
    0
}
