//! Single-word atomics with selectable hardware support.
//!
//! `Amo` maps onto the A extension: `amoadd.w` for add and an `lr.w`/`sc.w`
//! loop for compare-and-swap that retries until the store succeeds or the
//! comparison fails. `Emulated` is a plain read-modify-write for cores
//! without the A extension. It is NOT atomic across harts; such targets use
//! [`HartMaskLock`](super::lock::HartMaskLock), which needs only loads and
//! stores.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::cache::{CacheMaintenance, PlfCache};

pub trait AtomicMode {
    /// Add `i` and return the previous value.
    fn add<C: CacheMaintenance>(cell: &AtomicI32, i: i32) -> i32;

    /// Store `new` if the current value equals `cmp`. Returns true on success.
    fn cas<C: CacheMaintenance>(cell: &AtomicI32, cmp: i32, new: i32) -> bool;
}

#[cfg(target_has_atomic = "32")]
pub struct Amo;

#[cfg(target_has_atomic = "32")]
impl AtomicMode for Amo {
    #[inline]
    fn add<C: CacheMaintenance>(cell: &AtomicI32, i: i32) -> i32 {
        cell.fetch_add(i, Ordering::Relaxed)
    }

    #[inline]
    fn cas<C: CacheMaintenance>(cell: &AtomicI32, cmp: i32, new: i32) -> bool {
        cell.compare_exchange(cmp, new, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

pub struct Emulated;

impl AtomicMode for Emulated {
    fn add<C: CacheMaintenance>(cell: &AtomicI32, i: i32) -> i32 {
        let out = load::<C>(cell);
        store::<C>(cell, out.wrapping_add(i));
        out
    }

    fn cas<C: CacheMaintenance>(cell: &AtomicI32, cmp: i32, new: i32) -> bool {
        let matched = load::<C>(cell) == cmp;
        if matched {
            store::<C>(cell, new);
        }
        matched
    }
}

#[cfg(all(target_has_atomic = "32", not(feature = "no-atomics")))]
pub type PlfAtomicMode = Amo;

#[cfg(not(all(target_has_atomic = "32", not(feature = "no-atomics"))))]
pub type PlfAtomicMode = Emulated;

#[inline]
fn load<C: CacheMaintenance>(cell: &AtomicI32) -> i32 {
    if C::SOFTWARE_MANAGED {
        C::invalidate_range(cell.as_ptr() as usize, size_of::<i32>());
    }
    cell.load(Ordering::Relaxed)
}

#[inline]
fn store<C: CacheMaintenance>(cell: &AtomicI32, value: i32) {
    cell.store(value, Ordering::Relaxed);
    if C::SOFTWARE_MANAGED {
        C::flush_range(cell.as_ptr() as usize, size_of::<i32>());
    }
}

/// A 32-bit counter shared between harts.
///
/// Loads and stores carry no ordering of their own; callers place
/// `arch::fence_*` where they need it, as the lock code does.
#[repr(transparent)]
pub struct ArchAtomic<M = PlfAtomicMode, C = PlfCache> {
    counter: AtomicI32,
    _mode: PhantomData<fn() -> (M, C)>,
}

impl<M: AtomicMode, C: CacheMaintenance> ArchAtomic<M, C> {
    pub const fn new(value: i32) -> Self {
        Self {
            counter: AtomicI32::new(value),
            _mode: PhantomData,
        }
    }

    #[inline]
    pub fn read(&self) -> i32 {
        load::<C>(&self.counter)
    }

    #[inline]
    pub fn set(&self, value: i32) {
        store::<C>(&self.counter, value)
    }

    /// Returns the value before the addition.
    #[inline]
    pub fn add(&self, i: i32) -> i32 {
        M::add::<C>(&self.counter, i)
    }

    #[inline]
    pub fn cas(&self, cmp: i32, new: i32) -> bool {
        M::cas::<C>(&self.counter, cmp, new)
    }
}

impl<M: AtomicMode, C: CacheMaintenance> Default for ArchAtomic<M, C> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<M: AtomicMode, C: CacheMaintenance> core::fmt::Debug for ArchAtomic<M, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ArchAtomic").field(&self.read()).finish()
    }
}
