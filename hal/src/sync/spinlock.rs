use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use super::lock::{ArchLock, RawLock};

/// Data protected by a raw hart lock.
///
/// The lock strategy defaults to the platform's [`ArchLock`]; tests and
/// drivers with special needs pick another [`RawLock`].
///
/// Over a lock that is not [`RawLock::EXCLUSIVE`] (the single-hart
/// [`NoSmpLock`](super::NoSmpLock)) a guard marks the data borrowed:
/// `try_lock` then returns `None` and a nested `lock` panics, like a
/// `RefCell`.
pub struct SpinLock<T, L: RawLock = ArchLock> {
    lock: L,
    borrowed: AtomicBool,
    data: UnsafeCell<T>,
}

/// RAII guard for SpinLock
pub struct SpinLockGuard<'a, T, L: RawLock = ArchLock> {
    lock: &'a SpinLock<T, L>,
}

unsafe impl<T: Send, L: RawLock + Sync> Sync for SpinLock<T, L> {}
unsafe impl<T: Send, L: RawLock + Send> Send for SpinLock<T, L> {}

impl<T, L: RawLock> SpinLock<T, L> {
    pub const fn new(data: T) -> Self {
        Self {
            lock: L::INIT,
            borrowed: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning until it becomes available
    ///
    /// # Panics
    ///
    /// Over a non-exclusive lock, if a guard for this lock is still alive.
    pub fn lock(&self) -> SpinLockGuard<'_, T, L> {
        self.lock.lock();
        if !self.claim() {
            panic!("SpinLock already locked");
        }
        SpinLockGuard { lock: self }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T, L>> {
        if !self.lock.try_lock() {
            return None;
        }
        if !self.claim() {
            self.lock.unlock();
            return None;
        }
        Some(SpinLockGuard { lock: self })
    }

    /// Mark the data borrowed. Always succeeds over an exclusive lock.
    #[cfg(target_has_atomic = "8")]
    fn claim(&self) -> bool {
        L::EXCLUSIVE || !self.borrowed.swap(true, Ordering::Acquire)
    }

    // Without read-modify-write atomics there is only the one hart.
    #[cfg(not(target_has_atomic = "8"))]
    fn claim(&self) -> bool {
        if L::EXCLUSIVE {
            return true;
        }
        if self.borrowed.load(Ordering::Relaxed) {
            return false;
        }
        self.borrowed.store(true, Ordering::Relaxed);
        true
    }

    fn release(&self) {
        if !L::EXCLUSIVE {
            self.borrowed.store(false, Ordering::Release);
        }
        self.lock.unlock();
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Spin until no hart holds the lock, without acquiring it.
    pub fn unlock_wait(&self) {
        self.lock.unlock_wait();
    }

    pub fn raw(&self) -> &L {
        &self.lock
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Force unlock (unsafe - only use in exceptional circumstances)
    pub unsafe fn force_unlock(&self) {
        self.release();
    }
}

impl<T, L: RawLock> Drop for SpinLockGuard<'_, T, L> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl<T, L: RawLock> Deref for SpinLockGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, L: RawLock> DerefMut for SpinLockGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: fmt::Debug, L: RawLock> fmt::Debug for SpinLock<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("data", &*guard).finish(),
            None => f.debug_struct("SpinLock").field("data", &"<locked>").finish(),
        }
    }
}

impl<T: Default, L: RawLock> Default for SpinLock<T, L> {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Coherent;
    use crate::sync::atomic::Amo;
    use crate::sync::lock::{FlagLock, NoSmpLock, TicketLock};
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_guard_releases_on_drop() {
        let lock: SpinLock<u32, TicketLock<Amo, Coherent>> = SpinLock::new(1);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 2);
    }

    #[test]
    fn test_counter_under_contention() {
        let lock: Arc<SpinLock<u64, FlagLock<Coherent>>> = Arc::new(SpinLock::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    fn test_debug_shows_locked_state() {
        let lock: SpinLock<u8, TicketLock<Amo, Coherent>> = SpinLock::new(7);
        assert_eq!(std::format!("{:?}", lock), "SpinLock { data: 7 }");
        let _guard = lock.lock();
        assert_eq!(std::format!("{:?}", lock), "SpinLock { data: \"<locked>\" }");
    }

    #[test]
    fn test_no_smp_lock_never_reports_held() {
        let lock: SpinLock<(), NoSmpLock> = SpinLock::new(());
        let _a = lock.lock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_no_smp_guard_is_unique() {
        let lock: SpinLock<u32, NoSmpLock> = SpinLock::new(0);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(lock.try_lock().is_none());
            assert_eq!(std::format!("{:?}", lock), "SpinLock { data: \"<locked>\" }");
            // Formatting must not have released the live guard.
            assert!(lock.try_lock().is_none());
        }
        let mut again = lock.try_lock().unwrap();
        *again += 1;
        drop(again);
        assert_eq!(*lock.lock(), 2);
    }

    #[test]
    #[should_panic(expected = "already locked")]
    fn test_no_smp_nested_lock_panics() {
        let lock: SpinLock<u32, NoSmpLock> = SpinLock::new(0);
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn test_no_smp_guard_excludes_other_threads() {
        let lock: Arc<SpinLock<u32, NoSmpLock>> = Arc::new(SpinLock::new(0));
        let guard = lock.lock();
        let other = {
            let lock = lock.clone();
            thread::spawn(move || lock.try_lock().is_none())
        };
        assert!(other.join().unwrap());
        drop(guard);
    }
}
