/// Multi-hart synchronization primitives
///
/// Atomics and raw locks are generic over the atomic mode and the cache
/// maintenance strategy; the `Plf*`/`Arch*` aliases pick the build's
/// configuration.

pub mod atomic;
pub mod lock;
pub mod poll;
pub mod spinlock;

pub use atomic::{ArchAtomic, AtomicMode, Emulated, PlfAtomicMode};
#[cfg(target_has_atomic = "32")]
pub use atomic::Amo;
#[cfg(target_has_atomic = "32")]
pub use lock::FlagLock;
pub use lock::{ArchLock, HartMaskLock, NoSmpLock, RawLock, TicketLock};
pub use poll::{Bounded, Spin, SpinPolicy, spin_until};
pub use spinlock::{SpinLock, SpinLockGuard};
