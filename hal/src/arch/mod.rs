//! Architecture primitives used by the synchronization code: hart id,
//! fences, the spin-wait relax hint and halting.
//!
//! On RISC-V these are single instructions. Other targets (host unit tests,
//! simulators) get portable fallbacks with the same ordering guarantees.

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod riscv;
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use self::riscv::*;

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
mod host;
#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
pub use self::host::*;

/// Stop this hart for good.
pub fn park() -> ! {
    loop {
        wfi();
    }
}
