//! Cache maintenance for data shared between harts.
//!
//! On coherent platforms a fence is enough to make a store visible to other
//! harts. On software-managed platforms the writer must push the line out of
//! its L1 (flush) and the reader must drop its stale copy (invalidate) before
//! every access to a shared word. The strategy is a type parameter so the
//! choice is made at compile time, the same way the platform headers select
//! it.

use core::mem::size_of_val;

use crate::arch;
use crate::config::MAX_CACHELINE_SIZE;

pub trait CacheMaintenance {
    /// True when hardware does not keep L1 caches coherent.
    const SOFTWARE_MANAGED: bool;

    /// Write back and invalidate every line overlapping `[addr, addr + len)`.
    fn flush_range(addr: usize, len: usize);

    /// Discard every line overlapping `[addr, addr + len)`.
    fn invalidate_range(addr: usize, len: usize);
}

/// Hardware-coherent caches. Maintenance degenerates to a full fence.
pub struct Coherent;

impl CacheMaintenance for Coherent {
    const SOFTWARE_MANAGED: bool = false;

    #[inline(always)]
    fn flush_range(_addr: usize, _len: usize) {
        arch::fence();
    }

    #[inline(always)]
    fn invalidate_range(_addr: usize, _len: usize) {
        arch::fence();
    }
}

/// Software-managed coherency through the Zicbom cache-block instructions.
pub struct Zicbom;

impl CacheMaintenance for Zicbom {
    const SOFTWARE_MANAGED: bool = true;

    fn flush_range(addr: usize, len: usize) {
        arch::fence();
        for line in lines(addr, len) {
            cbo_flush(line);
        }
        arch::fence();
    }

    fn invalidate_range(addr: usize, len: usize) {
        arch::fence();
        for line in lines(addr, len) {
            cbo_inval(line);
        }
        arch::fence();
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[inline(always)]
fn cbo_flush(line: usize) {
    // cbo.flush 0(rs1)
    unsafe {
        core::arch::asm!(".insn i 0x0F, 2, x0, {0}, 2", in(reg) line, options(nostack));
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[inline(always)]
fn cbo_inval(line: usize) {
    // cbo.inval 0(rs1)
    unsafe {
        core::arch::asm!(".insn i 0x0F, 2, x0, {0}, 0", in(reg) line, options(nostack));
    }
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
#[inline(always)]
fn cbo_flush(_line: usize) {}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
#[inline(always)]
fn cbo_inval(_line: usize) {}

/// Cache maintenance selected by the `non-coherent` feature.
#[cfg(feature = "non-coherent")]
pub type PlfCache = Zicbom;

#[cfg(not(feature = "non-coherent"))]
pub type PlfCache = Coherent;

/// Line-aligned start addresses covering `[addr, addr + len)`.
pub fn lines(addr: usize, len: usize) -> impl Iterator<Item = usize> {
    let start = addr & !(MAX_CACHELINE_SIZE - 1);
    let end = if len == 0 { start } else { addr + len };
    (start..end).step_by(MAX_CACHELINE_SIZE)
}

/// Make this hart's writes to `obj` visible to other harts.
#[inline]
pub fn publish<C: CacheMaintenance, T: ?Sized>(obj: &T) {
    C::flush_range(obj as *const T as *const u8 as usize, size_of_val(obj));
}

/// Drop any stale copy of `obj` before reading what other harts wrote.
#[inline]
pub fn refresh<C: CacheMaintenance, T: ?Sized>(obj: &T) {
    C::invalidate_range(obj as *const T as *const u8 as usize, size_of_val(obj));
}
