use core::arch::asm;

#[cfg(target_arch = "riscv32")]
use riscv::register::mcycleh;
use riscv::register::{mcycle, mhartid};

/// Hardware id of the calling hart
#[inline(always)]
pub fn hart_id() -> usize {
    mhartid::read()
}

#[cfg(target_arch = "riscv64")]
#[inline]
pub fn cycle() -> u64 {
    mcycle::read() as u64
}

#[cfg(target_arch = "riscv32")]
pub fn cycle() -> u64 {
    // Re-read the high half in case the low half wrapped in between.
    loop {
        let hi = mcycleh::read();
        let lo = mcycle::read();
        if hi == mcycleh::read() {
            return ((hi as u64) << 32) | lo as u64;
        }
    }
}

/// Full `fence rw, rw`.
#[inline(always)]
pub fn fence() {
    unsafe {
        asm!("fence rw, rw", options(nostack, preserves_flags));
    }
}

/// Acquire barrier: later accesses stay after earlier loads.
#[inline(always)]
pub fn fence_acquire() {
    unsafe {
        asm!("fence r, rw", options(nostack, preserves_flags));
    }
}

/// Release barrier: earlier accesses complete before later stores.
#[inline(always)]
pub fn fence_release() {
    unsafe {
        asm!("fence rw, w", options(nostack, preserves_flags));
    }
}

/// Spin-wait hint. A divide by zero stalls the pipeline for a few cycles
/// without side effects on cores with the M extension.
#[inline(always)]
pub fn cpu_relax() {
    #[cfg(target_feature = "m")]
    unsafe {
        let mut dummy: usize = 0;
        asm!("div {0}, {0}, zero", inout(reg) dummy, options(nomem, nostack, preserves_flags));
        let _ = dummy;
    }

    #[cfg(not(target_feature = "m"))]
    unsafe {
        asm!("nop", options(nomem, nostack, preserves_flags));
    }
}

#[inline(always)]
pub fn wfi() {
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

/// Current thread pointer, i.e. the base of this hart's TLS block.
#[inline(always)]
pub fn thread_pointer() -> usize {
    let tp: usize;
    unsafe {
        asm!("mv {}, tp", out(reg) tp, options(nomem, nostack, preserves_flags));
    }
    tp
}
