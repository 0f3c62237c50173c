use crate::error::{HalError, HalResult};
use crate::log::LogLevel;

// SMP_HART_NUM, SMP_HARTID_BASE, SMP_MASTER_HARTID, TRAP_STACK, HLS_MIN_STACK_SIZE
include!(concat!(env!("OUT_DIR"), "/plf_config.rs"));

/// Largest cache line of any supported core. HLS blocks and cache
/// maintenance ranges are aligned to it.
pub const MAX_CACHELINE_SIZE: usize = 64;

pub const SMP_SUPPORT: bool = cfg!(feature = "smp");
pub const SMP_NON_COHERENT: bool = cfg!(feature = "non-coherent");
pub const ICCM_L3_SUPPORT: bool = cfg!(feature = "iccm-l3");
pub const ATOMIC_SUPPORTED: bool = cfg!(all(target_has_atomic = "32", not(feature = "no-atomics")));

// 日志配置
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Debug;

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Multi-hart layout of a platform.
///
/// `PlfConfig::BUILD` mirrors the constants generated by `build.rs`; tests
/// and simulators build their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlfConfig {
    pub hart_count: usize,
    pub hartid_base: usize,
    pub master_hartid: usize,
    /// Minimum stack carved for every secondary hart.
    pub hls_min_stack: usize,
    pub cacheline: usize,
    /// Flush TLS images after writing them even on coherent platforms.
    pub flush_tls: bool,
}

impl PlfConfig {
    pub const BUILD: Self = Self {
        hart_count: SMP_HART_NUM,
        hartid_base: SMP_HARTID_BASE,
        master_hartid: SMP_MASTER_HARTID,
        hls_min_stack: HLS_MIN_STACK_SIZE,
        cacheline: MAX_CACHELINE_SIZE,
        flush_tls: ICCM_L3_SUPPORT,
    };

    /// Configuration with `hart_count` harts numbered from zero, hart 0 master.
    pub const fn with_harts(hart_count: usize) -> Self {
        Self {
            hart_count,
            hartid_base: 0,
            master_hartid: 0,
            ..Self::BUILD
        }
    }

    pub fn validate(&self) -> HalResult<()> {
        if self.hart_count == 0 {
            return Err(HalError::InvalidConfig("hart count is zero"));
        }
        if !self.cacheline.is_power_of_two() {
            return Err(HalError::InvalidConfig("cache line size is not a power of two"));
        }
        if self.master_hartid < self.hartid_base
            || self.master_hartid >= self.hartid_base + self.hart_count
        {
            return Err(HalError::InvalidConfig("master hart outside hart id range"));
        }
        Ok(())
    }

    /// Normalized start-table index of a hart id.
    #[inline]
    pub fn index_of(&self, hartid: usize) -> HalResult<usize> {
        hartid
            .checked_sub(self.hartid_base)
            .filter(|idx| *idx < self.hart_count)
            .ok_or(HalError::InvalidHart(hartid))
    }

    #[inline]
    pub fn hartid_of(&self, index: usize) -> usize {
        self.hartid_base + index
    }

    #[inline]
    pub fn master_index(&self) -> usize {
        self.master_hartid - self.hartid_base
    }

    #[inline]
    pub fn is_master(&self, hartid: usize) -> bool {
        hartid == self.master_hartid
    }

    pub fn secondary_count(&self) -> usize {
        self.hart_count - 1
    }
}
