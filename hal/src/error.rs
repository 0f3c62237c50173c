use core::fmt;

/// Failures reported by the HAL.
///
/// Most of the bring-up path has no failure mode at all; the variants here
/// cover resource exhaustion, misuse of hart ids and injected spin limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The bump allocator cannot satisfy a hart-local storage request.
    OutOfMemory,
    /// The hart id is outside `[hartid_base, hartid_base + hart_count)`.
    InvalidHart(usize),
    /// A master-only operation was invoked on a secondary hart.
    NotMaster(usize),
    /// A start-table slot is not in a state that allows the transition.
    InvalidState(usize),
    /// Inconsistent platform configuration.
    InvalidConfig(&'static str),
    /// A bounded spin policy gave up before the condition held.
    SpinAborted,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::OutOfMemory => write!(f, "Out of memory"),
            HalError::InvalidHart(id) => write!(f, "Invalid hart id {}", id),
            HalError::NotMaster(id) => write!(f, "Hart {} is not the master hart", id),
            HalError::InvalidState(idx) => write!(f, "Invalid start table state for slot {}", idx),
            HalError::InvalidConfig(why) => write!(f, "Invalid platform configuration: {}", why),
            HalError::SpinAborted => write!(f, "Spin wait aborted"),
        }
    }
}

pub type HalResult<T> = Result<T, HalError>;
