//! Spin-wait policies.
//!
//! Every wait in the bring-up handshake polls shared memory until a
//! condition holds. Firmware waits forever with [`Spin`]; test harnesses
//! bound the number of iterations, or drive other "harts" from inside the
//! loop, by passing their own policy.

use crate::arch;
use crate::error::{HalError, HalResult};

pub trait SpinPolicy {
    /// Called once per failed poll. Returning false abandons the wait.
    fn relax(&mut self) -> bool;
}

/// Unbounded busy-wait with the CPU relax hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spin;

impl SpinPolicy for Spin {
    #[inline(always)]
    fn relax(&mut self) -> bool {
        arch::cpu_relax();
        true
    }
}

/// Give up after a fixed number of polls.
#[derive(Debug, Clone, Copy)]
pub struct Bounded {
    remaining: usize,
}

impl Bounded {
    pub const fn new(max_polls: usize) -> Self {
        Self { remaining: max_polls }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl SpinPolicy for Bounded {
    fn relax(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        arch::cpu_relax();
        true
    }
}

impl<F: FnMut() -> bool> SpinPolicy for F {
    fn relax(&mut self) -> bool {
        self()
    }
}

/// Poll `done` until it returns true, consulting `policy` between polls.
pub fn spin_until<P, F>(policy: &mut P, mut done: F) -> HalResult<()>
where
    P: SpinPolicy + ?Sized,
    F: FnMut() -> bool,
{
    loop {
        if done() {
            return Ok(());
        }
        if !policy.relax() {
            return Err(HalError::SpinAborted);
        }
    }
}
