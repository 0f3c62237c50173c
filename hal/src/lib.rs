//! Multi-hart bring-up and synchronization core for SCR RISC-V platforms.
//!
//! The boot hart runs [`init::plf_init_generic`], which configures the
//! platform and publishes a hart-local stack/TLS block for every secondary
//! hart in the [`smp::SmpContext`] start table. Secondaries claim their
//! block, run [`init::secondary_main`] up to the rendezvous barrier and
//! enter the application once the master calls
//! [`smp::SmpContext::release_secondaries`]. At exit every hart goes
//! through [`init::plf_exit`]; the master powers off only after all
//! running harts have finished.
//!
//! Lock and atomic strategies, cache maintenance and the hart layout are
//! chosen at build time through cargo features and `PLF_*` environment
//! variables (see `build.rs`).

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod log;

pub mod arch;
pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod features;
pub mod hls;
pub mod init;
pub mod platform;
pub mod reloc;
pub mod smp;
pub mod sync;
pub mod sysinfo;

pub use config::PlfConfig;
pub use error::{HalError, HalResult};
pub use features::FeatureSet;
pub use hls::{BumpArena, HlsBlock, TlsImage};
pub use init::{BootImage, BootStats, InitStep, plf_exit, plf_init, plf_init_generic, secondary_main};
pub use platform::{AppHooks, DefaultHooks, NullPlatform, PlatformOps};
pub use smp::{BringupReport, HartSlot, PlfSmp, ShutdownAction, SmpContext};
