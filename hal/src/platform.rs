//! Seams between the HAL core and the firmware image.
//!
//! [`AppHooks`] are the application's callbacks. [`PlatformOps`] is the
//! board layer: cache controllers, memory protection, peripherals and the
//! power-off register. Both come with no-op defaults so a platform only
//! implements what it has.

use crate::features::FeatureSet;
use crate::init::InitStep;

/// Application callbacks invoked during startup and exit.
pub trait AppHooks: Sync {
    /// Runs once per hart, after early memory protection and before the
    /// caches are brought up.
    fn early_init(&self, boot_hart: bool) {
        let _ = boot_hart;
    }

    /// Runs on every secondary hart once the master releases the barrier.
    fn slave_entry(&self, hartid: usize) {
        let _ = hartid;
    }

    fn exit_message(&self) -> Option<&str> {
        None
    }

    /// Runs on each hart before it marks itself finished.
    fn app_exit(&self) {
        if let Some(msg) = self.exit_message() {
            crate::console::write_fmt(format_args!("{}\n", msg));
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl AppHooks for DefaultHooks {}

/// Board-level operations the init sequencer drives.
pub trait PlatformOps: Sync {
    /// Hardware performance monitor setup.
    fn perf_init_hpm(&self) {}

    fn pmp_early_init(&self) {}

    fn l3cache_init(&self) {}

    fn l2cache_init(&self) {}

    fn l1cache_init(&self) {}

    /// Secondary harts own a private L2 that they must bring up themselves.
    fn l2_dedicated(&self) -> bool {
        false
    }

    fn mpu_init(&self) {}

    fn pmp_init(&self) {}

    /// Memory region table unit.
    fn mrt_init(&self) {}

    fn feature_available(&self, feature: FeatureSet) -> bool {
        let _ = feature;
        false
    }

    fn feature_reset(&self, feature: FeatureSet) {
        let _ = feature;
    }

    fn feature_set(&self, feature: FeatureSet, enable: bool) {
        let _ = (feature, enable);
    }

    fn console_init(&self) {}

    fn rtc_init(&self) {}

    fn leds_init(&self) {}

    /// Write the exit code to the platform halt device. May return on
    /// platforms without one; the caller parks the hart afterwards.
    fn poweroff(&self, code: i32) {
        let _ = code;
    }

    /// Called on `hartid` right before each init step runs.
    fn on_step(&self, hartid: usize, step: InitStep) {
        let _ = (hartid, step);
    }
}

/// A platform with nothing to configure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlatform;

impl PlatformOps for NullPlatform {}
