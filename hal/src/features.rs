use bitflags::bitflags;

use crate::platform::PlatformOps;

bitflags! {
    /// Core micro-architectural features with a platform enable bit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct FeatureSet: u16 {
        const BPU_EARLY_BRANCH_RESOLUTION = 1 << 0;
        const BPU_LOOP_PREDICTOR = 1 << 1;
        const L1D_STORE_MERGE = 1 << 2;
        const L1D_LOAD_SPEC = 1 << 3;
        const L1D_LOAD_OVER_STORE_SPEC = 1 << 4;
        const L1D_LOAD_STORE_DEP_PREDICTOR = 1 << 5;
        const L1D_PREFETCHER = 1 << 6;
        const L1I_PREFETCHER = 1 << 7;
        const PAGE_PREFETCHER = 1 << 8;
        const MISALIGNED_ACCESS = 1 << 9;
    }
}

/// Bring every available feature to a known state: reset it, then enable
/// it if it is in `wanted`, otherwise disable it. Features the core does
/// not implement are skipped. Returns the set that ended up enabled.
pub fn init_features<P: PlatformOps + ?Sized>(ops: &P, wanted: FeatureSet) -> FeatureSet {
    let mut enabled = FeatureSet::empty();
    for feature in FeatureSet::all().iter() {
        if !ops.feature_available(feature) {
            continue;
        }
        ops.feature_reset(feature);
        let on = wanted.contains(feature);
        ops.feature_set(feature, on);
        if on {
            enabled |= feature;
        }
    }
    debug!("features: wanted {:?}, enabled {:?}", wanted, enabled);
    enabled
}
