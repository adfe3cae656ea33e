// ============================================================
// Layer 4 — Volume Preprocessor
// ============================================================
// Brings every scan into the same intensity range before it is
// degraded and batched.
//
// Scanner output is in arbitrary units (and raw files may hold
// anything), so each volume is min-max scaled independently:
//
//   v' = (v - min) / (max - min)      → [0, 1]
//
// A constant volume has max == min; it maps to all zeros.
// Non-finite voxels are left for the loss check to catch.

use crate::domain::volume::Volume;

pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Min-max scale a volume into [0, 1], returning a new array.
    pub fn normalize(&self, volume: &Volume) -> Volume {
        let (min, max) = volume
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let range = max - min;
        if !range.is_finite() || range <= 0.0 {
            return Volume::zeros(volume.raw_dim());
        }

        volume.mapv(|v| (v - min) / range)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}
