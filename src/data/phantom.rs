// ============================================================
// Layer 4 — Synthetic Phantom Source
// ============================================================
// Generates scan-like volumes so the full pipeline can run
// without a dataset on disk.
//
// Each phantom is a sum of soft-edged ellipsoids with random
// centre, radii and intensity:
//
//   v(p) = Σ_k  a_k · σ( s · (1 - ‖(p - c_k) / r_k‖²) )
//
// followed by min-max normalisation into [0, 1].
// The generator is a seeded StdRng, so the same seed always
// yields the same corpus (which keeps the train/validation
// split stable across restarts).

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::preprocessor::Normalizer;
use crate::domain::traits::VolumeSource;
use crate::domain::volume::{ScanVolume, Volume};

/// Edge sharpness of each ellipsoid
const EDGE_SHARPNESS: f32 = 12.0;

#[derive(Debug, Clone)]
pub struct PhantomSource {
    count:      usize,
    shape:      [usize; 3],
    ellipsoids: usize,
    seed:       u64,
}

impl PhantomSource {
    pub fn new(count: usize, shape: [usize; 3], seed: u64) -> Self {
        Self { count, shape, ellipsoids: 4, seed }
    }

    pub fn with_ellipsoids(mut self, ellipsoids: usize) -> Self {
        self.ellipsoids = ellipsoids.max(1);
        self
    }

    fn generate(&self, rng: &mut StdRng) -> Volume {
        let [d, h, w] = self.shape;
        let extents   = [d as f32, h as f32, w as f32];

        let blobs: Vec<([f32; 3], [f32; 3], f32)> = (0..self.ellipsoids)
            .map(|_| {
                let centre = extents.map(|e| rng.gen_range(0.2..0.8) * e);
                let radii  = extents.map(|e| rng.gen_range(0.1..0.35) * e.max(1.0));
                let amp    = rng.gen_range(0.3..1.0);
                (centre, radii, amp)
            })
            .collect();

        Volume::from_shape_fn((d, h, w), |(z, y, x)| {
            let p = [z as f32, y as f32, x as f32];
            blobs
                .iter()
                .map(|(c, r, a)| {
                    let dist2: f32 = (0..3).map(|i| ((p[i] - c[i]) / r[i]).powi(2)).sum();
                    a / (1.0 + (-EDGE_SHARPNESS * (1.0 - dist2)).exp())
                })
                .sum()
        })
    }
}

impl VolumeSource for PhantomSource {
    fn load_all(&self) -> Result<Vec<ScanVolume>> {
        let mut rng    = StdRng::seed_from_u64(self.seed);
        let normalizer = Normalizer::new();

        let volumes = (0..self.count)
            .map(|i| {
                let raw = self.generate(&mut rng);
                ScanVolume::new(format!("phantom_{i:04}"), normalizer.normalize(&raw))
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Generated {} phantoms of shape {:?} (seed {})",
            volumes.len(),
            self.shape,
            self.seed
        );
        Ok(volumes)
    }
}
