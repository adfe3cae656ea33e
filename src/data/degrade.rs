// ============================================================
// Layer 4 — Degradation Transform
// ============================================================
// Produces the "reduced" network input from an original scan.
//
// The scan is block-averaged by `factor` along every axis and
// then blown back up with nearest-neighbour replication, so
// the result lives on the original grid but only carries the
// detail of the coarse one:
//
//   original  [D, H, W]
//      │  mean over factor³ blocks (edge blocks may be smaller)
//      ▼
//   coarse    [⌈D/f⌉, ⌈H/f⌉, ⌈W/f⌉]
//      │  out[d,h,w] = coarse[d/f, h/f, w/f]
//      ▼
//   reduced   [D, H, W]
//
// factor = 1 is the identity.

use ndarray::Array3;

use crate::domain::volume::Volume;
use crate::error::{Result, TrainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Degradation {
    factor: usize,
}

impl Degradation {
    pub fn new(factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(TrainError::Configuration(
                "degradation factor must be at least 1".into(),
            ));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Apply the transform, returning a volume of the same shape.
    pub fn apply(&self, volume: &Volume) -> Volume {
        let f = self.factor;
        if f == 1 {
            return volume.clone();
        }

        let (d, h, w) = volume.dim();
        let coarse_dim = (d.div_ceil(f), h.div_ceil(f), w.div_ceil(f));

        let mut sums   = Array3::<f64>::zeros(coarse_dim);
        let mut counts = Array3::<u32>::zeros(coarse_dim);
        for ((z, y, x), &v) in volume.indexed_iter() {
            let cell = (z / f, y / f, x / f);
            sums[cell]   += v as f64;
            counts[cell] += 1;
        }

        let coarse = ndarray::Zip::from(&sums)
            .and(&counts)
            .map_collect(|&s, &n| (s / n.max(1) as f64) as f32);

        Volume::from_shape_fn((d, h, w), |(z, y, x)| coarse[(z / f, y / f, x / f)])
    }
}
