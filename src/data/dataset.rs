use burn::data::dataset::Dataset;

use crate::data::degrade::Degradation;
use crate::data::splitter::{self, Split};
use crate::domain::traits::VolumeSource;
use crate::domain::volume::{ScanVolume, Volume};
use crate::error::{Result, TrainError};

/// One (original, degraded) training pair on a shared voxel grid.
#[derive(Debug, Clone)]
pub struct VolumeSample {
    pub original: Volume,
    pub degraded: Volume,
}

impl VolumeSample {
    pub fn shape(&self) -> [usize; 3] {
        let s = self.original.shape();
        [s[0], s[1], s[2]]
    }
}

/// Indexable set of samples, all sharing one spatial shape.
#[derive(Debug, Clone)]
pub struct VolumeDataset {
    samples: Vec<VolumeSample>,
    shape:   Option<[usize; 3]>,
}

impl VolumeDataset {
    pub fn new(samples: Vec<VolumeSample>) -> Result<Self> {
        let shape = samples.first().map(VolumeSample::shape);

        if let Some(expected) = shape {
            if expected.contains(&0) {
                return Err(TrainError::Data(format!("volume shape {expected:?} has an empty axis")));
            }
            for s in &samples {
                if s.shape() != expected {
                    return Err(TrainError::ShapeMismatch {
                        expected: expected.to_vec(),
                        got:      s.shape().to_vec(),
                    });
                }
                if s.degraded.shape() != s.original.shape() {
                    return Err(TrainError::ShapeMismatch {
                        expected: s.original.shape().to_vec(),
                        got:      s.degraded.shape().to_vec(),
                    });
                }
            }
        }

        Ok(Self { samples, shape })
    }

    /// Load the source, keep one side of the seeded split, and
    /// derive each degraded input with `degradation`.
    pub fn from_source(
        source:      &dyn VolumeSource,
        degradation: &Degradation,
        split:       Split,
        holdout:     f64,
        seed:        u64,
    ) -> anyhow::Result<Self> {
        let volumes: Vec<ScanVolume> = source.load_all()?;
        let chosen = splitter::select(volumes, split, holdout, seed);

        let samples = chosen
            .into_iter()
            .map(|scan| VolumeSample {
                degraded: degradation.apply(&scan.voxels),
                original: scan.voxels,
            })
            .collect();

        Ok(Self::new(samples)?)
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Shared spatial shape, None when empty.
    pub fn shape(&self) -> Option<[usize; 3]> { self.shape }
}

impl Dataset<VolumeSample> for VolumeDataset {
    fn get(&self, index: usize) -> Option<VolumeSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
