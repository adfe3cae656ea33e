// ============================================================
// Layer 4 — Volume Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<VolumeSample>
// into device tensors.
//
// How batching works here:
//   Input:  N samples, each a pair of [D, H, W] host arrays
//   Output: VolumeBatch with two tensors of shape [N, 1, D, H, W]
//
//   Every volume is flattened in logical (row-major) order and
//   the N flat buffers are concatenated:
//   [s1_v1 … s1_vK, s2_v1 … sN_vK] → [N, 1, D, H, W]
//
// The tensors are created directly on the batcher's device,
// so a batch coming out of the DataLoader already lives where
// the model does. VolumeDataset guarantees one shared shape.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::VolumeSample;
use crate::domain::volume::Volume;

// ─── VolumeBatch ──────────────────────────────────────────────────────────────
/// A batch of training pairs ready for the forward pass.
#[derive(Debug, Clone)]
pub struct VolumeBatch<B: Backend> {
    /// Learning targets, shape [batch_size, 1, D, H, W]
    pub original: Tensor<B, 5>,

    /// Network inputs, shape [batch_size, 1, D, H, W]
    pub degraded: Tensor<B, 5>,
}

// ─── VolumeBatcher ────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct VolumeBatcher<B: Backend> {
    /// Device the batch tensors are created on
    pub device: B::Device,
}

impl<B: Backend> VolumeBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<VolumeSample, VolumeBatch<B>> for VolumeBatcher<B> {
    fn batch(&self, items: Vec<VolumeSample>) -> VolumeBatch<B> {
        let original = stack(items.iter().map(|s| &s.original), &self.device);
        let degraded = stack(items.iter().map(|s| &s.degraded), &self.device);

        VolumeBatch { original, degraded }
    }
}

/// Upload a single host volume as a [1, 1, D, H, W] tensor.
pub fn volume_tensor<B: Backend>(volume: &Volume, device: &B::Device) -> Tensor<B, 5> {
    stack(std::iter::once(volume), device)
}

fn stack<'a, B: Backend>(
    volumes: impl ExactSizeIterator<Item = &'a Volume>,
    device:  &B::Device,
) -> Tensor<B, 5> {
    let n = volumes.len();
    let mut dims = [0usize; 3];
    let mut flat = Vec::new();

    for v in volumes {
        let s = v.shape();
        dims  = [s[0], s[1], s[2]];
        flat.extend(v.iter().copied());
    }

    Tensor::<B, 5>::from_data(
        TensorData::new(flat, [n, 1, dims[0], dims[1], dims[2]]),
        device,
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_batch_shape_and_order() {
        let a = Volume::from_shape_fn((2, 3, 4), |(d, h, w)| (d * 12 + h * 4 + w) as f32);
        let b = a.mapv(|x| -x);
        let items = vec![
            VolumeSample { original: a.clone(), degraded: a.clone() },
            VolumeSample { original: b.clone(), degraded: b },
        ];

        let batcher = VolumeBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(items);

        assert_eq!(batch.original.dims(), [2, 1, 2, 3, 4]);
        assert_eq!(batch.degraded.dims(), [2, 1, 2, 3, 4]);

        let values = batch.original.into_data().to_vec::<f32>().unwrap();
        // voxel [d=1, h=2, w=3] of the first sample
        assert_eq!(values[12 + 8 + 3], 23.0);
        // same voxel of the second sample
        assert_eq!(values[24 + 23], -23.0);
    }

    #[test]
    fn test_single_volume_tensor() {
        let v = Volume::from_elem((2, 2, 2), 0.5);
        let t = volume_tensor::<TestBackend>(&v, &Default::default());
        assert_eq!(t.dims(), [1, 1, 2, 2, 2]);
    }
}
