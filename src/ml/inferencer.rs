// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Runs a trained UNet3d on host volumes.
//
//   Volume [D, H, W]
//     → tensor [1, 1, D, H, W] on the device
//     → forward
//     → into_data (host read-back; waits for the device)
//     → Volume [D, H, W]
//
// Used by the per-epoch evaluation (on model.valid()) and by
// the `evaluate` command (on a model loaded from the final
// snapshot).

use burn::prelude::*;
use ndarray::Array3;

use crate::data::batcher::volume_tensor;
use crate::data::dataset::VolumeDataset;
use crate::domain::run_identity::RunIdentity;
use crate::domain::volume::Volume;
use crate::error::{Result, TrainError};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{UNet3d, UNet3dConfig};
use crate::ml::trainer::l1_loss;

/// Forward one volume and bring the prediction back to the host.
pub fn predict_volume<B: Backend>(
    model:  &UNet3d<B>,
    volume: &Volume,
    device: &B::Device,
) -> Result<Volume> {
    let s      = volume.shape();
    let shape  = [s[0], s[1], s[2]];
    let output = model.forward(volume_tensor::<B>(volume, device));

    let dims = output.dims();
    if dims != [1, 1, shape[0], shape[1], shape[2]] {
        return Err(TrainError::ShapeMismatch {
            expected: vec![1, 1, shape[0], shape[1], shape[2]],
            got:      dims.to_vec(),
        });
    }

    let values = output
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| TrainError::Tensor(format!("{e:?}")))?;

    Array3::from_shape_vec(shape, values).map_err(|e| TrainError::Tensor(e.to_string()))
}

/// A model restored from a finished run, ready for inference.
pub struct Inferencer<B: Backend> {
    model:  UNet3d<B>,
    device: B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: UNet3d<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Rebuild the architecture from `model_cfg` and load the final
    /// snapshot of `run` into it. Dropout plays no part at inference.
    pub fn from_checkpoint(
        checkpoints: &CheckpointManager,
        run:         &RunIdentity,
        model_cfg:   &UNet3dConfig,
        device:      B::Device,
    ) -> Result<Self> {
        let model = model_cfg.clone().with_dropout(0.0).init::<B>(&device)?;
        let model = checkpoints.load_model(model, run, &device)?;
        tracing::info!("Model loaded from '{}'", checkpoints.snapshot_file::<B>(run).display());
        Ok(Self { model, device })
    }

    pub fn predict(&self, volume: &Volume) -> Result<Volume> {
        predict_volume(&self.model, volume, &self.device)
    }

    /// Mean L1 between prediction and original over every sample.
    /// None for an empty dataset.
    pub fn mean_l1(&self, dataset: &VolumeDataset) -> Result<Option<f64>> {
        use burn::data::dataset::Dataset;

        let mut total = 0.0f64;
        for index in 0..dataset.len() {
            let sample = dataset
                .get(index)
                .ok_or_else(|| TrainError::Data(format!("sample {index} vanished")))?;

            let prediction = self.model.forward(volume_tensor::<B>(&sample.degraded, &self.device));
            let target     = volume_tensor::<B>(&sample.original, &self.device);
            total += l1_loss(prediction, target)?.into_scalar().elem::<f64>();
        }

        Ok((!dataset.is_empty()).then(|| total / dataset.len() as f64))
    }
}
