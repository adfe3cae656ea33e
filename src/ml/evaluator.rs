// ============================================================
// Layer 5 — Evaluation Visualizer
// ============================================================
// Once per epoch the trainer asks for a visual check:
//
//   1. Enter inference mode (InferenceScope guard)
//   2. Pick one held-out sample (SampleSelector, default index 0)
//   3. Forward the degraded volume through model.valid()
//      (inner backend: no autodiff graph, dropout off)
//   4. Take the middle plane along the third axis of the
//      original, degraded and predicted volumes, transposed
//   5. Compose "Epoch N" with three panels, hand it to the sink
//   6. Guard drops → previous mode restored, on every exit path
//
// A failing sink is logged and ignored. A failing forward pass
// or a bad selector is returned as an error.

use burn::{data::dataset::Dataset, module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::data::dataset::{VolumeDataset, VolumeSample};
use crate::domain::figure::Figure;
use crate::domain::traits::MetricSink;
use crate::domain::volume::{middle_slice, Volume};
use crate::error::{Result, TrainError};
use crate::ml::inferencer::predict_volume;
use crate::ml::model::UNet3d;

/// Series the per-epoch training figure is logged under.
pub const COMPARISON_SERIES: &str = "comparison";

/// Series the `evaluate` command logs its figure under.
pub const EVALUATION_SERIES: &str = "evaluation";

// ─── Mode handling ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMode {
    Training,
    Inference,
}

/// Holds the model in inference mode for its lifetime.
pub struct InferenceScope<'a> {
    mode:     &'a mut ModelMode,
    previous: ModelMode,
}

impl<'a> InferenceScope<'a> {
    pub fn enter(mode: &'a mut ModelMode) -> Self {
        let previous = *mode;
        *mode = ModelMode::Inference;
        Self { mode, previous }
    }

    pub fn mode(&self) -> ModelMode {
        *self.mode
    }
}

impl Drop for InferenceScope<'_> {
    fn drop(&mut self) {
        *self.mode = self.previous;
    }
}

// ─── Sample selection ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSelector {
    /// Always the same held-out index
    Fixed(usize),
    /// epoch % len, walking through the held-out set
    Cycle,
}

impl Default for SampleSelector {
    fn default() -> Self {
        SampleSelector::Fixed(0)
    }
}

impl SampleSelector {
    pub fn pick(&self, epoch: usize, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(TrainError::Data("held-out set is empty".into()));
        }
        match *self {
            SampleSelector::Fixed(i) if i < len => Ok(i),
            SampleSelector::Fixed(i) => Err(TrainError::Data(format!(
                "evaluation index {i} is out of range for {len} held-out samples"
            ))),
            SampleSelector::Cycle => Ok(epoch % len),
        }
    }
}

// ─── Evaluator ────────────────────────────────────────────────────────────────
pub struct Evaluator {
    samples:  VolumeDataset,
    selector: SampleSelector,
}

impl Evaluator {
    pub fn new(samples: VolumeDataset, selector: SampleSelector) -> Self {
        Self { samples, selector }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn selector(&self) -> SampleSelector {
        self.selector
    }

    /// The held-out sample shown after `epoch`.
    pub fn sample_for(&self, epoch: usize) -> Result<VolumeSample> {
        let index = self.selector.pick(epoch, self.samples.len())?;
        self.samples
            .get(index)
            .ok_or_else(|| TrainError::Data(format!("held-out sample {index} missing")))
    }

    /// Produce the epoch figure and log it at `step`.
    pub fn evaluate_and_log<B: AutodiffBackend>(
        &self,
        model:  &UNet3d<B>,
        mode:   &mut ModelMode,
        epoch:  usize,
        step:   usize,
        sink:   &mut dyn MetricSink,
        device: &B::Device,
    ) -> Result<Figure> {
        let scope = InferenceScope::enter(mode);
        debug_assert_eq!(scope.mode(), ModelMode::Inference);

        let sample    = self.sample_for(epoch)?;
        let predicted = predict_volume::<B::InnerBackend>(&model.valid(), &sample.degraded, device)?;
        let figure    = comparison_figure(epoch, &sample.original, &sample.degraded, &predicted)?;

        if let Err(e) = sink.record_figure(COMPARISON_SERIES, &figure, step) {
            tracing::warn!("Could not log evaluation figure at step {step}: {e:#}");
        }

        drop(scope);
        Ok(figure)
    }
}

/// Three-panel comparison of the middle planes.
pub fn comparison_figure(
    epoch:     usize,
    original:  &Volume,
    degraded:  &Volume,
    predicted: &Volume,
) -> Result<Figure> {
    let plane = |v: &Volume| {
        middle_slice(v).ok_or_else(|| TrainError::Data("volume has an empty third axis".into()))
    };
    Ok(Figure::comparison(epoch, plane(original)?, plane(degraded)?, plane(predicted)?))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::MemorySink;
    use crate::ml::model::UNet3dConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn held_out(count: usize) -> VolumeDataset {
        let samples = (0..count)
            .map(|i| {
                let v = Volume::from_shape_fn((2, 2, 2), |(d, h, w)| (i + d + h + w) as f32);
                VolumeSample { original: v.clone(), degraded: v }
            })
            .collect();
        VolumeDataset::new(samples).unwrap()
    }

    fn model() -> UNet3d<TestBackend> {
        UNet3dConfig::new(1, 1, 1)
            .with_depth(1)
            .with_dropout(0.5)
            .init(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_scope_restores_previous_mode() {
        let mut mode = ModelMode::Training;
        {
            let scope = InferenceScope::enter(&mut mode);
            assert_eq!(scope.mode(), ModelMode::Inference);
        }
        assert_eq!(mode, ModelMode::Training);
    }

    #[test]
    fn test_selector_policies() {
        assert_eq!(SampleSelector::default().pick(7, 3).unwrap(), 0);
        assert_eq!(SampleSelector::Fixed(2).pick(0, 3).unwrap(), 2);
        assert_eq!(SampleSelector::Cycle.pick(4, 3).unwrap(), 1);
        assert!(SampleSelector::Fixed(3).pick(0, 3).is_err());
        assert!(SampleSelector::Cycle.pick(0, 0).is_err());
    }

    #[test]
    fn test_evaluation_logs_one_figure() {
        let evaluator = Evaluator::new(held_out(2), SampleSelector::default());
        let mut sink  = MemorySink::default();
        let mut mode  = ModelMode::Training;

        let figure = evaluator
            .evaluate_and_log(&model(), &mut mode, 0, 5, &mut sink, &Default::default())
            .unwrap();

        assert_eq!(figure.title, "Epoch 1");
        assert_eq!(figure.panel_titles(), vec!["Original", "Reduced", "Predicted"]);
        // [D, H, W] = [2, 2, 2] → transposed [H, D] plane
        assert_eq!(figure.panels[2].pixels.dim(), (2, 2));

        assert_eq!(sink.figures.len(), 1);
        assert_eq!(sink.figures[0].series, COMPARISON_SERIES);
        assert_eq!(sink.figures[0].step, 5);
        assert_eq!(mode, ModelMode::Training);
    }

    #[test]
    fn test_mode_restored_after_failed_evaluation() {
        let evaluator = Evaluator::new(held_out(1), SampleSelector::Fixed(4));
        let mut sink  = MemorySink::default();
        let mut mode  = ModelMode::Training;

        let res = evaluator.evaluate_and_log(&model(), &mut mode, 0, 1, &mut sink, &Default::default());

        assert!(matches!(res, Err(TrainError::Data(_))));
        assert_eq!(mode, ModelMode::Training);
        assert!(sink.figures.is_empty());
    }

    #[test]
    fn test_evaluation_is_deterministic_with_dropout() {
        let evaluator = Evaluator::new(held_out(1), SampleSelector::default());
        let model     = model();
        let mut sink  = MemorySink::default();
        let mut mode  = ModelMode::Training;
        let device    = Default::default();

        let a = evaluator.evaluate_and_log(&model, &mut mode, 0, 1, &mut sink, &device).unwrap();
        let b = evaluator.evaluate_and_log(&model, &mut mode, 0, 2, &mut sink, &device).unwrap();
        assert_eq!(a.panels[2].pixels, b.panels[2].pixels);
    }

    #[test]
    fn test_original_panel_is_middle_plane() {
        let original = Volume::from_shape_fn((3, 2, 7), |(d, h, w)| (d * 100 + h * 10 + w) as f32);
        let figure   = comparison_figure(2, &original, &original, &original).unwrap();

        let panel = &figure.panels[0].pixels;
        assert_eq!(figure.title, "Epoch 3");
        assert_eq!(panel.dim(), (2, 3));
        // plane w = 3, transposed: panel[[h, d]] = original[[d, h, 3]]
        assert_eq!(panel[[1, 2]], 213.0);
    }
}
