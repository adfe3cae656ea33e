// ============================================================
// Layer 5 — Training Loop
// ============================================================
// All mutable training state lives in one TrainingContext value:
// model, Adam optimizer, step counter, start epoch, mode. It is
// moved into fit() and handed back at the end.
//
// Per epoch (start_epoch .. epochs):
//   B::sync(device)                 wait for queued device work
//   for batch in loader:
//     step += 1
//     prediction = model(degraded)
//     loss       = mean |prediction - original|
//     read loss back to the host, reject NaN / Inf
//     backward → GradientsParams → Adam step
//     accumulate, log "training_loss" at step
//   evaluator.evaluate_and_log(epoch, step)
//   print "EPOCH e Loss ====> mean"
//   reject non-finite mean, save CheckpointRecord
// After the last epoch:
//   final model snapshot
//
// Resume: a record for epoch e restarts the loop at e + 1 with
// step = (e + 1) · batch_count.
//
// burn builds a fresh gradient set on every backward(), so
// there is nothing to zero between steps.

use burn::{
    data::{dataloader::{DataLoader, DataLoaderBuilder}, dataset::Dataset},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{VolumeBatch, VolumeBatcher},
    dataset::VolumeDataset,
};
use crate::domain::run_identity::RunIdentity;
use crate::domain::traits::MetricSink;
use crate::error::{Result, TrainError};
use crate::infra::checkpoint::{decode_state, encode_state, CheckpointManager, CheckpointRecord};
use crate::ml::evaluator::{Evaluator, ModelMode};
use crate::ml::model::{UNet3d, UNet3dConfig};

/// Series name for per-step loss values.
pub const TRAINING_LOSS_SERIES: &str = "training_loss";

/// Mean absolute error over every element. Shapes must match exactly.
pub fn l1_loss<B: Backend>(prediction: Tensor<B, 5>, target: Tensor<B, 5>) -> Result<Tensor<B, 1>> {
    let (got, expected) = (prediction.dims(), target.dims());
    if got != expected {
        return Err(TrainError::ShapeMismatch {
            expected: expected.to_vec(),
            got:      got.to_vec(),
        });
    }
    Ok((prediction - target).abs().mean())
}

/// Running sum of batch losses within one epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpochLoss {
    total:   f64,
    batches: usize,
}

impl EpochLoss {
    pub fn add(&mut self, loss: f64) {
        self.total   += loss;
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// None until at least one batch was added.
    pub fn mean(&self) -> Option<f64> {
        (self.batches > 0).then(|| self.total / self.batches as f64)
    }
}

/// Loop constants fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub epochs:        usize,
    pub batch_size:    usize,
    pub lr:            f64,
    pub show_progress: bool,
}

// ─── TrainingContext ──────────────────────────────────────────────────────────
pub struct TrainingContext<B: AutodiffBackend, O> {
    model:       UNet3d<B>,
    optimizer:   O,
    device:      B::Device,
    run:         RunIdentity,
    step:        usize,
    start_epoch: usize,
    mode:        ModelMode,
    settings:    LoopSettings,
}

/// Build the model and bind a fresh Adam optimizer to it.
///
/// Adam: β1 = 0.9, β2 = 0.999, ε = 1e-8, one global learning rate.
pub fn initialize<B: AutodiffBackend>(
    model_cfg: &UNet3dConfig,
    run:       RunIdentity,
    settings:  LoopSettings,
    device:    &B::Device,
) -> Result<TrainingContext<B, impl Optimizer<UNet3d<B>, B>>> {
    let model     = model_cfg.init::<B>(device)?;
    let optimizer = AdamConfig::new().with_epsilon(1e-8).init::<B, UNet3d<B>>();

    tracing::info!(
        "Model ready: depth={} filters={} ({} Conv3d layers)",
        model_cfg.depth,
        model_cfg.filters,
        model.conv3d_layers().len()
    );
    Ok(TrainingContext::new(model, optimizer, run, settings, device.clone()))
}

impl<B, O> TrainingContext<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<UNet3d<B>, B>,
{
    pub fn new(
        model:     UNet3d<B>,
        optimizer: O,
        run:       RunIdentity,
        settings:  LoopSettings,
        device:    B::Device,
    ) -> Self {
        Self {
            model,
            optimizer,
            device,
            run,
            step: 0,
            start_epoch: 0,
            mode: ModelMode::Training,
            settings,
        }
    }

    pub fn step(&self) -> usize { self.step }

    pub fn start_epoch(&self) -> usize { self.start_epoch }

    pub fn mode(&self) -> ModelMode { self.mode }

    /// Install a checkpoint and continue after its epoch.
    pub fn resume(mut self, record: CheckpointRecord, batch_count: usize) -> Result<Self> {
        let model_record = decode_state::<B, _>(record.model_state, &self.device)?;
        self.model = self.model.load_record(model_record);

        let optim_record = decode_state::<B, O::Record>(record.optimizer_state, &self.device)?;
        self.optimizer = self.optimizer.load_record(optim_record);

        self.start_epoch = record.epoch + 1;
        self.step        = self.start_epoch * batch_count;

        tracing::info!(
            "Resumed '{}' after epoch {} (loss {:.6}); continuing at epoch {}, step {}",
            self.run,
            record.epoch,
            record.loss,
            self.start_epoch,
            self.step
        );
        Ok(self)
    }

    /// Snapshot model and optimizer together with `epoch` and `loss`.
    pub fn capture(&self, epoch: usize, loss: f64) -> Result<CheckpointRecord> {
        Ok(CheckpointRecord {
            epoch,
            model_state:     encode_state::<B, _>(self.model.clone().into_record())?,
            optimizer_state: encode_state::<B, _>(self.optimizer.to_record())?,
            loss,
        })
    }

    /// Run the remaining epochs, then write the final snapshot.
    pub fn fit(
        mut self,
        loader:      &dyn DataLoader<VolumeBatch<B>>,
        evaluator:   &Evaluator,
        sink:        &mut dyn MetricSink,
        checkpoints: &CheckpointManager,
    ) -> Result<Self> {
        if loader.num_items() == 0 {
            return Err(TrainError::Data("training set is empty".into()));
        }

        let record_path = checkpoints.record_path(&self.run);
        let batch_count = loader.num_items().div_ceil(self.settings.batch_size.max(1));

        for epoch in self.start_epoch..self.settings.epochs {
            B::sync(&self.device);
            let mut epoch_loss = EpochLoss::default();
            let bar = self.progress_bar(epoch, batch_count);

            // ── Training phase ────────────────────────────────────────────────
            for batch in loader.iter() {
                self.step += 1;

                let prediction = self.model.forward(batch.degraded);
                let loss       = l1_loss(prediction, batch.original)?;

                // into_scalar blocks until the device has produced the value
                let value: f64 = loss.clone().into_scalar().elem::<f64>();
                if !value.is_finite() {
                    bar.abandon();
                    return Err(TrainError::NumericDivergence { step: self.step, value });
                }

                let grads  = GradientsParams::from_grads(loss.backward(), &self.model);
                self.model = self.optimizer.step(self.settings.lr, self.model, grads);

                epoch_loss.add(value);
                if let Err(e) = sink.record_scalar(TRAINING_LOSS_SERIES, value, self.step) {
                    tracing::warn!("Could not log training loss at step {}: {e:#}", self.step);
                }

                bar.set_message(format!("loss {value:.5}"));
                bar.inc(1);
            }
            bar.finish_and_clear();

            // ── End of epoch ──────────────────────────────────────────────────
            evaluator.evaluate_and_log(
                &self.model,
                &mut self.mode,
                epoch,
                self.step,
                sink,
                &self.device,
            )?;

            let mean = epoch_loss
                .mean()
                .ok_or_else(|| TrainError::Data(format!("epoch {epoch} produced no batches")))?;

            println!("EPOCH {epoch} Loss ====> {mean}");
            tracing::info!(
                "Epoch {epoch} done: {} batches, mean loss {mean:.6}, step {}",
                epoch_loss.batches(),
                self.step
            );

            if !mean.is_finite() {
                return Err(TrainError::NumericDivergence { step: self.step, value: mean });
            }
            checkpoints.save(&record_path, &self.capture(epoch, mean)?)?;
            tracing::info!("Checkpoint saved for epoch {epoch}");
        }

        let snapshot = checkpoints.save_model(&self.model, &self.run)?;
        tracing::info!("Final model snapshot written to '{}'", snapshot.display());
        Ok(self)
    }

    fn progress_bar(&self, epoch: usize, batches: usize) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(batches as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "Epoch {prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(format!("{epoch}"));
        bar
    }
}

/// Entry point used by the train use case, generic over the backend
/// picked by the device resolver. Returns the final step counter.
pub fn run_training<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: VolumeDataset,
    evaluator:     &Evaluator,
    checkpoints:   &CheckpointManager,
    sink:          &mut dyn MetricSink,
    device:        B::Device,
) -> Result<usize> {
    if cfg.batch_size == 0 {
        return Err(TrainError::Configuration("batch_size must be positive".into()));
    }

    let model_cfg = cfg.model_config();
    if let Some(shape) = train_dataset.shape() {
        model_cfg.check_input(shape)?;
    }

    let run         = cfg.run_identity();
    let batch_count = train_dataset.len().div_ceil(cfg.batch_size);
    let settings    = LoopSettings {
        epochs:        cfg.epochs,
        batch_size:    cfg.batch_size,
        lr:            cfg.lr,
        show_progress: !cfg.no_progress,
    };

    let mut ctx = initialize::<B>(&model_cfg, run.clone(), settings, &device)?;

    // A requested restore with no usable record is fatal
    if cfg.restore {
        let record = checkpoints.load(&checkpoints.record_path(&run))?;
        ctx = ctx.resume(record, batch_count)?;
    }

    let batcher = VolumeBatcher::<B>::new(device.clone());
    let loader  = DataLoaderBuilder::new(batcher)
        .batch_size(cfg.batch_size)
        .build(train_dataset);

    tracing::info!(
        "Training '{run}' for epochs {}..{} ({batch_count} batches per epoch)",
        ctx.start_epoch(),
        cfg.epochs
    );

    let ctx = ctx.fit(&*loader, evaluator, sink, checkpoints)?;
    tracing::info!("Training complete at step {}", ctx.step());
    Ok(ctx.step())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::VolumeSample;
    use crate::domain::figure::Figure;
    use crate::domain::volume::Volume;
    use crate::infra::metrics::MemorySink;
    use crate::ml::evaluator::SampleSelector;
    use burn::backend::{Autodiff, NdArray};
    use std::sync::Arc;

    type TestBackend = Autodiff<NdArray>;

    const SHAPE: (usize, usize, usize) = (2, 2, 2);

    fn dataset(count: usize) -> VolumeDataset {
        let samples = (0..count)
            .map(|i| {
                let original = Volume::from_shape_fn(SHAPE, |(d, h, w)| ((i + d + h + w) % 3) as f32 / 2.0);
                let degraded = original.mapv(|v| v * 0.5);
                VolumeSample { original, degraded }
            })
            .collect();
        VolumeDataset::new(samples).unwrap()
    }

    fn settings(epochs: usize) -> LoopSettings {
        LoopSettings { epochs, batch_size: 1, lr: 1e-3, show_progress: false }
    }

    fn model_cfg() -> UNet3dConfig {
        UNet3dConfig::new(1, 1, 1).with_depth(1)
    }

    fn run() -> RunIdentity {
        RunIdentity::derive(1, 1, "ADAM", "Glorot", "L1")
    }

    fn loader(data: VolumeDataset) -> Arc<dyn DataLoader<VolumeBatch<TestBackend>>> {
        DataLoaderBuilder::new(VolumeBatcher::<TestBackend>::new(Default::default()))
            .batch_size(1)
            .build(data)
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(dataset(1), SampleSelector::default())
    }

    struct FailingSink;

    impl MetricSink for FailingSink {
        fn record_scalar(&mut self, _: &str, _: f64, _: usize) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        fn record_figure(&mut self, _: &str, _: &Figure, _: usize) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_l1_loss_value() {
        let device = Default::default();
        let p = Tensor::<NdArray, 5>::from_data(TensorData::new(vec![1.0f32, 3.0], [1, 1, 1, 1, 2]), &device);
        let t = Tensor::<NdArray, 5>::zeros([1, 1, 1, 1, 2], &device);

        let loss: f64 = l1_loss(p, t).unwrap().into_scalar().elem();
        assert!((loss - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_l1_loss_rejects_shape_mismatch() {
        let device = Default::default();
        let p = Tensor::<NdArray, 5>::zeros([1, 1, 2, 2, 2], &device);
        let t = Tensor::<NdArray, 5>::zeros([1, 1, 4, 4, 4], &device);

        match l1_loss(p, t) {
            Err(TrainError::ShapeMismatch { expected, got }) => {
                assert_eq!(expected, vec![1, 1, 4, 4, 4]);
                assert_eq!(got, vec![1, 1, 2, 2, 2]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_epoch_mean() {
        let mut acc = EpochLoss::default();
        assert_eq!(acc.mean(), None);

        acc.add(0.4);
        acc.add(0.2);
        assert_eq!(acc.batches(), 2);
        assert!((acc.mean().unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_two_samples_one_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();

        let ctx = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        let ctx = ctx.fit(&*loader(dataset(2)), &evaluator(), &mut sink, &mgr).unwrap();

        assert_eq!(ctx.step(), 2);
        assert_eq!(sink.scalars.len(), 2);
        assert!(sink.scalars.iter().all(|s| s.series == TRAINING_LOSS_SERIES));
        assert_eq!(sink.scalars.iter().map(|s| s.step).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(sink.figures.len(), 1);
        assert_eq!(sink.figures[0].step, 2);

        let record = mgr.load(&mgr.record_path(&run())).unwrap();
        assert_eq!(record.epoch, 0);
        let expected = (sink.scalars[0].value + sink.scalars[1].value) / 2.0;
        assert!((record.loss - expected).abs() < 1e-12);

        assert!(mgr.snapshot_file::<TestBackend>(&run()).exists());
        assert_eq!(ctx.mode(), ModelMode::Training);
    }

    #[test]
    fn test_step_counter_reaches_batches_times_epochs() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();

        let ctx = initialize::<TestBackend>(&model_cfg(), run(), settings(3), &device).unwrap();
        let ctx = ctx.fit(&*loader(dataset(2)), &evaluator(), &mut sink, &mgr).unwrap();

        assert_eq!(ctx.step(), 6);
        let steps: Vec<usize> = sink.scalars.iter().map(|s| s.step).collect();
        assert_eq!(steps, (1..=6).collect::<Vec<_>>());
        assert_eq!(sink.figures.len(), 3);
        assert_eq!(mgr.load(&mgr.record_path(&run())).unwrap().epoch, 2);
    }

    #[test]
    fn test_nan_loss_aborts_without_checkpoint() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();

        let poisoned = VolumeDataset::new(vec![VolumeSample {
            original: Volume::from_elem(SHAPE, f32::NAN),
            degraded: Volume::zeros(SHAPE),
        }])
        .unwrap();

        let ctx = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        let res = ctx.fit(&*loader(poisoned), &evaluator(), &mut sink, &mgr);

        assert!(matches!(res, Err(TrainError::NumericDivergence { step: 1, .. })));
        assert!(sink.scalars.is_empty());
        assert!(!mgr.record_path(&run()).exists());
    }

    #[test]
    fn test_empty_loader_is_rejected() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();

        let ctx = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        let res = ctx.fit(&*loader(dataset(0)), &evaluator(), &mut sink, &mgr);
        assert!(matches!(res, Err(TrainError::Data(_))));
    }

    #[test]
    fn test_sink_failures_do_not_stop_training() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let device = Default::default();

        let ctx = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        let ctx = ctx.fit(&*loader(dataset(2)), &evaluator(), &mut FailingSink, &mgr).unwrap();

        assert_eq!(ctx.step(), 2);
        assert!(mgr.record_path(&run()).exists());
    }

    #[test]
    fn test_resume_continues_after_recorded_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();

        // One completed epoch out of two
        let first = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        first.fit(&*loader(dataset(2)), &evaluator(), &mut sink, &mgr).unwrap();
        let record = mgr.load(&mgr.record_path(&run())).unwrap();

        let resumed = initialize::<TestBackend>(&model_cfg(), run(), settings(2), &device)
            .unwrap()
            .resume(record, 2)
            .unwrap();
        assert_eq!(resumed.start_epoch(), 1);
        assert_eq!(resumed.step(), 2);

        let mut sink = MemorySink::default();
        let resumed  = resumed.fit(&*loader(dataset(2)), &evaluator(), &mut sink, &mgr).unwrap();

        assert_eq!(resumed.step(), 4);
        assert_eq!(sink.scalars.iter().map(|s| s.step).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(sink.figures.len(), 1);
        assert_eq!(mgr.load(&mgr.record_path(&run())).unwrap().epoch, 1);
    }

    #[test]
    fn test_resume_then_save_reproduces_loss() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();
        let path   = mgr.record_path(&run());

        let ctx = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        ctx.fit(&*loader(dataset(2)), &evaluator(), &mut sink, &mgr).unwrap();
        let saved = mgr.load(&path).unwrap();

        let resumed = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device)
            .unwrap()
            .resume(saved.clone(), 2)
            .unwrap();
        mgr.save(&path, &resumed.capture(saved.epoch, saved.loss).unwrap()).unwrap();

        let again = mgr.load(&path).unwrap();
        assert_eq!(again.epoch, saved.epoch);
        assert_eq!(again.loss.to_bits(), saved.loss.to_bits());
    }

    #[test]
    fn test_resume_past_last_epoch_only_writes_snapshot() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let mut sink = MemorySink::default();
        let device = Default::default();

        let first = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device).unwrap();
        let record = first.capture(0, 0.5).unwrap();

        let resumed = initialize::<TestBackend>(&model_cfg(), run(), settings(1), &device)
            .unwrap()
            .resume(record, 2)
            .unwrap()
            .fit(&*loader(dataset(2)), &evaluator(), &mut sink, &mgr)
            .unwrap();

        assert_eq!(resumed.step(), 2);
        assert!(sink.scalars.is_empty());
        assert!(!mgr.record_path(&run()).exists());
        assert!(mgr.snapshot_file::<TestBackend>(&run()).exists());
    }
}
