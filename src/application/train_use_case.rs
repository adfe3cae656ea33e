// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration
//   Step 2: Pick a volume source       (Layer 4 - data)
//   Step 3: Build train / held-out     (Layer 4 - data)
//   Step 4: Save config                (Layer 6 - infra)
//   Step 5: Open the run logger        (Layer 6 - infra)
//   Step 6: Resolve the device         (Layer 5 - ml)
//   Step 7: Run the training loop      (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    dataset::VolumeDataset,
    degrade::Degradation,
    loader::RawVolumeLoader,
    phantom::PhantomSource,
    splitter::Split,
};
use crate::domain::{run_identity::RunIdentity, traits::VolumeSource};
use crate::error::TrainError;
use crate::infra::{checkpoint::CheckpointManager, metrics::RunLogger};
use crate::ml::{
    device::{self, ComputeDevice},
    evaluator::{Evaluator, SampleSelector},
    model::{UNet3dConfig, WeightInit},
    trainer::run_training,
};

/// Optimizer and loss names that enter the run identity.
pub const OPTIMIZER_NAME: &str = "ADAM";
pub const LOSS_NAME:      &str = "L1";

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved as JSON next to the final snapshot so `evaluate` can
// rebuild the same architecture and the same held-out split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs:         usize,
    pub batch_size:     usize,
    pub lr:             f64,
    pub in_channels:    usize,
    pub out_channels:   usize,
    pub filters:        usize,
    pub depth:          usize,
    pub dropout:        f64,
    pub weight_init:    WeightInit,
    pub restore:        bool,
    pub checkpoint_dir: String,
    pub logs_dir:       String,
    /// Directory of .raw volumes; synthetic phantoms when None
    pub volumes_dir:    Option<String>,
    pub volume_shape:   [usize; 3],
    pub phantoms:       usize,
    pub degrade_factor: usize,
    pub holdout:        f64,
    pub seed:           u64,
    pub eval_selector:  SampleSelector,
    pub no_progress:    bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs:         10,
            batch_size:     1,
            lr:             1e-3,
            in_channels:    1,
            out_channels:   1,
            filters:        2,
            depth:          2,
            dropout:        0.0,
            weight_init:    WeightInit::Glorot,
            restore:        false,
            checkpoint_dir: "Models".to_string(),
            logs_dir:       "runs".to_string(),
            volumes_dir:    None,
            volume_shape:   [32, 32, 32],
            phantoms:       24,
            degrade_factor: 2,
            holdout:        0.2,
            seed:           42,
            eval_selector:  SampleSelector::Fixed(0),
            no_progress:    false,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self) -> UNet3dConfig {
        UNet3dConfig::new(self.in_channels, self.out_channels, self.filters)
            .with_depth(self.depth)
            .with_dropout(self.dropout)
            .with_weight_init(self.weight_init)
    }

    pub fn run_identity(&self) -> RunIdentity {
        RunIdentity::derive(
            self.epochs,
            self.batch_size,
            OPTIMIZER_NAME,
            self.weight_init.label(),
            LOSS_NAME,
        )
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> std::result::Result<(), TrainError> {
        if self.batch_size == 0 {
            return Err(TrainError::Configuration("batch_size must be positive".into()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(TrainError::Configuration(format!("lr must be positive, got {}", self.lr)));
        }
        if !(0.0..1.0).contains(&self.holdout) {
            return Err(TrainError::Configuration(format!(
                "holdout must lie in [0, 1), got {}",
                self.holdout
            )));
        }
        if self.volumes_dir.is_none() && self.phantoms == 0 {
            return Err(TrainError::Configuration("phantoms must be positive".into()));
        }
        self.model_config().check_input(self.volume_shape)
    }

    pub fn volume_source(&self) -> Box<dyn VolumeSource> {
        match &self.volumes_dir {
            Some(dir) => Box::new(RawVolumeLoader::new(dir, self.volume_shape)),
            None      => Box::new(PhantomSource::new(self.phantoms, self.volume_shape, self.seed)),
        }
    }

    /// One side of the seeded split, with degraded inputs attached.
    pub fn dataset(&self, split: Split) -> Result<VolumeDataset> {
        let degradation = Degradation::new(self.degrade_factor)?;
        let source      = self.volume_source();
        VolumeDataset::from_source(source.as_ref(), &degradation, split, self.holdout, self.seed)
    }
}

/// What a finished training run produced.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub run:      RunIdentity,
    pub steps:    usize,
    pub snapshot: PathBuf,
    pub logs:     PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run on whichever device the resolver picks.
    pub fn execute(&self) -> Result<TrainReport> {
        match device::resolve() {
            ComputeDevice::Accelerator(d) => self.execute_on::<Autodiff<Wgpu>>(d.clone()),
            ComputeDevice::Cpu(d)         => self.execute_on::<Autodiff<NdArray>>(d.clone()),
        }
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainReport> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;
        let run = cfg.run_identity();
        tracing::info!("Run identity: {run}");

        // ── Steps 2-3: Data ───────────────────────────────────────────────────
        match &cfg.volumes_dir {
            Some(dir) => tracing::info!("Loading .raw volumes from '{dir}'"),
            None      => tracing::info!("Generating {} synthetic phantoms", cfg.phantoms),
        }
        let train    = cfg.dataset(Split::Training)?;
        let held_out = cfg.dataset(Split::Validation)?;
        tracing::info!(
            "Split: {} train, {} held-out (shape {:?}, degrade x{})",
            train.sample_count(),
            held_out.sample_count(),
            cfg.volume_shape,
            cfg.degrade_factor
        );
        if train.sample_count() == 0 {
            anyhow::bail!("No training volumes available");
        }
        // Every epoch ends with an evaluation; fail before the first one runs
        cfg.eval_selector
            .pick(0, held_out.sample_count())
            .map_err(|e| TrainError::Configuration(format!("cannot evaluate this split: {e}")))?;

        // ── Step 4: Config for evaluate ───────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir);
        checkpoints.save_config(cfg, &run)?;

        // ── Step 5: Logger ────────────────────────────────────────────────────
        let mut logger = RunLogger::new(&cfg.logs_dir, &run)?;

        // ── Steps 6-7: Train ──────────────────────────────────────────────────
        let evaluator = Evaluator::new(held_out, cfg.eval_selector);
        let steps = run_training::<B>(cfg, train, &evaluator, &checkpoints, &mut logger, device)
            .with_context(|| format!("Training run '{run}' failed"))?;

        Ok(TrainReport {
            snapshot: checkpoints.snapshot_file::<B>(&run),
            logs:     logger.dir().to_path_buf(),
            run,
            steps,
        })
    }
}
