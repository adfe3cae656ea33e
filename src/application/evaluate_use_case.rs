// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a finished run on its held-out volumes:
//
//   1. Reload <run>.config.json          (Layer 6 - infra)
//   2. Rebuild the held-out split        (Layer 4 - data)
//   3. Load the final model snapshot     (Layer 5 - ml)
//   4. Mean L1 over every held-out pair
//   5. One comparison figure for the selected sample, logged
//      under "evaluation" at step 0 (training steps start at 1)

use anyhow::{Context, Result};
use burn::{
    backend::{NdArray, Wgpu},
    prelude::Backend,
};
use std::path::PathBuf;

use crate::data::splitter::Split;
use crate::domain::{run_identity::RunIdentity, traits::MetricSink};
use crate::infra::{checkpoint::CheckpointManager, metrics::RunLogger};
use crate::ml::{
    device::{self, ComputeDevice},
    evaluator::{comparison_figure, EVALUATION_SERIES},
    inferencer::Inferencer,
};

/// Step the evaluate command logs at.
pub const EVALUATION_STEP: usize = 0;

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub run:     RunIdentity,
    pub samples: usize,
    /// None when the held-out set is empty
    pub mean_l1: Option<f64>,
    pub figure:  Option<PathBuf>,
}

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    run:            RunIdentity,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: impl Into<String>, run: RunIdentity) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), run }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        match device::resolve() {
            ComputeDevice::Accelerator(d) => self.execute_on::<Wgpu>(d.clone()),
            ComputeDevice::Cpu(d)         => self.execute_on::<NdArray>(d.clone()),
        }
    }

    pub fn execute_on<B: Backend>(&self, device: B::Device) -> Result<EvaluationReport> {
        let checkpoints = CheckpointManager::new(&self.checkpoint_dir);
        let cfg         = checkpoints.load_config(&self.run)?;

        let held_out = cfg.dataset(Split::Validation)?;
        tracing::info!("Evaluating '{}' on {} held-out volumes", self.run, held_out.sample_count());

        let inferencer = Inferencer::<B>::from_checkpoint(
            &checkpoints,
            &self.run,
            &cfg.model_config(),
            device,
        )
        .with_context(|| format!("Cannot load the final model of '{}'", self.run))?;

        let mean_l1 = inferencer.mean_l1(&held_out)?;

        let mut report = EvaluationReport {
            run:     self.run.clone(),
            samples: held_out.sample_count(),
            mean_l1,
            figure:  None,
        };
        if held_out.sample_count() == 0 {
            tracing::warn!("Held-out set is empty; no figure written");
            return Ok(report);
        }

        // Same selection rule as the last training epoch
        let last_epoch = cfg.epochs.saturating_sub(1);
        let index      = cfg.eval_selector.pick(last_epoch, held_out.sample_count())?;
        let sample     = burn::data::dataset::Dataset::get(&held_out, index)
            .with_context(|| format!("Held-out sample {index} missing"))?;

        let predicted = inferencer.predict(&sample.degraded)?;
        let figure    = comparison_figure(last_epoch, &sample.original, &sample.degraded, &predicted)?;

        let mut logger = RunLogger::new(&cfg.logs_dir, &self.run)?;
        if let Some(mean) = mean_l1 {
            logger.record_scalar("evaluation_l1", mean, EVALUATION_STEP)?;
        }
        logger.record_figure(EVALUATION_SERIES, &figure, EVALUATION_STEP)?;

        report.figure = Some(
            logger
                .dir()
                .join("figures")
                .join(format!("{EVALUATION_SERIES}_{EVALUATION_STEP:06}.png")),
        );
        Ok(report)
    }
}
