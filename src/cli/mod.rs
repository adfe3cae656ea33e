// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — trains (or resumes) a run
//   2. `evaluate` — scores a finished run on held-out volumes
//   3. `inspect`  — prints a checkpoint record's epoch and loss
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, InspectArgs, TrainArgs};

use crate::infra::checkpoint::CheckpointManager;

#[derive(Parser, Debug)]
#[command(
    name = "volume-restore",
    version,
    about = "Train a 3D U-Net that restores degraded volumetric scans."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Inspect(args)  => run_inspect(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let report = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete after {} steps.", report.steps);
    println!("  run:      {}", report.run);
    println!("  snapshot: {}", report.snapshot.display());
    println!("  logs:     {}", report.logs.display());
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.checkpoint_dir.clone(), args.run_identity()).execute()?;

    println!("Run: {}", report.run);
    match report.mean_l1 {
        Some(l1) => println!("Mean L1 over {} held-out volumes: {l1:.6}", report.samples),
        None     => println!("No held-out volumes to evaluate."),
    }
    if let Some(figure) = report.figure {
        println!("Figure: {}", figure.display());
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let dir    = args.path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    let record = CheckpointManager::new(dir).load(&args.path)?;

    println!("Checkpoint: {}", args.path.display());
    println!("  epoch:           {}", record.epoch);
    println!("  loss:            {}", record.loss);
    println!("  model state:     {} bytes", record.model_state.len());
    println!("  optimizer state: {} bytes", record.optimizer_state.len());
    Ok(())
}
