// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `evaluate` and
// `inspect`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, enums, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::{TrainConfig, LOSS_NAME, OPTIMIZER_NAME};
use crate::domain::run_identity::RunIdentity;
use crate::ml::{evaluator::SampleSelector, model::WeightInit};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the 3D U-Net restoration model
    Train(TrainArgs),

    /// Score a finished run on its held-out volumes
    Evaluate(EvaluateArgs),

    /// Print the contents of a checkpoint record
    Inspect(InspectArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightInitArg {
    /// Xavier/Glorot uniform on every Conv3d weight
    Glorot,
    /// burn's default initialisation
    Default,
}

impl From<WeightInitArg> for WeightInit {
    fn from(a: WeightInitArg) -> Self {
        match a {
            WeightInitArg::Glorot  => WeightInit::Glorot,
            WeightInitArg::Default => WeightInit::Default,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPolicyArg {
    /// Always the held-out sample at --eval-index
    Fixed,
    /// A different held-out sample every epoch
    Cycle,
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Number of volumes per optimization step
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 1)]
    pub in_channels: usize,

    #[arg(long, default_value_t = 1)]
    pub out_channels: usize,

    /// Channel width of the first U-Net level
    #[arg(long, default_value_t = 2)]
    pub filters: usize,

    /// Number of down/up-sampling levels; every volume dim must
    /// be divisible by 2^depth
    #[arg(long, default_value_t = 2)]
    pub depth: usize,

    /// Dropout after the bottleneck block
    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    #[arg(long, value_enum, default_value_t = WeightInitArg::Glorot)]
    pub weight_init: WeightInitArg,

    /// Resume from the run's checkpoint record
    #[arg(long)]
    pub restore: bool,

    /// Directory for checkpoint records, snapshots and configs
    #[arg(long, default_value = "Models")]
    pub checkpoint_dir: String,

    /// Root directory for per-run metric logs
    #[arg(long, default_value = "runs")]
    pub logs_dir: String,

    /// Directory of headerless f32 .raw volumes
    /// (synthetic phantoms are generated when omitted)
    #[arg(long)]
    pub volumes_dir: Option<String>,

    /// Volume shape as D,H,W
    #[arg(long, default_value = "32,32,32", value_parser = parse_shape)]
    pub volume_shape: [usize; 3],

    /// Number of phantoms to generate without --volumes-dir
    #[arg(long, default_value_t = 24)]
    pub phantoms: usize,

    /// Block size of the degradation transform
    #[arg(long, default_value_t = 2)]
    pub degrade_factor: usize,

    /// Fraction of volumes held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub holdout: f64,

    /// Seed for phantoms and the train/held-out split
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Held-out sample shown with --eval-policy fixed
    #[arg(long, default_value_t = 0)]
    pub eval_index: usize,

    #[arg(long, value_enum, default_value_t = EvalPolicyArg::Fixed)]
    pub eval_policy: EvalPolicyArg,

    /// Hide the per-epoch progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let eval_selector = match a.eval_policy {
            EvalPolicyArg::Fixed => SampleSelector::Fixed(a.eval_index),
            EvalPolicyArg::Cycle => SampleSelector::Cycle,
        };
        TrainConfig {
            epochs:         a.epochs,
            batch_size:     a.batch_size,
            lr:             a.lr,
            in_channels:    a.in_channels,
            out_channels:   a.out_channels,
            filters:        a.filters,
            depth:          a.depth,
            dropout:        a.dropout,
            weight_init:    a.weight_init.into(),
            restore:        a.restore,
            checkpoint_dir: a.checkpoint_dir,
            logs_dir:       a.logs_dir,
            volumes_dir:    a.volumes_dir,
            volume_shape:   a.volume_shape,
            phantoms:       a.phantoms,
            degrade_factor: a.degrade_factor,
            holdout:        a.holdout,
            seed:           a.seed,
            eval_selector,
            no_progress:    a.no_progress,
        }
    }
}

/// Arguments for `evaluate`. The run is identified by the same
/// settings that named it during training.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    #[arg(long, value_enum, default_value_t = WeightInitArg::Glorot)]
    pub weight_init: WeightInitArg,

    #[arg(long, default_value = "Models")]
    pub checkpoint_dir: String,
}

impl EvaluateArgs {
    pub fn run_identity(&self) -> RunIdentity {
        RunIdentity::derive(
            self.epochs,
            self.batch_size,
            OPTIMIZER_NAME,
            WeightInit::from(self.weight_init).label(),
            LOSS_NAME,
        )
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to a <run>.ckpt file
    pub path: PathBuf,
}

/// Parse "D,H,W" into a shape.
pub fn parse_shape(s: &str) -> Result<[usize; 3], String> {
    let dims: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;

    match dims.as_slice() {
        &[d, h, w] if d > 0 && h > 0 && w > 0 => Ok([d, h, w]),
        _ => Err(format!("expected three positive dims D,H,W, got '{s}'")),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_parse_shape() {
        assert_eq!(parse_shape("8, 16,4"), Ok([8, 16, 4]));
        assert!(parse_shape("8,16").is_err());
        assert!(parse_shape("8,0,4").is_err());
        assert!(parse_shape("a,b,c").is_err());
    }

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["volume-restore", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(TrainConfig::from(args), TrainConfig::default());
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "volume-restore", "train",
            "--epochs", "3",
            "--volume-shape", "8,8,16",
            "--weight-init", "default",
            "--eval-policy", "cycle",
            "--restore",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = TrainConfig::from(args);

        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.volume_shape, [8, 8, 16]);
        assert_eq!(cfg.weight_init, WeightInit::Default);
        assert_eq!(cfg.eval_selector, SampleSelector::Cycle);
        assert!(cfg.restore);
    }

    #[test]
    fn test_evaluate_identity_matches_training() {
        let cli = Cli::try_parse_from(["volume-restore", "evaluate", "--epochs", "4"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };

        let cfg = TrainConfig { epochs: 4, ..TrainConfig::default() };
        assert_eq!(args.run_identity(), cfg.run_identity());
    }
}
