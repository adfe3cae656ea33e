// ============================================================
// Crate-wide Error Taxonomy
// ============================================================
// Every failure the training core can surface. The application
// layer wraps these in anyhow; nothing below it retries.
//
//   Configuration     → bad hyperparameters / architecture dims
//   ShapeMismatch     → prediction and target disagree
//   CheckpointIo      → missing, truncated or malformed record
//   NumericDivergence → NaN / Inf loss
//   Data / Tensor     → dataset and host read-back problems
//
// Device exhaustion is raised by the burn backend as a panic
// and is deliberately not caught.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the data, ml and infra layers.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid hyperparameters or architecture dimensions.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two tensors that must agree in shape do not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Shape of the reference tensor.
        expected: Vec<usize>,
        /// Shape that was actually produced.
        got: Vec<usize>,
    },

    /// A checkpoint could not be written or read back.
    #[error("checkpoint '{}': {reason}", path.display())]
    CheckpointIo {
        /// Checkpoint location.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The loss left the finite range.
    #[error("numeric divergence at step {step}: loss = {value}")]
    NumericDivergence {
        /// Step counter value when the bad loss was observed.
        step: usize,
        /// Offending loss value.
        value: f64,
    },

    /// Dataset or sample problems.
    #[error("data error: {0}")]
    Data(String),

    /// Reading tensor data back to the host failed.
    #[error("tensor error: {0}")]
    Tensor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrainError {
    pub fn checkpoint(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CheckpointIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
