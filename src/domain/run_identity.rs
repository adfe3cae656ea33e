// ============================================================
// Layer 3 — Run Identity
// ============================================================
// A deterministic name for one hyperparameter configuration.
// It namespaces both the metric log directory and the
// checkpoint files, so two runs with the same settings share
// artifacts and a resumed run finds its own checkpoint.
//
// Format:
//   baseUnet3D_OriginalSize_{Optim}Optim_{E}Epochs_BS{B}_{Init}Weights_{Loss}Loss

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunIdentity(String);

impl RunIdentity {
    /// Build the identity from the settings that define a run.
    pub fn derive(
        epochs:      usize,
        batch_size:  usize,
        optimizer:   &str,
        weight_init: &str,
        loss:        &str,
    ) -> Self {
        Self(format!(
            "baseUnet3D_OriginalSize_{optimizer}Optim_{epochs}Epochs_BS{batch_size}_{weight_init}Weights_{loss}Loss"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
