// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training a run or evaluating one).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination and configuration
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow and its configuration
pub mod train_use_case;

// Scoring a finished run on its held-out volumes
pub mod evaluate_use_case;
