// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of a run:
//
//   checkpoint.rs — resumable CheckpointRecord (bincode, atomic
//                   tmp + rename), the final full-precision
//                   snapshot, and the run config as JSON
//
//   metrics.rs    — MetricSink implementations: RunLogger
//                   (CSV + PNG under runs/<id>/) and MemorySink
//
//   figure.rs     — renders a Figure into a grayscale PNG
//
// Every artifact path is namespaced by the RunIdentity.

/// Checkpoint records, model snapshots and run config
pub mod checkpoint;

/// Run-scoped scalar and figure logging
pub mod metrics;

/// Figure → PNG rendering
pub mod figure;
