// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw scans to device-resident batches.
//
//   PhantomSource / RawVolumeLoader   → original scans
//       │
//       ▼
//   Normalizer                        → min-max to [0, 1]
//       │
//       ▼
//   splitter                          → seeded train / validation
//       │
//       ▼
//   Degradation                       → reduced network input
//       │
//       ▼
//   VolumeDataset                     → Burn Dataset<VolumeSample>
//       │
//       ▼
//   VolumeBatcher                     → [N, 1, D, H, W] tensors
//       │
//       ▼
//   DataLoader                        → batches in dataset order

/// Reads headerless .raw volumes from a directory
pub mod loader;

/// Seeded synthetic scan generator
pub mod phantom;

/// Min-max intensity normalisation
pub mod preprocessor;

/// Original → reduced transform
pub mod degrade;

/// Implements Burn's Dataset trait for volume pairs
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded, disjoint train/validation partition
pub mod splitter;
