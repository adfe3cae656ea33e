// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop talks to its collaborators through these
// traits, never through concrete types:
//
//   VolumeSource → where raw scans come from
//                  (synthetic phantoms, a directory of .raw files)
//   MetricSink   → where scalars and figures go
//                  (files under runs/<id>/, or memory in tests)

use anyhow::Result;

use crate::domain::figure::Figure;
use crate::domain::volume::ScanVolume;

// ─── VolumeSource ─────────────────────────────────────────────────────────────
/// Any component that can produce the full set of original scans.
///
/// Implementations:
///   - PhantomSource   → seeded synthetic volumes
///   - RawVolumeLoader → headerless f32 files on disk
pub trait VolumeSource {
    /// Load every available volume, in a stable order.
    fn load_all(&self) -> Result<Vec<ScanVolume>>;
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// Append-only destination for training instrumentation,
/// keyed by the global step counter.
///
/// Implementations:
///   - RunLogger  → CSV + PNG files under the run's log directory
///   - MemorySink → in-process vectors
///
/// Callers treat errors from a sink as non-fatal.
pub trait MetricSink {
    /// Append one point of a scalar time series.
    fn record_scalar(&mut self, series: &str, value: f64, step: usize) -> Result<()>;

    /// Store a rendered figure.
    fn record_figure(&mut self, series: &str, figure: &Figure, step: usize) -> Result<()>;
}
