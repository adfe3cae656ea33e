// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits describing what the system works
// with: volumes, figures, run identities, and the collaborator
// traits the training loop depends on.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//   - ndarray is allowed: it is the host-side volume container

// A 3D scan and the middle-plane slicing used for display
pub mod volume;

// Titled rows of 2D panels handed to the metric sink
pub mod figure;

// Deterministic artifact namespace for one configuration
pub mod run_identity;

// Core abstractions (traits) that other layers implement
pub mod traits;
