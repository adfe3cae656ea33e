// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model, training and inference code built on burn.
//
//   device.rs     — picks wgpu or the ndarray CPU fallback once
//                   per process
//
//   model.rs      — UNet3d: strided-conv encoder, transposed-conv
//                   decoder with skip connections, Glorot init
//                   on every Conv3d
//
//   trainer.rs    — TrainingContext and the epoch/batch loop:
//                   L1 loss, Adam step, per-step logging,
//                   evaluation, checkpoint + resume
//
//   evaluator.rs  — per-epoch comparison figure under an
//                   InferenceScope guard
//
//   inferencer.rs — host volume in, host volume out; also the
//                   `evaluate` command's model wrapper
//
// Reference: Burn Book §5 (Training)
//            Çiçek et al. (2016) 3D U-Net
//            Kingma & Ba (2015) Adam

/// Compute device selection
pub mod device;

/// 3D U-Net architecture and weight initialisation
pub mod model;

/// Training loop, checkpointing and resume
pub mod trainer;

/// Per-epoch evaluation figure
pub mod evaluator;

/// Forward passes on host volumes
pub mod inferencer;
