// ============================================================
// Layer 5 — Device Resolver
// ============================================================
// Picks the compute device once per process.
//
//   1. Try the default wgpu adapter with a one-element tensor
//      round-trip (the first use is where a missing adapter
//      surfaces, as a panic inside the backend).
//   2. On success → Accelerator; on failure → NdArray CPU.
//
// Falling back is a capability downgrade, not an error.
// The answer is cached in a OnceLock and never changes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Wgpu};
use burn::prelude::*;

#[derive(Debug, Clone)]
pub enum ComputeDevice {
    /// GPU (or other adapter) through the wgpu backend
    Accelerator(WgpuDevice),
    /// Plain CPU through the ndarray backend
    Cpu(NdArrayDevice),
}

impl ComputeDevice {
    pub fn describe(&self) -> String {
        match self {
            ComputeDevice::Accelerator(d) => format!("wgpu accelerator ({d:?})"),
            ComputeDevice::Cpu(d)         => format!("ndarray CPU fallback ({d:?})"),
        }
    }
}

static RESOLVED: OnceLock<ComputeDevice> = OnceLock::new();

/// Process-wide compute device, probed on first call.
pub fn resolve() -> &'static ComputeDevice {
    RESOLVED.get_or_init(|| {
        let device = probe();
        tracing::info!("Using {}", device.describe());
        device
    })
}

fn probe() -> ComputeDevice {
    let device = WgpuDevice::default();

    // Silence the backend's panic message while probing
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        Tensor::<Wgpu, 1>::zeros([1], &device).into_data()
    }));
    panic::set_hook(previous_hook);

    match outcome {
        Ok(_)  => ComputeDevice::Accelerator(device),
        Err(_) => {
            tracing::warn!("No usable wgpu adapter; falling back to CPU");
            ComputeDevice::Cpu(NdArrayDevice::Cpu)
        }
    }
}
