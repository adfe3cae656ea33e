// ============================================================
// Layer 3 — Volume Domain Type
// ============================================================
// A scan is a single-channel 3D intensity grid, stored on the
// host as an ndarray Array3<f32> with axes [D, H, W].
//
// The evaluation figures show one plane of each volume:
// the middle plane along the third spatial axis, transposed
// for display.
//
//   index = shape[2] / 2      (integer floor, no interpolation)
//   depth 7 → plane 3
//   depth 8 → plane 4

use ndarray::{Array2, Array3, Axis};

/// Host-side volume, axes ordered [D, H, W].
pub type Volume = Array3<f32>;

/// A volume loaded from some source, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ScanVolume {
    /// File name or generator label, kept for traceability
    pub source: String,

    /// Voxel intensities
    pub voxels: Volume,
}

impl ScanVolume {
    pub fn new(source: impl Into<String>, voxels: Volume) -> Self {
        Self {
            source: source.into(),
            voxels,
        }
    }

    /// Spatial shape as [D, H, W]
    pub fn shape(&self) -> [usize; 3] {
        let s = self.voxels.shape();
        [s[0], s[1], s[2]]
    }
}

/// Index of the representative plane along an axis of `extent` voxels.
pub fn middle_index(extent: usize) -> usize {
    extent / 2
}

/// Middle plane along the third spatial axis, transposed for display.
///
/// For a [D, H, W] volume this returns an [H, D] image.
/// Returns None when the third axis is empty.
pub fn middle_slice(volume: &Volume) -> Option<Array2<f32>> {
    let extent = volume.shape()[2];
    if extent == 0 {
        return None;
    }
    let plane = volume.index_axis(Axis(2), middle_index(extent));
    Some(plane.t().to_owned())
}
