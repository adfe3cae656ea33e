// ============================================================
// Layer 4 — Raw Volume Loader
// ============================================================
// Loads scans stored as headerless binary volumes:
//
//   <dir>/
//     scan_000.raw   ← D·H·W little-endian f32 values, [D, H, W] order
//     scan_001.raw
//     ...
//
// Raw files carry no header, so the shape is supplied by the
// caller and every file must hold exactly D·H·W·4 bytes.
// Files are read in name order so the dataset order (and the
// seeded split on top of it) is stable between runs.
// Each volume is min-max normalised on load.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::data::preprocessor::Normalizer;
use crate::domain::traits::VolumeSource;
use crate::domain::volume::{ScanVolume, Volume};

const RAW_EXTENSION: &str = "raw";

/// Loads all .raw volumes of a known shape from a directory.
pub struct RawVolumeLoader {
    dir:   PathBuf,
    shape: [usize; 3],
}

impl RawVolumeLoader {
    pub fn new(dir: impl Into<PathBuf>, shape: [usize; 3]) -> Self {
        Self { dir: dir.into(), shape }
    }

    fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }
}

impl VolumeSource for RawVolumeLoader {
    fn load_all(&self) -> Result<Vec<ScanVolume>> {
        if !self.dir.exists() {
            tracing::warn!(
                "Volume directory '{}' does not exist; returning empty corpus",
                self.dir.display()
            );
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(RAW_EXTENSION))
            .collect();
        paths.sort();

        let normalizer = Normalizer::new();
        let mut volumes = Vec::with_capacity(paths.len());

        for path in paths {
            match read_raw(&path, self.shape, self.voxel_count()) {
                Ok(voxels) => {
                    let source = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                        .to_string();
                    volumes.push(ScanVolume::new(source, normalizer.normalize(&voxels)));
                }
                // One unreadable file does not sink the whole corpus
                Err(e) => tracing::warn!("Skipping '{}': {:#}", path.display(), e),
            }
        }

        tracing::info!("Loaded {} volumes from '{}'", volumes.len(), self.dir.display());
        Ok(volumes)
    }
}

/// Decode one headerless little-endian f32 volume.
fn read_raw(path: &Path, shape: [usize; 3], voxels: usize) -> Result<Volume> {
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;

    let expected = voxels * std::mem::size_of::<f32>();
    if bytes.len() != expected {
        anyhow::bail!(
            "expected {} bytes for shape {:?}, found {}",
            expected,
            shape,
            bytes.len()
        );
    }

    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(Volume::from_shape_vec((shape[0], shape[1], shape[2]), values)?)
}
