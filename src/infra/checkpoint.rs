// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists training state so an interrupted run can resume.
//
// A checkpoint record is four fields from the same instant:
//
//   epoch            last completed epoch
//   model_state      burn model record   → opaque bytes
//   optimizer_state  burn Adam record    → opaque bytes
//   loss             mean loss of that epoch
//
// The two records are turned into bytes with Burn's
// BinBytesRecorder (full precision), then the whole struct is
// written with bincode as ONE file.
//
// Atomicity: the file is written to "<path>.tmp", flushed and
// fsync'd, then renamed over <path>. A crash leaves either the
// previous complete record or a stray .tmp that load() never
// reads. No history is kept; every save overwrites.
//
// File naming convention (one run = one identity):
//   Models/
//     <run>.ckpt              ← resumable record
//     <run>_final.mpk         ← full-precision model snapshot after the last epoch
//     <run>.config.json       ← TrainConfig, for rebuilding the model
//
// Directories are created on the first save, never on lookup.

use anyhow::Context;
use std::{
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{
        BinBytesRecorder, FileRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Record,
        Recorder,
    },
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::domain::run_identity::RunIdentity;
use crate::error::{Result, TrainError};
use crate::ml::model::UNet3d;

type StateRecorder    = BinBytesRecorder<FullPrecisionSettings>;
type SnapshotRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Everything needed to resume, captured at one training instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub epoch:           usize,
    pub model_state:     Vec<u8>,
    pub optimizer_state: Vec<u8>,
    pub loss:            f64,
}

/// Serialise a burn record (model or optimizer) into an opaque blob.
pub fn encode_state<B: Backend, R: Record<B>>(record: R) -> Result<Vec<u8>> {
    let recorder = StateRecorder::default();
    Recorder::<B>::record(&recorder, record, ())
        .map_err(|e| TrainError::Tensor(format!("cannot encode state: {e:?}")))
}

/// Inverse of `encode_state`.
pub fn decode_state<B: Backend, R: Record<B>>(bytes: Vec<u8>, device: &B::Device) -> Result<R> {
    let recorder = StateRecorder::default();
    Recorder::<B>::load(&recorder, bytes, device)
        .map_err(|e| TrainError::Tensor(format!("cannot decode state: {e:?}")))
}

pub struct CheckpointManager {
    /// Directory holding every artifact of every run
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, run: &RunIdentity) -> PathBuf {
        self.dir.join(format!("{run}.ckpt"))
    }

    /// Snapshot path without extension; the recorder sets its own.
    pub fn snapshot_path(&self, run: &RunIdentity) -> PathBuf {
        self.dir.join(format!("{run}_final"))
    }

    /// The file the snapshot recorder actually writes for `snapshot_path`.
    pub fn snapshot_file<B: Backend>(&self, run: &RunIdentity) -> PathBuf {
        self.snapshot_path(run)
            .with_extension(<SnapshotRecorder as FileRecorder<B>>::file_extension())
    }

    pub fn config_path(&self, run: &RunIdentity) -> PathBuf {
        self.dir.join(format!("{run}.config.json"))
    }

    /// Atomically write `record` to `path`, replacing any previous one.
    pub fn save(&self, path: &Path, record: &CheckpointRecord) -> Result<()> {
        let bytes = bincode::serialize(record).map_err(|e| TrainError::checkpoint(path, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = tmp_path(path);
        let write = || -> std::io::Result<()> {
            let mut f = File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.flush()?;
            f.sync_all()?;
            fs::rename(&tmp, path)
        };
        write().map_err(|e| {
            fs::remove_file(&tmp).ok();
            TrainError::checkpoint(path, e)
        })?;

        tracing::debug!(
            "Saved checkpoint: epoch {} loss {:.6} → '{}'",
            record.epoch,
            record.loss,
            path.display()
        );
        Ok(())
    }

    /// Read a record back. Missing, truncated or malformed files
    /// are all `CheckpointIo` errors; the caller decides what to do.
    pub fn load(&self, path: &Path) -> Result<CheckpointRecord> {
        let bytes = fs::read(path).map_err(|e| TrainError::checkpoint(path, e))?;

        bincode::deserialize(&bytes)
            .map_err(|e| TrainError::checkpoint(path, format!("malformed record: {e}")))
    }

    /// Write the final full-model snapshot for `run`.
    pub fn save_model<B: Backend>(&self, model: &UNet3d<B>, run: &RunIdentity) -> Result<PathBuf> {
        let path = self.snapshot_path(run);
        fs::create_dir_all(&self.dir)?;

        Recorder::<B>::record(&SnapshotRecorder::new(), model.clone().into_record(), path.clone())
            .map_err(|e| TrainError::checkpoint(&path, format!("{e:?}")))?;

        let file = self.snapshot_file::<B>(run);
        tracing::debug!("Saved final model snapshot '{}'", file.display());
        Ok(file)
    }

    /// Load the final snapshot of `run` into a freshly built model.
    /// The architecture must match the one that was saved.
    pub fn load_model<B: Backend>(
        &self,
        model:  UNet3d<B>,
        run:    &RunIdentity,
        device: &B::Device,
    ) -> Result<UNet3d<B>> {
        let path = self.snapshot_path(run);

        let record = Recorder::<B>::load(&SnapshotRecorder::new(), path.clone(), device)
            .map_err(|e| TrainError::checkpoint(&path, format!("{e:?}")))?;

        Ok(model.load_record(record))
    }

    /// Save the run configuration so `evaluate` can rebuild everything.
    pub fn save_config(&self, cfg: &TrainConfig, run: &RunIdentity) -> anyhow::Result<()> {
        let path = self.config_path(run);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self, run: &RunIdentity) -> anyhow::Result<TrainConfig> {
        let path = self.config_path(run);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Has this run finished training?",
                path.display()
            )
        })?;

        Ok(serde_json::from_str(&json)?)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::UNet3dConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn record() -> CheckpointRecord {
        CheckpointRecord {
            epoch:           5,
            model_state:     vec![1, 2, 3, 250],
            optimizer_state: vec![9; 17],
            loss:            0.12,
        }
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        mgr.save(&path, &record()).unwrap();
        let loaded = mgr.load(&path).unwrap();

        assert_eq!(loaded, record());
        assert_eq!(loaded.loss.to_bits(), 0.12f64.to_bits());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        mgr.save(&path, &record()).unwrap();
        let newer = CheckpointRecord { epoch: 6, loss: 0.1, ..record() };
        mgr.save(&path, &newer).unwrap();

        assert_eq!(mgr.load(&path).unwrap().epoch, 6);
    }

    #[test]
    fn test_missing_file_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path());

        let res = mgr.load(&dir.path().join("absent.ckpt"));
        assert!(matches!(res, Err(TrainError::CheckpointIo { .. })));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        mgr.save(&path, &record()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(mgr.load(&path), Err(TrainError::CheckpointIo { .. })));
    }

    #[test]
    fn test_resave_reproduces_loss() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        mgr.save(&path, &record()).unwrap();
        let first = mgr.load(&path).unwrap();
        mgr.save(&path, &first).unwrap();

        assert_eq!(mgr.load(&path).unwrap().loss, first.loss);
    }

    #[test]
    fn test_model_state_blob_round_trip() {
        let device = Default::default();
        let cfg    = UNet3dConfig::new(1, 1, 1).with_depth(1);
        let model  = cfg.init::<TestBackend>(&device).unwrap();

        let blob     = encode_state::<TestBackend, _>(model.clone().into_record()).unwrap();
        let restored = cfg
            .init::<TestBackend>(&device)
            .unwrap()
            .load_record(decode_state::<TestBackend, _>(blob, &device).unwrap());

        let x = Tensor::<TestBackend, 5>::ones([1, 1, 2, 2, 2], &device);
        let a = model.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        let b = restored.forward(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_final_snapshot_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path());
        let run    = RunIdentity::derive(1, 1, "ADAM", "Glorot", "L1");
        let device = Default::default();
        let cfg    = UNet3dConfig::new(1, 1, 1).with_depth(1);
        let model  = cfg.init::<TestBackend>(&device).unwrap();

        let file = mgr.save_model(&model, &run).unwrap();
        assert!(file.exists());
        assert_eq!(file, mgr.snapshot_file::<TestBackend>(&run));
        let loaded = mgr
            .load_model(cfg.init::<TestBackend>(&device).unwrap(), &run, &device)
            .unwrap();

        let w0 = model.head.weight.val().into_data().to_vec::<f32>().unwrap();
        let w1 = loaded.head.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(w0, w1);
    }

    #[test]
    fn test_failed_save_keeps_previous_record() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        mgr.save(&path, &record()).unwrap();

        // A directory in the temp file's place makes the write fail
        fs::create_dir(tmp_path(&path)).unwrap();
        let newer = CheckpointRecord { epoch: 6, loss: 0.1, ..record() };
        let res   = mgr.save(&path, &newer);

        assert!(matches!(res, Err(TrainError::CheckpointIo { .. })));
        assert_eq!(mgr.load(&path).unwrap(), record());
        assert!(!tmp_path(&path).is_file());
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        // A directory at the target makes the final rename fail
        fs::create_dir(&path).unwrap();
        let res = mgr.save(&path, &record());

        assert!(matches!(res, Err(TrainError::CheckpointIo { .. })));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_stray_temp_file_is_ignored() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path());
        let path = dir.path().join("run.ckpt");

        mgr.save(&path, &record()).unwrap();
        fs::write(tmp_path(&path), b"half-written").unwrap();

        assert_eq!(mgr.load(&path).unwrap(), record());

        let newer = CheckpointRecord { epoch: 6, ..record() };
        mgr.save(&path, &newer).unwrap();
        assert_eq!(mgr.load(&path).unwrap().epoch, 6);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_lookups_do_not_create_directories() {
        let dir     = tempfile::tempdir().unwrap();
        let missing = dir.path().join("Models");
        let mgr     = CheckpointManager::new(&missing);
        let run     = RunIdentity::derive(1, 1, "ADAM", "Glorot", "L1");

        assert!(mgr.load(&mgr.record_path(&run)).is_err());
        assert!(mgr.load_config(&run).is_err());
        assert!(!missing.exists());

        mgr.save(&mgr.record_path(&run), &record()).unwrap();
        assert!(missing.is_dir());
    }
}
