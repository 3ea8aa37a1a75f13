//! Checkpoint/Resume controller
//!
//! Persists one whole epoch of trainer state (model weights, optimizer
//! record, scheduler state, score history) and restores it on startup. Each
//! epoch is written into its own directory; `latest.json` is the commit
//! pointer, replaced by an atomic rename only after every artifact of the
//! new epoch is fully on disk. A crash at any point therefore leaves the
//! previously committed epoch intact and mutually consistent, and the
//! superseded directory is pruned only after the pointer moves.

use std::fs;
use std::path::PathBuf;

use burn::{
    module::{AutodiffModule, Module},
    optim::Optimizer,
    record::{CompactRecorder, Recorder, RecorderError},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::scheduler::PlateauScheduler;
use crate::utils::error::{FewShotError, Result};
use crate::utils::metrics::EpochRecord;

/// Commit pointer to the most recent fully written epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    epoch: usize,
    dir: String,
}

/// Non-module state restored from a checkpoint
#[derive(Debug, Clone)]
pub struct ResumePoint {
    pub scheduler: PlateauScheduler,
    pub history: Vec<EpochRecord>,
    /// One past the last recorded epoch
    pub next_epoch: usize,
}

/// Durable per-run checkpoint store rooted at one directory
#[derive(Debug, Clone)]
pub struct CheckpointController {
    root: PathBuf,
}

fn record_err(err: RecorderError) -> FewShotError {
    FewShotError::Checkpoint(format!("{:?}", err))
}

impl CheckpointController {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join("latest.json")
    }

    fn epoch_dir_name(epoch: usize) -> String {
        format!("epoch_{:04}", epoch)
    }

    fn read_pointer(&self) -> Result<Option<LatestPointer>> {
        let path = self.pointer_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Persist one completed epoch's full state.
    ///
    /// Must be called after every epoch, before the next one starts; the
    /// epoch boundary is the only safe interruption point of a run.
    pub fn save<B, M, O>(
        &self,
        epoch: usize,
        model: &M,
        optimizer: &O,
        scheduler: &PlateauScheduler,
        history: &[EpochRecord],
    ) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let dir_name = Self::epoch_dir_name(epoch);
        let dir = self.root.join(&dir_name);

        // A leftover directory means a previous save of this epoch was
        // interrupted before commit; its contents are unreferenced.
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let recorder = CompactRecorder::new();
        model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .map_err(record_err)?;
        recorder
            .record(optimizer.to_record(), dir.join("optim"))
            .map_err(record_err)?;
        fs::write(
            dir.join("scheduler.json"),
            serde_json::to_string_pretty(scheduler)?,
        )?;
        fs::write(
            dir.join("score_list.json"),
            serde_json::to_string_pretty(history)?,
        )?;

        // Commit point: everything above is invisible until this rename.
        let previous = self.read_pointer()?;
        let pointer = LatestPointer {
            epoch,
            dir: dir_name,
        };
        let tmp = self.root.join("latest.json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&pointer)?)?;
        fs::rename(&tmp, self.pointer_path())?;

        if let Some(prev) = previous {
            if prev.dir != pointer.dir {
                debug!("Pruning superseded checkpoint {}", prev.dir);
                let _ = fs::remove_dir_all(self.root.join(prev.dir));
            }
        }

        info!("Checkpoint saved for epoch {} in {:?}", epoch, self.root);
        Ok(())
    }

    /// Restore the most recently committed epoch, if any.
    ///
    /// Takes the freshly constructed model and optimizer and returns them
    /// either untouched (no prior state; start at epoch 0) or loaded with
    /// the committed records plus the accompanying [`ResumePoint`].
    pub fn load<B, M, O>(
        &self,
        model: M,
        optimizer: O,
        device: &B::Device,
    ) -> Result<(M, O, Option<ResumePoint>)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let Some(pointer) = self.read_pointer()? else {
            return Ok((model, optimizer, None));
        };

        let dir = self.root.join(&pointer.dir);
        let recorder = CompactRecorder::new();

        let model = model
            .load_file(dir.join("model"), &recorder, device)
            .map_err(record_err)?;
        let optimizer_record = recorder
            .load(dir.join("optim"), device)
            .map_err(record_err)?;
        let optimizer = optimizer.load_record(optimizer_record);

        let scheduler: PlateauScheduler =
            serde_json::from_str(&fs::read_to_string(dir.join("scheduler.json"))?)?;
        let history: Vec<EpochRecord> =
            serde_json::from_str(&fs::read_to_string(dir.join("score_list.json"))?)?;

        let next_epoch = match history.last() {
            Some(last) => last.epoch + 1,
            None => {
                return Err(FewShotError::Checkpoint(format!(
                    "checkpoint {} has an empty score history",
                    pointer.dir
                )))
            }
        };

        info!(
            "Resuming from checkpoint at epoch {} ({} epochs recorded)",
            pointer.epoch,
            history.len()
        );

        Ok((model, optimizer, Some(ResumePoint {
            scheduler,
            history,
            next_epoch,
        })))
    }
}
