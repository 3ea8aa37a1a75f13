//! Episodic training: trainer, plateau scheduler, and checkpointing
//!
//! One run is a strictly sequential loop: train epoch, validation epoch,
//! metric record, checkpoint. The checkpoint boundary is the epoch boundary
//! and the only safe interruption point; the controller guarantees a crashed
//! run resumes from the last fully committed epoch.

pub mod checkpoint;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{CheckpointController, ResumePoint};
pub use scheduler::{PlateauMode, PlateauScheduler};
pub use trainer::{accuracy, eval_step, EpisodicTrainer, EpochMetrics, EvalStep, RunPhase, StepMetrics};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
