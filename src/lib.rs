//! # Few-Shot Prototypical Networks
//!
//! An episodic few-shot metric-learning engine built on the Burn framework.
//! A configurable embedding backbone maps images to feature vectors; per
//! episode, query samples are classified by distance to the mean embedding
//! ("prototype") of each class in a small labeled support set.
//!
//! ## Modules
//!
//! - `model`: backbone factory (conv4, mlp, wrn, resnet18) and the
//!   prototype-distance classification head
//! - `dataset`: the episode data model and a deterministic synthetic
//!   episode sampler
//! - `training`: episodic trainer/evaluator, plateau learning-rate
//!   scheduler, and resumable per-epoch checkpointing
//! - `utils`: error taxonomy, logging, and metric records
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fewshot_protonet::backend::TrainingBackend;
//! use fewshot_protonet::model::{build_backbone, Architecture, BackboneConfig, TrainingConfig};
//! use fewshot_protonet::training::{CheckpointController, EpisodicTrainer};
//!
//! let config = BackboneConfig::new(Architecture::Conv4 { gap: true }, 3, 84, 84, 64);
//! let model = build_backbone::<TrainingBackend>(&config, &device)?;
//! let mut trainer = EpisodicTrainer::new(model, TrainingConfig::default(), device)?;
//! // ... feed episodes through trainer.fit(...)
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{relative_labels, Episode, SyntheticConfig, SyntheticEpisodeSampler};
pub use model::{build_backbone, prototype_distance, Architecture, Backbone, BackboneConfig};
pub use training::{
    accuracy, eval_step, CheckpointController, EpisodicTrainer, PlateauScheduler, RunPhase,
    TrainingConfig,
};
pub use utils::error::{FewShotError, Result};
pub use utils::metrics::{EpochRecord, MetricSink, NullSink, TracingSink};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
