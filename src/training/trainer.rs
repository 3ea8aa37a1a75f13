//! Episodic training and evaluation engine
//!
//! Owns the backbone, the Adam optimizer and the plateau scheduler, and
//! drives the per-epoch loop over episodes: forward, prototype-distance
//! loss, backward and one optimizer step per episode during training;
//! gradient-free evaluation with strict shape checking during validation.
//!
//! Aggregation is deliberately asymmetric and must stay that way: train
//! epochs report the unweighted mean over episodes, eval epochs weight every
//! episode by its query count. Changing either silently changes the meaning
//! of reported metrics.

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{
        adaptor::OptimizerAdaptor, decay::WeightDecayConfig, Adam, AdamConfig, GradientsParams,
        Optimizer,
    },
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use tracing::{debug, info};

use crate::dataset::Episode;
use crate::model::{prototype_distance, Backbone, TrainingConfig};
use crate::training::checkpoint::CheckpointController;
use crate::training::scheduler::PlateauScheduler;
use crate::utils::error::Result;
use crate::utils::metrics::{EpochRecord, MetricSink};

/// Phase of a training run.
///
/// `Resuming` is entered unconditionally at the start of [`EpisodicTrainer::fit`]
/// and falls through to `Initialized` when the checkpoint controller has no
/// prior state; the epoch loop then alternates training and validation until
/// `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initialized,
    Resuming,
    TrainingEpoch,
    ValidatingEpoch,
    Completed,
}

/// Loss and top-1 accuracy of one training episode
#[derive(Debug, Clone, Copy)]
pub struct StepMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Loss and correct-count of one evaluation episode
#[derive(Debug, Clone, Copy)]
pub struct EvalStep {
    /// Mean cross-entropy over the episode's queries
    pub loss: f64,
    /// Correctly classified queries
    pub correct: usize,
    /// Total queries in the episode
    pub queries: usize,
}

/// Aggregated metrics of one epoch
#[derive(Debug, Clone, Copy)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Episodic trainer/evaluator
pub struct EpisodicTrainer<B: AutodiffBackend> {
    model: Backbone<B>,
    optimizer: OptimizerAdaptor<Adam, Backbone<B>, B>,
    scheduler: PlateauScheduler,
    config: TrainingConfig,
    device: B::Device,
    phase: RunPhase,
    history: Vec<EpochRecord>,
}

impl<B: AutodiffBackend> EpisodicTrainer<B> {
    /// Create a trainer with run-scoped configuration; nothing here mutates
    /// the configuration afterwards.
    pub fn new(model: Backbone<B>, config: TrainingConfig, device: B::Device) -> Result<Self> {
        config.validate()?;

        let optimizer = Self::fresh_optimizer(&config);
        let scheduler = PlateauScheduler::from_config(&config);

        Ok(Self {
            model,
            optimizer,
            scheduler,
            config,
            device,
            phase: RunPhase::Initialized,
            history: Vec::new(),
        })
    }

    fn fresh_optimizer(config: &TrainingConfig) -> OptimizerAdaptor<Adam, Backbone<B>, B> {
        AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
            .init()
    }

    /// One training episode: forward, prototype-distance loss, backward,
    /// one optimizer step.
    ///
    /// Every episode is its own gradient step; gradients are computed fresh
    /// from this episode's loss and nothing accumulates across episodes.
    pub fn train_step(&mut self, episode: &Episode<B>) -> Result<StepMetrics> {
        let support_embeddings = self.model.forward(episode.support_batch());
        let query_embeddings = self.model.forward(episode.query_batch());

        let logits = prototype_distance(
            support_embeddings,
            query_embeddings,
            episode.support_labels(),
        )?;
        let query_labels = episode.query_labels();

        let loss = CrossEntropyLossConfig::new()
            .init(&self.device)
            .forward(logits.clone(), query_labels.clone());
        let loss_value: f64 = loss.clone().into_scalar().elem();
        let episode_accuracy = accuracy(logits, query_labels);

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.scheduler.lr(), self.model.clone(), grads);

        Ok(StepMetrics {
            loss: loss_value,
            accuracy: episode_accuracy,
        })
    }

    /// One pass over the training episodes.
    ///
    /// Reports the unweighted mean of per-episode loss and accuracy.
    pub fn train_epoch(&mut self, episodes: &[Episode<B>]) -> Result<EpochMetrics> {
        let mut loss_sum = 0.0;
        let mut accuracy_sum = 0.0;

        for (index, episode) in episodes.iter().enumerate() {
            let step = self.train_step(episode)?;
            loss_sum += step.loss;
            accuracy_sum += step.accuracy;

            if (index + 1) % 50 == 0 || index + 1 == episodes.len() {
                debug!(
                    "  Episode {}/{}: loss = {:.4}, acc = {:.2}%",
                    index + 1,
                    episodes.len(),
                    step.loss,
                    step.accuracy * 100.0
                );
            }
        }

        let count = episodes.len().max(1) as f64;
        Ok(EpochMetrics {
            loss: loss_sum / count,
            accuracy: accuracy_sum / count,
        })
    }

    /// One pass over the validation episodes, without gradient tracking.
    ///
    /// Loss and correct counts are weighted by each episode's query count
    /// before dividing by the total number of query samples. The plateau
    /// scheduler then steps on the epoch's mean loss.
    pub fn eval_epoch(&mut self, episodes: &[Episode<B::InnerBackend>]) -> Result<EpochMetrics> {
        let model = self.model.valid();

        let mut weighted_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;

        for episode in episodes {
            let step = eval_step(&model, episode)?;
            weighted_loss += step.loss * step.queries as f64;
            correct += step.correct;
            total += step.queries;
        }

        let total_f = total.max(1) as f64;
        let metrics = EpochMetrics {
            loss: weighted_loss / total_f,
            accuracy: correct as f64 / total_f,
        };

        let lr = self.scheduler.step(metrics.loss);
        debug!(
            "Validation: loss = {:.4}, acc = {:.2}% over {} queries (lr now {:.6})",
            metrics.loss,
            metrics.accuracy * 100.0,
            total,
            lr
        );

        Ok(metrics)
    }

    /// Run the full train/validate loop, checkpointing after every epoch.
    ///
    /// Starts by querying the checkpoint controller: with prior state the
    /// run continues one past the last recorded epoch with model, optimizer,
    /// scheduler and history restored; otherwise it starts fresh at epoch 0.
    pub fn fit(
        &mut self,
        train_episodes: &[Episode<B>],
        val_episodes: &[Episode<B::InnerBackend>],
        checkpoints: &CheckpointController,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        self.phase = RunPhase::Resuming;
        let start_epoch = self.resume(checkpoints)?;
        if start_epoch == 0 {
            self.phase = RunPhase::Initialized;
            info!("Starting fresh run at epoch 0");
        } else {
            info!("Resumed run, continuing at epoch {}", start_epoch);
        }

        for epoch in start_epoch..self.config.epochs {
            self.phase = RunPhase::TrainingEpoch;
            let train = self.train_epoch(train_episodes)?;

            self.phase = RunPhase::ValidatingEpoch;
            let val = self.eval_epoch(val_episodes)?;

            let record = EpochRecord::new(epoch)
                .with("train_loss", train.loss)
                .with("train_accuracy", train.accuracy)
                .with("val_loss", val.loss)
                .with("val_accuracy", val.accuracy)
                .with("learning_rate", self.scheduler.lr());
            sink.record(&record);
            self.history.push(record);

            checkpoints.save(
                epoch,
                &self.model,
                &self.optimizer,
                &self.scheduler,
                &self.history,
            )?;

            info!(
                "Epoch {}/{}: train loss {:.4}, val loss {:.4}, val acc {:.2}%",
                epoch + 1,
                self.config.epochs,
                train.loss,
                val.loss,
                val.accuracy * 100.0
            );
        }

        self.phase = RunPhase::Completed;
        Ok(())
    }

    /// Restore prior state through the checkpoint controller. Returns the
    /// epoch to start from.
    fn resume(&mut self, checkpoints: &CheckpointController) -> Result<usize> {
        let optimizer = std::mem::replace(&mut self.optimizer, Self::fresh_optimizer(&self.config));
        let (model, optimizer, resume) =
            checkpoints.load(self.model.clone(), optimizer, &self.device)?;

        self.model = model;
        self.optimizer = optimizer;

        match resume {
            Some(point) => {
                self.scheduler = point.scheduler;
                self.history = point.history;
                Ok(point.next_epoch)
            }
            None => Ok(0),
        }
    }

    pub fn model(&self) -> &Backbone<B> {
        &self.model
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn current_lr(&self) -> f64 {
        self.scheduler.lr()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

/// One evaluation episode on a gradient-free model.
///
/// Verifies the episode's realized shapes against its declared metadata
/// before any forward pass; a mismatch means the dataset cannot supply the
/// configured shot/query counts and is fatal.
pub fn eval_step<B: Backend>(model: &Backbone<B>, episode: &Episode<B>) -> Result<EvalStep> {
    episode.validate()?;

    let device = episode.support.device();
    let support_embeddings = model.forward(episode.support_batch());
    let query_embeddings = model.forward(episode.query_batch());

    let logits = prototype_distance(
        support_embeddings,
        query_embeddings,
        episode.support_labels(),
    )?;
    let query_labels = episode.query_labels();

    let loss = CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits.clone(), query_labels.clone());
    let loss_value: f64 = loss.into_scalar().elem();

    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(query_labels)
        .int()
        .sum()
        .into_scalar()
        .elem();

    Ok(EvalStep {
        loss: loss_value,
        correct: correct as usize,
        queries: episode.query_count(),
    })
}

/// Top-1 accuracy from a logit matrix and integer targets
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let total = targets.dims()[0];
    if total == 0 {
        return 0.0;
    }

    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();

    correct as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use crate::dataset::{SyntheticConfig, SyntheticEpisodeSampler};
    use crate::model::{build_backbone, Architecture, BackboneConfig};
    use crate::utils::metrics::NullSink;
    use burn::tensor::TensorData;

    type B = TrainingBackend;
    type Inner = DefaultBackend;

    fn mlp_config() -> BackboneConfig {
        BackboneConfig::new(
            Architecture::Mlp {
                hidden_size: 8,
                depth: 1,
            },
            1,
            4,
            4,
            8,
        )
    }

    fn training_config(epochs: usize, dir: &std::path::Path) -> TrainingConfig {
        TrainingConfig {
            epochs,
            learning_rate: 1e-2,
            checkpoint_dir: dir.to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    fn synthetic_config() -> SyntheticConfig {
        SyntheticConfig {
            n_classes: 2,
            support_size: 1,
            query_size: 2,
            channels: 1,
            height: 4,
            width: 4,
            total_classes: 8,
            separation: 1.0,
            noise: 0.05,
        }
    }

    /// Episode filled with a constant pixel value per class slot.
    ///
    /// `class_values[c]` fills every support and query image of class `c`;
    /// query slots can be filled from a different class's value to build
    /// deliberately misleading episodes.
    fn constant_episode<Bk: Backend>(
        support_values: &[f32],
        query_values: &[f32],
        query_size: usize,
        targets: Vec<usize>,
    ) -> Episode<Bk> {
        let device = Default::default();
        let n_classes = support_values.len();
        let pixels = 4 * 4;

        let support_data: Vec<f32> = support_values
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(pixels))
            .collect();
        let query_data: Vec<f32> = (0..query_size)
            .flat_map(|_| query_values.iter().copied())
            .flat_map(|v| std::iter::repeat(v).take(pixels))
            .collect();

        Episode {
            support: Tensor::from_data(
                TensorData::new(support_data, [1, n_classes, 1, 4, 4]),
                &device,
            ),
            query: Tensor::from_data(
                TensorData::new(query_data, [query_size, n_classes, 1, 4, 4]),
                &device,
            ),
            n_classes,
            support_size: 1,
            query_size,
            targets,
        }
    }

    #[test]
    fn test_train_step_produces_finite_metrics() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut trainer =
            EpisodicTrainer::new(model, training_config(1, dir.path()), device).unwrap();

        let mut sampler = SyntheticEpisodeSampler::new(synthetic_config(), 3);
        let episode = sampler.sample::<B>(trainer.device());

        let step = trainer.train_step(&episode).unwrap();
        assert!(step.loss.is_finite());
        assert!((0.0..=1.0).contains(&step.accuracy));
    }

    #[test]
    fn test_relabeling_ignores_absolute_targets() {
        let device = Default::default();
        let model = build_backbone::<Inner>(&mlp_config(), &device).unwrap();

        let a = constant_episode::<Inner>(&[0.0, 5.0], &[0.0, 5.0], 2, vec![11, 29]);
        let b = constant_episode::<Inner>(&[0.0, 5.0], &[0.0, 5.0], 2, vec![3, 4]);

        let sa = eval_step(&model, &a).unwrap();
        let sb = eval_step(&model, &b).unwrap();

        assert!((sa.loss - sb.loss).abs() < 1e-9);
        assert_eq!(sa.correct, sb.correct);
    }

    #[test]
    fn test_train_unweighted_vs_eval_weighted_aggregation() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        // Episode A: all-zero content, loss is exactly ln(2) under any model.
        // Episode B: queries replicate their own class's support image, so
        // its loss is strictly below ln(2) whenever the two support
        // embeddings differ. Their query counts differ (5 vs 1 per class).
        let train_a = constant_episode::<B>(&[0.0, 0.0], &[0.0, 0.0], 5, vec![0, 1]);
        let train_b = constant_episode::<B>(&[0.0, 5.0], &[0.0, 5.0], 1, vec![2, 3]);
        let val_a = constant_episode::<Inner>(&[0.0, 0.0], &[0.0, 0.0], 5, vec![0, 1]);
        let val_b = constant_episode::<Inner>(&[0.0, 5.0], &[0.0, 5.0], 1, vec![2, 3]);

        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut config = training_config(1, dir.path());
        config.learning_rate = 1e-30; // keep the model effectively frozen
        config.min_lr = 0.0;
        let mut trainer = EpisodicTrainer::new(model, config, device).unwrap();

        let inner_model = trainer.model().valid();
        let step_a = eval_step(&inner_model, &val_a).unwrap();
        let step_b = eval_step(&inner_model, &val_b).unwrap();
        assert!((step_a.loss - (2.0f64).ln()).abs() < 1e-5);
        assert!(step_b.loss < step_a.loss - 1e-6);

        let unweighted = (step_a.loss + step_b.loss) / 2.0;
        let weighted = (step_a.loss * step_a.queries as f64 + step_b.loss * step_b.queries as f64)
            / (step_a.queries + step_b.queries) as f64;

        let train = trainer.train_epoch(&[train_a, train_b]).unwrap();
        let eval = trainer.eval_epoch(&[val_a, val_b]).unwrap();

        assert!((train.loss - unweighted).abs() < 1e-5);
        assert!((eval.loss - weighted).abs() < 1e-9);
        assert!((train.loss - eval.loss).abs() > 1e-6);
    }

    #[test]
    fn test_eval_epoch_rejects_malformed_episode() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut trainer =
            EpisodicTrainer::new(model, training_config(1, dir.path()), device).unwrap();

        let mut episode = constant_episode::<Inner>(&[0.0, 1.0], &[0.0, 1.0], 2, vec![0, 1]);
        episode.query_size = 7; // dataset cannot supply the declared count

        assert!(trainer.eval_epoch(&[episode]).is_err());
    }

    #[test]
    fn test_fit_completes_and_records_history() {
        let device: <B as Backend>::Device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut trainer =
            EpisodicTrainer::new(model, training_config(3, dir.path()), device.clone()).unwrap();

        let mut sampler = SyntheticEpisodeSampler::new(synthetic_config(), 3);
        let train: Vec<Episode<B>> = sampler.sample_many(3, &device);
        let val: Vec<Episode<Inner>> = sampler.sample_many(2, &Default::default());

        let checkpoints = CheckpointController::new(dir.path().join("run"));
        trainer
            .fit(&train, &val, &checkpoints, &mut NullSink)
            .unwrap();

        assert_eq!(trainer.phase(), RunPhase::Completed);
        assert_eq!(trainer.history().len(), 3);
        let epochs: Vec<usize> = trainer.history().iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![0, 1, 2]);
    }

    #[test]
    fn test_resumed_run_matches_uninterrupted_run() {
        let device: <B as Backend>::Device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        let sample_pools = |seed: u64| {
            let mut sampler = SyntheticEpisodeSampler::new(synthetic_config(), seed);
            let train: Vec<Episode<B>> = sampler.sample_many(3, &Default::default());
            let val: Vec<Episode<Inner>> = sampler.sample_many(2, &Default::default());
            (train, val)
        };

        // Uninterrupted run: 3 epochs in one go
        let (train, val) = sample_pools(9);
        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut full =
            EpisodicTrainer::new(model, training_config(3, dir.path()), device.clone()).unwrap();
        let full_ckpt = CheckpointController::new(dir.path().join("full"));
        full.fit(&train, &val, &full_ckpt, &mut NullSink).unwrap();

        // Interrupted run: 2 epochs, then a fresh trainer resumes for the third
        let (train, val) = sample_pools(9);
        let resumed_ckpt = CheckpointController::new(dir.path().join("resumed"));
        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut first =
            EpisodicTrainer::new(model, training_config(2, dir.path()), device.clone()).unwrap();
        first.fit(&train, &val, &resumed_ckpt, &mut NullSink).unwrap();

        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut second =
            EpisodicTrainer::new(model, training_config(3, dir.path()), device.clone()).unwrap();
        second.fit(&train, &val, &resumed_ckpt, &mut NullSink).unwrap();

        assert_eq!(second.history().len(), full.history().len());
        let full_epochs: Vec<usize> = full.history().iter().map(|r| r.epoch).collect();
        let resumed_epochs: Vec<usize> = second.history().iter().map(|r| r.epoch).collect();
        assert_eq!(resumed_epochs, full_epochs);

        let full_last = full.history().last().unwrap().get("val_loss").unwrap();
        let resumed_last = second.history().last().unwrap().get("val_loss").unwrap();
        assert!((full_last - resumed_last).abs() < 1e-6);
    }

    #[test]
    fn test_fit_past_configured_epochs_is_a_no_op() {
        let device: <B as Backend>::Device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        let mut sampler = SyntheticEpisodeSampler::new(synthetic_config(), 5);
        let train: Vec<Episode<B>> = sampler.sample_many(2, &Default::default());
        let val: Vec<Episode<Inner>> = sampler.sample_many(1, &Default::default());
        let checkpoints = CheckpointController::new(dir.path().join("run"));

        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut trainer =
            EpisodicTrainer::new(model, training_config(2, dir.path()), device.clone()).unwrap();
        trainer.fit(&train, &val, &checkpoints, &mut NullSink).unwrap();

        // Same epoch budget, prior state already covers it
        let model = build_backbone::<B>(&mlp_config(), &device).unwrap();
        let mut again =
            EpisodicTrainer::new(model, training_config(2, dir.path()), device).unwrap();
        again.fit(&train, &val, &checkpoints, &mut NullSink).unwrap();

        assert_eq!(again.phase(), RunPhase::Completed);
        assert_eq!(again.history().len(), 2);
    }
}
