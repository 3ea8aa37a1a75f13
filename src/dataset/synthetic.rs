//! Synthetic episode sampler
//!
//! Deterministic, seeded generator of few-shot episodes over a fictitious
//! label space. Each absolute class owns a fixed cluster center in pixel
//! space; samples are the center plus bounded uniform noise, so a sampled
//! episode is solvable exactly when `separation` dominates `noise`.
//!
//! This is the reference implementation of the episode-supplier boundary,
//! used by the demo CLI and the test suite. Real dataset loaders satisfy the
//! same contract: grouped-by-class tensors with matching class order and
//! metadata consistent with tensor shapes.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::episode::Episode;

/// Configuration of the synthetic episode distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Classes per episode (the "way")
    pub n_classes: usize,
    /// Support samples per class (the "shot")
    pub support_size: usize,
    /// Query samples per class
    pub query_size: usize,
    /// Image channels
    pub channels: usize,
    /// Image height
    pub height: usize,
    /// Image width
    pub width: usize,
    /// Size of the absolute label space episodes are drawn from
    pub total_classes: usize,
    /// Amplitude of the per-class cluster centers
    pub separation: f32,
    /// Amplitude of the per-sample uniform noise
    pub noise: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_classes: 5,
            support_size: 5,
            query_size: 15,
            channels: 3,
            height: 32,
            width: 32,
            total_classes: 64,
            separation: 1.0,
            noise: 0.1,
        }
    }
}

/// Seeded sampler producing [`Episode`] values
pub struct SyntheticEpisodeSampler {
    config: SyntheticConfig,
    rng: ChaCha8Rng,
    /// Base seed for per-class cluster centers, so the same absolute class
    /// keeps the same center across episodes and epochs.
    center_seed: u64,
}

impl SyntheticEpisodeSampler {
    pub fn new(config: SyntheticConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            center_seed: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Fixed cluster center of one absolute class
    fn class_center(&self, class_id: usize) -> Vec<f32> {
        let cfg = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(self.center_seed.wrapping_add(class_id as u64));
        (0..cfg.channels * cfg.height * cfg.width)
            .map(|_| rng.gen_range(-cfg.separation..=cfg.separation))
            .collect()
    }

    /// Fill one shot-major `[set_size, n_classes, c, h, w]` tensor
    fn sample_set<B: Backend>(
        &mut self,
        centers: &[Vec<f32>],
        set_size: usize,
        device: &B::Device,
    ) -> Tensor<B, 5> {
        let cfg = &self.config;
        let pixels = cfg.channels * cfg.height * cfg.width;
        let mut data = Vec::with_capacity(set_size * centers.len() * pixels);

        for _ in 0..set_size {
            for center in centers {
                for &value in center {
                    let noise = self.rng.gen_range(-cfg.noise..=cfg.noise);
                    data.push(value + noise);
                }
            }
        }

        Tensor::from_data(
            TensorData::new(
                data,
                [set_size, centers.len(), cfg.channels, cfg.height, cfg.width],
            ),
            device,
        )
    }

    /// Sample one episode: draw `n_classes` distinct absolute classes, then
    /// support and query sets around their cluster centers.
    pub fn sample<B: Backend>(&mut self, device: &B::Device) -> Episode<B> {
        let cfg = self.config.clone();

        let mut class_ids: Vec<usize> = (0..cfg.total_classes).collect();
        class_ids.shuffle(&mut self.rng);
        class_ids.truncate(cfg.n_classes);

        let centers: Vec<Vec<f32>> = class_ids.iter().map(|&id| self.class_center(id)).collect();

        let support = self.sample_set::<B>(&centers, cfg.support_size, device);
        let query = self.sample_set::<B>(&centers, cfg.query_size, device);

        Episode {
            support,
            query,
            n_classes: cfg.n_classes,
            support_size: cfg.support_size,
            query_size: cfg.query_size,
            targets: class_ids,
        }
    }

    /// Sample a fixed-size pool of episodes
    pub fn sample_many<B: Backend>(&mut self, count: usize, device: &B::Device) -> Vec<Episode<B>> {
        (0..count).map(|_| self.sample(device)).collect()
    }
}
