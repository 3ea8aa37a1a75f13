//! Episode records for episodic few-shot learning
//!
//! One episode is a single sampled classification task: a support set used
//! to build class prototypes and a query set scored against them. Support
//! and query tensors are shot-major, `[set_size, n_classes, c, h, w]`, and
//! share the same class ordering, so relabeling to relative indices is a
//! pure positional operation independent of any other episode.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::utils::error::{FewShotError, Result};

/// One few-shot episode.
#[derive(Debug, Clone)]
pub struct Episode<B: Backend> {
    /// Support images, `[support_size, n_classes, channels, height, width]`
    pub support: Tensor<B, 5>,
    /// Query images, `[query_size, n_classes, channels, height, width]`
    pub query: Tensor<B, 5>,
    /// Number of classes sampled for this episode
    pub n_classes: usize,
    /// Declared support samples per class
    pub support_size: usize,
    /// Declared query samples per class
    pub query_size: usize,
    /// Absolute dataset label per class slot. Bookkeeping only; the loss is
    /// always computed against per-episode relative labels.
    pub targets: Vec<usize>,
}

impl<B: Backend> Episode<B> {
    /// Flatten the support set to a `(support_size * n_classes, c, h, w)` batch.
    ///
    /// Row `i` of the result carries relative label `i % n_classes`.
    pub fn support_batch(&self) -> Tensor<B, 4> {
        let [s, c, ch, h, w] = self.support.dims();
        self.support.clone().reshape([s * c, ch, h, w])
    }

    /// Flatten the query set to a `(query_size * n_classes, c, h, w)` batch.
    pub fn query_batch(&self) -> Tensor<B, 4> {
        let [s, c, ch, h, w] = self.query.dims();
        self.query.clone().reshape([s * c, ch, h, w])
    }

    /// Relative labels for the flattened support batch.
    pub fn support_labels(&self) -> Tensor<B, 1, Int> {
        relative_labels(self.n_classes, self.support_size, &self.support.device())
    }

    /// Relative labels for the flattened query batch.
    pub fn query_labels(&self) -> Tensor<B, 1, Int> {
        relative_labels(self.n_classes, self.query_size, &self.query.device())
    }

    /// Total number of query samples in the episode.
    pub fn query_count(&self) -> usize {
        self.query_size * self.n_classes
    }

    /// Check realized tensor shapes against the declared metadata.
    ///
    /// A mismatch means the dataset cannot supply the configured shot/query
    /// counts and the run must abort.
    pub fn validate(&self) -> Result<()> {
        let [ss, sc, s_ch, s_h, s_w] = self.support.dims();
        let [qs, qc, q_ch, q_h, q_w] = self.query.dims();

        if ss != self.support_size || sc != self.n_classes {
            return Err(FewShotError::EpisodeShape(format!(
                "support set is {}x{} but the episode declares {} samples of {} classes",
                ss, sc, self.support_size, self.n_classes
            )));
        }
        if qs != self.query_size || qc != self.n_classes {
            return Err(FewShotError::EpisodeShape(format!(
                "query set is {}x{} but the episode declares {} samples of {} classes",
                qs, qc, self.query_size, self.n_classes
            )));
        }
        if (s_ch, s_h, s_w) != (q_ch, q_h, q_w) {
            return Err(FewShotError::EpisodeShape(format!(
                "support images {:?} and query images {:?} disagree",
                (s_ch, s_h, s_w),
                (q_ch, q_h, q_w)
            )));
        }

        Ok(())
    }
}

/// Contiguous per-episode labels: `0..n_classes` tiled `group_size` times.
///
/// Regenerated for every episode; relative labels are never drawn from a
/// stored vocabulary.
pub fn relative_labels<B: Backend>(
    n_classes: usize,
    group_size: usize,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let labels: Vec<i64> = (0..group_size)
        .flat_map(|_| (0..n_classes as i64))
        .collect();

    Tensor::from_data(TensorData::new(labels, [n_classes * group_size]), device)
}
