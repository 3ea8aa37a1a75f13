//! Prototype distance classifier
//!
//! The metric-learning head of the engine: per-class mean embeddings
//! ("prototypes") computed from the support set, and query-to-prototype
//! scores used directly as classification logits.
//!
//! The score is the negative squared Euclidean distance. It is a monotonic
//! transform of the distance, so argmax picks the nearest prototype, and it
//! feeds cross-entropy unchanged; the same metric is used at train and eval
//! time. No softmax is applied here.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::utils::error::{FewShotError, Result};

/// Classify query embeddings against per-class support prototypes.
///
/// `support_labels` are the episode's relative labels, assumed contiguous in
/// `0..C`; the class count is inferred from them. Returns a
/// `(num_query, C)` logit matrix.
///
/// Fails with [`FewShotError::EpisodeShape`] when the embeddings' widths
/// disagree, when a label in `0..C` owns no support rows, or when the query
/// count is not divisible by the inferred class count.
pub fn prototype_distance<B: Backend>(
    support_embeddings: Tensor<B, 2>,
    query_embeddings: Tensor<B, 2>,
    support_labels: Tensor<B, 1, Int>,
) -> Result<Tensor<B, 2>> {
    let [num_support, support_dim] = support_embeddings.dims();
    let [num_query, query_dim] = query_embeddings.dims();

    if support_dim != query_dim {
        return Err(FewShotError::EpisodeShape(format!(
            "support embeddings are {}-dimensional but query embeddings are {}-dimensional",
            support_dim, query_dim
        )));
    }

    let labels: Vec<i64> = support_labels.into_data().iter::<i64>().collect();
    if labels.len() != num_support {
        return Err(FewShotError::EpisodeShape(format!(
            "{} support labels for {} support embeddings",
            labels.len(),
            num_support
        )));
    }

    let n_classes = match labels.iter().max() {
        Some(&max) if max >= 0 => (max as usize) + 1,
        _ => {
            return Err(FewShotError::EpisodeShape(
                "support set is empty or labels are negative".to_string(),
            ))
        }
    };

    if num_query % n_classes != 0 {
        return Err(FewShotError::EpisodeShape(format!(
            "{} query embeddings cannot be grouped into {} classes",
            num_query, n_classes
        )));
    }

    let device = support_embeddings.device();

    // One prototype per relative label, stacked in label order
    let mut prototypes = Vec::with_capacity(n_classes);
    for class in 0..n_classes as i64 {
        let indices: Vec<i64> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(row, _)| row as i64)
            .collect();

        if indices.is_empty() {
            return Err(FewShotError::EpisodeShape(format!(
                "relative label {} has no support samples",
                class
            )));
        }

        let count = indices.len();
        let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [count]), &device);
        prototypes.push(support_embeddings.clone().select(0, indices).mean_dim(0));
    }
    let prototypes = Tensor::cat(prototypes, 0);

    // Negative squared Euclidean distance of every query to every prototype
    let queries = query_embeddings
        .unsqueeze_dim::<3>(1)
        .expand([num_query, n_classes, query_dim]);
    let prototypes = prototypes
        .unsqueeze_dim::<3>(0)
        .expand([num_query, n_classes, query_dim]);

    let squared_distance = (queries - prototypes).powf_scalar(2.0).sum_dim(2);

    Ok(squared_distance.squeeze::<2>(2).neg())
}
