//! Episode data model and suppliers
//!
//! The trainer consumes [`Episode`] values and nothing else; where they come
//! from (disk loaders, prefetching workers, the synthetic sampler) is outside
//! the engine's correctness contract. Suppliers must guarantee support and
//! query tensors grouped by class in matching class order, with metadata
//! consistent with tensor shapes.

pub mod episode;
pub mod synthetic;

pub use episode::{relative_labels, Episode};
pub use synthetic::{SyntheticConfig, SyntheticEpisodeSampler};
