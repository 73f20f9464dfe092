use burn::tensor::backend::Backend;
use dataset::{load_sample, DatasetError, LoadOptions, SampleIndex};
use models::{collate, DetectionBatch, ModelError};
use rand::{seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Collate(#[from] ModelError),
}

/// Visit order for one epoch; reshuffled per epoch, reproducible per seed.
pub fn epoch_order(len: usize, seed: u64, epoch: usize, shuffle: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);
    }
    order
}

pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

/// Load the selected samples in parallel and stack them into one batch.
pub fn load_batch<B: Backend>(
    samples: &[&SampleIndex],
    opts: &LoadOptions,
    max_boxes: usize,
    num_classes: usize,
    device: &B::Device,
) -> Result<DetectionBatch<B>, BatchError> {
    let loaded = samples
        .par_iter()
        .map(|idx| load_sample(idx, opts).map(|s| s.into_pair()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collate::<B>(&loaded, max_boxes, num_classes, device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_a_seeded_permutation() {
        let a = epoch_order(20, 7, 0, true);
        let b = epoch_order(20, 7, 0, true);
        let c = epoch_order(20, 7, 1, true);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        assert_eq!(epoch_order(4, 7, 0, false), vec![0, 1, 2, 3]);
    }

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(batch_count(8, 3), 3);
        assert_eq!(batch_count(9, 3), 3);
        assert_eq!(batch_count(0, 3), 0);
    }
}
