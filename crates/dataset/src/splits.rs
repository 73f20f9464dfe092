//! Reproducible train/validation splitting.

use rand::{seq::SliceRandom, SeedableRng};
use vision_core::error::ConfigurationError;

/// Below this many samples every sample goes to training.
pub const MIN_SPLIT_SAMPLES: usize = 2;

/// Accept only fractions in the open interval (0, 1).
pub fn check_fraction(train_fraction: f32) -> Result<(), ConfigurationError> {
    if train_fraction.is_nan() || train_fraction <= 0.0 || train_fraction >= 1.0 {
        return Err(ConfigurationError::SplitFraction(train_fraction));
    }
    Ok(())
}

/// Training share for `n` samples: `floor(fraction * n)`, at least one sample when `n >= 1`.
pub fn train_len(n: usize, train_fraction: f32) -> Result<usize, ConfigurationError> {
    check_fraction(train_fraction)?;
    if n < MIN_SPLIT_SAMPLES {
        return Ok(n);
    }
    let train = (train_fraction * n as f32).floor() as usize;
    Ok(train.clamp(1, n))
}

/// Shuffle with `seed`, then cut into (train, val). Same seed, same split.
pub fn split<T>(
    mut items: Vec<T>,
    train_fraction: f32,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), ConfigurationError> {
    let train = train_len(items.len(), train_fraction)?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    let val = items.split_off(train);
    Ok((items, val))
}
