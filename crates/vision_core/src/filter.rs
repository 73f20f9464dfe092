//! Score/label policy applied to raw proposals.

use crate::error::ConfigurationError;
use crate::interfaces::{Detection, Proposal};
use crate::labels::{AllowedLabels, LabelVocabulary};

/// Clamp a caller threshold into `[0, 1]`; NaN is rejected.
pub fn clamp_threshold(threshold: f32) -> Result<f32, ConfigurationError> {
    if threshold.is_nan() {
        return Err(ConfigurationError::Threshold(threshold));
    }
    Ok(threshold.clamp(0.0, 1.0))
}

/// Keep proposals with `score >= threshold` whose label is allowed, in input order.
pub fn filter<'a, I>(
    proposals: I,
    threshold: f32,
    allowed: &AllowedLabels,
    vocabulary: &LabelVocabulary,
) -> Vec<Detection>
where
    I: IntoIterator<Item = &'a Proposal>,
{
    proposals
        .into_iter()
        .filter(|p| p.score >= threshold && allowed.contains(p.label))
        .map(|p| Detection {
            proposal: *p,
            label: vocabulary.name_for(p.label),
        })
        .collect()
}
