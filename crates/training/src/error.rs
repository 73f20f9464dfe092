use std::collections::BTreeMap;
use std::error::Error as StdError;

use thiserror::Error;
use vision_core::error::ConfigurationError;

use crate::state::TrainingState;

/// The summed loss of a batch was exactly zero, which only a broken loss
/// computation produces.
#[derive(Debug, Error)]
#[error("aggregated loss is exactly zero at epoch {epoch}, batch {batch} (terms: {terms:?})")]
pub struct DegenerateLossError {
    pub epoch: usize,
    pub batch: usize,
    /// Component values that summed to zero.
    pub terms: BTreeMap<String, f32>,
}

/// A batch, validation pass or checkpoint write failed; the run is aborted.
#[derive(Debug, Error)]
#[error("training failed while {state}: {source}")]
pub struct TrainingFailedError {
    pub state: TrainingState,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl TrainingFailedError {
    pub fn new(state: TrainingState, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            state,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    DegenerateLoss(#[from] DegenerateLossError),
    #[error(transparent)]
    Failed(#[from] TrainingFailedError),
    #[error("training cancelled before epoch {epoch}, batch {batch}")]
    Cancelled { epoch: usize, batch: usize },
}
