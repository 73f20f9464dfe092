//! Burn ML models for gun detection.
//!
//! This crate defines the trainable detector and the contract the training loop
//! and the inference engine consume it through:
//! - `GridDetector`: conv stem, adaptive pooling to a fixed grid, and a
//!   multibox head (boxes, objectness, class logits).
//! - `DetectionBatch` / `collate`: stacked image tensors plus padded targets.
//! - `LossTerms` / `DetectionLosses`: named loss components per batch.
//!
//! The pipeline treats the model as a black box: any module implementing
//! `DetectionLosses` can be trained, and the engine only needs `forward`.

pub mod batch;
pub mod checkpoint;
pub mod detector;
pub mod losses;

use thiserror::Error;

pub use batch::{collate, DetectionBatch};
pub use checkpoint::{load_detector, recorder};
pub use detector::{DetectorOutput, GridDetector, GridDetectorConfig};
pub use losses::{build_greedy_targets, iou_xyxy, DetectionLosses, GreedyTargets, LossTerms};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot collate empty batch")]
    EmptyBatch,
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("sample {sample} has class id {class}; expected 1..{num_classes}")]
    Label {
        sample: usize,
        class: u32,
        num_classes: usize,
    },
    #[error("non-finite model output: {0}")]
    NonFinite(String),
    #[error("tensor readback failed: {0}")]
    Readback(String),
    #[error("checkpoint recorder error: {0}")]
    Recorder(#[from] burn::record::RecorderError),
    #[error("checkpoint holds {found} parameters, architecture expects {expected}")]
    ParameterMismatch { expected: usize, found: usize },
}

pub mod prelude {
    pub use super::{
        collate, load_detector, DetectionBatch, DetectionLosses, GridDetector, GridDetectorConfig,
        LossTerms, ModelError,
    };
}
