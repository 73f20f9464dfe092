#![recursion_limit = "256"]

//! Training loop for the gun detector.
//!
//! `TrainingLoop` splits the indexed dataset, runs epochs of Adam steps over
//! shuffled batches, validates without gradients, rewrites a single
//! checkpoint per epoch and streams scalars to a `MetricSink`.

pub mod batches;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metrics;
pub mod state;
pub mod trainer;
pub mod util;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use config::{TrainArgs, TrainConfig, TRAIN_CONFIG_ENV};
pub use error::{DegenerateLossError, TrainingError, TrainingFailedError};
pub use metrics::{InMemorySink, JsonlMetricSink, MetricRecord, MetricSink};
pub use state::TrainingState;
pub use trainer::{TrainingLoop, TrainingOutcome, TrainingSummary};
pub use util::run_train;

/// Backend alias for training (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type AutodiffTrainBackend = burn::backend::Autodiff<TrainBackend>;
