use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use dataset::{check_fraction, LoadOptions};
use models::GridDetectorConfig;
use serde::{Deserialize, Serialize};
use vision_core::error::ConfigurationError;

/// Env var pointing at the training TOML when no `--config` is given.
pub const TRAIN_CONFIG_ENV: &str = "DETECT_TRAIN_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Raw-data root holding `Images/` and `Labels/`.
    pub dataset_root: PathBuf,
    /// Fixed checkpoint path, overwritten every epoch.
    pub checkpoint: PathBuf,
    /// Each run writes `<metrics_root>/<timestamp>/metrics.jsonl`.
    pub metrics_root: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub train_fraction: f32,
    pub seed: u64,
    /// Use only the first N indexed samples.
    pub max_samples: Option<usize>,
    pub load: LoadOptions,
    pub model: GridDetectorConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("artifacts/raw"),
            checkpoint: PathBuf::from("artifacts/models/detector.bin"),
            metrics_root: PathBuf::from("runs"),
            epochs: 1,
            batch_size: 3,
            learning_rate: 1e-3,
            train_fraction: 0.8,
            seed: 42,
            max_samples: None,
            load: LoadOptions::default(),
            model: GridDetectorConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading training config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing training config {}", path.display()))
    }

    /// Explicit path, then `DETECT_TRAIN_CONFIG`, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        match std::env::var_os(TRAIN_CONFIG_ENV) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_fraction(self.train_fraction)?;
        if self.batch_size == 0 {
            return Err(ConfigurationError::Invalid(
                "batch_size must be positive".to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigurationError::Invalid(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.load.input_size == 0 {
            return Err(ConfigurationError::Invalid(
                "input_size must be positive".to_string(),
            ));
        }
        if self.max_samples == Some(0) {
            return Err(ConfigurationError::Invalid(
                "max_samples must be positive when set".to_string(),
            ));
        }
        self.model.validate()
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "train", about = "Train the gun detector on an Images/ + Labels/ dataset")]
pub struct TrainArgs {
    /// Training TOML (falls back to DETECT_TRAIN_CONFIG, then defaults).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Dataset root containing Images/ and Labels/.
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,
    /// Checkpoint output path.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Directory receiving timestamped metric runs.
    #[arg(long)]
    pub metrics_root: Option<PathBuf>,
    /// Number of epochs.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Fraction of samples used for training, in (0, 1).
    #[arg(long)]
    pub train_fraction: Option<f32>,
    /// Seed for the split and per-epoch shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Train on the first N samples only.
    #[arg(long)]
    pub max_samples: Option<usize>,
}

impl TrainArgs {
    /// Load the config file and apply flag overrides on top.
    pub fn resolve(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = TrainConfig::load(self.config.as_deref())?;
        if let Some(root) = &self.dataset_root {
            cfg.dataset_root = root.clone();
        }
        if let Some(path) = &self.checkpoint {
            cfg.checkpoint = path.clone();
        }
        if let Some(root) = &self.metrics_root {
            cfg.metrics_root = root.clone();
        }
        if let Some(epochs) = self.epochs {
            cfg.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            cfg.learning_rate = lr;
        }
        if let Some(fraction) = self.train_fraction {
            cfg.train_fraction = fraction;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if self.max_samples.is_some() {
            cfg.max_samples = self.max_samples;
        }
        Ok(cfg)
    }
}
