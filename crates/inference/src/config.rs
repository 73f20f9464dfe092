use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use models::GridDetectorConfig;
use serde::{Deserialize, Serialize};
use vision_core::labels::{AllowedLabels, LabelVocabulary};
use vision_core::overlay::OutputFormat;

use crate::service::DEFAULT_SCORE_THRESHOLD;

/// Env var pointing at the service TOML when no `--config` is given.
pub const SERVICE_CONFIG_ENV: &str = "DETECT_SERVICE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub id: u32,
    pub name: String,
}

/// Service settings loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub checkpoint: PathBuf,
    pub model: GridDetectorConfig,
    pub labels: Vec<LabelEntry>,
    /// `None` allows every class id.
    pub allowed_labels: Option<Vec<u32>>,
    pub font_path: Option<PathBuf>,
    pub output_format: OutputFormat,
    /// Used by the CLI when no threshold is passed.
    pub default_threshold: f32,
    /// Build an untrained model when the checkpoint file is missing.
    pub allow_untrained: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            checkpoint: PathBuf::from("checkpoints/detector.bin"),
            model: GridDetectorConfig::default(),
            labels: vec![LabelEntry {
                id: 1,
                name: "gun".to_string(),
            }],
            allowed_labels: None,
            font_path: None,
            output_format: OutputFormat::Png,
            default_threshold: DEFAULT_SCORE_THRESHOLD,
            allow_untrained: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading service config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing service config {}", path.display()))
    }

    /// Explicit path, then `DETECT_SERVICE_CONFIG`, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        match std::env::var_os(SERVICE_CONFIG_ENV) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn vocabulary(&self) -> LabelVocabulary {
        LabelVocabulary::new(self.labels.iter().map(|l| (l.id, l.name.clone())))
    }

    pub fn allowed(&self) -> AllowedLabels {
        AllowedLabels::from(self.allowed_labels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ServiceConfig = toml::from_str(
            r#"
            checkpoint = "out/model.bin"
            allowed_labels = [1]
            output_format = "jpeg"

            [[labels]]
            id = 1
            name = "pistol"

            [model]
            hidden = 32
            "#,
        )
        .unwrap();
        assert_eq!(cfg.checkpoint, PathBuf::from("out/model.bin"));
        assert_eq!(cfg.output_format, OutputFormat::Jpeg);
        assert_eq!(cfg.model.hidden, 32);
        assert_eq!(cfg.model.max_boxes, GridDetectorConfig::default().max_boxes);
        assert_eq!(cfg.vocabulary().name_for(1), "pistol");
        assert_eq!(cfg.vocabulary().name_for(4), "class_4");
        assert!(!cfg.allowed().contains(2));
        assert!(!cfg.allow_untrained);
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        fs::write(&path, "default_threshold = 0.25\nallow_untrained = true\n").unwrap();
        let cfg = ServiceConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.default_threshold, 0.25);
        assert!(cfg.allow_untrained);
        assert!(ServiceConfig::from_path(&dir.path().join("missing.toml")).is_err());
    }
}
