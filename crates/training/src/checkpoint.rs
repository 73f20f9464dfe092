use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::RecorderError;
use burn::tensor::backend::Backend;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to record checkpoint {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Single checkpoint at a fixed path, replaced atomically on every save.
///
/// The model is first written to `<stem>.partial.bin` next to the target and
/// then renamed over it, so readers only ever see a complete file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// The recorder always writes `.bin`; the path is normalized to match.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into().with_extension("bin"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partial_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        self.path.with_file_name(format!("{stem}.partial.bin"))
    }

    pub fn save<B: Backend, M: Module<B>>(&self, model: M) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let partial = self.partial_path();
        model
            .save_file(&partial, &models::recorder())
            .map_err(|source| CheckpointError::Record {
                path: partial.clone(),
                source,
            })?;
        fs::rename(&partial, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!("saved checkpoint to {}", self.path.display());
        Ok(())
    }
}
