//! Core types and error definitions for dataset loading.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use vision_core::interfaces::{ImageTensor, Target};

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset layout invalid under {root}: {msg}")]
    Layout { root: PathBuf, msg: String },
    #[error("label parse error at {path}, line {line}: {msg}")]
    Label {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// One image/label pair on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
}

/// A loaded (image, target) pair. Boxes are normalized to 0..1.
#[derive(Debug, Clone)]
pub struct DatasetSample {
    pub image: ImageTensor,
    pub target: Target,
    /// Source image size before resizing.
    pub source_size: (u32, u32),
}

impl DatasetSample {
    pub fn into_pair(self) -> (ImageTensor, Target) {
        (self.image, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Square side every sample is resized to so batches stack.
    pub input_size: u32,
    /// Class assigned to boxes whose label line has no class column.
    pub default_class: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            input_size: 256,
            default_class: 1,
        }
    }
}
