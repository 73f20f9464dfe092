use thiserror::Error;

/// Upload bytes that could not be decoded as a supported raster format.
///
/// This is a client fault; it is kept separate from [`InferenceError`] so the
/// boundary can answer with a 4xx-equivalent status.
#[derive(Debug, Error)]
#[error("invalid image: {reason}")]
pub struct InvalidImageError {
    pub reason: String,
    #[source]
    pub source: Option<image::ImageError>,
}

impl InvalidImageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn from_decode(err: image::ImageError) -> Self {
        Self {
            reason: err.to_string(),
            source: Some(err),
        }
    }
}

/// Engine/runtime failure while running the detector.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("input shape mismatch: {0}")]
    Shape(String),
    #[error("model produced non-finite output: {0}")]
    NonFinite(String),
    #[error("model execution failed: {0}")]
    Runtime(String),
    #[error("failed to load model artifact: {0}")]
    Artifact(String),
}

/// Invalid configuration rejected before any pipeline or training work starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("train fraction {0} must lie strictly between 0 and 1")]
    SplitFraction(f32),
    #[error("score threshold must be a number, got {0}")]
    Threshold(f32),
    #[error("{0}")]
    Invalid(String),
}
