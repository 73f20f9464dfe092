//! vision_core: shared detector data model, preprocessing, filtering and overlay rendering.

pub mod error;
pub mod filter;
pub mod interfaces;
pub mod labels;
pub mod overlay;
pub mod preprocess;

pub mod prelude {
    pub use crate::error::{ConfigurationError, InferenceError, InvalidImageError};
    pub use crate::filter::{clamp_threshold, filter};
    pub use crate::interfaces::*;
    pub use crate::labels::{AllowedLabels, LabelVocabulary};
    pub use crate::overlay::{AnnotatedImage, AnnotationRenderer, OutputFormat};
    pub use crate::preprocess::{decode, decode_rgb};
}
