use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use vision_core::error::{ConfigurationError, InferenceError, InvalidImageError};
use vision_core::filter::{clamp_threshold, filter};
use vision_core::interfaces::{Detection, DetectionEngine, ImageTensor};
use vision_core::labels::{AllowedLabels, LabelVocabulary};
use vision_core::overlay::{AnnotatedImage, AnnotationRenderer, OutputFormat};
use vision_core::preprocess::decode_rgb;

use crate::config::ServiceConfig;

/// Response metadata key carrying the number of drawn detections.
pub const DETECTION_COUNT_HEADER: &str = "X-Detection-Count";

/// Threshold applied when a request does not supply one.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;

/// Per-request pipeline position. `Errored` absorbs any failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Decoded,
    Inferred,
    Filtered,
    Rendered,
    Responded,
    Errored,
}

#[derive(Debug, Error)]
pub enum ServiceErrorKind {
    #[error(transparent)]
    InvalidInput(#[from] InvalidImageError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("failed to encode annotated image: {0}")]
    Encode(#[source] image::ImageError),
}

/// A failed request and the last stage it completed.
#[derive(Debug, Error)]
#[error("request failed at {stage:?}: {kind}")]
pub struct ServiceError {
    pub stage: RequestStage,
    #[source]
    pub kind: ServiceErrorKind,
}

impl ServiceError {
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self.kind,
            ServiceErrorKind::InvalidInput(_) | ServiceErrorKind::Configuration(_)
        )
    }

    /// HTTP-equivalent status: 400 for client faults, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        if self.is_client_fault() {
            400
        } else {
            500
        }
    }

    /// Message safe to return to the caller; server faults stay generic.
    pub fn public_message(&self) -> String {
        if self.is_client_fault() {
            self.kind.to_string()
        } else {
            "internal error while running detection".to_string()
        }
    }
}

/// Annotated image bytes plus the response metadata.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub detection_count: usize,
}

impl ImageResponse {
    pub fn headers(&self) -> [(&'static str, String); 2] {
        [
            ("Content-Type", self.content_type.to_string()),
            (DETECTION_COUNT_HEADER, self.detection_count.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEntry {
    pub label: String,
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

impl From<&Detection> for DetectionEntry {
    fn from(det: &Detection) -> Self {
        Self {
            label: det.label.clone(),
            score: det.score(),
            bbox: det.bbox(),
        }
    }
}

/// `{count, detections, image}` with the image as a data URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonResponse {
    pub count: usize,
    pub detections: Vec<DetectionEntry>,
    pub image: String,
}

struct RequestTrace {
    stage: RequestStage,
}

impl RequestTrace {
    fn new() -> Self {
        tracing::debug!("request received");
        Self {
            stage: RequestStage::Received,
        }
    }

    fn advance(&mut self, next: RequestStage) {
        tracing::debug!("request {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn fail(&self, kind: impl Into<ServiceErrorKind>) -> ServiceError {
        let err = ServiceError {
            stage: self.stage,
            kind: kind.into(),
        };
        if err.is_client_fault() {
            tracing::debug!("request {:?} -> {:?}: {err}", self.stage, RequestStage::Errored);
        } else {
            tracing::error!("request {:?} -> {:?}: {err}", self.stage, RequestStage::Errored);
        }
        err
    }
}

/// Decode, infer, filter and render for one upload.
///
/// Holds no per-request state, so one instance serves concurrent callers.
pub struct InferenceService {
    engine: Arc<dyn DetectionEngine>,
    renderer: AnnotationRenderer,
    vocabulary: LabelVocabulary,
    allowed: AllowedLabels,
    format: OutputFormat,
}

impl InferenceService {
    pub fn new(
        engine: Arc<dyn DetectionEngine>,
        renderer: AnnotationRenderer,
        vocabulary: LabelVocabulary,
        allowed: AllowedLabels,
        format: OutputFormat,
    ) -> Self {
        Self {
            engine,
            renderer,
            vocabulary,
            allowed,
            format,
        }
    }

    /// Wire a service from config around an already built engine.
    pub fn from_config(engine: Arc<dyn DetectionEngine>, cfg: &ServiceConfig) -> Self {
        Self::new(
            engine,
            AnnotationRenderer::from_font_path(cfg.font_path.as_deref()),
            cfg.vocabulary(),
            cfg.allowed(),
            cfg.output_format,
        )
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    pub fn handle_image(
        &self,
        bytes: &[u8],
        threshold: Option<f32>,
    ) -> Result<ImageResponse, ServiceError> {
        let (mut trace, annotated, _) = self.run(bytes, threshold)?;
        let encoded = annotated
            .encode(self.format)
            .map_err(|e| trace.fail(ServiceErrorKind::Encode(e)))?;
        trace.advance(RequestStage::Responded);
        Ok(ImageResponse {
            bytes: encoded,
            content_type: self.format.content_type(),
            detection_count: annotated.detection_count(),
        })
    }

    pub fn handle_json(
        &self,
        bytes: &[u8],
        threshold: Option<f32>,
    ) -> Result<JsonResponse, ServiceError> {
        let (mut trace, annotated, detections) = self.run(bytes, threshold)?;
        let image = annotated
            .to_data_uri(self.format)
            .map_err(|e| trace.fail(ServiceErrorKind::Encode(e)))?;
        trace.advance(RequestStage::Responded);
        Ok(JsonResponse {
            count: detections.len(),
            detections: detections.iter().map(DetectionEntry::from).collect(),
            image,
        })
    }

    fn run(
        &self,
        bytes: &[u8],
        threshold: Option<f32>,
    ) -> Result<(RequestTrace, AnnotatedImage, Vec<Detection>), ServiceError> {
        let mut trace = RequestTrace::new();
        let threshold = clamp_threshold(threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD))
            .map_err(|e| trace.fail(e))?;

        let source = decode_rgb(bytes).map_err(|e| trace.fail(e))?;
        let tensor = ImageTensor::from_rgb(&source);
        trace.advance(RequestStage::Decoded);

        let proposals = self.engine.infer(&tensor).map_err(|e| trace.fail(e))?;
        trace.advance(RequestStage::Inferred);

        let detections = filter(&proposals, threshold, &self.allowed, &self.vocabulary);
        trace.advance(RequestStage::Filtered);
        tracing::debug!(
            "{} of {} proposals kept at threshold {threshold}",
            detections.len(),
            proposals.len()
        );

        let annotated = self.renderer.render(&source, &detections);
        trace.advance(RequestStage::Rendered);
        Ok((trace, annotated, detections))
    }
}
