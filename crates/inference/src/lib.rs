#![recursion_limit = "256"]

//! Detection engine over Burn plus the request pipeline that serves it.
//!
//! `EngineFactory` loads the detector once at start-up and hands out a shared
//! `DetectionEngine`; `InferenceService` runs decode, inference, filtering and
//! rendering for each request and produces the image or JSON response.

pub mod config;
pub mod engine;
pub mod factory;
pub mod service;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use config::{LabelEntry, ServiceConfig, SERVICE_CONFIG_ENV};
pub use engine::BurnDetectionEngine;
pub use factory::EngineFactory;
pub use service::{
    DetectionEntry, ImageResponse, InferenceService, JsonResponse, RequestStage, ServiceError,
    ServiceErrorKind,
    DEFAULT_SCORE_THRESHOLD, DETECTION_COUNT_HEADER,
};

pub mod prelude {
    pub use crate::config::ServiceConfig;
    pub use crate::engine::BurnDetectionEngine;
    pub use crate::factory::EngineFactory;
    pub use crate::service::{ImageResponse, InferenceService, JsonResponse, ServiceError};
    pub use crate::InferenceBackend;
}
