use std::sync::Arc;

use burn::tensor::backend::Backend;
use vision_core::error::InferenceError;
use vision_core::interfaces::DetectionEngine;

use crate::config::ServiceConfig;
use crate::engine::BurnDetectionEngine;
use crate::InferenceBackend;

/// Builds the process-wide engine once, before any request is served.
pub struct EngineFactory;

impl EngineFactory {
    pub fn build(&self, cfg: &ServiceConfig) -> Result<Arc<dyn DetectionEngine>, InferenceError> {
        let device = <InferenceBackend as Backend>::Device::default();
        let engine = self.build_on::<InferenceBackend>(cfg, device)?;
        tracing::info!("detection engine ready on {}", engine.device_name());
        Ok(Arc::new(engine))
    }

    /// Same as [`EngineFactory::build`] for an explicit backend and device.
    pub fn build_on<B: Backend>(
        &self,
        cfg: &ServiceConfig,
        device: B::Device,
    ) -> Result<BurnDetectionEngine<B>, InferenceError> {
        let path = cfg.checkpoint.as_path();
        if path.exists() {
            return BurnDetectionEngine::load(path, &cfg.model, device);
        }
        if cfg.allow_untrained {
            tracing::warn!(
                "checkpoint {} not found; serving an untrained detector",
                path.display()
            );
            return BurnDetectionEngine::untrained(&cfg.model, device);
        }
        Err(InferenceError::Artifact(format!(
            "checkpoint {} not found",
            path.display()
        )))
    }
}
