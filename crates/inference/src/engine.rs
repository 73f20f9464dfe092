use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use models::{collate, load_detector, DetectionLosses, GridDetector, GridDetectorConfig, ModelError};
use vision_core::error::InferenceError;
use vision_core::interfaces::{DetectionEngine, ImageTensor, Proposal, Target};

/// `DetectionEngine` backed by a `GridDetector` on backend `B`.
///
/// The forward pass is serialized through a mutex; the model is never
/// mutated after construction. Use a non-autodiff backend so no gradient
/// graph is recorded.
pub struct BurnDetectionEngine<B: Backend> {
    model: Mutex<GridDetector<B>>,
    device: B::Device,
    max_boxes: usize,
    num_classes: usize,
}

impl<B: Backend> BurnDetectionEngine<B> {
    pub fn from_model(model: GridDetector<B>, device: B::Device) -> Self {
        let max_boxes = model.max_boxes();
        let num_classes = model.num_classes();
        Self {
            model: Mutex::new(model),
            device,
            max_boxes,
            num_classes,
        }
    }

    /// Strict load of a checkpoint written by the training loop.
    pub fn load(
        path: &Path,
        cfg: &GridDetectorConfig,
        device: B::Device,
    ) -> Result<Self, InferenceError> {
        cfg.validate()
            .map_err(|e| InferenceError::Artifact(e.to_string()))?;
        let model = load_detector::<B>(path, cfg, &device).map_err(model_error)?;
        Ok(Self::from_model(model, device))
    }

    /// Freshly initialised weights; only useful for smoke runs.
    pub fn untrained(cfg: &GridDetectorConfig, device: B::Device) -> Result<Self, InferenceError> {
        cfg.validate()
            .map_err(|e| InferenceError::Artifact(e.to_string()))?;
        let model = GridDetector::new(cfg, &device);
        Ok(Self::from_model(model, device))
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Loss terms for a batch of labelled samples, without gradients.
    pub fn infer_batch(
        &self,
        samples: &[(ImageTensor, Target)],
    ) -> Result<BTreeMap<String, f32>, InferenceError> {
        let batch = collate::<B>(samples, self.max_boxes, self.num_classes, &self.device)
            .map_err(model_error)?;
        let model = self.lock_model();
        let scalars = panic::catch_unwind(AssertUnwindSafe(|| model.losses(&batch).scalars()))
            .map_err(|payload| InferenceError::Runtime(panic_message(payload.as_ref())))?;
        drop(model);
        if let Some((name, value)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(InferenceError::NonFinite(format!("{name} = {value}")));
        }
        Ok(scalars)
    }

    fn lock_model(&self) -> MutexGuard<'_, GridDetector<B>> {
        // A panic is caught before the guard drops, but recover anyway so one
        // bad request never wedges the engine.
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: Backend> DetectionEngine for BurnDetectionEngine<B> {
    fn infer(&self, image: &ImageTensor) -> Result<Vec<Proposal>, InferenceError> {
        let [channels, height, width] = image.shape();
        if height == 0 || width == 0 {
            return Err(InferenceError::Shape(format!(
                "image has zero area ({width}x{height})"
            )));
        }
        let input = Tensor::<B, 4>::from_data(
            TensorData::new(image.as_slice().to_vec(), [1, channels, height, width]),
            &self.device,
        );

        let model = self.lock_model();
        let output = panic::catch_unwind(AssertUnwindSafe(|| model.forward(input)))
            .map_err(|payload| InferenceError::Runtime(panic_message(payload.as_ref())))?;
        drop(model);

        let mut per_image = output
            .into_proposals(&[(image.width(), image.height())])
            .map_err(model_error)?;
        Ok(per_image.pop().unwrap_or_default())
    }

    fn device_name(&self) -> String {
        format!("{:?}", self.device)
    }
}

fn model_error(err: ModelError) -> InferenceError {
    match err {
        ModelError::NonFinite(msg) => InferenceError::NonFinite(msg),
        ModelError::Shape(msg) => InferenceError::Shape(msg),
        ModelError::EmptyBatch | ModelError::Label { .. } => {
            InferenceError::Shape(err.to_string())
        }
        ModelError::Readback(msg) => InferenceError::Runtime(msg),
        ModelError::Recorder(_) | ModelError::ParameterMismatch { .. } => {
            InferenceError::Artifact(err.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("forward pass panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("forward pass panicked: {msg}")
    } else {
        "forward pass panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let err = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "forward pass panicked: boom");
        let err = panic::catch_unwind(|| panic!("{}", String::from("dyn"))).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "forward pass panicked: dyn");
    }

    #[test]
    fn artifact_failures_map_to_artifact_errors() {
        let err = model_error(ModelError::ParameterMismatch {
            expected: 10,
            found: 12,
        });
        assert!(matches!(err, InferenceError::Artifact(_)));
        assert!(matches!(
            model_error(ModelError::NonFinite("nan".into())),
            InferenceError::NonFinite(_)
        ));
    }
}
