use std::path::Path;

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;

use crate::detector::{GridDetector, GridDetectorConfig};
use crate::ModelError;

/// Recorder shared by checkpoint writes and loads.
pub fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

/// Strict load: the record must deserialize into `cfg`'s architecture and carry
/// exactly as many parameters as a freshly built model.
pub fn load_detector<B: Backend>(
    path: &Path,
    cfg: &GridDetectorConfig,
    device: &B::Device,
) -> Result<GridDetector<B>, ModelError> {
    let fresh = GridDetector::<B>::new(cfg, device);
    let expected = fresh.num_params();
    let loaded = fresh.load_file(path, &recorder(), device)?;
    let found = loaded.num_params();
    if found != expected {
        return Err(ModelError::ParameterMismatch { expected, found });
    }
    tracing::info!(
        "loaded detector checkpoint {} ({found} parameters)",
        path.display()
    );
    Ok(loaded)
}
