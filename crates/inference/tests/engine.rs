use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use burn::module::Module;
use burn_ndarray::NdArray;
use inference::{BurnDetectionEngine, EngineFactory, InferenceService, ServiceConfig};
use models::{GridDetector, GridDetectorConfig};
use vision_core::error::InferenceError;
use vision_core::interfaces::{DetectionEngine, ImageTensor, Target};

type B = NdArray<f32>;

fn tiny_cfg() -> GridDetectorConfig {
    GridDetectorConfig {
        max_boxes: 4,
        hidden: 16,
        depth: 1,
        conv_channels: 2,
        grid: 2,
        ..Default::default()
    }
}

fn gradient(w: u32, h: u32) -> image::RgbImage {
    image::RgbImage::from_fn(w, h, |x, y| image::Rgb([(x * 7) as u8, (y * 5) as u8, 128]))
}

fn service_cfg(checkpoint: PathBuf) -> ServiceConfig {
    ServiceConfig {
        checkpoint,
        model: tiny_cfg(),
        ..Default::default()
    }
}

#[test]
fn infer_scales_boxes_to_source_pixels() {
    let device = Default::default();
    let engine = BurnDetectionEngine::<B>::untrained(&tiny_cfg(), device).unwrap();
    let proposals = engine.infer(&ImageTensor::from_rgb(&gradient(30, 20))).unwrap();
    assert_eq!(proposals.len(), 4);
    for p in &proposals {
        assert!(p.bbox[0] <= p.bbox[2] && p.bbox[1] <= p.bbox[3]);
        assert!(p.bbox[2] <= 30.0 && p.bbox[3] <= 20.0);
        assert!((0.0..=1.0).contains(&p.score));
        assert_ne!(p.label, 0);
    }
}

#[test]
fn infer_batch_returns_named_finite_losses() {
    let device = Default::default();
    let engine = BurnDetectionEngine::<B>::untrained(&tiny_cfg(), device).unwrap();
    let sample = (
        ImageTensor::from_rgb(&gradient(8, 8)),
        Target {
            boxes: vec![[0.1, 0.2, 0.5, 0.6]],
            labels: vec![1],
        },
    );
    let losses = engine.infer_batch(&[sample.clone(), sample]).unwrap();
    assert_eq!(losses.len(), 3);
    assert!(losses.values().all(|v| v.is_finite()));
    assert!(matches!(
        engine.infer_batch(&[]),
        Err(InferenceError::Shape(_))
    ));
}

#[test]
fn failed_requests_leave_the_engine_usable() {
    let device = Default::default();
    let engine = BurnDetectionEngine::<B>::untrained(&tiny_cfg(), device).unwrap();
    let image = ImageTensor::from_rgb(&gradient(30, 20));
    let before = engine.infer(&image).unwrap();

    let empty = ImageTensor::from_chw(0, 0, Vec::new()).unwrap();
    assert!(matches!(engine.infer(&empty), Err(InferenceError::Shape(_))));
    let unknown_class = (
        ImageTensor::from_rgb(&gradient(8, 8)),
        Target {
            boxes: vec![[0.1, 0.2, 0.5, 0.6]],
            labels: vec![7],
        },
    );
    assert!(matches!(
        engine.infer_batch(&[unknown_class]),
        Err(InferenceError::Shape(_))
    ));

    let after = engine.infer(&image).unwrap();
    assert_eq!(before, after);
}

#[test]
fn factory_loads_a_saved_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detector.bin");
    let device = Default::default();
    GridDetector::<B>::new(&tiny_cfg(), &device)
        .save_file(&path, &models::recorder())
        .unwrap();

    let engine = EngineFactory.build(&service_cfg(path)).unwrap();
    let proposals = engine
        .infer(&ImageTensor::from_rgb(&gradient(12, 12)))
        .unwrap();
    assert_eq!(proposals.len(), 4);
}

#[test]
fn factory_rejects_missing_checkpoint_unless_untrained_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = service_cfg(dir.path().join("absent.bin"));
    assert!(matches!(
        EngineFactory.build(&cfg),
        Err(InferenceError::Artifact(_))
    ));

    cfg.allow_untrained = true;
    assert!(EngineFactory.build(&cfg).is_ok());
}

#[test]
fn factory_rejects_mismatched_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detector.bin");
    let device = Default::default();
    GridDetector::<B>::new(&tiny_cfg(), &device)
        .save_file(&path, &models::recorder())
        .unwrap();

    let mut cfg = service_cfg(path);
    cfg.model.hidden = 32;
    assert!(matches!(
        EngineFactory.build(&cfg),
        Err(InferenceError::Artifact(_))
    ));
}

#[test]
fn untrained_engine_serves_the_full_pipeline() {
    let device = Default::default();
    let engine = BurnDetectionEngine::<B>::untrained(&tiny_cfg(), device).unwrap();
    let cfg = service_cfg(PathBuf::from("unused.bin"));
    let svc = InferenceService::from_config(Arc::new(engine), &cfg);

    let mut bytes = Cursor::new(Vec::new());
    gradient(24, 18)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    let response = svc.handle_json(bytes.get_ref(), Some(0.0)).unwrap();
    assert_eq!(response.count, 4);
    assert!(response.detections.iter().all(|d| d.label == "gun"));
}
