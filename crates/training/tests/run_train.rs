use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use training::{run_train, MetricRecord, TrainArgs};

#[test]
fn run_train_writes_checkpoint_and_timestamped_metrics() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("raw");
    fs::create_dir_all(data.join("Images")).unwrap();
    fs::create_dir_all(data.join("Labels")).unwrap();
    for i in 0..5 {
        image::RgbImage::from_pixel(10, 10, image::Rgb([i * 40, 100, 50]))
            .save(data.join("Images").join(format!("gun_{i}.png")))
            .unwrap();
        fs::write(
            data.join("Labels").join(format!("gun_{i}.txt")),
            "2\n1 1 5 5\n4 4 9 9 1\n",
        )
        .unwrap();
    }
    let config = tmp.path().join("train.toml");
    fs::write(
        &config,
        r#"
epochs = 2
batch_size = 2

[load]
input_size = 8

[model]
max_boxes = 2
hidden = 8
depth = 1
conv_channels = 2
grid = 2
"#,
    )
    .unwrap();

    let args = TrainArgs {
        config: Some(config),
        dataset_root: Some(data),
        checkpoint: Some(tmp.path().join("models").join("detector.bin")),
        metrics_root: Some(tmp.path().join("runs")),
        ..Default::default()
    };
    let summary = run_train(args, Arc::new(AtomicBool::new(false))).unwrap();
    assert_eq!(summary.train_samples, 4);
    assert_eq!(summary.val_samples, 1);
    assert_eq!(summary.epochs_completed, 2);
    assert!(tmp.path().join("models").join("detector.bin").exists());

    let runs: Vec<_> = fs::read_dir(tmp.path().join("runs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    let rows: Vec<MetricRecord> = fs::read_to_string(runs[0].join("metrics.jsonl"))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.iter().filter(|r| r.tag == "Loss/train").count(), 4);
    assert_eq!(rows.iter().filter(|r| r.tag == "epoch").count(), 2);
    assert_eq!(rows.iter().filter(|r| r.tag == "Loss/val").count(), 2);
}

#[test]
fn run_train_fails_on_missing_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let args = TrainArgs {
        dataset_root: Some(tmp.path().join("nowhere")),
        metrics_root: Some(tmp.path().join("runs")),
        ..Default::default()
    };
    assert!(run_train(args, Arc::new(AtomicBool::new(false))).is_err());
}
