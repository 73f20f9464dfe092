use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use burn::tensor::backend::Backend;
use dataset::index_dataset;
use models::GridDetector;

use crate::checkpoint::CheckpointStore;
use crate::config::TrainArgs;
use crate::metrics::JsonlMetricSink;
use crate::trainer::{TrainingLoop, TrainingSummary};
use crate::AutodiffTrainBackend;

/// Resolve config, index the dataset and train a fresh `GridDetector`.
pub fn run_train(args: TrainArgs, stop: Arc<AtomicBool>) -> anyhow::Result<TrainingSummary> {
    let cfg = args.resolve()?;
    cfg.validate()?;

    let samples = index_dataset(&cfg.dataset_root)
        .with_context(|| format!("indexing dataset {}", cfg.dataset_root.display()))?;
    if samples.is_empty() {
        anyhow::bail!(
            "no labelled samples found under {}",
            cfg.dataset_root.display()
        );
    }
    tracing::info!(
        "indexed {} samples under {}",
        samples.len(),
        cfg.dataset_root.display()
    );

    let sink = JsonlMetricSink::create_run(&cfg.metrics_root)
        .with_context(|| format!("creating metric run under {}", cfg.metrics_root.display()))?;
    tracing::info!("writing metrics to {}", sink.path().display());

    let device = <AutodiffTrainBackend as Backend>::Device::default();
    let model = GridDetector::<AutodiffTrainBackend>::new(&cfg.model, &device);
    let checkpoints = CheckpointStore::new(&cfg.checkpoint);

    let mut trainer =
        TrainingLoop::<AutodiffTrainBackend>::new(cfg, device, checkpoints, Box::new(sink))
            .with_stop_flag(stop);
    let outcome = trainer.run(model, samples)?;
    tracing::info!(
        "training finished after {} epoch(s); checkpoint at {}",
        outcome.summary.epochs_completed,
        trainer.checkpoints().path().display()
    );
    Ok(outcome.summary)
}
