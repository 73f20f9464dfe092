use std::fs;
use std::path::PathBuf;

use clap::Parser;
use inference::{EngineFactory, InferenceService, ServiceConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "single_infer",
    about = "Run the detection pipeline on one image and write the annotated result next to it"
)]
struct Args {
    /// Image to run detection on.
    #[arg(long)]
    image: PathBuf,
    /// Service TOML (falls back to DETECT_SERVICE_CONFIG, then defaults).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Checkpoint to load instead of the configured one.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Score threshold; out-of-range values are clamped to [0, 1].
    #[arg(long)]
    threshold: Option<f32>,
    /// Write the JSON response instead of the annotated image.
    #[arg(long)]
    json: bool,
    /// Serve an untrained model when the checkpoint is missing.
    #[arg(long)]
    allow_untrained: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = ServiceConfig::load(args.config.as_deref())?;
    if let Some(checkpoint) = args.checkpoint {
        cfg.checkpoint = checkpoint;
    }
    cfg.allow_untrained |= args.allow_untrained;

    let engine = EngineFactory.build(&cfg)?;
    let service = InferenceService::from_config(engine, &cfg);
    let threshold = args.threshold.unwrap_or(cfg.default_threshold);

    let bytes = fs::read(&args.image)?;
    let stem = args
        .image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let dir = args.image.parent().map(PathBuf::from).unwrap_or_default();

    let (out_path, count) = if args.json {
        let response = service.handle_json(&bytes, Some(threshold))?;
        let path = dir.join(format!("{stem}_detections.json"));
        fs::write(&path, serde_json::to_vec_pretty(&response)?)?;
        (path, response.count)
    } else {
        let response = service.handle_image(&bytes, Some(threshold))?;
        let ext = service
            .output_format()
            .image_format()
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("png");
        let path = dir.join(format!("{stem}_annotated.{ext}"));
        fs::write(&path, &response.bytes)?;
        (path, response.detection_count)
    };

    tracing::info!(
        "{count} detection(s) at threshold {threshold}; wrote {}",
        out_path.display()
    );
    Ok(())
}
