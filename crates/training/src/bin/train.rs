use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use training::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = TrainArgs::parse();
    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        tracing::warn!("Ctrl-C received; stopping at the next batch boundary");
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let summary = run_train(args, stop)?;
    tracing::info!(
        "{} training / {} validation samples, {} steps",
        summary.train_samples,
        summary.val_samples,
        summary.steps
    );
    Ok(())
}
