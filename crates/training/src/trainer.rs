use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use dataset::{split, SampleIndex};
use models::DetectionLosses;

use crate::batches::{batch_count, epoch_order, load_batch};
use crate::checkpoint::CheckpointStore;
use crate::config::TrainConfig;
use crate::error::{DegenerateLossError, TrainingError, TrainingFailedError};
use crate::metrics::{MetricSink, TAG_EPOCH, TAG_TRAIN_LOSS, TAG_VAL_LOSS};
use crate::state::TrainingState;

/// Key under which validation reports the summed loss.
pub const TOTAL_LOSS: &str = "total";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    pub train_samples: usize,
    pub val_samples: usize,
    pub epochs_completed: usize,
    pub steps: u64,
    /// Mean training loss of the last epoch.
    pub last_train_loss: Option<f32>,
    /// Mean validation loss per component for the last epoch; empty when
    /// the validation subset is empty.
    pub last_val_losses: BTreeMap<String, f32>,
}

pub struct TrainingOutcome<M> {
    pub model: M,
    pub summary: TrainingSummary,
}

/// Drives split, epochs, validation, checkpointing and metric emission.
///
/// Batches run strictly one after another; only sample loading inside a
/// batch is parallel.
pub struct TrainingLoop<B: AutodiffBackend> {
    config: TrainConfig,
    device: B::Device,
    checkpoints: CheckpointStore,
    metrics: Box<dyn MetricSink>,
    stop: Option<Arc<AtomicBool>>,
    state: TrainingState,
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_scalar().elem::<f32>()
}

/// Run a model call, turning a panic (e.g. a tensor shape mismatch) into a
/// message the run can fail with.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("model panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("model panicked: {msg}")
    } else {
        "model panicked".to_string()
    }
}

impl<B: AutodiffBackend> TrainingLoop<B> {
    pub fn new(
        config: TrainConfig,
        device: B::Device,
        checkpoints: CheckpointStore,
        metrics: Box<dyn MetricSink>,
    ) -> Self {
        Self {
            config,
            device,
            checkpoints,
            metrics,
            stop: None,
            state: TrainingState::Initialized,
        }
    }

    /// Checked before every epoch and every batch.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn transition(&mut self, next: TrainingState) {
        tracing::info!("training state: {} -> {}", self.state, next);
        self.state = next;
    }

    fn failed(&mut self, err: impl Into<TrainingError>) -> TrainingError {
        let err = err.into();
        tracing::error!("training {}: {err}", self.state);
        self.state = TrainingState::Failed;
        err
    }

    fn abort(
        &mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> TrainingError {
        let err = TrainingFailedError::new(self.state, source);
        self.failed(err)
    }

    fn check_stop(&mut self, epoch: usize, batch: usize) -> Result<(), TrainingError> {
        let requested = self
            .stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst));
        if requested {
            tracing::warn!("stop requested; ending run before epoch {epoch}, batch {batch}");
            return Err(self.failed(TrainingError::Cancelled { epoch, batch }));
        }
        Ok(())
    }

    /// Train `model` on `samples`. The checkpoint is rewritten after every
    /// completed epoch; a failed or cancelled epoch leaves the previous one.
    pub fn run<M>(
        &mut self,
        mut model: M,
        mut samples: Vec<SampleIndex>,
    ) -> Result<TrainingOutcome<M>, TrainingError>
    where
        M: AutodiffModule<B> + DetectionLosses<B>,
        M::InnerModule: DetectionLosses<B::InnerBackend>,
    {
        if let Err(err) = self.config.validate() {
            return Err(self.failed(err));
        }

        self.transition(TrainingState::Splitting);
        if let Some(cap) = self.config.max_samples {
            samples.truncate(cap);
        }
        let (train, val) = match split(samples, self.config.train_fraction, self.config.seed) {
            Ok(parts) => parts,
            Err(err) => return Err(self.failed(err)),
        };
        if train.is_empty() {
            return Err(self.abort("dataset contains no samples"));
        }
        tracing::info!(
            "dataset split into {} training and {} validation samples",
            train.len(),
            val.len()
        );

        let mut optim = AdamConfig::new().init();
        let batch_size = self.config.batch_size;
        let batches_per_epoch = batch_count(train.len(), batch_size);
        let max_boxes = self.config.model.max_boxes;
        let num_classes = self.config.model.num_classes;
        let learning_rate = self.config.learning_rate;
        let mut summary = TrainingSummary {
            train_samples: train.len(),
            val_samples: val.len(),
            ..Default::default()
        };
        let mut step = 0u64;

        for epoch in 0..self.config.epochs {
            self.check_stop(epoch, 0)?;
            self.transition(TrainingState::EpochRunning { epoch });

            let order = epoch_order(train.len(), self.config.seed, epoch, true);
            let mut epoch_loss = 0.0f32;
            for (i, chunk) in order.chunks(batch_size).enumerate() {
                self.check_stop(epoch, i)?;
                let picked: Vec<&SampleIndex> = chunk.iter().map(|&j| &train[j]).collect();
                let loaded = load_batch::<B>(
                    &picked,
                    &self.config.load,
                    max_boxes,
                    num_classes,
                    &self.device,
                );
                let batch = match loaded {
                    Ok(batch) => batch,
                    Err(err) => return Err(self.abort(err)),
                };

                let forward = guarded(|| {
                    let terms = model.losses(&batch);
                    let scalars = terms.scalars();
                    terms
                        .total()
                        .map(|total| (scalar(total.clone().detach()), total, scalars))
                });
                let (value, total, scalars) = match forward {
                    Ok(Some(parts)) => parts,
                    Ok(None) => return Err(self.abort("model returned no loss terms")),
                    Err(msg) => return Err(self.abort(msg)),
                };
                if !value.is_finite() {
                    return Err(self.abort(format!(
                        "loss is {value} at epoch {epoch}, batch {i} (terms: {scalars:?})"
                    )));
                }
                if value == 0.0 {
                    let err = DegenerateLossError {
                        epoch,
                        batch: i,
                        terms: scalars,
                    };
                    return Err(self.failed(err));
                }

                let stepped = guarded(|| {
                    let grads = GradientsParams::from_grads(total.backward(), &model);
                    optim.step(learning_rate, model, grads)
                });
                model = match stepped {
                    Ok(model) => model,
                    Err(msg) => return Err(self.abort(msg)),
                };

                step = (epoch * batches_per_epoch + i) as u64;
                if let Err(err) = self.metrics.add_scalar(TAG_TRAIN_LOSS, value, step) {
                    return Err(self.abort(err));
                }
                epoch_loss += value;
                tracing::debug!("epoch {epoch} batch {i}: loss {value:.4}");
            }
            let mean_train = epoch_loss / batches_per_epoch.max(1) as f32;
            let marker = self
                .metrics
                .add_scalar(TAG_EPOCH, epoch as f32, step)
                .and_then(|_| self.metrics.flush());
            if let Err(err) = marker {
                return Err(self.abort(err));
            }

            self.transition(TrainingState::Validating { epoch });
            let val_losses = self.validate(&model.valid(), &val, epoch)?;
            if let Some(total) = val_losses.get(TOTAL_LOSS) {
                let logged = self
                    .metrics
                    .add_scalar(TAG_VAL_LOSS, *total, epoch as u64)
                    .and_then(|_| self.metrics.flush());
                if let Err(err) = logged {
                    return Err(self.abort(err));
                }
            }

            self.transition(TrainingState::Checkpointing { epoch });
            if let Err(err) = self.checkpoints.save::<B, M>(model.clone()) {
                return Err(self.abort(err));
            }

            tracing::info!(
                "epoch {epoch}: train loss {mean_train:.4}, val loss {}",
                val_losses
                    .get(TOTAL_LOSS)
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_else(|| "n/a".to_string())
            );
            summary.epochs_completed = epoch + 1;
            summary.steps = step + 1;
            summary.last_train_loss = Some(mean_train);
            summary.last_val_losses = val_losses;
        }

        self.transition(TrainingState::Completed);
        Ok(TrainingOutcome { model, summary })
    }

    /// Mean of every loss component over the validation subset, plus
    /// [`TOTAL_LOSS`]. Logged only; never gates checkpointing.
    fn validate<V>(
        &mut self,
        model: &V,
        val: &[SampleIndex],
        epoch: usize,
    ) -> Result<BTreeMap<String, f32>, TrainingError>
    where
        V: DetectionLosses<B::InnerBackend>,
    {
        if val.is_empty() {
            tracing::info!("epoch {epoch}: validation subset is empty; skipping");
            return Ok(BTreeMap::new());
        }
        let max_boxes = self.config.model.max_boxes;
        let num_classes = self.config.model.num_classes;
        let mut sums: BTreeMap<String, f32> = BTreeMap::new();
        let mut batches = 0usize;
        for chunk in val.chunks(self.config.batch_size) {
            let picked: Vec<&SampleIndex> = chunk.iter().collect();
            let batch = match load_batch::<B::InnerBackend>(
                &picked,
                &self.config.load,
                max_boxes,
                num_classes,
                &self.device,
            ) {
                Ok(batch) => batch,
                Err(err) => return Err(self.abort(err)),
            };
            let scalars = match guarded(|| model.losses(&batch).scalars()) {
                Ok(scalars) => scalars,
                Err(msg) => return Err(self.abort(msg)),
            };
            let total: f32 = scalars.values().sum();
            for (name, value) in scalars {
                *sums.entry(name).or_default() += value;
            }
            *sums.entry(TOTAL_LOSS.to_string()).or_default() += total;
            batches += 1;
        }
        let means: BTreeMap<String, f32> = sums
            .into_iter()
            .map(|(name, sum)| (name, sum / batches as f32))
            .collect();
        for (name, value) in &means {
            tracing::info!("epoch {epoch} validation {name}: {value:.4}");
        }
        Ok(means)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_turns_panics_into_messages() {
        assert_eq!(guarded(|| 3), Ok(3));
        assert_eq!(
            guarded(|| -> u8 { panic!("dims differ") }),
            Err("model panicked: dims differ".to_string())
        );
    }
}
