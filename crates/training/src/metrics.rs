//! Append-only scalar telemetry keyed by (tag, step).

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

pub const TAG_TRAIN_LOSS: &str = "Loss/train";
pub const TAG_VAL_LOSS: &str = "Loss/val";
pub const TAG_EPOCH: &str = "epoch";

pub const METRICS_FILE: &str = "metrics.jsonl";

/// One line of `metrics.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub tag: String,
    pub step: u64,
    pub value: f32,
    /// Seconds since the Unix epoch.
    pub wall_time: f64,
}

impl MetricRecord {
    pub fn now(tag: &str, value: f32, step: u64) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self {
            tag: tag.to_string(),
            step,
            value,
            wall_time: millis as f64 / 1000.0,
        }
    }
}

/// Write-only destination for training scalars.
pub trait MetricSink: Send {
    fn add_scalar(&mut self, tag: &str, value: f32, step: u64) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// JSON-lines sink under a per-run timestamped directory.
pub struct JsonlMetricSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlMetricSink {
    /// `<root>/<YYYYmmdd-HHMMSS>/metrics.jsonl`.
    pub fn create_run(root: &Path) -> io::Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::open(&root.join(stamp).join(METRICS_FILE))
    }

    /// Append to an explicit file, creating parents as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricSink for JsonlMetricSink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: u64) -> io::Result<()> {
        let line = serde_json::to_string(&MetricRecord::now(tag, value, step))?;
        writeln!(self.writer, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Keeps records in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl InMemorySink {
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn tagged(&self, tag: &str) -> Vec<MetricRecord> {
        self.records().into_iter().filter(|r| r.tag == tag).collect()
    }
}

impl MetricSink for InMemorySink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: u64) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetricRecord::now(tag, value, step));
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_sink_appends_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlMetricSink::create_run(dir.path()).unwrap();
        sink.add_scalar(TAG_TRAIN_LOSS, 1.5, 0).unwrap();
        sink.add_scalar(TAG_TRAIN_LOSS, 1.25, 1).unwrap();
        sink.add_scalar(TAG_EPOCH, 0.0, 2).unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.path().file_name().unwrap(), METRICS_FILE);
        let run_dir = sink.path().parent().unwrap();
        assert_eq!(run_dir.parent().unwrap(), dir.path());
        assert_eq!(run_dir.file_name().unwrap().len(), "20260101-000000".len());

        let rows: Vec<MetricRecord> = fs::read_to_string(sink.path())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].tag, TAG_TRAIN_LOSS);
        assert_eq!(rows[1].step, 1);
        assert_eq!(rows[2].tag, TAG_EPOCH);
    }

    #[test]
    fn in_memory_clones_share_records() {
        let sink = InMemorySink::default();
        let mut writer = sink.clone();
        writer.add_scalar(TAG_VAL_LOSS, 0.5, 3).unwrap();
        assert_eq!(sink.tagged(TAG_VAL_LOSS).len(), 1);
        assert!(sink.tagged(TAG_TRAIN_LOSS).is_empty());
    }
}
