//! Dataset loading and splitting for detector training.
//!
//! Expects a raw-data root with two subdirectories:
//! - `Images/`: source images, matched to labels by file stem
//! - `Labels/`: `<stem>.txt`, a box count followed by one `x_min y_min x_max y_max [class]` line per box

pub mod layout;
pub mod splits;
pub mod types;

pub use layout::{index_dataset, load_sample, parse_label_file, IMAGES_SUBDIR, LABELS_SUBDIR};
pub use splits::{check_fraction, split, train_len, MIN_SPLIT_SAMPLES};
pub use types::*;
