//! Indexing and loading the Images/Labels layout.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use vision_core::interfaces::{ImageTensor, Target};

use crate::types::{DatasetError, DatasetResult, DatasetSample, LoadOptions, SampleIndex};

pub const IMAGES_SUBDIR: &str = "Images";
pub const LABELS_SUBDIR: &str = "Labels";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Pair every image in `Images/` with `Labels/<stem>.txt`, sorted by image path.
///
/// Images without a label file are skipped with a warning.
pub fn index_dataset(root: &Path) -> DatasetResult<Vec<SampleIndex>> {
    let images_dir = root.join(IMAGES_SUBDIR);
    let labels_dir = root.join(LABELS_SUBDIR);
    for dir in [&images_dir, &labels_dir] {
        if !dir.is_dir() {
            return Err(DatasetError::Layout {
                root: root.to_path_buf(),
                msg: format!("missing directory {}", dir.display()),
            });
        }
    }

    let mut images: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(&images_dir).map_err(io_err(&images_dir))? {
        let path = entry.map_err(io_err(&images_dir))?.path();
        let is_image = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            images.push(path);
        }
    }
    images.sort();

    let mut indices = Vec::with_capacity(images.len());
    let mut unlabeled = 0usize;
    for image_path in images {
        let Some(stem) = image_path.file_stem() else {
            continue;
        };
        let label_path = labels_dir.join(format!("{}.txt", stem.to_string_lossy()));
        if !label_path.is_file() {
            unlabeled += 1;
            continue;
        }
        indices.push(SampleIndex {
            image_path,
            label_path,
        });
    }
    if unlabeled > 0 {
        tracing::warn!(
            "{unlabeled} image(s) under {} have no label file; skipped",
            images_dir.display()
        );
    }
    tracing::info!("indexed {} samples under {}", indices.len(), root.display());
    Ok(indices)
}

/// Parse a label file into pixel boxes and class ids.
///
/// First non-empty line: box count N. Next N lines: `x_min y_min x_max y_max [class]`.
pub fn parse_label_file(
    contents: &str,
    path: &Path,
    default_class: u32,
) -> DatasetResult<(Vec<[f32; 4]>, Vec<u32>)> {
    let label_err = |line: usize, msg: String| DatasetError::Label {
        path: path.to_path_buf(),
        line,
        msg,
    };
    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let Some((count_line, count)) = lines.next() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let count: usize = count
        .parse()
        .map_err(|_| label_err(count_line, format!("expected box count, found {count:?}")))?;

    let mut boxes = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);
    for _ in 0..count {
        let Some((line_no, line)) = lines.next() else {
            return Err(label_err(
                count_line,
                format!("declares {count} boxes but only {} present", boxes.len()),
            ));
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 4 && tokens.len() != 5 {
            return Err(label_err(
                line_no,
                format!("expected 4 or 5 columns, found {}", tokens.len()),
            ));
        }
        let mut bbox = [0.0f32; 4];
        for (slot, tok) in bbox.iter_mut().zip(&tokens[..4]) {
            *slot = tok
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| label_err(line_no, format!("invalid coordinate {tok:?}")))?;
        }
        let class = match tokens.get(4) {
            Some(tok) => tok
                .parse::<u32>()
                .ok()
                .filter(|&c| c != 0)
                .ok_or_else(|| label_err(line_no, format!("invalid class id {tok:?}")))?,
            None => default_class,
        };
        boxes.push(bbox);
        labels.push(class);
    }
    Ok((boxes, labels))
}

fn normalize(bbox: [f32; 4], (w, h): (u32, u32)) -> Option<[f32; 4]> {
    let (w, h) = (w as f32, h as f32);
    let x0 = (bbox[0].min(bbox[2]) / w).clamp(0.0, 1.0);
    let y0 = (bbox[1].min(bbox[3]) / h).clamp(0.0, 1.0);
    let x1 = (bbox[0].max(bbox[2]) / w).clamp(0.0, 1.0);
    let y1 = (bbox[1].max(bbox[3]) / h).clamp(0.0, 1.0);
    (x0 < x1 && y0 < y1).then_some([x0, y0, x1, y1])
}

/// Load one sample: decode, normalize boxes against the source size, resize.
pub fn load_sample(idx: &SampleIndex, opts: &LoadOptions) -> DatasetResult<DatasetSample> {
    let contents = fs::read_to_string(&idx.label_path).map_err(io_err(&idx.label_path))?;
    let (px_boxes, px_labels) = parse_label_file(&contents, &idx.label_path, opts.default_class)?;

    let rgb = image::open(&idx.image_path)
        .map_err(|source| DatasetError::Image {
            path: idx.image_path.clone(),
            source,
        })?
        .to_rgb8();
    let source_size = rgb.dimensions();

    let mut target = Target::default();
    for (bbox, label) in px_boxes.into_iter().zip(px_labels) {
        match normalize(bbox, source_size) {
            Some(norm) => {
                target.boxes.push(norm);
                target.labels.push(label);
            }
            None => tracing::debug!(
                "dropping zero-area box {bbox:?} in {}",
                idx.label_path.display()
            ),
        }
    }

    let side = opts.input_size.max(1);
    let resized = if source_size == (side, side) {
        rgb
    } else {
        imageops::resize(&rgb, side, side, FilterType::Triangle)
    };

    Ok(DatasetSample {
        image: ImageTensor::from_rgb(&resized),
        target,
        source_size,
    })
}
