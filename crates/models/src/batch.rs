use burn::tensor::{backend::Backend, Tensor, TensorData};
use vision_core::interfaces::{ImageTensor, Target};

use crate::ModelError;

/// Stacked images plus padded ground truth.
#[derive(Debug, Clone)]
pub struct DetectionBatch<B: Backend> {
    /// Shape: [batch, 3, height, width].
    pub images: Tensor<B, 4>,
    /// Normalized boxes per sample (shape: [batch, max_boxes, 4]).
    pub boxes: Tensor<B, 3>,
    /// Mask indicating which box slots are populated (shape: [batch, max_boxes]).
    pub box_mask: Tensor<B, 2>,
    /// Class id per box slot as f32 (shape: [batch, max_boxes]).
    pub labels: Tensor<B, 2>,
}

impl<B: Backend> DetectionBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stack samples of identical size; boxes beyond `max_boxes` are truncated.
///
/// Every class id must be a foreground class of the model (`1..num_classes`).
pub fn collate<B: Backend>(
    samples: &[(ImageTensor, Target)],
    max_boxes: usize,
    num_classes: usize,
    device: &B::Device,
) -> Result<DetectionBatch<B>, ModelError> {
    let Some((first, _)) = samples.first() else {
        return Err(ModelError::EmptyBatch);
    };
    let max_boxes = max_boxes.max(1);
    let [channels, height, width] = first.shape();
    let batch = samples.len();

    let mut image_buf: Vec<f32> = Vec::with_capacity(batch * channels * height * width);
    let mut boxes_buf = vec![0.0f32; batch * max_boxes * 4];
    let mut mask_buf = vec![0.0f32; batch * max_boxes];
    let mut labels_buf = vec![0.0f32; batch * max_boxes];

    for (b, (image, target)) in samples.iter().enumerate() {
        if image.shape() != first.shape() {
            return Err(ModelError::Shape(format!(
                "image {b} is {:?}, expected {:?}",
                image.shape(),
                first.shape()
            )));
        }
        if target.boxes.len() != target.labels.len() {
            return Err(ModelError::Shape(format!(
                "target {b} has {} boxes but {} labels",
                target.boxes.len(),
                target.labels.len()
            )));
        }
        if let Some(&class) = target
            .labels
            .iter()
            .find(|&&c| c == 0 || c as usize >= num_classes)
        {
            return Err(ModelError::Label {
                sample: b,
                class,
                num_classes,
            });
        }
        image_buf.extend_from_slice(image.as_slice());
        for (i, (bbox, label)) in target
            .boxes
            .iter()
            .zip(&target.labels)
            .take(max_boxes)
            .enumerate()
        {
            let base = (b * max_boxes + i) * 4;
            boxes_buf[base..base + 4].copy_from_slice(bbox);
            mask_buf[b * max_boxes + i] = 1.0;
            labels_buf[b * max_boxes + i] = *label as f32;
        }
    }

    let images = Tensor::<B, 4>::from_data(
        TensorData::new(image_buf, [batch, channels, height, width]),
        device,
    );
    let boxes =
        Tensor::<B, 3>::from_data(TensorData::new(boxes_buf, [batch, max_boxes, 4]), device);
    let box_mask = Tensor::<B, 2>::from_data(TensorData::new(mask_buf, [batch, max_boxes]), device);
    let labels = Tensor::<B, 2>::from_data(TensorData::new(labels_buf, [batch, max_boxes]), device);

    Ok(DetectionBatch {
        images,
        boxes,
        box_mask,
        labels,
    })
}
