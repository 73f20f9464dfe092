use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use vision_core::error::ConfigurationError;
use vision_core::interfaces::Proposal;

use crate::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDetectorConfig {
    /// Including background at class 0.
    pub num_classes: usize,
    pub max_boxes: usize,
    pub hidden: usize,
    pub depth: usize,
    pub conv_channels: usize,
    /// Side of the pooled feature grid.
    pub grid: usize,
}

impl Default for GridDetectorConfig {
    fn default() -> Self {
        Self {
            num_classes: 2,
            max_boxes: 16,
            hidden: 128,
            depth: 2,
            conv_channels: 8,
            grid: 8,
        }
    }
}

impl GridDetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.num_classes < 2 {
            return Err(ConfigurationError::Invalid(format!(
                "num_classes must include background and at least one object class, got {}",
                self.num_classes
            )));
        }
        if self.max_boxes == 0 || self.hidden == 0 || self.conv_channels == 0 || self.grid == 0 {
            return Err(ConfigurationError::Invalid(
                "max_boxes, hidden, conv_channels and grid must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn feature_dim(&self) -> usize {
        self.conv_channels * self.grid * self.grid
    }
}

/// Raw head outputs for a batch.
#[derive(Debug, Clone)]
pub struct DetectorOutput<B: Backend> {
    /// Normalized, corner-ordered boxes [batch, max_boxes, 4].
    pub boxes: Tensor<B, 3>,
    /// Objectness in 0..1 [batch, max_boxes].
    pub scores: Tensor<B, 2>,
    /// Unnormalized class scores [batch, max_boxes, num_classes].
    pub class_logits: Tensor<B, 3>,
}

fn readback<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f32>, ModelError> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ModelError::Readback(format!("{e:?}")))
}

impl<B: Backend> DetectorOutput<B> {
    /// Host-side proposals per image, boxes scaled to each image's pixel size.
    ///
    /// Label is the arg-max foreground class; background (0) is never emitted.
    pub fn into_proposals(self, sizes: &[(u32, u32)]) -> Result<Vec<Vec<Proposal>>, ModelError> {
        let [batch, slots, num_classes] = self.class_logits.dims();
        if sizes.len() != batch {
            return Err(ModelError::Shape(format!(
                "{} image sizes for a batch of {batch}",
                sizes.len()
            )));
        }
        let boxes = readback(self.boxes)?;
        let scores = readback(self.scores)?;
        let logits = readback(self.class_logits)?;
        if let Some(bad) = boxes
            .iter()
            .chain(&scores)
            .chain(&logits)
            .find(|v| !v.is_finite())
        {
            return Err(ModelError::NonFinite(format!("head output contains {bad}")));
        }

        let mut out = Vec::with_capacity(batch);
        for (b, &(w, h)) in sizes.iter().enumerate() {
            let mut proposals = Vec::with_capacity(slots);
            for s in 0..slots {
                let slot = b * slots + s;
                let row = &logits[slot * num_classes..(slot + 1) * num_classes];
                let label = row
                    .iter()
                    .enumerate()
                    .skip(1)
                    .fold((1usize, f32::NEG_INFINITY), |best, (i, v)| {
                        if *v > best.1 {
                            (i, *v)
                        } else {
                            best
                        }
                    })
                    .0;
                let bx = &boxes[slot * 4..slot * 4 + 4];
                proposals.push(Proposal::new(
                    [
                        bx[0] * w as f32,
                        bx[1] * h as f32,
                        bx[2] * w as f32,
                        bx[3] * h as f32,
                    ],
                    label as u32,
                    scores[slot].clamp(0.0, 1.0),
                ));
            }
            out.push(proposals);
        }
        Ok(out)
    }
}

#[derive(Debug, Module)]
pub struct GridDetector<B: Backend> {
    conv: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    stem: nn::Linear<B>,
    blocks: Vec<nn::Linear<B>>,
    box_head: nn::Linear<B>,
    score_head: nn::Linear<B>,
    class_head: nn::Linear<B>,
    max_boxes: usize,
    num_classes: usize,
    feature_dim: usize,
}

impl<B: Backend> GridDetector<B> {
    pub fn new(cfg: &GridDetectorConfig, device: &B::Device) -> Self {
        let max_boxes = cfg.max_boxes.max(1);
        let hidden = cfg.hidden.max(1);
        let feature_dim = cfg.feature_dim().max(1);
        let conv = Conv2dConfig::new([3, cfg.conv_channels.max(1)], [3, 3])
            .with_padding(nn::PaddingConfig2d::Same)
            .init(device);
        let pool = AdaptiveAvgPool2dConfig::new([cfg.grid.max(1), cfg.grid.max(1)]).init();
        let stem = nn::LinearConfig::new(feature_dim, hidden).init(device);
        let blocks = (0..cfg.depth)
            .map(|_| nn::LinearConfig::new(hidden, hidden).init(device))
            .collect();
        let box_head = nn::LinearConfig::new(hidden, max_boxes * 4).init(device);
        let score_head = nn::LinearConfig::new(hidden, max_boxes).init(device);
        let class_head = nn::LinearConfig::new(hidden, max_boxes * cfg.num_classes).init(device);
        Self {
            conv,
            pool,
            stem,
            blocks,
            box_head,
            score_head,
            class_head,
            max_boxes,
            num_classes: cfg.num_classes,
            feature_dim,
        }
    }

    pub fn max_boxes(&self) -> usize {
        self.max_boxes
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Images [batch, 3, H, W] in 0..1; any H, W.
    pub fn forward(&self, images: Tensor<B, 4>) -> DetectorOutput<B> {
        let batch = images.dims()[0];
        let x = relu(self.conv.forward(images));
        let x = self.pool.forward(x).reshape([batch, self.feature_dim]);
        let mut x = relu(self.stem.forward(x));
        for block in &self.blocks {
            x = relu(block.forward(x));
        }

        let boxes = sigmoid(self.box_head.forward(x.clone())).reshape([batch, self.max_boxes, 4]);
        let scores = sigmoid(self.score_head.forward(x.clone()));
        let class_logits =
            self.class_head
                .forward(x)
                .reshape([batch, self.max_boxes, self.num_classes]);

        // Reorder to enforce x0 <= x1, y0 <= y1 using arithmetic.
        let x0 = boxes.clone().slice([0..batch, 0..self.max_boxes, 0..1]);
        let y0 = boxes.clone().slice([0..batch, 0..self.max_boxes, 1..2]);
        let x1 = boxes.clone().slice([0..batch, 0..self.max_boxes, 2..3]);
        let y1 = boxes.slice([0..batch, 0..self.max_boxes, 3..4]);

        let dx = x0.clone() - x1.clone();
        let dy = y0.clone() - y1.clone();
        let half = 0.5;

        let x_min = (x0.clone() + x1.clone() - dx.clone().abs()) * half;
        let x_max = (x0 + x1 + dx.abs()) * half;
        let y_min = (y0.clone() + y1.clone() - dy.clone().abs()) * half;
        let y_max = (y0 + y1 + dy.abs()) * half;

        let boxes = Tensor::cat(vec![x_min, y_min, x_max, y_max], 2);

        DetectorOutput {
            boxes,
            scores,
            class_logits,
        }
    }
}
