use std::collections::BTreeMap;

use burn::tensor::activation::log_softmax;
use burn::tensor::{backend::Backend, ElementConversion, Tensor, TensorData};

use crate::batch::DetectionBatch;
use crate::detector::GridDetector;

/// Named loss components for one batch (e.g. `loss_objectness`, `loss_box_reg`).
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    terms: BTreeMap<String, Tensor<B, 1>>,
}

impl<B: Backend> Default for LossTerms<B> {
    fn default() -> Self {
        Self {
            terms: BTreeMap::new(),
        }
    }
}

impl<B: Backend> LossTerms<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Tensor<B, 1>) {
        self.terms.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    /// Sum of all components; `None` when there are none.
    pub fn total(&self) -> Option<Tensor<B, 1>> {
        self.terms
            .values()
            .cloned()
            .reduce(|acc, term| acc + term)
    }

    /// Detached scalar value per component.
    pub fn scalars(&self) -> BTreeMap<String, f32> {
        self.terms
            .iter()
            .map(|(name, t)| (name.clone(), t.clone().detach().into_scalar().elem::<f32>()))
            .collect()
    }
}

impl<B: Backend, S: Into<String>> FromIterator<(S, Tensor<B, 1>)> for LossTerms<B> {
    fn from_iter<I: IntoIterator<Item = (S, Tensor<B, 1>)>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Forward-with-targets capability the training loop drives.
pub trait DetectionLosses<B: Backend> {
    fn losses(&self, batch: &DetectionBatch<B>) -> LossTerms<B>;
}

impl<B: Backend> DetectionLosses<B> for GridDetector<B> {
    fn losses(&self, batch: &DetectionBatch<B>) -> LossTerms<B> {
        let out = self.forward(batch.images.clone());
        let targets = build_greedy_targets(
            out.boxes.clone(),
            batch.boxes.clone(),
            batch.box_mask.clone(),
            batch.labels.clone(),
            self.num_classes(),
        );
        let matched = (targets.matched as f32).max(1.0);

        // Objectness loss (BCE); unassigned preds stay at 0.0.
        let eps = 1e-6;
        let [n_batch, n_pred] = targets.objectness.dims();
        let scores = out.scores.clamp(eps, 1.0 - eps);
        let obj_inv = targets.objectness.ones_like() - targets.objectness.clone();
        let obj_loss = -((targets.objectness * scores.clone().log())
            + (obj_inv * (scores.ones_like() - scores).log()))
        .sum()
        .div_scalar((n_batch * n_pred) as f32);

        // Box regression on matched preds only.
        let box_loss = ((out.boxes - targets.boxes).abs() * targets.box_weights)
            .sum()
            .div_scalar(matched);

        let class_loss = -(targets.classes * log_softmax(out.class_logits, 2))
            .sum()
            .div_scalar(matched);

        LossTerms::from_iter([
            ("loss_objectness", obj_loss),
            ("loss_box_reg", box_loss),
            ("loss_classifier", class_loss),
        ])
    }
}

pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let ax0 = a[0].min(a[2]);
    let ay0 = a[1].min(a[3]);
    let ax1 = a[0].max(a[2]);
    let ay1 = a[1].max(a[3]);
    let bx0 = b[0].min(b[2]);
    let by0 = b[1].min(b[3]);
    let bx1 = b[0].max(b[2]);
    let by1 = b[1].max(b[3]);

    let inter_w = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
    let inter_h = (ay1.min(by1) - ay0.max(by0)).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (ax1 - ax0).max(0.0) * (ay1 - ay0).max(0.0);
    let area_b = (bx1 - bx0).max(0.0) * (by1 - by0).max(0.0);
    let denom = area_a + area_b - inter_area;
    if denom <= 0.0 {
        0.0
    } else {
        inter_area / denom
    }
}

/// Per-prediction training targets.
#[derive(Debug, Clone)]
pub struct GreedyTargets<B: Backend> {
    /// [batch, max_pred]
    pub objectness: Tensor<B, 2>,
    /// [batch, max_pred, 4]
    pub boxes: Tensor<B, 3>,
    /// [batch, max_pred, 4]
    pub box_weights: Tensor<B, 3>,
    /// One-hot [batch, max_pred, num_classes]; zero rows for unmatched preds.
    pub classes: Tensor<B, 3>,
    pub matched: usize,
}

/// For each ground-truth box pick the prediction with the best IoU.
pub fn build_greedy_targets<B: Backend>(
    pred_boxes: Tensor<B, 3>,
    gt_boxes: Tensor<B, 3>,
    gt_mask: Tensor<B, 2>,
    gt_labels: Tensor<B, 2>,
    num_classes: usize,
) -> GreedyTargets<B> {
    let device = pred_boxes.device();
    let [batch, max_pred, _] = pred_boxes.dims();
    let max_gt = gt_boxes.dims()[1];
    let num_classes = num_classes.max(1);

    let host = |t: TensorData| t.convert::<f32>().to_vec::<f32>().unwrap_or_default();
    let gt_mask_vec = host(gt_mask.into_data());
    let gt_boxes_vec = host(gt_boxes.into_data());
    let gt_labels_vec = host(gt_labels.into_data());
    let pred_boxes_vec = host(pred_boxes.detach().into_data());

    let mut obj_targets = vec![0.0f32; batch * max_pred];
    let mut box_targets = vec![0.0f32; batch * max_pred * 4];
    let mut box_weights = vec![0.0f32; batch * max_pred * 4];
    let mut class_targets = vec![0.0f32; batch * max_pred * num_classes];
    let mut assigned = vec![false; batch * max_pred];

    for b in 0..batch {
        for g in 0..max_gt {
            let gt_idx = b * max_gt + g;
            if gt_mask_vec.get(gt_idx).copied().unwrap_or(0.0) < 0.5 {
                continue;
            }
            let Some(gb) = gt_boxes_vec.get(gt_idx * 4..gt_idx * 4 + 4) else {
                continue;
            };
            let gb = [gb[0], gb[1], gb[2], gb[3]];

            let mut best_iou = -1.0f32;
            let mut best_p = 0usize;
            for p in 0..max_pred {
                let base = (b * max_pred + p) * 4;
                let Some(pb) = pred_boxes_vec.get(base..base + 4) else {
                    continue;
                };
                let iou = iou_xyxy([pb[0], pb[1], pb[2], pb[3]], gb);
                if iou > best_iou {
                    best_iou = iou;
                    best_p = p;
                }
            }

            let label = gt_labels_vec.get(gt_idx).copied().unwrap_or(1.0);
            if !(1.0..num_classes as f32).contains(&label) {
                tracing::warn!(
                    "ignoring ground-truth box with class {label} (num_classes {num_classes})"
                );
                continue;
            }
            let label = label as usize;
            let slot = b * max_pred + best_p;
            obj_targets[slot] = 1.0;
            box_targets[slot * 4..slot * 4 + 4].copy_from_slice(&gb);
            box_weights[slot * 4..slot * 4 + 4].copy_from_slice(&[1.0; 4]);
            let row = &mut class_targets[slot * num_classes..(slot + 1) * num_classes];
            row.fill(0.0);
            row[label] = 1.0;
            assigned[slot] = true;
        }
    }

    let matched = assigned.iter().filter(|a| **a).count();
    GreedyTargets {
        objectness: Tensor::from_data(TensorData::new(obj_targets, [batch, max_pred]), &device),
        boxes: Tensor::from_data(TensorData::new(box_targets, [batch, max_pred, 4]), &device),
        box_weights: Tensor::from_data(TensorData::new(box_weights, [batch, max_pred, 4]), &device),
        classes: Tensor::from_data(
            TensorData::new(class_targets, [batch, max_pred, num_classes]),
            &device,
        ),
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        assert!((iou_xyxy([0.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(iou_xyxy([0.0, 0.0, 0.1, 0.1], [0.5, 0.5, 0.9, 0.9]), 0.0);
        assert_eq!(iou_xyxy([0.2, 0.2, 0.2, 0.2], [0.2, 0.2, 0.2, 0.2]), 0.0);
    }

    #[test]
    fn out_of_range_classes_are_never_remapped() {
        type B = burn_ndarray::NdArray<f32>;
        let device = Default::default();
        let pred = Tensor::<B, 3>::from_data(
            TensorData::new(vec![0.1f32, 0.1, 0.6, 0.6], [1, 1, 4]),
            &device,
        );
        let targets_for = |label: f32| {
            build_greedy_targets(
                pred.clone(),
                Tensor::<B, 3>::from_data(
                    TensorData::new(vec![0.1f32, 0.1, 0.6, 0.6], [1, 1, 4]),
                    &device,
                ),
                Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32], [1, 1]), &device),
                Tensor::<B, 2>::from_data(TensorData::new(vec![label], [1, 1]), &device),
                2,
            )
        };

        let ok = targets_for(1.0);
        assert_eq!(ok.matched, 1);
        assert_eq!(ok.classes.into_data().to_vec::<f32>().unwrap(), vec![0.0, 1.0]);

        for label in [0.0, 5.0] {
            let skipped = targets_for(label);
            assert_eq!(skipped.matched, 0);
            assert_eq!(
                skipped.classes.into_data().to_vec::<f32>().unwrap(),
                vec![0.0, 0.0]
            );
            assert_eq!(
                skipped.objectness.into_data().to_vec::<f32>().unwrap(),
                vec![0.0]
            );
        }
    }
}
