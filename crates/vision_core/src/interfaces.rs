use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InvalidImageError};

/// Normalized image in CHW layout, 3 channels, values in `[0, 1]`.
///
/// Immutable once built; the pipeline call that decoded it owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ImageTensor {
    pub const CHANNELS: usize = 3;

    /// Build from a CHW buffer; the length must be `3 * width * height`.
    pub fn from_chw(width: u32, height: u32, data: Vec<f32>) -> Result<Self, InvalidImageError> {
        let expected = Self::CHANNELS * width as usize * height as usize;
        if data.len() != expected {
            return Err(InvalidImageError::new(format!(
                "tensor buffer has {} values, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
            return Err(InvalidImageError::new("tensor values must lie in [0, 1]"));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_rgb(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let plane = width as usize * height as usize;
        let mut data = vec![0.0f32; plane * Self::CHANNELS];
        for (idx, px) in img.pixels().enumerate() {
            for c in 0..Self::CHANNELS {
                data[c * plane + idx] = px[c] as f32 / 255.0;
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        Self::CHANNELS
    }

    /// `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        [
            Self::CHANNELS,
            self.height as usize,
            self.width as usize,
        ]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Ground-truth annotations for one training sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Normalized boxes \[x_min, y_min, x_max, y_max\] in 0..1.
    pub boxes: Vec<[f32; 4]>,
    /// Class id per box, aligned with `boxes`.
    pub labels: Vec<u32>,
}

impl Target {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// One raw model output unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Pixel box \[x_min, y_min, x_max, y_max\] with min <= max on both axes.
    pub bbox: [f32; 4],
    pub label: u32,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

impl Proposal {
    /// Build a proposal, reordering corners so min <= max.
    pub fn new(bbox: [f32; 4], label: u32, score: f32) -> Self {
        let [x0, y0, x1, y1] = bbox;
        Self {
            bbox: [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)],
            label,
            score,
        }
    }
}

/// A proposal that survived filtering, with its display name.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub proposal: Proposal,
    pub label: String,
}

impl Detection {
    pub fn score(&self) -> f32 {
        self.proposal.score
    }

    pub fn bbox(&self) -> [f32; 4] {
        self.proposal.bbox
    }
}

/// Runs the trained detector on one image.
///
/// Implementations are shared read-only across requests; a failure must only
/// affect the call that produced it.
pub trait DetectionEngine: Send + Sync {
    fn infer(&self, image: &ImageTensor) -> Result<Vec<Proposal>, InferenceError>;

    /// Human-readable compute device, fixed for the engine's lifetime.
    fn device_name(&self) -> String {
        "cpu".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_is_planar() {
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        let t = ImageTensor::from_rgb(&img);
        assert_eq!(t.shape(), [3, 1, 2]);
        assert_eq!(t.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn from_chw_rejects_wrong_length() {
        assert!(ImageTensor::from_chw(2, 2, vec![0.0; 5]).is_err());
        assert!(ImageTensor::from_chw(1, 1, vec![0.0, 0.5, 1.5]).is_err());
        assert!(ImageTensor::from_chw(1, 1, vec![0.0, 0.5, 1.0]).is_ok());
    }

    #[test]
    fn proposal_orders_corners() {
        let p = Proposal::new([10.0, 8.0, 2.0, 4.0], 1, 0.5);
        assert_eq!(p.bbox, [2.0, 4.0, 10.0, 8.0]);
    }
}
