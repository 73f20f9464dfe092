use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::interfaces::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 2;
const LABEL_FONT_SIZE: f32 = 14.0;

/// Normalize a box from 0..1 space into pixel coordinates, clamped to image bounds.
pub fn normalize_box(bbox_norm: [f32; 4], dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    clamp_box(
        [
            bbox_norm[0] * w as f32,
            bbox_norm[1] * h as f32,
            bbox_norm[2] * w as f32,
            bbox_norm[3] * h as f32,
        ],
        dims,
    )
}

/// Clamp a pixel box to image bounds. `None` for empty images, NaN corners,
/// or boxes that do not overlap the image at all.
pub fn clamp_box(bbox_px: [f32; 4], dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 || bbox_px.iter().any(|v| v.is_nan()) {
        return None;
    }
    let [bx0, by0, bx1, by1] = bbox_px;
    if bx1 < 0.0 || by1 < 0.0 || bx0 >= w as f32 || by0 >= h as f32 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32).round() as u32 };
    let x0 = clamp(bbox_px[0], w);
    let y0 = clamp(bbox_px[1], h);
    let x1 = clamp(bbox_px[2], w);
    let y1 = clamp(bbox_px[3], h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

/// Draw a rectangle border with given thickness.
pub fn draw_rect(img: &mut RgbImage, bbox_px: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

/// `"<name> <score:.3>"`.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.3}", detection.label, detection.score())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Source image with detections burned in. One consumer per request.
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
    image: RgbImage,
    detection_count: usize,
}

impl AnnotatedImage {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn detection_count(&self) -> usize {
        self.detection_count
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn encode(&self, format: OutputFormat) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, format.image_format())?;
        Ok(buf.into_inner())
    }

    /// `data:<mime>;base64,<payload>` for embedding in JSON.
    pub fn to_data_uri(&self, format: OutputFormat) -> Result<String, image::ImageError> {
        let bytes = self.encode(format)?;
        Ok(format!(
            "data:{};base64,{}",
            format.content_type(),
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ))
    }

    pub fn into_inner(self) -> RgbImage {
        self.image
    }
}

/// Draws detection boxes and labels.
///
/// Whether labels can be drawn is decided once, when the renderer is built:
/// without a font, boxes are still drawn and labels are omitted.
#[derive(Clone)]
pub struct AnnotationRenderer {
    font: Option<FontArc>,
    scale: f32,
}

impl std::fmt::Debug for AnnotationRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationRenderer")
            .field("has_text_renderer", &self.has_text_renderer())
            .field("scale", &self.scale)
            .finish()
    }
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        Self::boxes_only()
    }
}

impl AnnotationRenderer {
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            font,
            scale: LABEL_FONT_SIZE,
        }
    }

    /// Boxes only.
    pub fn boxes_only() -> Self {
        Self::new(None)
    }

    /// Load a TTF/OTF font; an unreadable or invalid file disables labels.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::boxes_only();
        };
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()));
        match font {
            Ok(font) => Self::new(Some(font)),
            Err(err) => {
                tracing::warn!(
                    "label font {} unavailable ({err}); rendering boxes without labels",
                    path.display()
                );
                Self::boxes_only()
            }
        }
    }

    pub fn has_text_renderer(&self) -> bool {
        self.font.is_some()
    }

    pub fn render(&self, source: &RgbImage, detections: &[Detection]) -> AnnotatedImage {
        let mut image = source.clone();
        let dims = image.dimensions();
        for det in detections {
            let Some(px) = clamp_box(det.bbox(), dims) else {
                continue;
            };
            draw_rect(&mut image, px, BOX_COLOR, BOX_THICKNESS);
            if let Some(font) = &self.font {
                self.draw_label(&mut image, font, px, &label_text(det));
            }
        }
        AnnotatedImage {
            image,
            detection_count: detections.len(),
        }
    }

    fn draw_label(&self, image: &mut RgbImage, font: &FontArc, px: [u32; 4], text: &str) {
        let scale = PxScale::from(self.scale);
        let (text_w, text_h) = text_size(scale, font, text);
        let anchor_x = px[0] as i32;
        // Above the box; pinned to row 0 when that would leave the image.
        let anchor_y = (px[1] as i32 - text_h as i32 - 2).max(0);
        let bg_w = (text_w + 2).min(image.width().saturating_sub(px[0]));
        if bg_w > 0 {
            let rect = Rect::at(anchor_x, anchor_y).of_size(bg_w, text_h + 2);
            draw_filled_rect_mut(image, rect, BOX_COLOR);
        }
        draw_text_mut(image, TEXT_COLOR, anchor_x + 1, anchor_y + 1, scale, font, text);
    }
}
