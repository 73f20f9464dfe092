//! Upload decoding: arbitrary bytes to an RGB image and its normalized tensor.

use std::io::Cursor;

use image::{ImageReader, RgbImage};

use crate::error::InvalidImageError;
use crate::interfaces::ImageTensor;

/// Decode into a 3-channel image regardless of the source channel layout.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, InvalidImageError> {
    if bytes.is_empty() {
        return Err(InvalidImageError::new("empty upload"));
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| InvalidImageError::new(format!("unreadable upload: {e}")))?;
    if reader.format().is_none() {
        return Err(InvalidImageError::new("unrecognized image format"));
    }
    let img = reader.decode().map_err(InvalidImageError::from_decode)?;
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(InvalidImageError::new("image has zero area"));
    }
    Ok(rgb)
}

/// Decode bytes straight to the normalized tensor.
pub fn decode(bytes: &[u8]) -> Result<ImageTensor, InvalidImageError> {
    decode_rgb(bytes).map(|rgb| ImageTensor::from_rgb(&rgb))
}
