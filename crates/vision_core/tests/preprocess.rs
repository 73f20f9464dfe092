use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use vision_core::preprocess::{decode, decode_rgb};

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode fixture");
    buf.into_inner()
}

#[test]
fn grayscale_and_rgba_become_three_channels() {
    let gray = GrayImage::from_pixel(7, 5, Luma([128]));
    let t = decode(&encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png)).unwrap();
    assert_eq!(t.shape(), [3, 5, 7]);
    let first = t.as_slice()[0];
    assert!((first - 128.0 / 255.0).abs() < 1e-6);

    let rgba = RgbaImage::from_pixel(4, 9, Rgba([255, 0, 0, 10]));
    let t = decode(&encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png)).unwrap();
    assert_eq!(t.shape(), [3, 9, 4]);
    assert_eq!(t.channels(), 3);
}

#[test]
fn palette_gif_becomes_three_channels() {
    let rgba = RgbaImage::from_fn(6, 4, |x, _| {
        if x < 3 {
            Rgba([200, 10, 10, 255])
        } else {
            Rgba([10, 10, 200, 255])
        }
    });
    let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Gif);
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Gif);

    let rgb = decode_rgb(&bytes).unwrap();
    assert_eq!(rgb.dimensions(), (6, 4));
    let t = decode(&bytes).unwrap();
    assert_eq!(t.shape(), [3, 4, 6]);
    // Left half red-dominant, right half blue-dominant after the palette lookup.
    let left = rgb.get_pixel(0, 0);
    let right = rgb.get_pixel(5, 3);
    assert!(left[0] > left[2]);
    assert!(right[2] > right[0]);
}

#[test]
fn jpeg_keeps_spatial_dimensions() {
    let rgb = image::RgbImage::from_pixel(33, 17, image::Rgb([10, 200, 30]));
    let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg);
    let decoded = decode_rgb(&bytes).unwrap();
    assert_eq!(decoded.dimensions(), (33, 17));
}

#[test]
fn garbage_and_empty_bytes_are_rejected() {
    assert!(decode(&[]).is_err());
    assert!(decode(b"definitely not an image").is_err());
    // Valid PNG magic followed by junk.
    let mut truncated = encode(
        DynamicImage::ImageRgb8(image::RgbImage::new(4, 4)),
        ImageFormat::Png,
    );
    truncated.truncate(20);
    let err = decode(&truncated).unwrap_err();
    assert!(err.to_string().starts_with("invalid image"));
}
