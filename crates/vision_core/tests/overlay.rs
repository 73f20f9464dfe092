use image::{Rgb, RgbImage};
use vision_core::interfaces::{Detection, Proposal};
use vision_core::overlay::{clamp_box, draw_rect, normalize_box, AnnotationRenderer, OutputFormat};
use vision_core::preprocess::decode_rgb;

fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]))
}

fn detection(bbox: [f32; 4], score: f32) -> Detection {
    Detection {
        proposal: Proposal::new(bbox, 1, score),
        label: "gun".into(),
    }
}

#[test]
fn normalize_and_draw_box() {
    let bbox = normalize_box([0.1, 0.2, 0.3, 0.4], (100, 200)).expect("bbox");
    assert_eq!(bbox, [10, 40, 30, 80]);

    let mut img = RgbImage::new(40, 40);
    draw_rect(&mut img, [5, 5, 10, 10], Rgb([255, 0, 0]), 2);
    // Expect the four corners to be colored.
    assert_eq!(img.get_pixel(5, 5), &Rgb([255, 0, 0]));
    assert_eq!(img.get_pixel(10, 5), &Rgb([255, 0, 0]));
    assert_eq!(img.get_pixel(5, 10), &Rgb([255, 0, 0]));
    assert_eq!(img.get_pixel(10, 10), &Rgb([255, 0, 0]));
    assert_eq!(img.get_pixel(8, 8), &Rgb([0, 0, 0]));
}

#[test]
fn boxes_are_clamped_to_bounds() {
    assert_eq!(clamp_box([-5.0, -3.0, 500.0, 12.0], (20, 10)), Some([0, 0, 19, 9]));
    assert_eq!(clamp_box([1.0, 1.0, 2.0, f32::NAN], (20, 10)), None);
    assert_eq!(clamp_box([1.0, 1.0, 2.0, 2.0], (0, 10)), None);
    // Entirely off-image boxes are dropped rather than pinned to a corner.
    assert_eq!(clamp_box([100.0, 100.0, 200.0, 200.0], (50, 50)), None);
    assert_eq!(clamp_box([-30.0, 5.0, -1.0, 8.0], (50, 50)), None);
    assert_eq!(clamp_box([40.0, 40.0, 200.0, 200.0], (50, 50)), Some([40, 40, 49, 49]));
}

#[test]
fn zero_detections_leave_pixels_untouched() {
    let src = gradient(31, 23);
    let out = AnnotationRenderer::boxes_only().render(&src, &[]);
    assert_eq!(out.image(), &src);
    assert_eq!(out.detection_count(), 0);
}

#[test]
fn off_image_detection_paints_nothing() {
    let src = gradient(50, 50);
    let out = AnnotationRenderer::boxes_only()
        .render(&src, &[detection([100.0, 100.0, 200.0, 200.0], 0.9)]);
    assert_eq!(out.image(), &src);
    assert_eq!(out.detection_count(), 1);
}

#[test]
fn missing_font_still_draws_boxes() {
    let renderer = AnnotationRenderer::from_font_path(Some(std::path::Path::new(
        "/nonexistent/font.ttf",
    )));
    assert!(!renderer.has_text_renderer());
    let src = RgbImage::new(50, 50);
    let out = renderer.render(&src, &[detection([10.0, 0.0, 40.0, 30.0], 0.8)]);
    assert_eq!(out.image().get_pixel(10, 0), &Rgb([255, 0, 0]));
    assert_eq!(out.image().get_pixel(40, 30), &Rgb([255, 0, 0]));
}

#[test]
fn invalid_font_file_disables_labels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(!AnnotationRenderer::from_font_path(Some(&path)).has_text_renderer());
}

#[test]
fn encoded_output_round_trips_dimensions() {
    let src = gradient(64, 48);
    let out = AnnotationRenderer::default().render(
        &src,
        &[detection([4.0, 4.0, 60.0, 44.0], 0.91), detection([-10.0, -10.0, 5.0, 5.0], 0.5)],
    );
    for format in [OutputFormat::Png, OutputFormat::Jpeg] {
        let bytes = out.encode(format).unwrap();
        let back = decode_rgb(&bytes).unwrap();
        assert_eq!(back.dimensions(), (64, 48));
    }
    let uri = out.to_data_uri(OutputFormat::Png).unwrap();
    assert!(uri.starts_with("data:image/png;base64,"));
}
