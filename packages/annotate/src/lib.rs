#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounding-box annotation and storage compression for detection frames.
//!
//! Frames that go to object storage get lime boxes with a confidence label
//! per detection, then a downscale-and-recompress pass to keep stored
//! images small. Label text needs a system font; when none is found the
//! boxes are drawn without labels rather than failing the scan.

use std::sync::OnceLock;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use waymo_counter_scan_models::Detection;

/// Bounding-box and label-background color (lime).
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
/// Box outline thickness in pixels.
const BOX_WIDTH: u32 = 3;
const FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 4;

/// Stored frames are downscaled to at most this wide.
const MAX_STORAGE_WIDTH: u32 = 800;
const JPEG_QUALITY: u8 = 75;

/// Candidate label fonts, tried in order at first use.
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
];

/// Annotation failed in a way that should be logged and skipped, never
/// propagated into the scan result.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    /// Encoding the compressed frame failed.
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Renders detections onto `frame` and compresses the result for storage.
///
/// # Errors
///
/// Returns [`AnnotateError`] when the annotated frame cannot be encoded.
pub fn annotate_jpeg(
    frame: &DynamicImage,
    detections: &[Detection],
) -> Result<Vec<u8>, AnnotateError> {
    let annotated = draw_detections(frame, detections);
    compress_for_storage(&annotated)
}

/// Draws a box and confidence label for each detection on a copy of
/// `frame`.
///
/// Boxes are clamped to the frame. The label sits above its box, or below
/// it when the box touches the top edge. Without a usable system font the
/// labels are skipped.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn draw_detections(frame: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = frame.to_rgb8();
    let (width, height) = (canvas.width(), canvas.height());
    let font = label_font();

    for detection in detections {
        let [bx1, by1, bx2, by2] = detection.bbox;
        let x1 = bx1.clamp(0.0, (width.saturating_sub(1)) as f32) as i32;
        let y1 = by1.clamp(0.0, (height.saturating_sub(1)) as f32) as i32;
        let x2 = bx2.clamp(0.0, (width.saturating_sub(1)) as f32) as i32;
        let y2 = by2.clamp(0.0, (height.saturating_sub(1)) as f32) as i32;

        let box_w = (x2 - x1).max(0) as u32;
        let box_h = (y2 - y1).max(0) as u32;
        if box_w == 0 || box_h == 0 {
            continue;
        }

        // Thickness by drawing nested 1px rectangles inward.
        for inset in 0..BOX_WIDTH {
            let w = box_w.saturating_sub(2 * inset);
            let h = box_h.saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(x1 + inset as i32, y1 + inset as i32).of_size(w, h),
                BOX_COLOR,
            );
        }

        if let Some(font) = font {
            draw_label(&mut canvas, font, detection.confidence, x1, y1, y2);
        }
    }

    canvas
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn draw_label(canvas: &mut RgbImage, font: &FontArc, confidence: f32, x1: i32, y1: i32, y2: i32) {
    let scale = PxScale::from(FONT_SIZE);
    let text = format!("{:.0}%", confidence * 100.0);
    let (text_w, text_h) = text_size(scale, font, &text);
    let (text_w, text_h) = (text_w as i32, text_h as i32);

    let label_x = x1;
    let mut label_y = y1 - text_h - 2 * LABEL_PADDING;
    if label_y < 0 {
        label_y = y2 + LABEL_PADDING;
    }

    let bg_w = (text_w + 2 * LABEL_PADDING).max(1) as u32;
    let bg_h = (text_h + 2 * LABEL_PADDING).max(1) as u32;
    draw_filled_rect_mut(
        canvas,
        Rect::at(label_x, label_y).of_size(bg_w, bg_h),
        BOX_COLOR,
    );
    draw_text_mut(
        canvas,
        LABEL_TEXT_COLOR,
        label_x + LABEL_PADDING,
        label_y + LABEL_PADDING,
        scale,
        font,
        &text,
    );
}

/// Downscales to at most [`MAX_STORAGE_WIDTH`] wide (aspect preserved,
/// Lanczos) and encodes as JPEG quality [`JPEG_QUALITY`].
///
/// # Errors
///
/// Returns [`AnnotateError`] when encoding fails.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compress_for_storage(image: &RgbImage) -> Result<Vec<u8>, AnnotateError> {
    let resized;
    let to_encode = if image.width() > MAX_STORAGE_WIDTH {
        let ratio = f64::from(MAX_STORAGE_WIDTH) / f64::from(image.width());
        let new_height = ((f64::from(image.height()) * ratio) as u32).max(1);
        resized = image::imageops::resize(
            image,
            MAX_STORAGE_WIDTH,
            new_height,
            image::imageops::FilterType::Lanczos3,
        );
        &resized
    } else {
        image
    };

    let mut bytes = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder.encode_image(to_encode)?;
    Ok(bytes)
}

fn label_font() -> Option<&'static FontArc> {
    static FONT: OnceLock<Option<FontArc>> = OnceLock::new();
    FONT.get_or_init(|| {
        for path in FONT_PATHS {
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(font) = FontArc::try_from_vec(bytes) {
                    log::debug!("Using label font {path}");
                    return Some(font);
                }
            }
        }
        log::warn!("No label font found; drawing boxes without confidence labels");
        None
    })
    .as_ref()
}
