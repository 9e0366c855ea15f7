//! YOLO tensor plumbing: letterbox preprocessing, prediction decoding, and
//! non-maximum suppression.
//!
//! The model takes a `[1, 3, S, S]` RGB tensor and emits a
//! `[1, 4 + classes, anchors]` tensor of center-size boxes with per-class
//! scores. Everything here is pure so it can be exercised without a session.

use image::{DynamicImage, GenericImageView as _};
use ndarray::{Array, ArrayD, Axis, Ix3, IxDyn, s};
use regex::Regex;
use waymo_counter_scan::InferenceError;
use waymo_counter_scan_models::Detection;

/// Gray letterbox padding value, matching the value the model was trained
/// with.
const PAD_FILL: f32 = 144.0 / 255.0;

/// Raw score floor applied while decoding. Anything this weak is noise and
/// would only bloat the candidate list ahead of suppression; the caller
/// applies the real configured threshold.
pub const MIN_RAW_CONFIDENCE: f32 = 0.05;

/// Scale factor that fits a `width` x `height` image inside a square of
/// `target` pixels without distortion.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn letterbox_ratio(width: u32, height: u32, target: u32) -> f32 {
    (target as f32 / width as f32).min(target as f32 / height as f32)
}

/// Converts a frame to a `[1, 3, target, target]` normalized tensor.
///
/// The frame is scaled to fit, anchored at the top-left corner, and the
/// remainder is filled with gray. Returns the tensor and the scale ratio
/// needed to map boxes back to frame coordinates.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn image_to_tensor(frame: &DynamicImage, target: u32) -> (ArrayD<f32>, f32) {
    let (width, height) = frame.dimensions();
    let ratio = letterbox_ratio(width, height, target);
    let scaled_w = ((width as f32 * ratio).round() as u32).max(1);
    let scaled_h = ((height as f32 * ratio).round() as u32).max(1);
    let resized = frame.resize_exact(scaled_w, scaled_h, image::imageops::FilterType::Triangle);

    let mut tensor =
        Array::from_elem(IxDyn(&[1, 3, target as usize, target as usize]), PAD_FILL);
    for (x, y, pixel) in resized.pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b, _] = pixel.0;
        tensor[[0, 0, y, x]] = f32::from(r) / 255.0;
        tensor[[0, 1, y, x]] = f32::from(g) / 255.0;
        tensor[[0, 2, y, x]] = f32::from(b) / 255.0;
    }

    (tensor, ratio)
}

/// Decodes a raw `[1, 4 + classes, anchors]` output tensor into detections
/// in original-frame coordinates.
///
/// Boxes are clamped to the frame. Candidates below [`MIN_RAW_CONFIDENCE`]
/// are dropped; suppression and the configured threshold come later.
///
/// # Errors
///
/// Returns [`InferenceError::Output`] when the tensor shape is not what the
/// model contract promises.
#[allow(clippy::cast_precision_loss)]
pub fn decode_predictions(
    output: &ArrayD<f32>,
    names: &[String],
    ratio: f32,
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<Detection>, InferenceError> {
    let preds = output.view().into_dimensionality::<Ix3>().map_err(|e| {
        InferenceError::Output(format!("expected [1, channels, anchors] tensor: {e}"))
    })?;
    let shape = preds.shape();
    if shape[0] != 1 || shape[1] < 5 {
        return Err(InferenceError::Output(format!(
            "unusable output shape {shape:?}"
        )));
    }

    let max_x = frame_width as f32;
    let max_y = frame_height as f32;
    let grid = preds.index_axis(Axis(0), 0);

    let mut detections = Vec::new();
    for anchor in grid.axis_iter(Axis(1)) {
        let scores = anchor.slice(s![4..]);
        let (class_id, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (id, score)| {
                if score > best.1 { (id, score) } else { best }
            });
        if confidence < MIN_RAW_CONFIDENCE {
            continue;
        }

        let cx = anchor[0] / ratio;
        let cy = anchor[1] / ratio;
        let w = anchor[2] / ratio;
        let h = anchor[3] / ratio;

        detections.push(Detection {
            class_label: class_name(names, class_id),
            confidence,
            bbox: [
                (cx - w / 2.0).clamp(0.0, max_x),
                (cy - h / 2.0).clamp(0.0, max_y),
                (cx + w / 2.0).clamp(0.0, max_x),
                (cy + h / 2.0).clamp(0.0, max_y),
            ],
        });
    }

    Ok(detections)
}

fn class_name(names: &[String], class_id: usize) -> String {
    names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| class_id.to_string())
}

/// Drops detections that overlap a stronger detection by more than
/// `iou_threshold`. The survivors stay sorted by descending confidence.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let mut drop = false;
        for prev in 0..kept {
            if iou(&detections[prev].bbox, &detections[index].bbox) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let left = a[0].max(b[0]);
    let top = a[1].max(b[1]);
    let right = a[2].min(b[2]);
    let bottom = a[3].min(b[3]);
    let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Parses the class name map baked into the model metadata, formatted like
/// `{0: 'waymo'}`. Returns an empty list when nothing parses.
#[must_use]
pub fn parse_class_names(raw: &str) -> Vec<String> {
    let re = Regex::new(r"(\d+)\s*:\s*'([^']*)'").unwrap_or_else(|_| unreachable!());

    let pairs: Vec<(usize, String)> = re
        .captures_iter(raw)
        .filter_map(|caps| {
            let id = caps.get(1)?.as_str().parse().ok()?;
            Some((id, caps.get(2)?.as_str().to_string()))
        })
        .collect();
    let Some(max_id) = pairs.iter().map(|(id, _)| *id).max() else {
        return Vec::new();
    };

    let mut names = vec![String::new(); max_id + 1];
    for (id, name) in pairs {
        names[id] = name;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["waymo".to_string()]
    }

    #[test]
    fn letterbox_ratio_fits_landscape() {
        let ratio = letterbox_ratio(1920, 1080, 640);
        assert!((ratio - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn letterbox_ratio_fits_portrait() {
        let ratio = letterbox_ratio(480, 960, 640);
        assert!((ratio - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn tensor_scales_into_top_left_and_pads_the_rest() {
        let mut white = image::RgbImage::new(4, 2);
        for pixel in white.pixels_mut() {
            *pixel = image::Rgb([255, 255, 255]);
        }
        let (tensor, ratio) = image_to_tensor(&DynamicImage::ImageRgb8(white), 8);

        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert!((ratio - 2.0).abs() < f32::EPSILON);
        // Scaled content occupies the top 8x4 region.
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 3, 7]] - 1.0).abs() < 1e-6);
        // Below it is letterbox padding.
        assert!((tensor[[0, 0, 4, 0]] - PAD_FILL).abs() < 1e-6);
        assert!((tensor[[0, 1, 7, 7]] - PAD_FILL).abs() < 1e-6);
    }

    #[test]
    fn decode_maps_boxes_back_to_frame_coordinates() {
        // One confident anchor and one below the raw floor.
        let mut output = Array::from_elem(IxDyn(&[1, 5, 2]), 0.0_f32);
        output[[0, 0, 0]] = 320.0;
        output[[0, 1, 0]] = 320.0;
        output[[0, 2, 0]] = 64.0;
        output[[0, 3, 0]] = 64.0;
        output[[0, 4, 0]] = 0.9;
        output[[0, 4, 1]] = 0.01;

        let detections = decode_predictions(&output, &names(), 0.5, 1280, 1280).unwrap();

        assert_eq!(detections.len(), 1);
        let detection = &detections[0];
        assert_eq!(detection.class_label, "waymo");
        assert!((detection.confidence - 0.9).abs() < 1e-6);
        assert_eq!(detection.bbox, [576.0, 576.0, 704.0, 704.0]);
    }

    #[test]
    fn decode_clamps_boxes_to_the_frame() {
        let mut output = Array::from_elem(IxDyn(&[1, 5, 1]), 0.0_f32);
        output[[0, 0, 0]] = 10.0;
        output[[0, 1, 0]] = 10.0;
        output[[0, 2, 0]] = 100.0;
        output[[0, 3, 0]] = 100.0;
        output[[0, 4, 0]] = 0.8;

        let detections = decode_predictions(&output, &names(), 1.0, 200, 200).unwrap();

        assert_eq!(detections[0].bbox, [0.0, 0.0, 60.0, 60.0]);
    }

    #[test]
    fn decode_rejects_unexpected_shapes() {
        let flat = Array::from_elem(IxDyn(&[1, 5]), 0.0_f32);
        assert!(decode_predictions(&flat, &names(), 1.0, 100, 100).is_err());

        let thin = Array::from_elem(IxDyn(&[1, 3, 10]), 0.0_f32);
        assert!(decode_predictions(&thin, &names(), 1.0, 100, 100).is_err());
    }

    #[test]
    fn unknown_class_ids_fall_back_to_numbers() {
        let mut output = Array::from_elem(IxDyn(&[1, 7, 1]), 0.0_f32);
        output[[0, 2, 0]] = 10.0;
        output[[0, 3, 0]] = 10.0;
        output[[0, 6, 0]] = 0.7;

        let detections = decode_predictions(&output, &names(), 1.0, 100, 100).unwrap();

        assert_eq!(detections[0].class_label, "2");
    }

    fn detection(confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            class_label: "waymo".to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn suppression_drops_weaker_overlaps() {
        let mut detections = vec![
            detection(0.8, [12.0, 12.0, 52.0, 52.0]),
            detection(0.9, [10.0, 10.0, 50.0, 50.0]),
            detection(0.7, [300.0, 300.0, 340.0, 340.0]),
        ];

        non_max_suppression(&mut detections, 0.45);

        assert_eq!(detections.len(), 2);
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
        assert!((detections[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn suppression_keeps_disjoint_boxes() {
        let mut detections = vec![
            detection(0.6, [0.0, 0.0, 20.0, 20.0]),
            detection(0.5, [100.0, 100.0, 120.0, 120.0]),
        ];

        non_max_suppression(&mut detections, 0.45);

        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn parses_single_class_metadata() {
        assert_eq!(parse_class_names("{0: 'waymo'}"), vec!["waymo"]);
    }

    #[test]
    fn parses_multi_class_metadata_with_gaps() {
        let names = parse_class_names("{0: 'car', 2: 'waymo'}");
        assert_eq!(names, vec!["car", "", "waymo"]);
    }

    #[test]
    fn unparseable_metadata_yields_empty() {
        assert!(parse_class_names("not a map").is_empty());
    }
}
