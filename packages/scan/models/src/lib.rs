#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scan result and summary types produced by the detection pipeline.
//!
//! A scan cycle turns each attempted camera into a [`CameraScanResult`] and
//! the whole cycle into one [`ScanSummary`]. Detections inside a result are
//! already normalized to class label, confidence, and pixel box, regardless
//! of what the inference engine emitted internally.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bounding-box observation from the inference engine.
///
/// Box coordinates are `[x1, y1, x2, y2]` in pixels of the original camera
/// frame (not the model's letterboxed input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Model class label (e.g., "waymo").
    pub class_label: String,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` pixel coordinates.
    pub bbox: [f32; 4],
}

/// Whether a camera's scan attempt produced detections or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Failure,
}

/// Per-camera outcome of one scan cycle.
///
/// Every attempted camera yields exactly one of these. The detection worker
/// converts fetch and inference errors into `Failure` results instead of
/// propagating them, so a results list always accounts for every attempt.
#[derive(Debug, Clone)]
pub struct CameraScanResult {
    pub camera_id: String,
    pub status: ScanStatus,
    /// Count of target-class detections at or above the configured
    /// confidence threshold. Zero for failures.
    pub waymo_count: usize,
    /// Mean confidence of the counted detections. `None` when the count is
    /// zero (including all failures).
    pub avg_confidence: Option<f32>,
    /// The counted detections, kept for the per-scan audit record.
    pub detections: Vec<Detection>,
    /// Present iff `status` is [`ScanStatus::Failure`].
    pub failure_reason: Option<String>,
    /// Annotated frame (boxes + labels, storage-compressed JPEG), populated
    /// only when image upload is enabled and detections were found.
    pub annotated_jpeg: Option<Vec<u8>>,
    /// Wall-clock time the attempt took, timeouts included.
    pub elapsed: Duration,
}

impl CameraScanResult {
    /// Builds a success result, deriving `waymo_count` and `avg_confidence`
    /// from the surviving detections.
    #[must_use]
    pub fn success(camera_id: String, detections: Vec<Detection>, elapsed: Duration) -> Self {
        let waymo_count = detections.len();
        let avg_confidence = if detections.is_empty() {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            Some(detections.iter().map(|d| d.confidence).sum::<f32>() / detections.len() as f32)
        };

        Self {
            camera_id,
            status: ScanStatus::Success,
            waymo_count,
            avg_confidence,
            detections,
            failure_reason: None,
            annotated_jpeg: None,
            elapsed,
        }
    }

    /// Builds a failure result carrying the reason.
    #[must_use]
    pub fn failure(camera_id: String, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            camera_id,
            status: ScanStatus::Failure,
            waymo_count: 0,
            avg_confidence: None,
            detections: Vec::new(),
            failure_reason: Some(reason.into()),
            annotated_jpeg: None,
            elapsed,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ScanStatus::Success)
    }
}

/// Scan-level statistics for one cycle, persisted as one immutable row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// When the cycle started.
    pub timestamp: DateTime<Utc>,
    /// Cameras that passed the service-area filter.
    pub total_cameras: usize,
    /// Cameras attempted (success or failure).
    pub cameras_scanned: usize,
    pub cameras_failed: usize,
    /// Sum of `waymo_count` over successful results.
    pub total_waymo_count: usize,
    /// Successful results with at least one detection.
    pub cameras_with_waymos: usize,
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(confidence: f32) -> Detection {
        Detection {
            class_label: "waymo".to_string(),
            confidence,
            bbox: [0.0, 0.0, 10.0, 10.0],
        }
    }

    #[test]
    fn success_with_no_detections_has_null_confidence() {
        let result =
            CameraScanResult::success("CAM1".to_string(), vec![], Duration::from_secs(1));
        assert!(result.is_success());
        assert_eq!(result.waymo_count, 0);
        assert_eq!(result.avg_confidence, None);
    }

    #[test]
    fn success_averages_confidences() {
        let result = CameraScanResult::success(
            "CAM1".to_string(),
            vec![detection(0.5), detection(0.9)],
            Duration::from_secs(1),
        );
        assert_eq!(result.waymo_count, 2);
        let avg = result.avg_confidence.unwrap();
        assert!((avg - 0.7).abs() < 1e-6);
    }

    #[test]
    fn failure_carries_reason_and_zero_counts() {
        let result =
            CameraScanResult::failure("CAM2".to_string(), "timeout", Duration::from_secs(30));
        assert!(!result.is_success());
        assert_eq!(result.waymo_count, 0);
        assert_eq!(result.avg_confidence, None);
        assert_eq!(result.failure_reason.as_deref(), Some("timeout"));
        assert!(result.detections.is_empty());
    }
}
