//! Detection worker: one camera in, one [`CameraScanResult`] out.
//!
//! The worker is a total function over its collaborators' behavior. Fetch
//! errors, undecodable payloads, and inference failures all come back as
//! `Failure` results; nothing escapes to the orchestrator.

use std::time::Instant;

use waymo_counter_cameras_models::Camera;
use waymo_counter_scan_models::{CameraScanResult, Detection};

use crate::{FetchError, ImageSource, InferenceEngine, ScanConfig};

/// Fetches `camera`'s current frame, runs inference, and filters the output
/// to target-class detections at or above the configured threshold.
///
/// Never returns an error: every fetch/decode/inference outcome maps to a
/// success or failure [`CameraScanResult`].
pub async fn scan_camera(
    camera: &Camera,
    config: &ScanConfig,
    source: &dyn ImageSource,
    engine: &dyn InferenceEngine,
) -> CameraScanResult {
    let start = Instant::now();

    let bytes = match source.fetch_image(&camera.camera_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return CameraScanResult::failure(
                camera.camera_id.clone(),
                e.to_string(),
                start.elapsed(),
            );
        }
    };

    let frame = match image::load_from_memory(&bytes) {
        Ok(frame) => frame,
        Err(e) => {
            return CameraScanResult::failure(
                camera.camera_id.clone(),
                FetchError::InvalidImage(e.to_string()).to_string(),
                start.elapsed(),
            );
        }
    };

    let raw = match engine.detect(&frame).await {
        Ok(detections) => detections,
        Err(e) => {
            return CameraScanResult::failure(
                camera.camera_id.clone(),
                e.to_string(),
                start.elapsed(),
            );
        }
    };

    let raw_count = raw.len();
    let kept: Vec<Detection> = raw
        .into_iter()
        .filter(|d| {
            d.class_label == config.target_class && d.confidence >= config.confidence_threshold
        })
        .collect();
    log::debug!(
        "camera {}: kept {}/{raw_count} detections at threshold {}",
        camera.camera_id,
        kept.len(),
        config.confidence_threshold
    );

    let mut result = CameraScanResult::success(camera.camera_id.clone(), kept, start.elapsed());

    if config.annotate_images && result.waymo_count > 0 {
        match waymo_counter_annotate::annotate_jpeg(&frame, &result.detections) {
            Ok(jpeg) => result.annotated_jpeg = Some(jpeg),
            Err(e) => {
                log::warn!("camera {}: annotation failed: {e}", camera.camera_id);
            }
        }
    }

    result
}
