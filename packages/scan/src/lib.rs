#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scan cycle core.
//!
//! [`run_scan`] drives one complete cycle: filter the camera list to the
//! service area, fan each camera out to a detection worker through a bounded
//! pool, and reduce the per-camera outcomes into one [`ScanSummary`]. The
//! collaborators a cycle needs (snapshot fetching, inference, persistence)
//! are traits here, implemented by the `cameras`, `detector`, and `database`
//! crates.
//!
//! Camera-level failures are data, not control flow: a worker always returns
//! a [`CameraScanResult`], and a scan with failed cameras is still a
//! completed scan. Only persistence failures surface as errors.

pub mod aggregate;
pub mod persist;
pub mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::DynamicImage;
use waymo_counter_cameras_models::Camera;
use waymo_counter_scan_models::{CameraScanResult, Detection, ScanSummary};
use waymo_counter_service_area::ServiceArea;

/// Minimum confidence counted toward a camera's total.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
/// Simultaneously in-flight detection workers.
pub const DEFAULT_MAX_WORKERS: usize = 3;
/// Per-camera budget for fetch, decode, and inference combined.
pub const DEFAULT_CAMERA_TIMEOUT: Duration = Duration::from_secs(30);
/// Class label the scan counts.
pub const DEFAULT_TARGET_CLASS: &str = "waymo";

/// Why a camera's frame could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed (connect, TLS, mid-body, client timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The snapshot endpoint answered with a non-success status.
    #[error("snapshot returned status {0}")]
    Status(u16),

    /// The per-camera budget ran out before a result was produced.
    #[error("timeout")]
    Timeout,

    /// The payload was not a decodable raster image.
    #[error("undecodable image payload: {0}")]
    InvalidImage(String),
}

/// The inference engine failed for one frame.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The model run itself failed.
    #[error("model execution failed: {0}")]
    Execution(String),

    /// The model ran but its output was not in the expected shape.
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// The store rejected or failed a write after the scan completed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The HTTP request to the store failed.
    #[error("store request failed: {0}")]
    Request(String),

    /// The store answered with a non-success status.
    #[error("store returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for the error report.
        body: String,
    },

    /// The store's response could not be interpreted.
    #[error("unexpected store response: {0}")]
    Response(String),
}

/// Supplies each camera's current frame.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetches the camera's current frame as encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the snapshot cannot be retrieved.
    async fn fetch_image(&self, camera_id: &str) -> Result<Vec<u8>, FetchError>;
}

/// Runs object detection on one frame.
///
/// Implementations must be safe to invoke from multiple workers at once.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Detects objects in the frame, returning normalized detections with
    /// boxes in the frame's own pixel coordinates. Confidence-threshold and
    /// target-class filtering happen in the worker, not here.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError`] when the model fails for this frame.
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, InferenceError>;
}

/// Durably records a completed scan cycle.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Inserts or updates camera metadata by `camera_id`, stamping
    /// `last_scanned` for every camera in the batch. An empty batch is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    async fn upsert_cameras(&self, cameras: &[Camera]) -> Result<(), PersistenceError>;

    /// Inserts the immutable scan row and returns its generated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    async fn insert_scan(&self, summary: &ScanSummary) -> Result<String, PersistenceError>;

    /// Bulk-records one detection row per *successful* result, keyed to
    /// `scan_id`. Failed results carry no detection data and are accounted
    /// on the scan row instead. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the write fails.
    async fn insert_detections(
        &self,
        scan_id: &str,
        results: &[CameraScanResult],
    ) -> Result<(), PersistenceError>;
}

/// Tunables for one scan cycle, built once at startup.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Minimum confidence for a detection to be counted.
    pub confidence_threshold: f32,
    /// Maximum simultaneously in-flight workers.
    pub max_workers: usize,
    /// Per-camera budget covering fetch, decode, and inference.
    pub camera_timeout: Duration,
    /// Class label to count.
    pub target_class: String,
    /// Render and attach annotated frames for results with detections.
    pub annotate_images: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_workers: DEFAULT_MAX_WORKERS,
            camera_timeout: DEFAULT_CAMERA_TIMEOUT,
            target_class: DEFAULT_TARGET_CLASS.to_string(),
            annotate_images: false,
        }
    }
}

/// Runs one scan cycle over `cameras`.
///
/// Filters the list to the service area, dispatches one detection worker
/// per in-area camera with at most `config.max_workers` in flight, waits
/// for every unit to finish (success, failure, or timeout), and aggregates
/// the outcomes. Zero in-area cameras is a valid cycle with all-zero
/// statistics.
///
/// A unit that exceeds `config.camera_timeout` is recorded as a failure
/// with reason "timeout". A unit whose task panics is recorded as a
/// failure rather than aborting the cycle.
pub async fn run_scan(
    cameras: &[Camera],
    area: &ServiceArea,
    config: &ScanConfig,
    source: Arc<dyn ImageSource>,
    engine: Arc<dyn InferenceEngine>,
) -> (ScanSummary, Vec<CameraScanResult>) {
    use futures::stream::{self, StreamExt as _};

    let started_at = chrono::Utc::now();
    let start = Instant::now();

    let targets = area.filter_cameras(cameras);
    let total = targets.len();
    log::info!(
        "{total} of {} cameras are inside the service area",
        cameras.len()
    );

    let completed = Arc::new(AtomicUsize::new(0));

    let results: Vec<CameraScanResult> = stream::iter(targets.into_iter().map(|camera| {
        let source = Arc::clone(&source);
        let engine = Arc::clone(&engine);
        let config = config.clone();
        let completed = Arc::clone(&completed);

        async move {
            let camera_id = camera.camera_id.clone();

            // Each unit gets its own task so a panicking collaborator takes
            // down one camera, not the scan. The timeout lives inside the
            // task so a timed-out unit stops occupying a pool slot.
            let handle = tokio::spawn(async move {
                let unit_start = Instant::now();
                match tokio::time::timeout(
                    config.camera_timeout,
                    worker::scan_camera(&camera, &config, source.as_ref(), engine.as_ref()),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => CameraScanResult::failure(
                        camera.camera_id.clone(),
                        FetchError::Timeout.to_string(),
                        unit_start.elapsed(),
                    ),
                }
            });

            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => CameraScanResult::failure(
                    camera_id,
                    format!("worker crashed: {join_error}"),
                    Duration::ZERO,
                ),
            };

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            log_unit(done, total, &result);
            result
        }
    }))
    .buffer_unordered(config.max_workers.max(1))
    .collect()
    .await;

    let elapsed = start.elapsed();
    let summary = aggregate::aggregate(&results, started_at, elapsed);

    log::info!(
        "Scan complete: {}/{} cameras succeeded, {} waymo(s) across {} camera(s), took {:.1}s",
        summary.cameras_scanned - summary.cameras_failed,
        summary.cameras_scanned,
        summary.total_waymo_count,
        summary.cameras_with_waymos,
        elapsed.as_secs_f64()
    );

    (summary, results)
}

fn log_unit(done: usize, total: usize, result: &CameraScanResult) {
    if result.is_success() {
        if result.waymo_count > 0 {
            log::info!(
                "[{done}/{total}] camera {}: {} waymo(s), avg confidence {:.2}",
                result.camera_id,
                result.waymo_count,
                result.avg_confidence.unwrap_or(0.0)
            );
        } else {
            log::info!("[{done}/{total}] camera {}: no waymos", result.camera_id);
        }
    } else {
        log::warn!(
            "[{done}/{total}] camera {}: {}",
            result.camera_id,
            result.failure_reason.as_deref().unwrap_or("unknown failure")
        );
    }
}
