//! Drives the persistence gateway after a scan cycle completes.

use std::collections::HashSet;

use waymo_counter_cameras_models::Camera;
use waymo_counter_scan_models::{CameraScanResult, ScanSummary};

use crate::{PersistenceError, PersistenceGateway};

/// Records one completed cycle: camera metadata upserts first (every
/// attempted camera, failed attempts included, so `last_scanned` reflects
/// the attempt), then the immutable scan row, then the per-camera detection
/// rows keyed to the returned scan id.
///
/// `cameras` is the full fetched list; the attempted subset is derived from
/// the results.
///
/// # Errors
///
/// Returns [`PersistenceError`] from the first failing write. Results are
/// not consumed on failure, so the caller still holds them for reporting.
pub async fn persist_scan(
    gateway: &dyn PersistenceGateway,
    cameras: &[Camera],
    summary: &ScanSummary,
    results: &[CameraScanResult],
) -> Result<String, PersistenceError> {
    let attempted_ids: HashSet<&str> = results.iter().map(|r| r.camera_id.as_str()).collect();
    let attempted: Vec<Camera> = cameras
        .iter()
        .filter(|camera| attempted_ids.contains(camera.camera_id.as_str()))
        .cloned()
        .collect();

    gateway.upsert_cameras(&attempted).await?;
    let scan_id = gateway.insert_scan(summary).await?;
    gateway.insert_detections(&scan_id, results).await?;

    log::info!(
        "Persisted scan {scan_id}: {} camera(s) upserted, {} successful result(s)",
        attempted.len(),
        results.iter().filter(|r| r.is_success()).count()
    );

    Ok(scan_id)
}
