#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Supabase persistence over the `PostgREST` API.
//!
//! Records scan rows, per-camera detection rows, and camera metadata, and
//! uploads annotated detection images to Supabase Storage. Everything talks
//! plain HTTP with the service key, no client SDK involved.

pub mod storage;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use waymo_counter_cameras_models::Camera;
use waymo_counter_scan::{PersistenceError, PersistenceGateway};
use waymo_counter_scan_models::{CameraScanResult, ScanSummary};

/// Rows per bulk insert or upsert request.
const BATCH_SIZE: usize = 500;

/// Per-request timeout for store calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one Supabase project, addressed by base URL and service key.
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl SupabaseClient {
    /// Creates a client for the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, key: &str) -> Result<Self, PersistenceError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| PersistenceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    /// POSTs rows to a `PostgREST` table and returns the raw response.
    async fn post_rows(
        &self,
        table: &str,
        query: &[(&str, &str)],
        prefer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, PersistenceError> {
        let url = format!("{}/rest/v1/{table}", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .query(query)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .json(body);
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PersistenceError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PersistenceError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn camera_row(camera: &Camera, stamped_at: &DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "camera_id": camera.camera_id,
        "location_name": camera.location_name,
        "longitude": camera.longitude,
        "latitude": camera.latitude,
        "council_district": camera.council_district,
        "last_scanned": stamped_at.to_rfc3339(),
        "updated_at": stamped_at.to_rfc3339(),
    })
}

fn scan_row(summary: &ScanSummary) -> serde_json::Value {
    serde_json::json!({
        "timestamp": summary.timestamp.to_rfc3339(),
        "total_cameras": summary.total_cameras,
        "cameras_scanned": summary.cameras_scanned,
        "cameras_failed": summary.cameras_failed,
        "total_waymo_count": summary.total_waymo_count,
        "cameras_with_waymos": summary.cameras_with_waymos,
        "duration_seconds": round2(summary.duration_seconds),
    })
}

/// Builds one row per successful result. Failures have nothing to record
/// here; they are accounted on the scan row.
fn detection_rows(
    scan_id: &str,
    results: &[CameraScanResult],
    stamped_at: &DateTime<Utc>,
) -> Vec<serde_json::Value> {
    results
        .iter()
        .filter(|result| result.is_success())
        .map(|result| {
            let detections_json: Vec<serde_json::Value> = result
                .detections
                .iter()
                .map(|d| serde_json::json!({"confidence": d.confidence, "bbox": d.bbox}))
                .collect();

            serde_json::json!({
                "scan_id": scan_id,
                "camera_id": result.camera_id,
                "timestamp": stamped_at.to_rfc3339(),
                "waymo_count": result.waymo_count,
                "avg_confidence": result.avg_confidence.map(round4),
                "detections_json": detections_json,
            })
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f32) -> f64 {
    (f64::from(value) * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl PersistenceGateway for SupabaseClient {
    async fn upsert_cameras(&self, cameras: &[Camera]) -> Result<(), PersistenceError> {
        if cameras.is_empty() {
            return Ok(());
        }

        let stamped_at = Utc::now();
        for batch in cameras.chunks(BATCH_SIZE) {
            let rows: Vec<serde_json::Value> = batch
                .iter()
                .map(|camera| camera_row(camera, &stamped_at))
                .collect();
            self.post_rows(
                "cameras",
                &[("on_conflict", "camera_id")],
                Some("resolution=merge-duplicates"),
                &serde_json::Value::Array(rows),
            )
            .await?;
        }
        log::info!("Upserted {} camera rows", cameras.len());

        Ok(())
    }

    async fn insert_scan(&self, summary: &ScanSummary) -> Result<String, PersistenceError> {
        let response = self
            .post_rows(
                "scans",
                &[],
                Some("return=representation"),
                &scan_row(summary),
            )
            .await?;

        let rows: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PersistenceError::Response(e.to_string()))?;
        let scan_id = rows
            .get(0)
            .and_then(|row| row.get("id"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                PersistenceError::Response(format!("scan insert returned no id: {rows}"))
            })?
            .to_string();
        log::info!("Created scan row {scan_id}");

        Ok(scan_id)
    }

    async fn insert_detections(
        &self,
        scan_id: &str,
        results: &[CameraScanResult],
    ) -> Result<(), PersistenceError> {
        let rows = detection_rows(scan_id, results, &Utc::now());
        if rows.is_empty() {
            return Ok(());
        }

        let total = rows.len();
        for batch in rows.chunks(BATCH_SIZE) {
            self.post_rows(
                "detections",
                &[],
                None,
                &serde_json::Value::Array(batch.to_vec()),
            )
            .await?;
        }
        log::info!("Recorded {total} detection rows for scan {scan_id}");

        Ok(())
    }
}
