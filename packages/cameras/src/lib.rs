#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Austin traffic camera feed client.
//!
//! Fetches the live camera inventory from the city's Socrata Open Data API
//! and serves per-camera snapshot JPEGs from the CCTV image endpoint.
//! Dataset: <https://data.austintexas.gov/resource/b4k4-adkb>

pub mod parsing;

use std::time::Duration;

use async_trait::async_trait;
use waymo_counter_cameras_models::Camera;
use waymo_counter_scan::{FetchError, ImageSource};

/// Socrata API endpoint for the Austin traffic camera inventory.
const CAMERA_API_URL: &str = "https://data.austintexas.gov/resource/b4k4-adkb.json";

/// Base URL for live snapshot JPEGs, one image per camera id.
const SNAPSHOT_BASE_URL: &str = "https://cctv.austinmobility.io/image";

/// Upper bound on feed records per request. Austin operates on the order of
/// a thousand cameras, so a single page covers the whole inventory.
const FETCH_LIMIT: u64 = 5_000;

/// Per-request timeout for feed and snapshot requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the camera inventory feed.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for the camera inventory feed and the snapshot endpoint.
pub struct CameraApi {
    client: reqwest::Client,
}

impl CameraApi {
    /// Creates a client against the production Austin endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, CameraError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Fetches every camera currently turned on, skipping malformed records.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError`] if the request fails or the feed responds
    /// with a non-success status.
    pub async fn fetch_cameras(&self) -> Result<Vec<Camera>, CameraError> {
        let url = format!("{CAMERA_API_URL}?$limit={FETCH_LIMIT}&$where=camera_status='TURNED_ON'");

        log::info!("Fetching camera inventory: {url}");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let records: Vec<serde_json::Value> = response.json().await?;

        let cameras: Vec<Camera> = records.iter().filter_map(parsing::parse_camera).collect();
        let skipped = records.len() - cameras.len();
        if skipped > 0 {
            log::warn!("Skipped {skipped} feed records without a camera id");
        }
        log::info!("Camera feed returned {} active cameras", cameras.len());

        Ok(cameras)
    }
}

fn to_fetch_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Request(e.to_string())
    }
}

#[async_trait]
impl ImageSource for CameraApi {
    async fn fetch_image(&self, camera_id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{SNAPSHOT_BASE_URL}/{camera_id}.jpg");

        let response = self.client.get(&url).send().await.map_err(to_fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(to_fetch_error)?;
        Ok(bytes.to_vec())
    }
}
