//! Detection image uploads to Supabase Storage.
//!
//! Annotated frames land in a public bucket, organized by camera and day so
//! a browser can pull them straight off the CDN.

use chrono::{DateTime, Utc};
use waymo_counter_scan::PersistenceError;

use crate::SupabaseClient;

/// Public bucket holding annotated detection frames.
const BUCKET: &str = "detection-images";

/// Cache lifetime for uploaded frames. They are immutable once written.
const CACHE_CONTROL: &str = "public, max-age=31536000";

/// Object path for a camera's frame: `detections/{camera}/{day}/{time}.jpg`.
#[must_use]
pub fn object_path(camera_id: &str, taken_at: &DateTime<Utc>) -> String {
    format!(
        "detections/{camera_id}/{}/{}.jpg",
        taken_at.format("%Y-%m-%d"),
        taken_at.format("%H%M%S")
    )
}

impl SupabaseClient {
    /// Uploads an annotated JPEG and returns its public URL.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the upload request fails or the
    /// storage API answers with a non-success status.
    pub async fn upload_detection_image(
        &self,
        camera_id: &str,
        jpeg: Vec<u8>,
    ) -> Result<String, PersistenceError> {
        let path = object_path(camera_id, &Utc::now());
        let url = format!("{}/storage/v1/object/{BUCKET}/{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Content-Type", "image/jpeg")
            .header("Cache-Control", CACHE_CONTROL)
            .body(jpeg)
            .send()
            .await
            .map_err(|e| PersistenceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let public_url = format!(
            "{}/storage/v1/object/public/{BUCKET}/{path}",
            self.base_url
        );
        log::debug!("Uploaded detection image to {public_url}");

        Ok(public_url)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn object_paths_are_grouped_by_camera_and_day() {
        let taken_at = Utc.with_ymd_and_hms(2026, 8, 25, 14, 30, 5).unwrap();
        assert_eq!(
            object_path("CAM42", &taken_at),
            "detections/CAM42/2026-08-25/143005.jpg"
        );
    }

    #[test]
    fn object_paths_zero_pad_times() {
        let taken_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            object_path("7", &taken_at),
            "detections/7/2026-01-02/030405.jpg"
        );
    }
}
