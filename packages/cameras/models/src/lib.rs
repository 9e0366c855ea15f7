#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Traffic camera record types shared across the scan pipeline.
//!
//! The [`Camera`] record is produced by the camera feed crate, filtered by
//! the service area crate, and upserted by the persistence gateway. Keeping
//! it in its own crate keeps those crates free of dependencies on each other.

use serde::{Deserialize, Serialize};

/// One public traffic camera, as reported by the city's camera feed.
///
/// Coordinates are optional. The feed contains cameras without a usable
/// location, and those are dropped before service-area filtering rather
/// than guessed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Stable identifier from the feed; primary key in the store and the
    /// path component of the camera's snapshot URL.
    pub camera_id: String,
    /// Human-readable intersection or street name.
    pub location_name: String,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// City council district, when the feed reports one.
    pub council_district: Option<i32>,
}

impl Camera {
    /// Returns `(longitude, latitude)` when both coordinates are present.
    #[must_use]
    pub const fn coordinate(&self) -> Option<(f64, f64)> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) => Some((lon, lat)),
            _ => None,
        }
    }
}
