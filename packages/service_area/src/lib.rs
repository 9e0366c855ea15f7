#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Service-area polygon loading and point-in-polygon camera filtering.
//!
//! The service area is loaded once at startup, either from a `GeoJSON` file
//! or from the built-in central Austin ring, and every camera is tested
//! against it before scanning. The containment test delegates to `geo`'s
//! [`Contains`], which classifies points exactly on an edge as outside,
//! uniformly for all edges.

use geo::{Contains, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;
use thiserror::Error;
use waymo_counter_cameras_models::Camera;

/// Rough hull of the central Austin operating zone, used when no
/// service-area file is configured. Counter-clockwise, implicitly closed.
const DEFAULT_RING: &[(f64, f64)] = &[
    (-97.8059, 30.2080),
    (-97.7106, 30.2035),
    (-97.6713, 30.2367),
    (-97.6689, 30.2945),
    (-97.7014, 30.3442),
    (-97.7656, 30.3501),
    (-97.8102, 30.3104),
    (-97.8212, 30.2551),
];

/// Error loading or validating the service-area polygon.
///
/// All variants are fatal at startup; a scan cannot proceed without a
/// valid service area.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A polygon ring has fewer than 3 distinct vertices.
    #[error("service area ring needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    /// The configured service-area file could not be read.
    #[error("failed to read service area file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid `GeoJSON`.
    #[error("invalid service area GeoJSON: {0}")]
    Geojson(#[from] geojson::Error),
    /// The `GeoJSON` parsed but contained no polygonal geometry.
    #[error("no Polygon or MultiPolygon geometry in service area GeoJSON")]
    NoPolygon,
}

/// The geographic zone cameras must fall inside to be scanned.
///
/// Immutable after construction; constructed once per process.
#[derive(Debug, Clone)]
pub struct ServiceArea {
    polygons: MultiPolygon<f64>,
}

impl ServiceArea {
    /// Builds a service area from an ordered ring of `(longitude, latitude)`
    /// vertices. The ring is treated as implicitly closed; the first and
    /// last vertex need not be identical.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::TooFewVertices`] when the ring has fewer
    /// than 3 distinct vertices.
    pub fn from_ring(ring: &[(f64, f64)]) -> Result<Self, GeometryError> {
        let exterior = LineString::from(ring.to_vec());
        let polygon = Polygon::new(exterior, vec![]);
        Self::from_multipolygon(MultiPolygon(vec![polygon]))
    }

    /// Parses a service area from a `GeoJSON` string. Accepts a bare
    /// `Polygon` or `MultiPolygon` geometry, a `Feature` wrapping one, or a
    /// `FeatureCollection` (first polygonal feature wins).
    ///
    /// # Errors
    ///
    /// Returns an error when the string is not valid `GeoJSON`, contains no
    /// polygonal geometry, or the polygon is degenerate.
    pub fn from_geojson_str(raw: &str) -> Result<Self, GeometryError> {
        let geojson: GeoJson = raw.parse()?;

        let polygons = match geojson {
            GeoJson::Geometry(geometry) => geometry_to_multipolygon(geometry),
            GeoJson::Feature(feature) => feature.geometry.and_then(geometry_to_multipolygon),
            GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .filter_map(|feature| feature.geometry)
                .find_map(geometry_to_multipolygon),
        }
        .ok_or(GeometryError::NoPolygon)?;

        Self::from_multipolygon(polygons)
    }

    /// Reads and parses a service-area `GeoJSON` file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or does not contain a
    /// valid service-area polygon.
    pub fn from_geojson_file(path: &str) -> Result<Self, GeometryError> {
        let raw = std::fs::read_to_string(path)?;
        let area = Self::from_geojson_str(&raw)?;
        log::info!(
            "Loaded service area from {path} ({} polygon(s), {} vertices)",
            area.polygons.0.len(),
            area.vertex_count()
        );
        Ok(area)
    }

    /// The built-in central Austin service area.
    #[must_use]
    pub fn default_area() -> Self {
        Self::from_ring(DEFAULT_RING).expect("built-in ring has enough vertices")
    }

    /// Whether a `(longitude, latitude)` coordinate falls inside the
    /// service area. Pure; `O(vertices)` per query.
    #[must_use]
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.polygons.contains(&geo::Point::new(longitude, latitude))
    }

    /// Filters cameras to those with coordinates inside the service area,
    /// preserving input order. Cameras without coordinates never pass.
    #[must_use]
    pub fn filter_cameras(&self, cameras: &[Camera]) -> Vec<Camera> {
        cameras
            .iter()
            .filter(|camera| {
                camera
                    .coordinate()
                    .is_some_and(|(lon, lat)| self.contains(lon, lat))
            })
            .cloned()
            .collect()
    }

    fn from_multipolygon(polygons: MultiPolygon<f64>) -> Result<Self, GeometryError> {
        if polygons.0.is_empty() {
            return Err(GeometryError::NoPolygon);
        }

        for polygon in &polygons.0 {
            let exterior = polygon.exterior();
            // `Polygon::new` closes rings, so a closed ring repeats its
            // first coordinate at the end.
            let distinct = if exterior.is_closed() {
                exterior.0.len().saturating_sub(1)
            } else {
                exterior.0.len()
            };
            if distinct < 3 {
                return Err(GeometryError::TooFewVertices(distinct));
            }
        }

        Ok(Self { polygons })
    }

    fn vertex_count(&self) -> usize {
        self.polygons
            .0
            .iter()
            .map(|polygon| polygon.exterior().0.len())
            .sum()
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`], accepting both
/// `Polygon` and `MultiPolygon` types.
fn geometry_to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
    }

    fn camera(id: &str, longitude: Option<f64>, latitude: Option<f64>) -> Camera {
        Camera {
            camera_id: id.to_string(),
            location_name: format!("Camera {id}"),
            longitude,
            latitude,
            council_district: None,
        }
    }

    #[test]
    fn unit_square_classifies_inside_and_outside() {
        let area = ServiceArea::from_ring(&unit_square()).unwrap();
        assert!(area.contains(0.5, 0.5));
        assert!(!area.contains(2.0, 2.0));
    }

    #[test]
    fn classification_is_invariant_under_ring_rotation() {
        let ring = unit_square();
        let samples = [
            (0.5, 0.5),
            (0.01, 0.99),
            (2.0, 2.0),
            (-0.5, 0.5),
            (1.5, 0.0),
        ];

        let baseline = ServiceArea::from_ring(&ring).unwrap();
        for rotation in 1..ring.len() {
            let mut rotated = ring.clone();
            rotated.rotate_left(rotation);
            let area = ServiceArea::from_ring(&rotated).unwrap();
            for &(lon, lat) in &samples {
                assert_eq!(
                    area.contains(lon, lat),
                    baseline.contains(lon, lat),
                    "rotation {rotation} disagrees at ({lon}, {lat})"
                );
            }
        }
    }

    #[test]
    fn far_outside_point_is_outside() {
        let area = ServiceArea::from_ring(&unit_square()).unwrap();
        assert!(!area.contains(1000.0, -1000.0));
    }

    #[test]
    fn explicitly_closed_ring_is_accepted() {
        let mut ring = unit_square();
        ring.push(ring[0]);
        let area = ServiceArea::from_ring(&ring).unwrap();
        assert!(area.contains(0.5, 0.5));
    }

    #[test]
    fn degenerate_rings_are_rejected() {
        assert!(matches!(
            ServiceArea::from_ring(&[(0.0, 0.0), (1.0, 1.0)]),
            Err(GeometryError::TooFewVertices(2))
        ));
        // Two distinct vertices pre-closed into a loop.
        assert!(matches!(
            ServiceArea::from_ring(&[(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            Err(GeometryError::TooFewVertices(2))
        ));
    }

    #[test]
    fn parses_bare_polygon_geometry() {
        let raw = r#"{"type":"Polygon","coordinates":[[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]]}"#;
        let area = ServiceArea::from_geojson_str(raw).unwrap();
        assert!(area.contains(0.5, 0.5));
        assert!(!area.contains(2.0, 2.0));
    }

    #[test]
    fn parses_feature_collection() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "marker"}, "geometry": {"type": "Point", "coordinates": [5.0, 5.0]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]]}}
            ]
        }"#;
        let area = ServiceArea::from_geojson_str(raw).unwrap();
        assert!(area.contains(0.5, 0.5));
    }

    #[test]
    fn parses_multipolygon_geometry() {
        let raw = r#"{"type":"MultiPolygon","coordinates":[
            [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]],
            [[[10.0,10.0],[11.0,10.0],[11.0,11.0],[10.0,11.0],[10.0,10.0]]]
        ]}"#;
        let area = ServiceArea::from_geojson_str(raw).unwrap();
        assert!(area.contains(0.5, 0.5));
        assert!(area.contains(10.5, 10.5));
        assert!(!area.contains(5.0, 5.0));
    }

    #[test]
    fn rejects_geojson_without_polygons() {
        let raw = r#"{"type":"Point","coordinates":[0.0,0.0]}"#;
        assert!(matches!(
            ServiceArea::from_geojson_str(raw),
            Err(GeometryError::NoPolygon)
        ));
    }

    #[test]
    fn rejects_malformed_geojson() {
        assert!(matches!(
            ServiceArea::from_geojson_str("not geojson"),
            Err(GeometryError::Geojson(_))
        ));
    }

    #[test]
    fn filter_preserves_order_and_drops_missing_coordinates() {
        let area = ServiceArea::from_ring(&unit_square()).unwrap();
        let cameras = vec![
            camera("A", Some(0.2), Some(0.2)),
            camera("B", Some(5.0), Some(5.0)),
            camera("C", Some(0.8), Some(0.9)),
            camera("D", None, Some(0.5)),
        ];

        let filtered = area.filter_cameras(&cameras);
        let ids: Vec<&str> = filtered.iter().map(|c| c.camera_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn default_area_covers_downtown_austin() {
        let area = ServiceArea::default_area();
        // Congress Ave bridge.
        assert!(area.contains(-97.7431, 30.2672));
        // Round Rock, well north of the zone.
        assert!(!area.contains(-97.6789, 30.5083));
    }
}
