//! Tolerant parsing of raw camera feed records.
//!
//! The feed occasionally carries records with missing coordinates or odd
//! district values. A bad record is dropped rather than failing the batch.

use serde_json::Value;
use waymo_counter_cameras_models::Camera;

/// Parses one raw feed record into a [`Camera`].
///
/// Returns `None` when the record has no usable `camera_id`. Missing
/// coordinates or district leave those fields unset.
#[must_use]
pub fn parse_camera(record: &Value) -> Option<Camera> {
    let camera_id = non_empty_str(record.get("camera_id"))?;
    let location_name = non_empty_str(record.get("location_name")).unwrap_or_default();

    let (longitude, latitude) = match point_coordinates(record.get("location")) {
        Some((lon, lat)) => (Some(lon), Some(lat)),
        None => (None, None),
    };

    Some(Camera {
        camera_id,
        location_name,
        longitude,
        latitude,
        council_district: parse_council_district(record.get("council_district")),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_string())
}

/// Pulls `[longitude, latitude]` out of a GeoJSON-style point. Returns
/// `None` if missing, short, or zero.
fn point_coordinates(location: Option<&Value>) -> Option<(f64, f64)> {
    let coordinates = location?.get("coordinates")?.as_array()?;
    let longitude = coordinates.first()?.as_f64()?;
    let latitude = coordinates.get(1)?.as_f64()?;
    if longitude == 0.0 || latitude == 0.0 {
        return None;
    }
    Some((longitude, latitude))
}

/// Parses the council district, taking the first value when a camera sits
/// on a boundary and the feed reports `"4, 7"`.
fn parse_council_district(value: Option<&Value>) -> Option<i32> {
    let text = match value? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    text.split(',').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_full_record() {
        let record = json!({
            "camera_id": "1234",
            "location_name": "LAMAR BLVD / 5TH ST",
            "camera_status": "TURNED_ON",
            "council_district": "9",
            "location": {
                "type": "Point",
                "coordinates": [-97.7431, 30.2672],
            },
        });

        let camera = parse_camera(&record).unwrap();
        assert_eq!(camera.camera_id, "1234");
        assert_eq!(camera.location_name, "LAMAR BLVD / 5TH ST");
        assert_eq!(camera.council_district, Some(9));
        let (lon, lat) = camera.coordinate().unwrap();
        assert!((lon - -97.7431).abs() < f64::EPSILON);
        assert!((lat - 30.2672).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_record_without_camera_id() {
        assert!(parse_camera(&json!({"location_name": "SOMEWHERE"})).is_none());
        assert!(parse_camera(&json!({"camera_id": "  "})).is_none());
    }

    #[test]
    fn missing_coordinates_leave_position_unset() {
        let camera = parse_camera(&json!({"camera_id": "77"})).unwrap();
        assert!(camera.coordinate().is_none());
        assert_eq!(camera.location_name, "");
    }

    #[test]
    fn rejects_zero_coordinates() {
        let record = json!({
            "camera_id": "88",
            "location": {"coordinates": [0.0, 0.0]},
        });
        assert!(parse_camera(&record).unwrap().coordinate().is_none());
    }

    #[test]
    fn boundary_camera_takes_first_district() {
        let record = json!({"camera_id": "5", "council_district": "4, 7"});
        assert_eq!(parse_camera(&record).unwrap().council_district, Some(4));
    }

    #[test]
    fn numeric_district_parses() {
        let record = json!({"camera_id": "6", "council_district": 7});
        assert_eq!(parse_camera(&record).unwrap().council_district, Some(7));
    }

    #[test]
    fn unparseable_district_is_none() {
        let record = json!({"camera_id": "7", "council_district": "N/A"});
        assert_eq!(parse_camera(&record).unwrap().council_district, None);
    }
}
