//! Pure reduction of per-camera outcomes into a [`ScanSummary`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use waymo_counter_scan_models::{CameraScanResult, ScanSummary};

/// Reduces one cycle's results into its summary row.
///
/// Order-independent and free of I/O. The orchestrator attempts every
/// in-area camera, so `total_cameras` and `cameras_scanned` both equal the
/// result count.
#[must_use]
pub fn aggregate(
    results: &[CameraScanResult],
    started_at: DateTime<Utc>,
    duration: Duration,
) -> ScanSummary {
    let cameras_failed = results.iter().filter(|r| !r.is_success()).count();
    let total_waymo_count = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.waymo_count)
        .sum();
    let cameras_with_waymos = results
        .iter()
        .filter(|r| r.is_success() && r.waymo_count > 0)
        .count();

    ScanSummary {
        timestamp: started_at,
        total_cameras: results.len(),
        cameras_scanned: results.len(),
        cameras_failed,
        total_waymo_count,
        cameras_with_waymos,
        duration_seconds: duration.as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(id: &str, waymo_count: usize) -> CameraScanResult {
        let detections = (0..waymo_count)
            .map(|_| waymo_counter_scan_models::Detection {
                class_label: "waymo".to_string(),
                confidence: 0.8,
                bbox: [0.0, 0.0, 5.0, 5.0],
            })
            .collect();
        CameraScanResult::success(id.to_string(), detections, Duration::from_millis(100))
    }

    fn failure(id: &str) -> CameraScanResult {
        CameraScanResult::failure(id.to_string(), "timeout", Duration::from_secs(30))
    }

    #[test]
    fn five_cameras_two_successes_three_failures() {
        let results = vec![
            success("A", 1),
            failure("B"),
            success("C", 0),
            failure("D"),
            failure("E"),
        ];

        let summary = aggregate(&results, Utc::now(), Duration::from_secs(12));

        assert_eq!(summary.total_cameras, 5);
        assert_eq!(summary.cameras_scanned, 5);
        assert_eq!(summary.cameras_failed, 3);
        assert_eq!(summary.total_waymo_count, 1);
        assert_eq!(summary.cameras_with_waymos, 1);
        assert!((summary.duration_seconds - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_results_produce_all_zero_summary() {
        let summary = aggregate(&[], Utc::now(), Duration::ZERO);

        assert_eq!(summary.total_cameras, 0);
        assert_eq!(summary.cameras_scanned, 0);
        assert_eq!(summary.cameras_failed, 0);
        assert_eq!(summary.total_waymo_count, 0);
        assert_eq!(summary.cameras_with_waymos, 0);
        assert!(summary.duration_seconds.abs() < f64::EPSILON);
    }

    #[test]
    fn counts_satisfy_scan_invariants() {
        let results = vec![
            success("A", 3),
            success("B", 0),
            success("C", 2),
            failure("D"),
        ];

        let summary = aggregate(&results, Utc::now(), Duration::from_secs(1));

        let successes = results.iter().filter(|r| r.is_success()).count();
        assert_eq!(summary.cameras_scanned, summary.cameras_failed + successes);
        assert_eq!(summary.total_waymo_count, 5);
        assert_eq!(summary.cameras_with_waymos, 2);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut results = vec![success("A", 2), failure("B"), success("C", 1)];
        let forward = aggregate(&results, Utc::now(), Duration::from_secs(1));
        results.reverse();
        let reversed = aggregate(&results, Utc::now(), Duration::from_secs(1));

        assert_eq!(forward.cameras_failed, reversed.cameras_failed);
        assert_eq!(forward.total_waymo_count, reversed.total_waymo_count);
        assert_eq!(forward.cameras_with_waymos, reversed.cameras_with_waymos);
    }
}
