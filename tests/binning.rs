//! Binning properties on synthetic tracks.

use chrono::{Duration, TimeZone, Utc};
use trail_analytics::geo_utils::total_distance;
use trail_analytics::{bin_route, GradeAdjustmentModel, TrackPoint};

/// A rolling track heading north-east with a timestamp every 5 seconds.
fn rolling_track(n: usize) -> Vec<TrackPoint> {
    let t0 = Utc.with_ymd_and_hms(2024, 9, 14, 7, 30, 0).unwrap();
    (0..n)
        .map(|i| {
            let f = i as f64;
            TrackPoint::new(46.0 + f * 0.00008, 7.0 + f * 0.00011)
                .with_elevation(1200.0 + (f / 15.0).sin() * 40.0 + f * 0.2)
                .with_time(t0 + Duration::seconds(i as i64 * 5))
        })
        .collect()
}

fn three_point_scenario() -> Vec<TrackPoint> {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    vec![
        TrackPoint::new(0.0, 0.0).with_elevation(100.0).with_time(t0),
        TrackPoint::new(0.0, 0.0045)
            .with_elevation(150.0)
            .with_time(t0 + Duration::seconds(300)),
        TrackPoint::new(0.0, 0.009)
            .with_elevation(120.0)
            .with_time(t0 + Duration::seconds(600)),
    ]
}

#[test]
fn test_bins_are_contiguous_and_cover_the_track() {
    let points = rolling_track(500);
    let bins = bin_route(&points, 50.0, None, None);
    assert!(!bins.is_empty());
    assert_eq!(bins[0].start_index, 0);
    assert_eq!(bins.last().unwrap().end_index, points.len() - 1);
    for w in bins.windows(2) {
        assert_eq!(w[0].end_index, w[1].start_index);
    }
}

#[test]
fn test_bin_distances_sum_to_route_length() {
    let points = rolling_track(500);
    for length in [25.0, 50.0, 200.0, 1000.0] {
        let bins = bin_route(&points, length, None, None);
        let sum: f64 = bins.iter().map(|b| b.distance_meters).sum();
        assert!((sum - total_distance(&points)).abs() < 1e-6, "bin length {}", length);
    }
}

#[test]
fn test_only_the_tail_is_short() {
    let points = rolling_track(500);
    let bins = bin_route(&points, 200.0, None, None);
    let (tail, full) = bins.split_last().unwrap();
    assert!(full.iter().all(|b| b.distance_meters >= 200.0));
    assert!(tail.distance_meters < 200.0 || tail.end_index == points.len() - 1);
}

#[test]
fn test_route_shorter_than_one_bin() {
    let points = rolling_track(5);
    let bins = bin_route(&points, 10_000.0, None, None);
    assert_eq!(bins.len(), 1);
    assert_eq!(bins[0].start_index, 0);
    assert_eq!(bins[0].end_index, 4);
    assert!((bins[0].distance_meters - total_distance(&points)).abs() < 1e-9);
}

#[test]
fn test_three_point_scenario() {
    let bins = bin_route(&three_point_scenario(), 500.0, None, None);
    assert_eq!(bins.len(), 2);
    assert!(bins[0].gradient_percent > 9.5 && bins[0].gradient_percent < 10.5);
    assert!(bins[1].gradient_percent < 0.0);
    let elapsed: f64 = bins.iter().filter_map(|b| b.elapsed_seconds).sum();
    assert_eq!(elapsed, 600.0);
    for bin in &bins {
        // ~500m in 300s
        assert!((bin.pace_min_per_km.unwrap() - 10.0).abs() < 0.05);
    }
}

#[test]
fn test_model_scales_adjusted_time() {
    let model = GradeAdjustmentModel::from_coefficients([0.0, 0.0, 0.0, 0.03, 1.0]);
    let target = 1000.0 / 300.0;
    let bins = bin_route(&three_point_scenario(), 500.0, Some(&model), Some(target));

    let up = &bins[0];
    let expected_factor = 1.0 + 0.03 * up.gradient_percent;
    assert!((up.adjustment_factor - expected_factor).abs() < 1e-12);
    assert!(
        (up.adjusted_time_seconds.unwrap() - up.distance_meters * expected_factor / target).abs()
            < 1e-9
    );
    let down = &bins[1];
    assert!(down.adjustment_factor < 1.0);
    assert!(down.adjusted_time_seconds.unwrap() < up.adjusted_time_seconds.unwrap());
}

#[test]
fn test_extreme_gradient_is_clamped() {
    let model = GradeAdjustmentModel::from_coefficients([0.0, 0.0, 0.001, 0.0, 1.0]);
    let points = vec![
        TrackPoint::new(0.0, 0.0).with_elevation(0.0),
        TrackPoint::new(0.0, 0.0009).with_elevation(80.0),
    ];
    let bins = bin_route(&points, 50.0, Some(&model), Some(3.0));
    assert!(bins[0].gradient_percent > 35.0);
    assert!((bins[0].adjustment_factor - (1.0 + 0.001 * 35.0 * 35.0)).abs() < 1e-12);
}

#[test]
fn test_untimed_track_still_projects() {
    let points: Vec<TrackPoint> = rolling_track(100)
        .into_iter()
        .map(|p| TrackPoint { time: None, ..p })
        .collect();
    let bins = bin_route(&points, 100.0, None, Some(3.0));
    assert!(bins.iter().all(|b| !b.has_time()));
    assert!(bins.iter().all(|b| b.adjusted_time_seconds.is_some()));
}
