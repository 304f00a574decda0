//! End-to-end pipeline over a synthetic trail run.

use chrono::{Duration, TimeZone, Utc};
use trail_analytics::checkpoints::SegmentLeader;
use trail_analytics::format::{format_hms, format_min_sec};
use trail_analytics::stats::{pace_by_gradient_group, GRADIENT_SUMMARY_GROUPS};
use trail_analytics::{
    analyze_route, analyze_routes, compare_checkpoints, AnalysisConfig, CheckpointMode,
    ReferenceDataset, TrackPoint, TrailError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 3 km flat, 2 km climbing ~150m, a 10 minute stop on top, 2 km down.
fn trail_run() -> Vec<TrackPoint> {
    let t0 = Utc.with_ymd_and_hms(2024, 8, 3, 6, 30, 0).unwrap();
    let mut points = Vec::new();
    let mut t = t0;
    let mut elevation = 650.0;
    for i in 0..=140 {
        let (climb, seconds) = match i {
            0..=60 => (0.0, 15),
            61..=100 => (3.75, 30),
            _ => (-3.75, 12),
        };
        if i > 0 {
            elevation += climb;
            t += Duration::seconds(seconds);
        }
        if i == 101 {
            t += Duration::minutes(10);
        }
        points.push(
            TrackPoint::new(45.0, 6.0 + i as f64 * 0.000636)
                .with_elevation(elevation)
                .with_time(t),
        );
    }
    points
}

fn reference() -> ReferenceDataset {
    ReferenceDataset::from_pairs(&[
        (-20.0, 1.2),
        (-10.0, 0.9),
        (-5.0, 0.92),
        (0.0, 1.0),
        (5.0, 1.2),
        (10.0, 1.45),
        (20.0, 2.1),
    ])
}

#[test]
fn test_full_pipeline() {
    init_logging();
    let model = reference().fit().unwrap();
    let analysis = analyze_route(&trail_run(), &AnalysisConfig::default(), Some(&model)).unwrap();

    assert!((analysis.summary.distance_km - 7.0).abs() < 0.1);
    assert_eq!(analysis.summary.elevation_gain_meters, 150.0);
    assert_eq!(analysis.climbs.len(), 1);
    assert_eq!(analysis.climbs[0].gain_meters, 150.0);
    assert!(analysis.summary.time_stopped_seconds >= 600.0);

    // Uphill bins project slower than flat ones at the same target pace
    let flat = &analysis.bins[5];
    let steep = analysis
        .bins
        .iter()
        .find(|b| b.gradient_percent > 5.0)
        .unwrap();
    let flat_rate = flat.adjusted_time_seconds.unwrap() / flat.distance_meters;
    let steep_rate = steep.adjusted_time_seconds.unwrap() / steep.distance_meters;
    assert!(steep_rate > flat_rate);

    let groups = pace_by_gradient_group(&analysis.bins, &GRADIENT_SUMMARY_GROUPS);
    assert!(groups.iter().all(|g| g.bin_count > 0));
    let uphill = groups[2].average_pace_min_per_km.unwrap();
    let flat_pace = groups[1].average_pace_min_per_km.unwrap();
    assert!(uphill > flat_pace);
}

#[test]
fn test_pause_removal_changes_timeline() {
    let points = trail_run();
    let with_pause = analyze_route(&points, &AnalysisConfig::default(), None).unwrap();
    let config = AnalysisConfig {
        remove_pauses: true,
        ..Default::default()
    };
    let without_pause = analyze_route(&points, &config, None).unwrap();

    assert_eq!(without_pause.removed_pause_seconds, 612.0);
    let before = with_pause.summary.total_time_seconds.unwrap();
    let after = without_pause.summary.total_time_seconds.unwrap();
    assert!((before - after - 612.0).abs() < 1e-6);
    // Projection does not depend on recorded time
    assert_eq!(
        with_pause.projected_total_seconds,
        without_pause.projected_total_seconds
    );
}

#[test]
fn test_projection_and_overrides_through_analysis() {
    let model = reference().fit().unwrap();
    let analysis = analyze_route(&trail_run(), &AnalysisConfig::default(), Some(&model)).unwrap();
    let mut checkpoints = analysis.default_checkpoints(CheckpointMode::Standard);
    checkpoints.add(3.0);
    checkpoints.add(5.0);

    let projection = analysis.project(&checkpoints);
    assert_eq!(projection.len(), 4);
    assert_eq!(projection[0].cumulative_adjusted_time_seconds, 0.0);
    let end = projection.last().unwrap().cumulative_adjusted_time_seconds;
    assert!((end - analysis.projected_total_seconds).abs() < 1e-6);

    let defaults = analysis.project_with_overrides(&checkpoints, &[]);
    assert!((defaults[3].cumulative_seconds - end).abs() < 1e-6);

    let hiking = analysis.project_with_overrides(&checkpoints, &[None, None, Some(9.0), None]);
    assert!(hiking[2].segment_seconds > defaults[2].segment_seconds);
    assert_eq!(hiking[1].segment_seconds, defaults[1].segment_seconds);
    assert!(format_hms(hiking[3].cumulative_seconds).starts_with("00:"));
}

#[test]
fn test_pause_removal_with_downsampling_keeps_running_time() {
    // Steady 10s sampling, no stops; each downsampled gap is 200s
    let t0 = Utc.with_ymd_and_hms(2024, 8, 3, 6, 30, 0).unwrap();
    let points: Vec<TrackPoint> = (0..=400)
        .map(|i| {
            TrackPoint::new(45.0, 6.0 + i as f64 * 0.000318)
                .with_elevation(500.0)
                .with_time(t0 + Duration::seconds(i * 10))
        })
        .collect();
    let config = AnalysisConfig {
        remove_pauses: true,
        pause_threshold_s: 120.0,
        downsample_factor: 20,
        ..Default::default()
    };
    let analysis = analyze_route(&points, &config, None).unwrap();

    assert_eq!(analysis.removed_pause_seconds, 0.0);
    assert_eq!(analysis.points.len(), 21);
    assert_eq!(analysis.summary.total_time_seconds, Some(4000.0));
    assert!(analysis.average_pace_min_per_km.unwrap() > 0.0);
    assert!(analysis.bins.iter().all(|b| b.elapsed_seconds.is_some()));
}

#[test]
fn test_smoothing_and_downsampling() {
    let config = AnalysisConfig {
        smooth_elevation: true,
        downsample_factor: 2,
        ..Default::default()
    };
    let analysis = analyze_route(&trail_run(), &config, None).unwrap();
    assert_eq!(analysis.points.len(), 71);
    assert!((analysis.summary.distance_km - 7.0).abs() < 0.1);
    assert!(analysis.summary.elevation_gain_meters <= 150.0);
}

#[test]
fn test_json_output_is_plain_values() {
    let analysis = analyze_route(&trail_run(), &AnalysisConfig::default(), None).unwrap();
    let value: serde_json::Value = serde_json::from_str(&analysis.to_json().unwrap()).unwrap();

    let bin = &value["bins"][0];
    assert!(bin["distance_meters"].is_number());
    assert!(bin["start_time"].is_string());
    assert_eq!(value["climbs"][0]["name"], "climb 1");
    assert!(format_min_sec(value["average_pace_min_per_km"].as_f64().unwrap()).contains(':'));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = AnalysisConfig {
        target_pace_min_per_km: -4.0,
        ..Default::default()
    };
    let err = analyze_route(&trail_run(), &config, None).unwrap_err();
    assert!(matches!(err, TrailError::InvalidConfig { .. }));
    assert!(err.to_string().contains("target_pace_min_per_km"));
}

#[test]
fn test_two_runners() {
    let runner_a = trail_run();
    let runner_b: Vec<TrackPoint> = runner_a
        .iter()
        .map(|p| TrackPoint {
            time: p.time.map(|t| t + (t - runner_a[0].time.unwrap()) / 10),
            ..*p
        })
        .collect();

    let results = analyze_routes(
        &[runner_a.clone(), runner_b.clone()],
        &AnalysisConfig::default(),
        None,
    );
    assert!(results.iter().all(|r| r.is_ok()));

    let analysis = results[0].as_ref().unwrap();
    let mut checkpoints = analysis.default_checkpoints(CheckpointMode::Comparison);
    checkpoints.add(3.0);
    let rows = compare_checkpoints(checkpoints.as_slice(), &runner_a, &runner_b);
    assert!(matches!(rows[1].leader, SegmentLeader::RouteA { .. }));
    assert!(matches!(rows[2].leader, SegmentLeader::RouteA { .. }));
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_matches_sequential() {
    use trail_analytics::analyze_routes_parallel;

    let routes = vec![trail_run(), trail_run()[..70].to_vec(), trail_run()[..1].to_vec()];
    let config = AnalysisConfig::default();
    let sequential = analyze_routes(&routes, &config, None);
    let parallel = analyze_routes_parallel(&routes, &config, None);
    assert_eq!(sequential, parallel);
}
