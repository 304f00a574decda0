//! Route-level and per-gradient aggregates.
//!
//! Everything here is a fold over points or bins that already exist; no
//! function re-bins or refits. Divisions that would produce infinity or NaN
//! return `None` instead.

use serde::{Deserialize, Serialize};

use crate::binning::Bin;
use crate::geo_utils::{elevation_gain, step_distance, total_distance};
use crate::TrackPoint;

/// Speed below which an interval counts as stopped (m/s).
pub const STOPPED_SPEED_THRESHOLD_MPS: f64 = 0.2;

/// Intervals this long or longer are recording gaps, not stops (seconds).
const MAX_STOP_INTERVAL_SECONDS: f64 = 2.0 * 60.0 * 60.0;

/// Headline numbers for a recorded route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub point_count: usize,
    /// First to last timestamp (seconds)
    pub total_time_seconds: Option<f64>,
    pub distance_km: f64,
    /// Total positive elevation change (meters, rounded)
    pub elevation_gain_meters: f64,
    /// Total time over total distance (min/km)
    pub average_pace_min_per_km: Option<f64>,
    pub time_stopped_seconds: f64,
}

impl RouteSummary {
    pub fn from_points(points: &[TrackPoint]) -> Self {
        let total_time = match (points.first(), points.last()) {
            (Some(first), Some(last)) => last.seconds_since(first).filter(|s| *s >= 0.0),
            _ => None,
        };
        let distance_km = total_distance(points) / 1000.0;
        let average_pace = total_time
            .filter(|_| distance_km > 0.0)
            .map(|s| s / 60.0 / distance_km);

        Self {
            point_count: points.len(),
            total_time_seconds: total_time,
            distance_km,
            elevation_gain_meters: elevation_gain(points).round(),
            average_pace_min_per_km: average_pace,
            time_stopped_seconds: time_stopped(points, STOPPED_SPEED_THRESHOLD_MPS),
        }
    }
}

/// Total time spent in intervals slower than `speed_threshold_mps`.
///
/// Only intervals with `0 < dt < 2h` between two timestamped points with
/// valid positions are considered.
pub fn time_stopped(points: &[TrackPoint], speed_threshold_mps: f64) -> f64 {
    points
        .windows(2)
        .filter(|w| w[0].has_valid_position() && w[1].has_valid_position())
        .filter_map(|w| {
            let dt = w[1].seconds_since(&w[0])?;
            if dt <= 0.0 || dt >= MAX_STOP_INTERVAL_SECONDS {
                return None;
            }
            let speed = step_distance(&w[0], &w[1]) / dt;
            (speed < speed_threshold_mps).then_some(dt)
        })
        .sum()
}

fn pace(seconds: f64, meters: f64) -> Option<f64> {
    if seconds > 0.0 && meters > 0.0 && seconds.is_finite() && meters.is_finite() {
        Some(seconds / 60.0 / (meters / 1000.0))
    } else {
        None
    }
}

fn recorded_seconds(bins: &[Bin]) -> f64 {
    bins.iter().filter_map(|b| b.elapsed_seconds).sum()
}

fn path_meters(bins: &[Bin]) -> f64 {
    bins.iter().map(|b| b.distance_meters).sum()
}

fn grade_adjusted_meters(bins: &[Bin]) -> f64 {
    bins.iter()
        .filter_map(|b| b.grade_adjusted_distance_meters)
        .filter(|d| d.is_finite())
        .sum()
}

/// Recorded time over total bin distance (min/km).
pub fn average_pace_from_bins(bins: &[Bin]) -> Option<f64> {
    pace(recorded_seconds(bins), path_meters(bins))
}

/// Projected pace over the whole route: adjusted time over path distance.
///
/// Only bins with a positive, finite adjusted time contribute.
pub fn overall_grade_adjusted_pace(bins: &[Bin]) -> Option<f64> {
    let (seconds, meters) = bins
        .iter()
        .filter(|b| b.distance_meters > 0.0)
        .filter_map(|b| {
            b.adjusted_time_seconds
                .filter(|t| t.is_finite() && *t > 0.0)
                .map(|t| (t, b.distance_meters))
        })
        .fold((0.0, 0.0), |(s, m), (t, d)| (s + t, m + d));
    pace(seconds, meters)
}

/// Grade-adjusted pace of the recorded effort: elapsed time over
/// grade-adjusted distance (min/km).
pub fn gap_from_grade_adjusted_distance(bins: &[Bin]) -> Option<f64> {
    pace(recorded_seconds(bins), grade_adjusted_meters(bins))
}

/// Sum of projected bin times up to `up_to_km` (the whole route for `None`).
///
/// A bin counts when its cumulative start lies before the cut-off.
pub fn total_adjusted_time(bins: &[Bin], up_to_km: Option<f64>) -> f64 {
    let limit_m = up_to_km.map_or(f64::INFINITY, |km| km * 1000.0);
    let mut start_m = 0.0;
    let mut total = 0.0;
    for bin in bins {
        if start_m >= limit_m {
            break;
        }
        if let Some(t) = bin.adjusted_time_seconds.filter(|t| t.is_finite()) {
            total += t;
        }
        start_m += bin.distance_meters;
    }
    total
}

// ============================================================================
// Gradient groups
// ============================================================================

/// A gradient band, `(min, max]` in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientGroup {
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    /// Representative gradient for plotting
    pub midpoint: f64,
}

impl GradientGroup {
    pub const fn new(label: &'static str, min: f64, max: f64, midpoint: f64) -> Self {
        Self {
            label,
            min,
            max,
            midpoint,
        }
    }

    pub fn contains(&self, gradient: f64) -> bool {
        gradient.is_finite() && gradient > self.min && gradient <= self.max
    }
}

pub const GRADIENT_GROUPS: [GradientGroup; 7] = [
    GradientGroup::new("< -20", f64::NEG_INFINITY, -20.0, -22.5),
    GradientGroup::new("-20 to -10", -20.0, -10.0, -15.0),
    GradientGroup::new("-10 to -5", -10.0, -5.0, -7.5),
    GradientGroup::new("-5 to 5", -5.0, 5.0, 0.0),
    GradientGroup::new("5 to 10", 5.0, 10.0, 7.5),
    GradientGroup::new("10 to 20", 10.0, 20.0, 15.0),
    GradientGroup::new("> 20", 20.0, f64::INFINITY, 22.5),
];

pub const GRADIENT_SUMMARY_GROUPS: [GradientGroup; 3] = [
    GradientGroup::new("Downhill", f64::NEG_INFINITY, -3.0, -6.0),
    GradientGroup::new("Flat", -3.0, 3.0, 0.0),
    GradientGroup::new("Uphill", 3.0, f64::INFINITY, 6.0),
];

/// Totals and paces for the bins that fall into one gradient group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientGroupStats {
    pub group: GradientGroup,
    pub bin_count: usize,
    pub time_seconds: f64,
    pub distance_meters: f64,
    pub grade_adjusted_distance_meters: f64,
    pub adjusted_time_seconds: f64,
    /// Recorded pace (min/km)
    pub average_pace_min_per_km: Option<f64>,
    /// Recorded time over grade-adjusted distance (min/km)
    pub grade_adjusted_pace_min_per_km: Option<f64>,
    /// Projected time over path distance (min/km)
    pub projected_pace_min_per_km: Option<f64>,
}

fn group_stats(bins: &[Bin], group: GradientGroup) -> GradientGroupStats {
    let members: Vec<&Bin> = bins
        .iter()
        .filter(|b| group.contains(b.gradient_percent))
        .collect();

    let time: f64 = members.iter().filter_map(|b| b.elapsed_seconds).sum();
    let distance: f64 = members.iter().map(|b| b.distance_meters).sum();
    let adjusted_distance: f64 = members
        .iter()
        .filter_map(|b| b.grade_adjusted_distance_meters)
        .filter(|d| d.is_finite())
        .sum();
    let adjusted_time: f64 = members
        .iter()
        .filter_map(|b| b.adjusted_time_seconds)
        .filter(|t| t.is_finite() && *t > 0.0)
        .sum();

    GradientGroupStats {
        group,
        bin_count: members.len(),
        time_seconds: time,
        distance_meters: distance,
        grade_adjusted_distance_meters: adjusted_distance,
        adjusted_time_seconds: adjusted_time,
        average_pace_min_per_km: pace(time, distance),
        grade_adjusted_pace_min_per_km: pace(time, adjusted_distance),
        projected_pace_min_per_km: pace(adjusted_time, distance),
    }
}

/// Per-group totals and paces, one entry per group in order.
pub fn pace_by_gradient_group(bins: &[Bin], groups: &[GradientGroup]) -> Vec<GradientGroupStats> {
    groups.iter().map(|&g| group_stats(bins, g)).collect()
}

/// Recorded time spent in each gradient group (seconds).
pub fn time_by_gradient_group(bins: &[Bin], groups: &[GradientGroup]) -> Vec<(&'static str, f64)> {
    groups
        .iter()
        .map(|g| {
            let seconds: f64 = bins
                .iter()
                .filter(|b| g.contains(b.gradient_percent))
                .filter_map(|b| b.elapsed_seconds)
                .sum();
            (g.label, seconds)
        })
        .collect()
}

/// Median paces at one whole-percent gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientPace {
    pub gradient_percent: i32,
    pub median_pace_min_per_km: f64,
    pub median_grade_adjusted_pace_min_per_km: f64,
}

/// Median raw and grade-adjusted pace for each rounded gradient.
///
/// Gradients are rounded to the nearest whole percent; a gradient is only
/// reported when it has at least one finite value of each pace.
pub fn pace_analysis_by_gradient(bins: &[Bin]) -> Vec<GradientPace> {
    let mut groups: std::collections::BTreeMap<i32, (Vec<f64>, Vec<f64>)> = Default::default();
    for bin in bins.iter().filter(|b| b.gradient_percent.is_finite()) {
        let entry = groups
            .entry(bin.gradient_percent.round() as i32)
            .or_default();
        if let Some(p) = bin.pace_min_per_km.filter(|p| p.is_finite()) {
            entry.0.push(p);
        }
        if let Some(p) = bin.grade_adjusted_pace_min_per_km().filter(|p| p.is_finite()) {
            entry.1.push(p);
        }
    }

    groups
        .into_iter()
        .filter_map(|(gradient, (mut paces, mut adjusted))| {
            Some(GradientPace {
                gradient_percent: gradient,
                median_pace_min_per_km: median(&mut paces)?,
                median_grade_adjusted_pace_min_per_km: median(&mut adjusted)?,
            })
        })
        .collect()
}

/// Median of the values, sorting them in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bin(distance: f64, gradient: f64, elapsed: Option<f64>, adjusted: Option<f64>) -> Bin {
        let pace = elapsed.map(|s| s / 60.0 / (distance / 1000.0));
        Bin {
            distance_meters: distance,
            elevation_change_meters: distance * gradient / 100.0,
            gradient_percent: gradient,
            elapsed_seconds: elapsed,
            velocity_mps: elapsed.map(|s| distance / s),
            pace_min_per_km: pace,
            adjustment_factor: 1.0 + gradient / 100.0,
            grade_adjusted_distance_meters: adjusted.map(|_| distance * (1.0 + gradient / 100.0)),
            adjusted_time_seconds: adjusted,
            start_index: 0,
            end_index: 1,
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn test_summary_from_points() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let points: Vec<TrackPoint> = (0..=10)
            .map(|i| {
                TrackPoint::new(0.0, i as f64 * 0.0009)
                    .with_elevation(100.0 + i as f64 * 2.4)
                    .with_time(t0 + Duration::seconds(i * 30))
            })
            .collect();
        let summary = RouteSummary::from_points(&points);
        assert_eq!(summary.point_count, 11);
        assert_eq!(summary.total_time_seconds, Some(300.0));
        assert!((summary.distance_km - 1.0).abs() < 0.01);
        assert_eq!(summary.elevation_gain_meters, 24.0);
        assert!((summary.average_pace_min_per_km.unwrap() - 5.0).abs() < 0.05);
        assert_eq!(summary.time_stopped_seconds, 0.0);
    }

    #[test]
    fn test_summary_without_time() {
        let points = vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.0, 0.001)];
        let summary = RouteSummary::from_points(&points);
        assert_eq!(summary.total_time_seconds, None);
        assert_eq!(summary.average_pace_min_per_km, None);
    }

    #[test]
    fn test_time_stopped() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let points = vec![
            TrackPoint::new(0.0, 0.0).with_time(t0),
            TrackPoint::new(0.0, 0.0).with_time(t0 + Duration::seconds(60)),
            TrackPoint::new(0.0, 0.001).with_time(t0 + Duration::seconds(90)),
            // Recording gap, not a stop
            TrackPoint::new(0.0, 0.001).with_time(t0 + Duration::hours(3)),
        ];
        assert_eq!(time_stopped(&points, STOPPED_SPEED_THRESHOLD_MPS), 60.0);
    }

    #[test]
    fn test_bin_paces() {
        let bins = vec![
            bin(1000.0, 0.0, Some(300.0), Some(300.0)),
            bin(1000.0, 10.0, Some(420.0), Some(330.0)),
        ];
        assert!((average_pace_from_bins(&bins).unwrap() - 6.0).abs() < 1e-9);
        assert!((overall_grade_adjusted_pace(&bins).unwrap() - 5.25).abs() < 1e-9);
        // 720s over 2.1 grade-adjusted km
        let gap = gap_from_grade_adjusted_distance(&bins).unwrap();
        assert!((gap - 12.0 / 2.1).abs() < 1e-9);
        assert_eq!(total_adjusted_time(&bins, None), 630.0);
        assert_eq!(total_adjusted_time(&bins, Some(0.5)), 300.0);
        assert_eq!(average_pace_from_bins(&[]), None);
    }

    #[test]
    fn test_gradient_group_boundaries() {
        let flat = &GRADIENT_GROUPS[3];
        assert!(flat.contains(5.0));
        assert!(!flat.contains(-5.0));
        assert!(GRADIENT_GROUPS[2].contains(-5.0));
        assert!(!flat.contains(f64::NAN));

        let bins = vec![
            bin(100.0, -25.0, Some(60.0), None),
            bin(100.0, 2.0, Some(30.0), None),
            bin(100.0, 4.0, Some(30.0), None),
            bin(100.0, 12.0, Some(90.0), None),
        ];
        let times = time_by_gradient_group(&bins, &GRADIENT_GROUPS);
        assert_eq!(times[0], ("< -20", 60.0));
        assert_eq!(times[3], ("-5 to 5", 60.0));
        assert_eq!(times[5], ("10 to 20", 90.0));

        let summary = pace_by_gradient_group(&bins, &GRADIENT_SUMMARY_GROUPS);
        assert_eq!(summary[0].bin_count, 1);
        assert_eq!(summary[1].bin_count, 1);
        assert_eq!(summary[2].bin_count, 2);
        assert!((summary[1].average_pace_min_per_km.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(summary[1].projected_pace_min_per_km, None);
    }

    #[test]
    fn test_gradient_groups_tile_the_line() {
        for groups in [&GRADIENT_GROUPS[..], &GRADIENT_SUMMARY_GROUPS[..]] {
            assert_eq!(groups[0].min, f64::NEG_INFINITY);
            assert_eq!(groups[groups.len() - 1].max, f64::INFINITY);
            for w in groups.windows(2) {
                assert_eq!(w[0].max, w[1].min);
            }
            for g in [-40.0, -20.0, -3.0, 0.0, 3.0, 19.9, 40.0] {
                assert_eq!(groups.iter().filter(|group| group.contains(g)).count(), 1);
            }
        }
        assert_eq!(
            GradientGroup::new("Flat", -3.0, 3.0, 0.0),
            GRADIENT_SUMMARY_GROUPS[1]
        );
    }

    #[test]
    fn test_pace_analysis_by_gradient() {
        let bins = vec![
            bin(1000.0, 0.2, Some(300.0), None),
            bin(1000.0, -0.3, Some(360.0), None),
            bin(1000.0, 0.0, Some(240.0), None),
            bin(1000.0, 5.1, Some(420.0), None),
            bin(1000.0, 7.0, None, None),
        ];
        let analysis = pace_analysis_by_gradient(&bins);
        assert_eq!(analysis.len(), 2);
        assert_eq!(analysis[0].gradient_percent, 0);
        assert!((analysis[0].median_pace_min_per_km - 5.0).abs() < 1e-9);
        assert_eq!(analysis[1].gradient_percent, 5);
    }

    #[test]
    fn test_median() {
        let mut empty: Vec<f64> = Vec::new();
        assert_eq!(median(&mut empty), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }
}
