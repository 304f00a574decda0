//! Fixed-length segment binning.
//!
//! Partitions a route into contiguous bins of roughly `bin_length` meters
//! of path. Each bin carries its distance, elevation change, gradient,
//! timing (when both boundary points have timestamps) and, when a target
//! velocity is supplied, its grade-adjusted distance and projected time.
//!
//! ## Algorithm
//! 1. Walk the points once, accumulating haversine distance
//! 2. When the accumulated distance reaches the bin length, close the bin
//!    at the point that crossed the threshold (inclusive) and reset
//! 3. After the scan, any remaining points form one shorter tail bin
//!
//! Consecutive bins share their boundary point, so
//! `bins[i].end_index == bins[i + 1].start_index`.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::geo_utils::step_distance;
use crate::model::{adjustment_factor, GradeAdjustmentModel};
use crate::TrackPoint;

/// A contiguous slice of the route used as the unit of aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Path length of the bin (meters)
    pub distance_meters: f64,
    /// End elevation minus start elevation (meters), 0 if either is missing
    pub elevation_change_meters: f64,
    /// Elevation change over distance, in percent
    pub gradient_percent: f64,
    /// Elapsed time between the boundary points (seconds)
    pub elapsed_seconds: Option<f64>,
    /// Average velocity over the bin (m/s)
    pub velocity_mps: Option<f64>,
    /// Average pace over the bin (min/km)
    pub pace_min_per_km: Option<f64>,
    /// Pace-adjustment factor for this gradient (1 without a model)
    pub adjustment_factor: f64,
    /// Flat-equivalent distance (meters)
    pub grade_adjusted_distance_meters: Option<f64>,
    /// Projected time at the target velocity (seconds)
    pub adjusted_time_seconds: Option<f64>,
    /// Index of the first point in the source track
    pub start_index: usize,
    /// Index of the last point in the source track
    pub end_index: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Bin {
    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }

    /// Observed pace normalised for gradient (min/km).
    pub fn grade_adjusted_pace_min_per_km(&self) -> Option<f64> {
        let pace = self.pace_min_per_km?;
        if self.adjustment_factor.is_finite() && self.adjustment_factor > 0.0 {
            Some(pace / self.adjustment_factor)
        } else {
            None
        }
    }

    pub fn has_time(&self) -> bool {
        self.elapsed_seconds.is_some()
    }
}

/// Partition a route into bins of approximately `bin_length_meters`.
///
/// Returns an empty vector for fewer than two points or a non-positive bin
/// length. `target_velocity_mps` must be finite and positive to produce
/// grade-adjusted values; otherwise they are `None`.
///
/// # Example
/// ```
/// use trail_analytics::{bin_route, TrackPoint};
///
/// let route: Vec<TrackPoint> = (0..=10)
///     .map(|i| TrackPoint::new(0.0, i as f64 * 0.0009))
///     .collect();
/// let bins = bin_route(&route, 300.0, None, None);
/// assert_eq!(bins.first().unwrap().start_index, 0);
/// assert_eq!(bins.last().unwrap().end_index, 10);
/// ```
pub fn bin_route(
    points: &[TrackPoint],
    bin_length_meters: f64,
    model: Option<&GradeAdjustmentModel>,
    target_velocity_mps: Option<f64>,
) -> Vec<Bin> {
    if points.len() < 2 || !(bin_length_meters > 0.0) {
        return Vec::new();
    }
    let target_velocity = target_velocity_mps.filter(|v| v.is_finite() && *v > 0.0);

    let mut bins = Vec::with_capacity(estimate_capacity(points.len()));
    let mut start_index = 0;
    let mut accumulated = 0.0;

    for i in 1..points.len() {
        accumulated += step_distance(&points[i - 1], &points[i]);
        if accumulated >= bin_length_meters {
            bins.push(build_bin(
                points,
                start_index,
                i,
                accumulated,
                model,
                target_velocity,
            ));
            start_index = i;
            accumulated = 0.0;
        }
    }

    // Partial tail; trailing points that add no distance get no bin
    let last = points.len() - 1;
    if start_index < last && accumulated > 0.0 {
        bins.push(build_bin(
            points,
            start_index,
            last,
            accumulated,
            model,
            target_velocity,
        ));
    }

    let untimed = bins.iter().filter(|b| !b.has_time()).count();
    if untimed > 0 {
        debug!("[Binning] {} of {} bins have no time data", untimed, bins.len());
    }
    info!(
        "[Binning] {} points -> {} bins of {}m (model: {}, target: {:?} m/s)",
        points.len(),
        bins.len(),
        bin_length_meters,
        model.is_some(),
        target_velocity
    );

    bins
}

fn estimate_capacity(point_count: usize) -> usize {
    (point_count / 4).max(1)
}

fn build_bin(
    points: &[TrackPoint],
    start_index: usize,
    end_index: usize,
    distance: f64,
    model: Option<&GradeAdjustmentModel>,
    target_velocity: Option<f64>,
) -> Bin {
    let start = &points[start_index];
    let end = &points[end_index];

    let elevation_change = match (start.valid_elevation(), end.valid_elevation()) {
        (Some(a), Some(b)) => b - a,
        _ => 0.0,
    };
    let gradient = if distance > 0.0 {
        elevation_change / distance * 100.0
    } else {
        0.0
    };

    let elapsed = end
        .seconds_since(start)
        .filter(|s| s.is_finite() && *s > 0.0);
    let velocity = elapsed.map(|s| distance / s);
    let pace = velocity.filter(|v| *v > 0.0).map(|v| 1000.0 / v / 60.0);

    let factor = adjustment_factor(model, gradient);
    let (grade_adjusted_distance, adjusted_time) = match target_velocity {
        Some(v) if factor.is_finite() && factor > 0.0 => {
            let adjusted = distance * factor;
            (Some(adjusted), Some(adjusted / v))
        }
        _ => (None, None),
    };

    Bin {
        distance_meters: distance,
        elevation_change_meters: elevation_change,
        gradient_percent: gradient,
        elapsed_seconds: elapsed,
        velocity_mps: velocity,
        pace_min_per_km: pace,
        adjustment_factor: factor,
        grade_adjusted_distance_meters: grade_adjusted_distance,
        adjusted_time_seconds: adjusted_time,
        start_index,
        end_index,
        start_time: start.time,
        end_time: end.time,
    }
}
