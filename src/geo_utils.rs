//! Geographic utilities: great-circle distance, cumulative distance along a
//! track, elevation gain and bounds.
//!
//! All functions are pure. Pairs with a non-finite coordinate or elevation
//! contribute nothing instead of poisoning the running totals.

use crate::{Bounds, TrackPoint};

/// Mean Earth radius used for all distance computations (meters).
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Calculate the great-circle distance between two points in meters.
///
/// Uses the haversine formula. NaN coordinates propagate as NaN.
///
/// # Example
/// ```
/// use trail_analytics::{haversine_distance, TrackPoint};
///
/// let chamonix = TrackPoint::new(45.9237, 6.8694);
/// let zermatt = TrackPoint::new(46.0207, 7.7491);
/// let d = haversine_distance(&chamonix, &zermatt);
/// assert!((d - 68_700.0).abs() < 1_000.0);
/// ```
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Distance between two consecutive samples, or 0 if either position is unusable.
pub(crate) fn step_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    if p1.has_valid_position() && p2.has_valid_position() {
        haversine_distance(p1, p2)
    } else {
        0.0
    }
}

/// Running distance along the track in meters, one value per point.
///
/// The first value is always 0.
pub fn cumulative_distances(points: &[TrackPoint]) -> Vec<f64> {
    let mut result = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += step_distance(&points[i - 1], point);
        }
        result.push(total);
    }
    result
}

/// Running distance along the track in kilometers.
pub fn cumulative_distances_km(points: &[TrackPoint]) -> Vec<f64> {
    cumulative_distances(points)
        .into_iter()
        .map(|d| d / 1000.0)
        .collect()
}

/// Total path length in meters.
pub fn total_distance(points: &[TrackPoint]) -> f64 {
    points.windows(2).map(|w| step_distance(&w[0], &w[1])).sum()
}

/// Sum of all positive elevation deltas between consecutive points.
///
/// Pairs where either elevation is missing are skipped.
pub fn elevation_gain(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .filter_map(|w| match (w[0].valid_elevation(), w[1].valid_elevation()) {
            (Some(a), Some(b)) if b > a => Some(b - a),
            _ => None,
        })
        .sum()
}

/// Average gradient from the first to the last point of a slice, in percent.
///
/// Returns `None` when the slice has no usable elevation at either end or
/// covers no distance.
pub fn segment_gradient(points: &[TrackPoint]) -> Option<f64> {
    let first = points.first()?.valid_elevation()?;
    let last = points.last()?.valid_elevation()?;
    let distance = total_distance(points);
    if distance <= 0.0 {
        return None;
    }
    Some((last - first) / distance * 100.0)
}

/// Compute the bounding box of a track.
pub fn compute_bounds(points: &[TrackPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}
