//! Pre-processing filters applied to a track before analysis.
//!
//! None of these are part of the core math; they are optional clean-up
//! passes the caller can enable (see [`crate::AnalysisConfig`]). Each one
//! returns a new vector and leaves the input untouched.

use chrono::Duration;
use geo::{algorithm::simplify::SimplifyIdx, Coord, LineString};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::cumulative_distances;
use crate::TrackPoint;

/// Result of removing pauses from a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseRemoval {
    /// Points with timestamps shifted back by the accumulated pause time
    pub points: Vec<TrackPoint>,
    /// Total pause time removed (seconds)
    pub removed_seconds: f64,
}

/// Remove pauses longer than `threshold_seconds` from the timeline.
///
/// Every gap between consecutive timestamped samples that exceeds the
/// threshold is added to a running total, and each later timestamp is
/// shifted back by that total. Points without a timestamp are passed
/// through unchanged.
pub fn remove_pauses(points: &[TrackPoint], threshold_seconds: f64) -> PauseRemoval {
    if points.len() < 2 {
        return PauseRemoval {
            points: points.to_vec(),
            removed_seconds: 0.0,
        };
    }

    let mut adjusted = Vec::with_capacity(points.len());
    adjusted.push(points[0]);
    let mut total_pause = 0.0;

    for w in points.windows(2) {
        let (prev, curr) = (&w[0], &w[1]);
        match (curr.seconds_since(prev), curr.time) {
            (Some(delta), Some(time)) => {
                if delta > threshold_seconds {
                    total_pause += delta;
                }
                let shift = Duration::milliseconds((total_pause * 1000.0).round() as i64);
                adjusted.push(TrackPoint {
                    time: Some(time - shift),
                    ..*curr
                });
            }
            _ => adjusted.push(*curr),
        }
    }

    if total_pause > 0.0 {
        debug!("[Preprocess] Removed {:.0}s of pauses", total_pause);
    }

    PauseRemoval {
        points: adjusted,
        removed_seconds: total_pause,
    }
}

/// Centred moving average of elevation.
///
/// Each point's elevation becomes the mean of the valid elevations within
/// `window_size / 2` samples on either side. Points with no valid elevation
/// in their window keep their original value.
pub fn smooth_elevations(points: &[TrackPoint], window_size: usize) -> Vec<TrackPoint> {
    if points.is_empty() {
        return Vec::new();
    }
    let half = window_size / 2;
    let last = points.len() - 1;

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(last);
            let (sum, count) = points[lo..=hi]
                .iter()
                .filter_map(|q| q.valid_elevation())
                .fold((0.0, 0usize), |(s, c), e| (s + e, c + 1));
            if count == 0 {
                *p
            } else {
                TrackPoint {
                    elevation: Some(sum / count as f64),
                    ..*p
                }
            }
        })
        .collect()
}

/// Keep every `n`th point, starting with the first.
///
/// `n <= 1` returns the track unchanged.
pub fn take_every_nth(points: &[TrackPoint], n: usize) -> Vec<TrackPoint> {
    if n <= 1 {
        return points.to_vec();
    }
    points.iter().step_by(n).copied().collect()
}

/// Reduce a track to at most roughly `max_points`, always keeping the last point.
pub fn downsample_to_max(points: &[TrackPoint], max_points: usize) -> Vec<TrackPoint> {
    if max_points == 0 || points.len() <= max_points {
        return points.to_vec();
    }
    let step = points.len().div_ceil(max_points);
    let last = points.len() - 1;
    points
        .iter()
        .enumerate()
        .filter(|(i, _)| i % step == 0 || *i == last)
        .map(|(_, p)| *p)
        .collect()
}

/// Douglas-Peucker simplification that keeps the original samples.
///
/// Tolerance is in degrees. Points without a valid position are dropped
/// before simplification. Elevation and time of the retained samples are
/// preserved as-is.
pub fn simplify_track(points: &[TrackPoint], tolerance_degrees: f64) -> Vec<TrackPoint> {
    let valid: Vec<TrackPoint> = points
        .iter()
        .filter(|p| p.has_valid_position())
        .copied()
        .collect();
    if valid.len() < 3 {
        return valid;
    }

    let line: LineString<f64> = valid
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    line.simplify_idx(&tolerance_degrees)
        .into_iter()
        .map(|i| valid[i])
        .collect()
}

/// Keep only the leading part of the track up to `max_meters` along the path.
pub fn trim_to_distance(points: &[TrackPoint], max_meters: f64) -> Vec<TrackPoint> {
    cumulative_distances(points)
        .into_iter()
        .zip(points.iter())
        .take_while(|(d, _)| *d <= max_meters)
        .map(|(_, p)| *p)
        .collect()
}
