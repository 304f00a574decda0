//! # Trail Analytics
//!
//! Performance analytics for GPS trail and road running tracks.
//!
//! This library provides:
//! - Geodesic distance and elevation-gain utilities (haversine)
//! - Fixed-length segment binning with grade-adjusted distance and time
//! - Quartic grade-adjustment model fitting from a reference dataset
//! - Climb detection using a gain/loss hysteresis rule
//! - Checkpoint time projection, including "what-if" pace overrides
//!
//! The engine is pure and synchronous: every call is a full recomputation
//! from the points it is given, and nothing is cached between calls.
//!
//! ## Features
//!
//! - **`parallel`** - Analyse several routes at once with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_analytics::{bin_route, GradeAdjustmentModel, TrackPoint};
//!
//! let reference_gradients = [-10.0, -5.0, 0.0, 5.0, 10.0];
//! let reference_factors = [1.5, 1.1, 1.0, 1.2, 1.6];
//! let model = GradeAdjustmentModel::fit(&reference_gradients, &reference_factors).unwrap();
//!
//! let route: Vec<TrackPoint> = (0..20)
//!     .map(|i| TrackPoint::new(46.0 + i as f64 * 0.0005, 7.0).with_elevation(1000.0 + i as f64 * 5.0))
//!     .collect();
//!
//! // 4:30 min/km target pace
//! let bins = bin_route(&route, 200.0, Some(&model), Some(1000.0 / 270.0));
//! for bin in &bins {
//!     println!("{:.0}m at {:+.1}% -> {:?}s", bin.distance_meters, bin.gradient_percent, bin.adjusted_time_seconds);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailError};

// Geographic utilities (distance, elevation gain, bounds)
pub mod geo_utils;
pub use geo_utils::{cumulative_distances, elevation_gain, haversine_distance};

// Pre-processing filters (pause removal, smoothing, downsampling)
pub mod preprocess;
pub use preprocess::{remove_pauses, smooth_elevations, PauseRemoval};

// Grade-adjustment model (quartic fit of pace factor against gradient)
pub mod model;
pub use model::{GradeAdjustmentModel, ReferenceDataset, GRADIENT_CLAMP_PERCENT};

// Fixed-length segment binning
pub mod binning;
pub use binning::{bin_route, Bin};

// Climb detection
pub mod climbs;
pub use climbs::{detect_climbs, Climb, ClimbConfig};

// Checkpoints and time projection
pub mod checkpoints;
pub use checkpoints::{
    checkpoint_bin_indices, checkpoint_splits, compare_checkpoints, project_checkpoints,
    recompute_with_overrides, Checkpoint, CheckpointComparison, CheckpointList, CheckpointMode,
    CheckpointProjection, CheckpointSplit, PaceOverrideProjection,
};

// Route-level and bin-level aggregates
pub mod stats;
pub use stats::{GradientGroup, RouteSummary, GRADIENT_GROUPS, GRADIENT_SUMMARY_GROUPS};

// Pace and duration formatting
pub mod format;

// One-call pipeline and configuration
pub mod analysis;
#[cfg(feature = "parallel")]
pub use analysis::analyze_routes_parallel;
pub use analysis::{analyze_route, analyze_routes, AnalysisConfig, RouteAnalysis};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS sample along a route.
///
/// Elevation and time are optional: planned routes usually carry no
/// timestamps, and some devices drop elevation. Every consumer treats a
/// missing value as "unavailable" rather than zero.
///
/// # Example
/// ```
/// use trail_analytics::TrackPoint;
/// let point = TrackPoint::new(45.8326, 6.8652).with_elevation(4808.0); // Mont Blanc
/// assert_eq!(point.valid_elevation(), Some(4808.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl TrackPoint {
    /// Create a point with no elevation and no timestamp.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            time: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Build a point from a `[lat, lon]` or `[lat, lon, ele]` coordinate array.
    ///
    /// Returns `None` for arrays shorter than two values.
    pub fn from_array(coords: &[f64]) -> Option<Self> {
        match coords {
            [lat, lon] => Some(Self::new(*lat, *lon)),
            [lat, lon, ele, ..] => Some(Self::new(*lat, *lon).with_elevation(*ele)),
            _ => None,
        }
    }

    /// Check if latitude and longitude are usable numbers.
    pub fn has_valid_position(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Elevation, only if present and finite.
    pub fn valid_elevation(&self) -> Option<f64> {
        self.elevation.filter(|e| e.is_finite())
    }

    /// Seconds elapsed since `earlier`, if both points carry a timestamp.
    pub fn seconds_since(&self, earlier: &TrackPoint) -> Option<f64> {
        match (self.time, earlier.time) {
            (Some(end), Some(start)) => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// Bounding box for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from track points, ignoring points without a valid position.
    pub fn from_points(points: &[TrackPoint]) -> Option<Self> {
        let mut valid = points.iter().filter(|p| p.has_valid_position()).peekable();
        valid.peek()?;

        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in valid {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> TrackPoint {
        TrackPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_track_point_from_array() {
        let p = TrackPoint::from_array(&[46.0, 7.0, 1200.0]).unwrap();
        assert_eq!(p.elevation, Some(1200.0));
        assert!(p.time.is_none());

        let flat = TrackPoint::from_array(&[46.0, 7.0]).unwrap();
        assert_eq!(flat.elevation, None);

        assert!(TrackPoint::from_array(&[46.0]).is_none());
    }

    #[test]
    fn test_track_point_validation() {
        assert!(TrackPoint::new(46.0, 7.0).has_valid_position());
        assert!(!TrackPoint::new(f64::NAN, 7.0).has_valid_position());
        assert_eq!(TrackPoint::new(0.0, 0.0).with_elevation(f64::NAN).valid_elevation(), None);
    }

    #[test]
    fn test_seconds_since() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let a = TrackPoint::new(0.0, 0.0).with_time(t0);
        let b = TrackPoint::new(0.0, 0.001).with_time(t0 + chrono::Duration::seconds(90));
        assert_eq!(b.seconds_since(&a), Some(90.0));
        assert_eq!(TrackPoint::new(0.0, 0.0).seconds_since(&a), None);
    }

    #[test]
    fn test_bounds_skip_invalid() {
        let points = vec![
            TrackPoint::new(46.0, 7.0),
            TrackPoint::new(f64::NAN, 100.0),
            TrackPoint::new(46.2, 7.4),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lng, 7.0);
        assert_eq!(bounds.max_lng, 7.4);
        let center = bounds.center();
        assert!((center.latitude - 46.1).abs() < 1e-9);

        assert!(Bounds::from_points(&[]).is_none());
    }
}
