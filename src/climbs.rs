//! Climb detection over the full-resolution track.
//!
//! A climb opens tentatively at the first point and tracks the highest
//! elevation reached since it opened. It closes as soon as the track falls
//! more than `max_loss_meters` below that high-water mark, and it is only
//! reported if the gain from its start to the high-water mark reached
//! `min_gain_meters`. After every close a new tentative climb opens at the
//! point that triggered it.
//!
//! Works on raw points rather than bins so short, steep ramps are not
//! averaged away by bin granularity.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::geo_utils::step_distance;
use crate::TrackPoint;

/// Thresholds for climb detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimbConfig {
    /// Minimum gain from start to high point to report a climb (meters).
    /// Default: 50.0
    pub min_gain_meters: f64,
    /// Drop below the high point that ends a climb (meters).
    /// Default: 20.0
    pub max_loss_meters: f64,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            min_gain_meters: 50.0,
            max_loss_meters: 20.0,
        }
    }
}

/// A detected sustained ascent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climb {
    /// Sequential name, "climb 1", "climb 2", ...
    pub name: String,
    /// Distance from route start to climb start (km, one decimal)
    pub start_distance_km: f64,
    /// Gain from start to high point (meters, rounded)
    pub gain_meters: f64,
    /// Path length of the climb (km, one decimal)
    pub distance_km: f64,
    /// Gain over distance (percent, rounded)
    pub avg_gradient_percent: f64,
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A tentative climb being scanned.
struct OpenClimb {
    start_index: usize,
    start_distance: f64,
    start_elevation: Option<f64>,
    high_water: Option<f64>,
    distance: f64,
}

impl OpenClimb {
    fn new(start_index: usize, start_distance: f64, point: &TrackPoint) -> Self {
        let elevation = point.valid_elevation();
        Self {
            start_index,
            start_distance,
            start_elevation: elevation,
            high_water: elevation,
            distance: 0.0,
        }
    }

    /// Record a new elevation; the first valid one anchors the start.
    fn observe(&mut self, elevation: f64) {
        if self.start_elevation.is_none() {
            self.start_elevation = Some(elevation);
        }
        self.high_water = Some(self.high_water.map_or(elevation, |h| h.max(elevation)));
    }

    fn gain(&self) -> f64 {
        match (self.start_elevation, self.high_water) {
            (Some(start), Some(high)) => high - start,
            _ => 0.0,
        }
    }
}

enum ScanState {
    Idle,
    InClimb(OpenClimb),
}

/// Find sustained climbs in a track.
///
/// Points without a valid elevation still add distance but never move the
/// high-water mark or trigger a close.
pub fn detect_climbs(points: &[TrackPoint], config: &ClimbConfig) -> Vec<Climb> {
    let mut climbs = Vec::new();
    if points.len() < 2 {
        return climbs;
    }

    let mut state = ScanState::Idle;
    let mut travelled = 0.0;

    for i in 1..points.len() {
        let prev = &points[i - 1];
        let curr = &points[i];

        let mut climb = match std::mem::replace(&mut state, ScanState::Idle) {
            ScanState::InClimb(open) => open,
            ScanState::Idle => OpenClimb::new(i - 1, travelled, prev),
        };

        let step = step_distance(prev, curr);
        climb.distance += step;
        travelled += step;

        let mut closed = false;
        if let Some(elevation) = curr.valid_elevation() {
            climb.observe(elevation);
            if let Some(high) = climb.high_water {
                if elevation < high - config.max_loss_meters {
                    if climb.gain() >= config.min_gain_meters {
                        let number = climbs.len() + 1;
                        climbs.push(finish(&climb, points, i, number));
                    }
                    closed = true;
                }
            }
        }

        if !closed {
            state = ScanState::InClimb(climb);
        }
    }

    if let ScanState::InClimb(climb) = state {
        if climb.gain() >= config.min_gain_meters {
            let number = climbs.len() + 1;
            climbs.push(finish(&climb, points, points.len() - 1, number));
        }
    }

    info!(
        "[Climbs] Found {} climbs (min gain {}m, max loss {}m)",
        climbs.len(),
        config.min_gain_meters,
        config.max_loss_meters
    );
    climbs
}

fn finish(climb: &OpenClimb, points: &[TrackPoint], end_index: usize, number: usize) -> Climb {
    let gain = climb.gain();
    let avg_gradient = if climb.distance > 0.0 {
        (gain / climb.distance * 100.0).round()
    } else {
        0.0
    };

    Climb {
        name: format!("climb {}", number),
        start_distance_km: round_to_tenth(climb.start_distance / 1000.0),
        gain_meters: gain.round(),
        distance_km: round_to_tenth(climb.distance / 1000.0),
        avg_gradient_percent: avg_gradient,
        start_index: climb.start_index,
        end_index,
        start_time: points[climb.start_index].time,
        end_time: points[end_index].time,
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
