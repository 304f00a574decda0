//! One-call analysis pipeline.
//!
//! `analyze_route` runs the whole chain on a track:
//! downsample -> remove pauses -> smooth elevation -> bin -> detect climbs
//! -> summarise. Every call recomputes from scratch; the caller owns and
//! persists the [`AnalysisConfig`].

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::binning::{bin_route, Bin};
use crate::checkpoints::{
    checkpoint_splits, project_checkpoints, recompute_with_overrides, CheckpointList,
    CheckpointMode, CheckpointProjection, CheckpointSplit, PaceOverrideProjection,
};
use crate::climbs::{detect_climbs, Climb, ClimbConfig};
use crate::error::{OptionExt, Result, TrailError};
use crate::format::pace_to_velocity;
use crate::model::GradeAdjustmentModel;
use crate::preprocess::{remove_pauses, smooth_elevations, take_every_nth};
use crate::stats::{
    average_pace_from_bins, gap_from_grade_adjusted_distance, overall_grade_adjusted_pace,
    total_adjusted_time, RouteSummary,
};
use crate::TrackPoint;

/// Minimum points needed to form a single bin.
const MIN_ROUTE_POINTS: usize = 2;

/// Configuration for [`analyze_route`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Target bin length along the path (meters).
    /// Default: 50.0
    pub bin_length_m: f64,

    /// Minimum gain for a climb to be reported (meters).
    /// Default: 50.0
    pub min_climb_gain_m: f64,

    /// Drop below a climb's high point that ends it (meters).
    /// Default: 20.0
    pub max_climb_loss_m: f64,

    /// Flat-ground target pace used for projected times (min/km).
    /// Default: 4.5 (4:30/km)
    pub target_pace_min_per_km: f64,

    /// Shift timestamps to cut out long pauses.
    /// Default: false
    pub remove_pauses: bool,

    /// Gap between samples treated as a pause (seconds).
    /// Default: 120.0
    pub pause_threshold_s: f64,

    /// Apply a moving average to elevation before binning.
    /// Default: false
    pub smooth_elevation: bool,

    /// Moving-average window (samples).
    /// Default: 7
    pub smoothing_window: usize,

    /// Keep every Nth point. 1 keeps the full track.
    /// Default: 1
    pub downsample_factor: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bin_length_m: 50.0,
            min_climb_gain_m: 50.0,
            max_climb_loss_m: 20.0,
            target_pace_min_per_km: 4.5,
            remove_pauses: false,
            pause_threshold_s: 120.0,
            smooth_elevation: false,
            smoothing_window: 7,
            downsample_factor: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("bin_length_m", self.bin_length_m),
            ("min_climb_gain_m", self.min_climb_gain_m),
            ("max_climb_loss_m", self.max_climb_loss_m),
            ("target_pace_min_per_km", self.target_pace_min_per_km),
            ("pause_threshold_s", self.pause_threshold_s),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TrailError::InvalidConfig {
                    message: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        if self.smoothing_window == 0 {
            return Err(TrailError::InvalidConfig {
                message: "smoothing_window must be at least 1".to_string(),
            });
        }
        if self.downsample_factor == 0 {
            return Err(TrailError::InvalidConfig {
                message: "downsample_factor must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn climb_config(&self) -> ClimbConfig {
        ClimbConfig {
            min_gain_meters: self.min_climb_gain_m,
            max_loss_meters: self.max_climb_loss_m,
        }
    }

    /// Target velocity derived from the target pace (m/s).
    pub fn target_velocity_mps(&self) -> Option<f64> {
        pace_to_velocity(self.target_pace_min_per_km)
    }
}

/// Everything computed for one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub config: AnalysisConfig,
    /// Track after pre-processing; bin and climb indices refer to this
    pub points: Vec<TrackPoint>,
    pub summary: RouteSummary,
    pub bins: Vec<Bin>,
    pub climbs: Vec<Climb>,
    /// Pause time cut out of the timeline (seconds)
    pub removed_pause_seconds: f64,
    /// Recorded pace over the bins (min/km)
    pub average_pace_min_per_km: Option<f64>,
    /// Recorded time over grade-adjusted distance (min/km)
    pub grade_adjusted_pace_min_per_km: Option<f64>,
    /// Projected pace at the target effort (min/km)
    pub projected_pace_min_per_km: Option<f64>,
    /// Projected time for the full route (seconds)
    pub projected_total_seconds: f64,
    /// Coefficients `[a, b, c, d, e]` of the model used, if any
    pub model_coefficients: Option<[f64; 5]>,
}

impl RouteAnalysis {
    /// Projected checkpoint times from the bins' adjusted times.
    pub fn project(&self, checkpoints: &CheckpointList) -> Vec<CheckpointProjection> {
        project_checkpoints(checkpoints.as_slice(), &self.bins)
    }

    /// Projected checkpoint times with per-segment pace overrides (min/km).
    pub fn project_with_overrides(
        &self,
        checkpoints: &CheckpointList,
        overrides_min_per_km: &[Option<f64>],
    ) -> Vec<PaceOverrideProjection> {
        recompute_with_overrides(
            checkpoints.as_slice(),
            &self.bins,
            overrides_min_per_km,
            self.config.target_pace_min_per_km,
        )
    }

    /// Recorded splits and projections for each checkpoint.
    pub fn splits(&self, checkpoints: &CheckpointList) -> Vec<CheckpointSplit> {
        checkpoint_splits(checkpoints.as_slice(), &self.points, &self.bins)
    }

    /// A checkpoint list spanning this route.
    pub fn default_checkpoints(&self, mode: CheckpointMode) -> CheckpointList {
        CheckpointList::new(self.summary.distance_km, mode)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run the full pipeline on one track.
///
/// Returns `InvalidConfig` for an out-of-range config and
/// `InsufficientData` when fewer than two points have a valid position.
pub fn analyze_route(
    points: &[TrackPoint],
    config: &AnalysisConfig,
    model: Option<&GradeAdjustmentModel>,
) -> Result<RouteAnalysis> {
    config.validate()?;

    let valid: Vec<TrackPoint> = points
        .iter()
        .filter(|p| p.has_valid_position())
        .copied()
        .collect();
    if valid.len() < points.len() {
        debug!(
            "[Analysis] Dropped {} points without a valid position",
            points.len() - valid.len()
        );
    }
    if valid.len() < MIN_ROUTE_POINTS {
        return Err(TrailError::InsufficientData {
            available: valid.len(),
            minimum_required: MIN_ROUTE_POINTS,
            message: "route needs at least two positioned points".to_string(),
        });
    }

    // Pauses are measured on the full-resolution track
    let mut removed_pause_seconds = 0.0;
    let full = if config.remove_pauses {
        let removal = remove_pauses(&valid, config.pause_threshold_s);
        removed_pause_seconds = removal.removed_seconds;
        removal.points
    } else {
        valid
    };

    let mut processed = take_every_nth(&full, config.downsample_factor);
    if processed.len() < MIN_ROUTE_POINTS {
        // Downsampling must not collapse a route to a single point
        let endpoints = full
            .first()
            .zip(full.last())
            .map(|(first, last)| vec![*first, *last])
            .ok_or_insufficient_data(full.len(), MIN_ROUTE_POINTS, "route has no points")?;
        processed = endpoints;
    }

    if config.smooth_elevation {
        processed = smooth_elevations(&processed, config.smoothing_window);
    }

    let bins = bin_route(
        &processed,
        config.bin_length_m,
        model,
        config.target_velocity_mps(),
    );
    let climbs = detect_climbs(&processed, &config.climb_config());
    let summary = RouteSummary::from_points(&processed);

    let analysis = RouteAnalysis {
        average_pace_min_per_km: average_pace_from_bins(&bins),
        grade_adjusted_pace_min_per_km: gap_from_grade_adjusted_distance(&bins),
        projected_pace_min_per_km: overall_grade_adjusted_pace(&bins),
        projected_total_seconds: total_adjusted_time(&bins, None),
        model_coefficients: model.map(|m| m.coefficients),
        config: config.clone(),
        points: processed,
        summary,
        bins,
        climbs,
        removed_pause_seconds,
    };

    info!(
        "[Analysis] {:.2} km, {} bins, {} climbs, projected {:.0}s",
        analysis.summary.distance_km,
        analysis.bins.len(),
        analysis.climbs.len(),
        analysis.projected_total_seconds
    );
    Ok(analysis)
}

/// Analyse several tracks with the same config and model.
pub fn analyze_routes(
    routes: &[Vec<TrackPoint>],
    config: &AnalysisConfig,
    model: Option<&GradeAdjustmentModel>,
) -> Vec<Result<RouteAnalysis>> {
    routes
        .iter()
        .map(|route| analyze_route(route, config, model))
        .collect()
}

/// Parallel [`analyze_routes`]; results keep the input order.
#[cfg(feature = "parallel")]
pub fn analyze_routes_parallel(
    routes: &[Vec<TrackPoint>],
    config: &AnalysisConfig,
    model: Option<&GradeAdjustmentModel>,
) -> Vec<Result<RouteAnalysis>> {
    use rayon::prelude::*;

    info!("[Analysis] Analysing {} routes in parallel", routes.len());
    routes
        .par_iter()
        .map(|route| analyze_route(route, config, model))
        .collect()
}
