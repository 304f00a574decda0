//! Checkpoints and checkpoint time projection.
//!
//! A [`CheckpointList`] is the user-editable set of distance markers along a
//! route. It is always sorted, never holds two markers within 1 mm of each
//! other, and always starts with `Start` at km 0.
//!
//! The projector maps each checkpoint onto the first bin whose cumulative
//! end distance reaches it and sums bin-level metrics per segment:
//! - [`project_checkpoints`] uses each bin's precomputed adjusted time
//! - [`recompute_with_overrides`] re-prices grade-adjusted distance with a
//!   per-segment pace, so "what-if" edits never require re-binning
//!
//! Both are a single pass over bins and checkpoints.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::binning::Bin;
use crate::geo_utils::{cumulative_distances_km, elevation_gain};
use crate::TrackPoint;

/// Two checkpoints closer than this are the same checkpoint (km).
pub const CHECKPOINT_EPSILON_KM: f64 = 1e-6;

pub const START_NAME: &str = "Start";
pub const END_NAME: &str = "End";

/// A named distance marker along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub distance_km: f64,
    pub name: String,
}

impl Checkpoint {
    pub fn new(distance_km: f64, name: impl Into<String>) -> Self {
        Self {
            distance_km,
            name: name.into(),
        }
    }

    fn is_at(&self, km: f64) -> bool {
        (self.distance_km - km).abs() < CHECKPOINT_EPSILON_KM
    }
}

/// Editing rules for a checkpoint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckpointMode {
    /// Single-route view: `Start` and `End` are both protected
    #[default]
    Standard,
    /// Two-route comparison: `End` may be deleted
    Comparison,
}

/// Sorted, de-duplicated checkpoints with a protected `Start` (and `End`).
///
/// Deserialising goes through [`CheckpointList::from_checkpoints`], so a
/// stored list comes back normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredCheckpointList")]
pub struct CheckpointList {
    checkpoints: Vec<Checkpoint>,
    max_distance_km: f64,
    mode: CheckpointMode,
}

#[derive(Deserialize)]
struct StoredCheckpointList {
    checkpoints: Vec<Checkpoint>,
    max_distance_km: f64,
    #[serde(default)]
    mode: CheckpointMode,
}

impl From<StoredCheckpointList> for CheckpointList {
    fn from(stored: StoredCheckpointList) -> Self {
        Self::from_checkpoints(stored.checkpoints, stored.max_distance_km, stored.mode)
    }
}

impl CheckpointList {
    /// A list holding only `Start` and, for a non-empty route, `End`.
    pub fn new(max_distance_km: f64, mode: CheckpointMode) -> Self {
        Self::from_checkpoints(Vec::new(), max_distance_km, mode)
    }

    /// Normalise an existing set of checkpoints (e.g. restored by the caller).
    pub fn from_checkpoints(
        checkpoints: Vec<Checkpoint>,
        max_distance_km: f64,
        mode: CheckpointMode,
    ) -> Self {
        let mut list = Self {
            checkpoints: checkpoints
                .into_iter()
                .filter(|cp| cp.distance_km.is_finite())
                .collect(),
            max_distance_km: sanitize_km(max_distance_km),
            mode,
        };
        list.ensure_end();
        list.normalize();
        list
    }

    pub fn max_distance_km(&self) -> f64 {
        self.max_distance_km
    }

    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    /// Update the route length. `End` moves to the new maximum and is
    /// re-inserted if it had been deleted.
    pub fn set_max_distance(&mut self, max_distance_km: f64) {
        let max_distance_km = sanitize_km(max_distance_km);
        if (max_distance_km - self.max_distance_km).abs() < CHECKPOINT_EPSILON_KM
            && self.has_end()
        {
            return;
        }
        self.max_distance_km = max_distance_km;
        self.checkpoints.retain(|cp| cp.name != END_NAME);
        self.ensure_end();
        self.normalize();
    }

    /// Add a checkpoint at `distance_km`, named `Checkpoint N`.
    ///
    /// Returns `false` (and leaves the list unchanged) when the distance is
    /// outside `[0, max_distance_km]` or a checkpoint already sits there.
    pub fn add(&mut self, distance_km: f64) -> bool {
        if !distance_km.is_finite() || distance_km < 0.0 || distance_km > self.max_distance_km {
            warn!(
                "[Checkpoints] Rejected checkpoint at {} km (route is {} km)",
                distance_km, self.max_distance_km
            );
            return false;
        }
        if self
            .checkpoints
            .iter()
            .any(|cp| (cp.distance_km - distance_km).abs() <= CHECKPOINT_EPSILON_KM)
        {
            debug!("[Checkpoints] Checkpoint at {} km already exists", distance_km);
            return false;
        }
        let manual = self
            .checkpoints
            .iter()
            .filter(|cp| cp.name != START_NAME && !cp.name.starts_with(END_NAME))
            .count();
        self.checkpoints
            .push(Checkpoint::new(distance_km, format!("Checkpoint {}", manual + 1)));
        self.normalize();
        true
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> bool {
        match self.checkpoints.get_mut(index) {
            Some(cp) => {
                cp.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Delete the checkpoint at `index`.
    ///
    /// The checkpoint at km 0 is never deleted; the one at the route end is
    /// only deletable in [`CheckpointMode::Comparison`].
    pub fn delete(&mut self, index: usize) -> bool {
        let Some(cp) = self.checkpoints.get(index) else {
            return false;
        };
        if cp.is_at(0.0) {
            return false;
        }
        if self.mode == CheckpointMode::Standard && cp.is_at(self.max_distance_km) {
            return false;
        }
        self.checkpoints.remove(index);
        true
    }

    pub fn as_slice(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    fn has_end(&self) -> bool {
        self.max_distance_km <= 0.0 || self.checkpoints.iter().any(|cp| cp.is_at(self.max_distance_km))
    }

    fn ensure_end(&mut self) {
        if !self.has_end() {
            self.checkpoints
                .push(Checkpoint::new(self.max_distance_km, END_NAME));
        }
    }

    /// Guarantee `Start`, sort ascending, drop near-duplicates (first wins).
    fn normalize(&mut self) {
        if !self.checkpoints.iter().any(|cp| cp.is_at(0.0)) {
            self.checkpoints.insert(0, Checkpoint::new(0.0, START_NAME));
        }
        self.checkpoints
            .sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        self.checkpoints.dedup_by(|later, earlier| {
            (later.distance_km - earlier.distance_km).abs() <= CHECKPOINT_EPSILON_KM
        });
    }
}

impl<'a> IntoIterator for &'a CheckpointList {
    type Item = &'a Checkpoint;
    type IntoIter = std::slice::Iter<'a, Checkpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.checkpoints.iter()
    }
}

fn sanitize_km(km: f64) -> f64 {
    if km.is_finite() && km > 0.0 {
        km
    } else {
        0.0
    }
}

// ============================================================================
// Projection
// ============================================================================

/// Projected (model-based) time at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointProjection {
    pub checkpoint_index: usize,
    /// Projected time from the start (seconds)
    pub cumulative_adjusted_time_seconds: f64,
    /// Projected time from the previous checkpoint (seconds)
    pub segment_adjusted_time_seconds: f64,
}

/// Projected time at a checkpoint under user-edited segment paces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceOverrideProjection {
    pub checkpoint_index: usize,
    pub cumulative_seconds: f64,
    pub segment_seconds: f64,
}

/// Index of the bin each checkpoint falls into.
///
/// A checkpoint maps to the first bin whose cumulative end distance is at
/// least the checkpoint distance; checkpoints past the route end clamp to
/// the last bin. Ascending checkpoints are resolved with one forward scan.
pub fn checkpoint_bin_indices(checkpoints: &[Checkpoint], bins: &[Bin]) -> Vec<usize> {
    if bins.is_empty() {
        return Vec::new();
    }
    let last = bins.len() - 1;
    let bin_km = |bin: &Bin| {
        let km = bin.distance_km();
        if km.is_finite() {
            km
        } else {
            0.0
        }
    };

    let mut cursor = 0;
    let mut cursor_end_km = bin_km(&bins[0]);
    let mut previous_km = f64::NEG_INFINITY;
    let mut indices = Vec::with_capacity(checkpoints.len());

    for cp in checkpoints {
        let km = cp.distance_km;
        if km.is_nan() {
            indices.push(last);
            continue;
        }
        if km < previous_km {
            debug!("[Checkpoints] Out-of-order checkpoint at {} km, rescanning", km);
            cursor = 0;
            cursor_end_km = bin_km(&bins[0]);
        }
        while cursor_end_km < km && cursor < last {
            cursor += 1;
            cursor_end_km += bin_km(&bins[cursor]);
        }
        indices.push(cursor);
        previous_km = km;
    }
    indices
}

/// Cumulative totals per checkpoint.
///
/// Segment `i` (for `i >= 1`) covers bins from just after checkpoint
/// `i - 1`'s bin through checkpoint `i`'s bin; segment 1 starts at bin 0.
/// The first checkpoint is always 0. Non-finite bin values contribute 0.
fn cumulative_by_segment<F>(bin_indices: &[usize], bins: &[Bin], mut bin_value: F) -> Vec<f64>
where
    F: FnMut(usize, &Bin) -> f64,
{
    let mut cumulative = Vec::with_capacity(bin_indices.len());
    let mut total = 0.0;
    let mut next_start = 0;

    for (segment, &end) in bin_indices.iter().enumerate() {
        if segment == 0 {
            cumulative.push(0.0);
            continue;
        }
        if end >= next_start {
            for bin in &bins[next_start..=end] {
                let value = bin_value(segment, bin);
                if value.is_finite() {
                    total += value;
                }
            }
            next_start = end + 1;
        }
        cumulative.push(total);
    }
    cumulative
}

fn segment_deltas(cumulative: &[f64]) -> impl Iterator<Item = f64> + '_ {
    cumulative
        .iter()
        .enumerate()
        .map(move |(i, &c)| if i == 0 { 0.0 } else { c - cumulative[i - 1] })
}

/// Project the time to each checkpoint from the bins' adjusted times.
///
/// The first checkpoint is pinned to zero. An empty bin list yields an
/// empty result.
pub fn project_checkpoints(checkpoints: &[Checkpoint], bins: &[Bin]) -> Vec<CheckpointProjection> {
    if bins.is_empty() {
        return Vec::new();
    }
    let indices = checkpoint_bin_indices(checkpoints, bins);
    let cumulative = cumulative_by_segment(&indices, bins, |_, bin| {
        bin.adjusted_time_seconds.unwrap_or(0.0)
    });

    cumulative
        .iter()
        .zip(segment_deltas(&cumulative))
        .enumerate()
        .map(|(i, (&c, s))| CheckpointProjection {
            checkpoint_index: i,
            cumulative_adjusted_time_seconds: c,
            segment_adjusted_time_seconds: s,
        })
        .collect()
}

/// Re-project checkpoint times with per-segment pace overrides.
///
/// `overrides_min_per_km[i]` is the pace for the segment that ends at
/// checkpoint `i`; a missing, non-finite or non-positive entry falls back to
/// `default_pace_min_per_km`. Each bin costs
/// `grade_adjusted_distance_km × pace × 60` seconds.
pub fn recompute_with_overrides(
    checkpoints: &[Checkpoint],
    bins: &[Bin],
    overrides_min_per_km: &[Option<f64>],
    default_pace_min_per_km: f64,
) -> Vec<PaceOverrideProjection> {
    if bins.is_empty() {
        return Vec::new();
    }
    let pace_for = |segment: usize| {
        overrides_min_per_km
            .get(segment)
            .copied()
            .flatten()
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(default_pace_min_per_km)
    };

    let indices = checkpoint_bin_indices(checkpoints, bins);
    let cumulative = cumulative_by_segment(&indices, bins, |segment, bin| {
        bin.grade_adjusted_distance_meters
            .map_or(0.0, |d| d / 1000.0 * pace_for(segment) * 60.0)
    });

    cumulative
        .iter()
        .zip(segment_deltas(&cumulative))
        .enumerate()
        .map(|(i, (&c, s))| PaceOverrideProjection {
            checkpoint_index: i,
            cumulative_seconds: c,
            segment_seconds: s,
        })
        .collect()
}

// ============================================================================
// Splits from recorded data
// ============================================================================

/// One row of the checkpoint table: recorded splits plus projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSplit {
    pub checkpoint_index: usize,
    pub name: String,
    pub distance_km: f64,
    /// Track point nearest to the checkpoint distance
    pub point_index: usize,
    /// Recorded time from the start (seconds)
    pub elapsed_seconds: Option<f64>,
    /// Recorded time from the previous checkpoint (seconds)
    pub segment_seconds: Option<f64>,
    pub segment_distance_km: f64,
    /// Elevation gain within the segment (meters)
    pub segment_elevation_gain_meters: f64,
    /// Elevation gain from the start (meters)
    pub cumulative_elevation_gain_meters: f64,
    /// Recorded average pace over the segment (min/km)
    pub average_pace_min_per_km: Option<f64>,
    /// Recorded pace over the segment's grade-adjusted distance (min/km)
    pub grade_adjusted_pace_min_per_km: Option<f64>,
    pub projected_cumulative_seconds: Option<f64>,
    pub projected_segment_seconds: Option<f64>,
}

/// Index of the track point nearest to each checkpoint distance.
///
/// Ties resolve to the earlier point. Ascending checkpoints share a single
/// forward scan.
pub fn nearest_point_indices(distances_km: &[f64], checkpoints: &[Checkpoint]) -> Vec<usize> {
    if distances_km.is_empty() {
        return Vec::new();
    }
    let mut cursor = 0;
    let mut previous_km = f64::NEG_INFINITY;
    checkpoints
        .iter()
        .map(|cp| {
            let km = cp.distance_km;
            if km < previous_km {
                cursor = 0;
            }
            previous_km = km;
            while cursor + 1 < distances_km.len() && distances_km[cursor + 1] < km {
                cursor += 1;
            }
            if cursor + 1 < distances_km.len()
                && (distances_km[cursor + 1] - km).abs() < (distances_km[cursor] - km).abs()
            {
                cursor += 1;
            }
            cursor
        })
        .collect()
}

/// Build the per-checkpoint split table for a recorded route.
///
/// Time-based fields are `None` when the track carries no timestamps.
pub fn checkpoint_splits(
    checkpoints: &[Checkpoint],
    points: &[TrackPoint],
    bins: &[Bin],
) -> Vec<CheckpointSplit> {
    if points.is_empty() {
        return Vec::new();
    }
    let distances = cumulative_distances_km(points);
    let point_indices = nearest_point_indices(&distances, checkpoints);
    let bin_indices = checkpoint_bin_indices(checkpoints, bins);
    let projections = project_checkpoints(checkpoints, bins);
    let first = &points[0];

    let mut splits = Vec::with_capacity(checkpoints.len());
    let mut cumulative_gain = 0.0;

    for (i, cp) in checkpoints.iter().enumerate() {
        let idx = point_indices[i];
        let prev_idx = if i == 0 { 0 } else { point_indices[i - 1] };
        let point = &points[idx];

        let elapsed = point.seconds_since(first).filter(|s| *s >= 0.0);
        let segment_seconds = point
            .seconds_since(&points[prev_idx])
            .filter(|s| *s >= 0.0);
        let segment_km = (distances[idx] - distances[prev_idx]).max(0.0);
        let segment_gain = if idx > prev_idx {
            elevation_gain(&points[prev_idx..=idx])
        } else {
            0.0
        };
        cumulative_gain += segment_gain;

        let average_pace = segment_seconds
            .filter(|_| segment_km > 0.0)
            .map(|s| s / 60.0 / segment_km);

        let grade_adjusted_pace = if i == 0 || bin_indices.is_empty() {
            None
        } else {
            let start = if i == 1 { 0 } else { bin_indices[i - 1] + 1 };
            let end = bin_indices[i];
            let adjusted_km: f64 = if start <= end {
                bins[start..=end]
                    .iter()
                    .filter_map(|b| b.grade_adjusted_distance_meters)
                    .filter(|d| d.is_finite())
                    .sum::<f64>()
                    / 1000.0
            } else {
                0.0
            };
            segment_seconds
                .filter(|s| *s > 0.0 && adjusted_km > 0.0)
                .map(|s| s / 60.0 / adjusted_km)
        };

        let projection = projections.get(i);
        splits.push(CheckpointSplit {
            checkpoint_index: i,
            name: cp.name.clone(),
            distance_km: cp.distance_km,
            point_index: idx,
            elapsed_seconds: elapsed,
            segment_seconds,
            segment_distance_km: segment_km,
            segment_elevation_gain_meters: segment_gain,
            cumulative_elevation_gain_meters: cumulative_gain,
            average_pace_min_per_km: average_pace,
            grade_adjusted_pace_min_per_km: grade_adjusted_pace,
            projected_cumulative_seconds: projection.map(|p| p.cumulative_adjusted_time_seconds),
            projected_segment_seconds: projection.map(|p| p.segment_adjusted_time_seconds),
        });
    }
    splits
}

// ============================================================================
// Two-route comparison
// ============================================================================

/// One runner's recorded times at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSplit {
    pub cumulative_seconds: Option<f64>,
    pub segment_seconds: Option<f64>,
    /// Segment time as a share of the runner's total time (rounded percent)
    pub percent_of_total: Option<f64>,
}

/// Who was faster over a segment, to the nearest minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentLeader {
    Tied,
    RouteA { by_minutes: u32 },
    RouteB { by_minutes: u32 },
    Unknown,
}

/// Side-by-side split for a checkpoint in a two-route comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointComparison {
    pub checkpoint_index: usize,
    pub name: String,
    pub distance_km: f64,
    pub route_a: RunnerSplit,
    pub route_b: RunnerSplit,
    pub leader: SegmentLeader,
}

fn runner_splits(checkpoints: &[Checkpoint], points: &[TrackPoint]) -> Vec<RunnerSplit> {
    let Some(first) = points.first() else {
        return checkpoints
            .iter()
            .map(|_| RunnerSplit {
                cumulative_seconds: None,
                segment_seconds: None,
                percent_of_total: None,
            })
            .collect();
    };
    let distances = cumulative_distances_km(points);
    let indices = nearest_point_indices(&distances, checkpoints);
    let total = points
        .last()
        .and_then(|p| p.seconds_since(first))
        .filter(|t| *t > 0.0);

    let cumulative: Vec<Option<f64>> = indices
        .iter()
        .map(|&idx| points[idx].seconds_since(first).filter(|s| *s >= 0.0))
        .collect();

    cumulative
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let segment = if i == 0 {
                Some(0.0)
            } else {
                c.map(|c| c - cumulative[i - 1].unwrap_or(0.0))
            };
            let percent = match (segment, total) {
                (Some(s), Some(t)) => Some((s / t * 100.0).round()),
                _ => None,
            };
            RunnerSplit {
                cumulative_seconds: c,
                segment_seconds: segment,
                percent_of_total: percent,
            }
        })
        .collect()
}

/// Compare two recorded routes checkpoint by checkpoint.
pub fn compare_checkpoints(
    checkpoints: &[Checkpoint],
    route_a: &[TrackPoint],
    route_b: &[TrackPoint],
) -> Vec<CheckpointComparison> {
    let splits_a = runner_splits(checkpoints, route_a);
    let splits_b = runner_splits(checkpoints, route_b);

    checkpoints
        .iter()
        .zip(splits_a.into_iter().zip(splits_b))
        .enumerate()
        .map(|(i, (cp, (a, b)))| {
            let leader = if i == 0 {
                SegmentLeader::Tied
            } else {
                match (a.segment_seconds, b.segment_seconds) {
                    (Some(sa), Some(sb)) => {
                        let minutes = ((sa - sb).abs() / 60.0).round() as u32;
                        if minutes == 0 {
                            SegmentLeader::Tied
                        } else if sa < sb {
                            SegmentLeader::RouteA { by_minutes: minutes }
                        } else {
                            SegmentLeader::RouteB { by_minutes: minutes }
                        }
                    }
                    _ => SegmentLeader::Unknown,
                }
            };
            CheckpointComparison {
                checkpoint_index: i,
                name: cp.name.clone(),
                distance_km: cp.distance_km,
                route_a: a,
                route_b: b,
                leader,
            }
        })
        .collect()
}
