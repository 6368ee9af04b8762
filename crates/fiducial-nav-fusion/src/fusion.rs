use std::collections::BTreeSet;

use fiducial_nav_core::{FusedPosition, WorldPositionEstimate};
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::aggregate::{weighted_mean, weighted_median};
use crate::ransac::{escalation_schedule, ransac_inliers};

/// How surviving estimates are combined into one position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// The estimate from the nearest allowed marker; no consensus step.
    Closest,
    Average,
    /// Mean weighted by `1 / distance^2`.
    #[default]
    WeightedAverage,
    Median,
    /// Per-axis median weighted by `1 / distance^2`.
    WeightedMedian,
}

impl FusionMode {
    pub fn is_weighted(self) -> bool {
        matches!(self, Self::WeightedAverage | Self::WeightedMedian)
    }
}

/// Configuration for [`fuse`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    pub mode: FusionMode,
    /// Initial inlier radius, in world units.
    pub ransac_threshold: f64,
    /// Escalation ceiling; `None` disables escalation.
    pub max_threshold: Option<f64>,
    /// Threshold increment between escalation attempts.
    pub step: f64,
    /// Markers eligible for [`FusionMode::Closest`]; `None` allows all.
    pub allowed_ids: Option<BTreeSet<u32>>,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            mode: FusionMode::WeightedAverage,
            ransac_threshold: 0.2,
            max_threshold: None,
            step: 0.1,
            allowed_ids: None,
        }
    }
}

impl FusionParams {
    pub fn with_mode(mut self, mode: FusionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_escalation(mut self, max_threshold: f64, step: f64) -> Self {
        self.max_threshold = Some(max_threshold);
        self.step = step;
        self
    }
}

/// One successful fusion cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub position: FusedPosition,
    /// Estimates that contributed to `position`.
    pub inliers: Vec<WorldPositionEstimate>,
    /// Consensus radius that succeeded; `None` for [`FusionMode::Closest`].
    pub threshold_used: Option<f64>,
    /// Number of consensus thresholds tried.
    pub attempts: usize,
}

/// Fuse the per-marker estimates of one frame.
///
/// Returns `None` when there is nothing to fuse or no threshold in the
/// escalation schedule reaches consensus.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(estimates = estimates.len(), mode = ?params.mode))
)]
pub fn fuse(estimates: &[WorldPositionEstimate], params: &FusionParams) -> Option<FusionResult> {
    if estimates.is_empty() {
        return None;
    }
    if params.mode == FusionMode::Closest {
        return closest(estimates, params.allowed_ids.as_ref());
    }

    let schedule = escalation_schedule(params.ransac_threshold, params.max_threshold, params.step);
    for (attempt, &threshold) in schedule.iter().enumerate() {
        let Some(indices) = ransac_inliers(estimates, threshold) else {
            debug!("no consensus at threshold {threshold:.3}");
            continue;
        };
        let inliers: Vec<WorldPositionEstimate> =
            indices.into_iter().map(|i| estimates[i].clone()).collect();
        let position = aggregate(&inliers, params.mode);
        return Some(FusionResult {
            position,
            inliers,
            threshold_used: Some(threshold),
            attempts: attempt + 1,
        });
    }
    debug!(
        "fusion failed for {} estimates after {} thresholds",
        estimates.len(),
        schedule.len()
    );
    None
}

fn closest(
    estimates: &[WorldPositionEstimate],
    allowed: Option<&BTreeSet<u32>>,
) -> Option<FusionResult> {
    let best = estimates
        .iter()
        .filter(|e| allowed.map_or(true, |ids| ids.contains(&e.marker_id)))
        .filter(|e| e.distance.is_finite())
        .min_by(|a, b| a.distance.total_cmp(&b.distance))?;
    Some(FusionResult {
        position: best.position,
        inliers: vec![best.clone()],
        threshold_used: None,
        attempts: 0,
    })
}

/// `1 / d^2`, or `None` for distances that cannot be weighted.
#[inline]
pub fn inverse_square_weight(distance: f64) -> Option<f64> {
    (distance.is_finite() && distance > 0.0).then(|| 1.0 / (distance * distance))
}

/// Combine inliers according to `mode` (`Closest` is treated as `Average`).
pub fn aggregate(inliers: &[WorldPositionEstimate], mode: FusionMode) -> Point3<f64> {
    let samples: Vec<(Point3<f64>, f64)> = if mode.is_weighted() {
        inliers
            .iter()
            .filter_map(|e| inverse_square_weight(e.distance).map(|w| (e.position, w)))
            .collect()
    } else {
        inliers.iter().map(|e| (e.position, 1.0)).collect()
    };
    match mode {
        FusionMode::Median | FusionMode::WeightedMedian => weighted_median(&samples),
        FusionMode::Closest | FusionMode::Average | FusionMode::WeightedAverage => {
            weighted_mean(&samples)
        }
    }
}
