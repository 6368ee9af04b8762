use serde::{Deserialize, Serialize};

/// Initial PnP solver for the four marker corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnpSolverKind {
    /// Closed-form planar-square solver returning the two ambiguous poses.
    /// Falls back to [`PnpSolverKind::Iterative`] when the decomposition fails.
    #[default]
    IppeSquare,
    /// Homography initialisation followed by Gauss-Newton iterations.
    Iterative,
}

/// Optional non-linear polish applied to the selected pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStrategy {
    /// Levenberg-Marquardt; falls back to virtual visual servoing, then to
    /// the unrefined pose.
    #[default]
    LevenbergMarquardt,
    /// Gauss-Newton on SE(3) with the analytic interaction matrix.
    VirtualVisualServoing,
    None,
}

/// Configuration for [`crate::PoseEstimator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseEstimatorParams {
    pub solver: PnpSolverKind,
    pub refinement: RefinementStrategy,
    /// Reject poses seen at more than this angle from the marker normal.
    pub max_viewing_angle_deg: Option<f64>,
    /// Reject quads whose mean edge is shorter than this, in pixels.
    pub min_pixel_size: Option<f64>,
    /// Iteration cap for the refinement and iterative solvers.
    pub max_iters: usize,
    /// A refined pose is kept only if its RMS error does not grow by more
    /// than this many pixels.
    pub refine_tolerance_px: f64,
}

impl Default for PoseEstimatorParams {
    fn default() -> Self {
        Self {
            solver: PnpSolverKind::IppeSquare,
            refinement: RefinementStrategy::LevenbergMarquardt,
            max_viewing_angle_deg: None,
            min_pixel_size: None,
            max_iters: 30,
            refine_tolerance_px: 1e-9,
        }
    }
}

impl PoseEstimatorParams {
    pub fn with_max_viewing_angle(mut self, deg: f64) -> Self {
        self.max_viewing_angle_deg = Some(deg);
        self
    }

    pub fn with_min_pixel_size(mut self, px: f64) -> Self {
        self.min_pixel_size = Some(px);
        self
    }
}
