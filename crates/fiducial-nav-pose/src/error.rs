/// Numeric failures of the per-marker pose pipeline.
///
/// These are absorbed by [`crate::PoseEstimator::estimate_markers`]: the
/// affected marker is dropped and the rest of the frame is processed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("detected corners are not finite")]
    NonFiniteCorners,
    #[error("marker quad is degenerate (no homography)")]
    DegenerateHomography,
    #[error("IPPE decomposition failed: {0}")]
    Ippe(&'static str),
    #[error("linear system is singular")]
    Singular,
    #[error("object point projects behind the camera")]
    BehindCamera,
    #[error("solver produced a non-finite pose")]
    NonFinitePose,
    #[error("refinement did not converge")]
    RefinementFailed,
}
