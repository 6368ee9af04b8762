//! Single-solution PnP: planar homography decomposition followed by
//! Gauss-Newton iterations.

use fiducial_nav_core::{homography_from_4pt, project_to_so3, MarkerPose};
use nalgebra::{Matrix3, Point2, Point3, Vector2};

use crate::error::PoseError;
use crate::refine::refine_vvs;

/// Closed-form pose from the model-plane to normalized-image homography.
pub(crate) fn pose_from_homography(
    object: &[Point3<f64>; 4],
    normalized: &[Vector2<f64>; 4],
) -> Result<MarkerPose, PoseError> {
    let model = object.map(|p| Point2::new(p.x, p.y));
    let image = normalized.map(|n| Point2::new(n.x, n.y));
    let h = homography_from_4pt(&model, &image).ok_or(PoseError::DegenerateHomography)?;

    let h1 = h.h.column(0).into_owned();
    let h2 = h.h.column(1).into_owned();
    let h3 = h.h.column(2).into_owned();

    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm <= f64::EPSILON {
        return Err(PoseError::DegenerateHomography);
    }
    // H is only defined up to sign; pick the one that puts the marker in front.
    let lambda = if h3.z >= 0.0 { 1.0 / norm } else { -1.0 / norm };

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r = project_to_so3(&Matrix3::from_columns(&[r1, r2, r1.cross(&r2)]));
    let pose = MarkerPose::from_rotation_matrix(&r, h3 * lambda);
    if !pose.is_finite() {
        return Err(PoseError::NonFinitePose);
    }
    Ok(pose)
}

/// Iterative PnP for one marker.
pub fn solve_iterative(
    object: &[Point3<f64>; 4],
    normalized: &[Vector2<f64>; 4],
    max_iters: usize,
) -> Result<MarkerPose, PoseError> {
    let init = pose_from_homography(object, normalized)?;
    refine_vvs(&init, object, normalized, max_iters)
}
