//! Marker model points and reprojection helpers shared by the solvers.

use fiducial_nav_core::{CameraModel, MarkerPose};
use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};

/// Corners of a square marker of side `size` in its own frame, in detector
/// order: top-left, top-right, bottom-right, bottom-left.
pub fn marker_object_points(size: f64) -> [Point3<f64>; 4] {
    let h = 0.5 * size;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// RMS pixel distance between detected corners and the object points
/// reprojected through `camera`. `None` if any point lands behind the camera.
pub fn reprojection_rms_px(
    camera: &CameraModel,
    pose: &MarkerPose,
    object: &[Point3<f64>; 4],
    image: &[Point2<f64>; 4],
) -> Option<f64> {
    let r = pose.rotation_matrix();
    let mut sum = 0.0;
    for (x, obs) in object.iter().zip(image) {
        let pc = Point3::from(r * x.coords + pose.tvec);
        let proj = camera.project(&pc)?;
        sum += (proj - obs).norm_squared();
    }
    Some((sum / object.len() as f64).sqrt())
}

/// Stacked residuals in undistorted normalized coordinates.
pub(crate) fn normalized_residuals(
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    object: &[Point3<f64>; 4],
    observed: &[Vector2<f64>; 4],
) -> Option<[f64; 8]> {
    let mut out = [0.0; 8];
    for (k, (x, obs)) in object.iter().zip(observed).enumerate() {
        let pc = r * x.coords + t;
        if pc.z <= f64::EPSILON {
            return None;
        }
        out[2 * k] = pc.x / pc.z - obs.x;
        out[2 * k + 1] = pc.y / pc.z - obs.y;
    }
    Some(out)
}

#[cfg(test)]
pub(crate) fn rms(residuals: &[f64; 8]) -> f64 {
    (residuals.iter().map(|v| v * v).sum::<f64>() / 4.0).sqrt()
}

/// Angle between the marker normal and the camera-to-marker line of sight,
/// in degrees. 0 means the camera looks straight at the printed face.
pub fn viewing_angle_deg(pose: &MarkerPose) -> f64 {
    let normal = pose.rotation_matrix() * Vector3::z();
    let dist = pose.tvec.norm();
    if dist <= f64::EPSILON {
        return 0.0;
    }
    let cos = (normal.dot(&(-pose.tvec)) / dist).abs().min(1.0);
    cos.acos().to_degrees()
}
