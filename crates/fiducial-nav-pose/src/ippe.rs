//! Infinitesimal Plane-based Pose Estimation for a square marker.
//!
//! A planar square seen under perspective has two physically plausible
//! poses (the "flip" ambiguity). IPPE recovers both in closed form from the
//! homography Jacobian at the marker centre.

use fiducial_nav_core::{homography_from_4pt, MarkerPose};
use nalgebra::{Matrix2, Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};

use crate::error::PoseError;

/// The two IPPE solutions, unranked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IppeSolution {
    pub first: MarkerPose,
    pub second: MarkerPose,
}

impl IppeSolution {
    pub fn into_array(self) -> [MarkerPose; 2] {
        [self.first, self.second]
    }
}

/// Solve the square PnP problem in undistorted normalized coordinates.
///
/// `object` must be the planar model returned by
/// [`crate::marker_object_points`] (z = 0, centred at the origin).
pub fn solve_square(
    object: &[Point3<f64>; 4],
    normalized: &[Vector2<f64>; 4],
) -> Result<IppeSolution, PoseError> {
    let model = object.map(|p| Point2::new(p.x, p.y));
    let image = normalized.map(|n| Point2::new(n.x, n.y));
    let h = homography_from_4pt(&model, &image).ok_or(PoseError::DegenerateHomography)?;

    let [[j00, j01], [j10, j11]] = h.jacobian_at_origin();
    let jac = Matrix2::new(j00, j01, j10, j11);
    let (r1, r2) = rotations_from_jacobian(&jac, h.h[(0, 2)], h.h[(1, 2)])?;

    let t1 = translation_for_rotation(&r1, object, normalized)?;
    let t2 = translation_for_rotation(&r2, object, normalized)?;

    let first = MarkerPose::from_rotation_matrix(&r1, t1);
    let second = MarkerPose::from_rotation_matrix(&r2, t2);
    if !first.is_finite() || !second.is_finite() {
        return Err(PoseError::NonFinitePose);
    }
    Ok(IppeSolution { first, second })
}

/// The two rotations consistent with the first-order image of the plane
/// at the model origin, which projects to `(u0, v0)`.
fn rotations_from_jacobian(
    jac: &Matrix2<f64>,
    u0: f64,
    v0: f64,
) -> Result<(Matrix3<f64>, Matrix3<f64>), PoseError> {
    // Rotation taking the optical axis onto the ray through the origin image.
    let rv = Rotation3::rotation_between(&Vector3::z(), &Vector3::new(u0, v0, 1.0))
        .map(|r| r.into_inner())
        .unwrap_or_else(Matrix3::identity);

    let b = Matrix2::new(
        rv[(0, 0)] - u0 * rv[(2, 0)],
        rv[(0, 1)] - u0 * rv[(2, 1)],
        rv[(1, 0)] - v0 * rv[(2, 0)],
        rv[(1, 1)] - v0 * rv[(2, 1)],
    );
    let a = b.try_inverse().ok_or(PoseError::Ippe("singular ray basis"))? * jac;

    // Largest singular value of A.
    let ata00 = a[(0, 0)].powi(2) + a[(0, 1)].powi(2);
    let ata01 = a[(0, 0)] * a[(1, 0)] + a[(0, 1)] * a[(1, 1)];
    let ata11 = a[(1, 0)].powi(2) + a[(1, 1)].powi(2);
    let gamma2 =
        0.5 * (ata00 + ata11 + ((ata00 - ata11).powi(2) + 4.0 * ata01.powi(2)).sqrt());
    if !gamma2.is_finite() || gamma2 <= f64::EPSILON {
        return Err(PoseError::Ippe("zero Jacobian scale"));
    }
    let rt = a / gamma2.sqrt();

    let b0 = (1.0 - rt[(0, 0)].powi(2) - rt[(1, 0)].powi(2)).max(0.0).sqrt();
    let mut b1 = (1.0 - rt[(0, 1)].powi(2) - rt[(1, 1)].powi(2)).max(0.0).sqrt();
    if -(rt[(0, 0)] * rt[(0, 1)] + rt[(1, 0)] * rt[(1, 1)]) < 0.0 {
        b1 = -b1;
    }

    let build = |sign: f64| {
        let c1 = Vector3::new(rt[(0, 0)], rt[(1, 0)], sign * b0);
        let c2 = Vector3::new(rt[(0, 1)], rt[(1, 1)], sign * b1);
        let c3 = c1.cross(&c2);
        rv * Matrix3::from_columns(&[c1, c2, c3])
    };
    Ok((build(1.0), build(-1.0)))
}

/// Linear least-squares translation for a fixed rotation.
fn translation_for_rotation(
    r: &Matrix3<f64>,
    object: &[Point3<f64>; 4],
    normalized: &[Vector2<f64>; 4],
) -> Result<Vector3<f64>, PoseError> {
    // For each point: [1 0 -u] t = u (RX)_z - (RX)_x, [0 1 -v] t = v (RX)_z - (RX)_y
    let mut ata = Matrix3::zeros();
    let mut atb = Vector3::zeros();
    for (x, n) in object.iter().zip(normalized) {
        let rx = r * x.coords;
        let rows = [
            (Vector3::new(1.0, 0.0, -n.x), n.x * rx.z - rx.x),
            (Vector3::new(0.0, 1.0, -n.y), n.y * rx.z - rx.y),
        ];
        for (row, rhs) in rows {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }
    ata.try_inverse()
        .map(|inv| inv * atb)
        .ok_or(PoseError::Singular)
}
