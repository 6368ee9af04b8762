//! Rotation helpers shared by the pose and world-transform stages.
//!
//! Conventions:
//! - Euler angles are `(roll, pitch, yaw)` about the X, Y and Z axes.
//! - The composed rotation is `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
//! - Rotation vectors are axis-angle vectors (Rodrigues), angle in radians.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Build `R = Rz(yaw) * Ry(pitch) * Rx(roll)` from angles in radians.
pub fn euler_to_rotation_matrix(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();

    let rx = Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, cr, -sr, //
        0.0, sr, cr,
    );
    let ry = Matrix3::new(
        cp, 0.0, sp, //
        0.0, 1.0, 0.0, //
        -sp, 0.0, cp,
    );
    let rz = Matrix3::new(
        cy, -sy, 0.0, //
        sy, cy, 0.0, //
        0.0, 0.0, 1.0,
    );

    rz * ry * rx
}

/// Same as [`euler_to_rotation_matrix`], with angles in degrees.
pub fn euler_degrees_to_rotation_matrix(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    euler_to_rotation_matrix(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
}

/// Rodrigues: axis-angle vector to rotation matrix.
#[inline]
pub fn rotation_vector_to_matrix(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*rvec).into_inner()
}

/// Inverse Rodrigues. The input is projected onto SO(3) first, so slightly
/// non-orthogonal matrices coming out of linear solvers are accepted.
///
/// Goes through a quaternion so half-turns (a marker seen head-on) keep
/// their axis.
pub fn rotation_matrix_to_vector(r: &Matrix3<f64>) -> Vector3<f64> {
    let rot = Rotation3::from_matrix_unchecked(project_to_so3(r));
    UnitQuaternion::from_rotation_matrix(&rot).scaled_axis()
}

/// Closest rotation matrix in the Frobenius sense (`U * V^T`, det fixed to +1).
pub fn project_to_so3(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return *m;
    };
    let r = u * v_t;
    if r.determinant() >= 0.0 {
        return r;
    }
    u.column_mut(2).neg_mut();
    u * v_t
}

/// Marker orientation in the world frame, in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl EulerAngles {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }

    /// Rotation matrix for these angles (interpreted as degrees).
    pub fn to_matrix(&self) -> Matrix3<f64> {
        euler_degrees_to_rotation_matrix(self.roll, self.pitch, self.yaw)
    }
}
