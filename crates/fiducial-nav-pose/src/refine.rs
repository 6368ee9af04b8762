//! Non-linear polish of a marker pose against its four corners.
//!
//! Both refiners minimise the reprojection error in undistorted normalized
//! coordinates, so lens distortion only enters through the corner
//! undistortion done by the caller.

use fiducial_nav_core::MarkerPose;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{
    storage::Owned, DMatrix, DVector, Dyn, Matrix3, Point3, Rotation3, SMatrix, SVector, Vector2,
    Vector3,
};

use crate::error::PoseError;
use crate::geometry::normalized_residuals;

const FD_STEP: f64 = 1e-7;
const VVS_STEP_TOL: f64 = 1e-12;

/// Parameter layout: `[rvec (3), tvec (3)]`.
fn pose_from_params(x: &DVector<f64>) -> MarkerPose {
    MarkerPose::new(Vector3::new(x[0], x[1], x[2]), Vector3::new(x[3], x[4], x[5]))
}

fn params_from_pose(pose: &MarkerPose) -> DVector<f64> {
    DVector::from_iterator(6, pose.rvec.iter().chain(pose.tvec.iter()).copied())
}

struct MarkerReprojection<'a> {
    object: &'a [Point3<f64>; 4],
    observed: &'a [Vector2<f64>; 4],
    params: DVector<f64>,
}

impl MarkerReprojection<'_> {
    fn residuals_at(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let pose = pose_from_params(x);
        let r = normalized_residuals(&pose.rotation_matrix(), &pose.tvec, self.object, self.observed)?;
        Some(DVector::from_row_slice(&r))
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for MarkerReprojection<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.params)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        // Central differences: the rotation-vector chart has no cheap
        // closed-form derivative near the identity.
        let n = self.params.len();
        let mut jac = DMatrix::zeros(8, n);
        for j in 0..n {
            let h = FD_STEP * (1.0 + self.params[j].abs());
            let mut plus = self.params.clone();
            plus[j] += h;
            let mut minus = self.params.clone();
            minus[j] -= h;
            let d = (self.residuals_at(&plus)? - self.residuals_at(&minus)?) / (2.0 * h);
            jac.set_column(j, &d);
        }
        Some(jac)
    }
}

/// Levenberg-Marquardt over `[rvec, tvec]`.
pub(crate) fn refine_lm(
    initial: &MarkerPose,
    object: &[Point3<f64>; 4],
    observed: &[Vector2<f64>; 4],
    max_iters: usize,
) -> Result<MarkerPose, PoseError> {
    let problem = MarkerReprojection {
        object,
        observed,
        params: params_from_pose(initial),
    };
    let lm = LevenbergMarquardt::new()
        .with_ftol(1e-12)
        .with_xtol(1e-12)
        .with_gtol(1e-12)
        .with_patience(max_iters.max(1));
    let (problem, report) = lm.minimize(problem);

    log::trace!(
        "LM refine: {:?} after {} evaluations, cost {:.3e}",
        report.termination,
        report.number_of_evaluations,
        report.objective_function
    );
    if !report.termination.was_successful() {
        return Err(PoseError::RefinementFailed);
    }
    let pose = pose_from_params(&problem.params);
    if !pose.is_finite() {
        return Err(PoseError::NonFinitePose);
    }
    Ok(pose)
}

/// Virtual visual servoing: Gauss-Newton on SE(3) with the analytic
/// point-feature interaction matrix and a left-multiplied update.
pub(crate) fn refine_vvs(
    initial: &MarkerPose,
    object: &[Point3<f64>; 4],
    observed: &[Vector2<f64>; 4],
    max_iters: usize,
) -> Result<MarkerPose, PoseError> {
    let mut r = initial.rotation_matrix();
    let mut t = initial.tvec;

    for _ in 0..max_iters.max(1) {
        let mut jtj = SMatrix::<f64, 6, 6>::zeros();
        let mut jtr = SVector::<f64, 6>::zeros();

        for (x, obs) in object.iter().zip(observed) {
            let pc = r * x.coords + t;
            if pc.z <= f64::EPSILON {
                return Err(PoseError::BehindCamera);
            }
            let inv_z = 1.0 / pc.z;
            let (u, v) = (pc.x * inv_z, pc.y * inv_z);
            let res = Vector2::new(u - obs.x, v - obs.y);

            // d(u, v) / d(pc)
            let j_proj = SMatrix::<f64, 2, 3>::new(
                inv_z, 0.0, -u * inv_z, //
                0.0, inv_z, -v * inv_z,
            );
            // d(pc) / d(rho, phi) for pc' = exp(phi) pc + rho
            let mut j_pose = SMatrix::<f64, 3, 6>::zeros();
            j_pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
            j_pose
                .fixed_view_mut::<3, 3>(0, 3)
                .copy_from(&(-pc.cross_matrix()));
            let j = j_proj * j_pose;

            jtj += j.transpose() * j;
            jtr += j.transpose() * res;
        }

        let delta = -jtj.cholesky().ok_or(PoseError::Singular)?.solve(&jtr);
        if !delta.iter().all(|v| v.is_finite()) {
            return Err(PoseError::NonFinitePose);
        }
        let rho = Vector3::new(delta[0], delta[1], delta[2]);
        let dr = Rotation3::new(Vector3::new(delta[3], delta[4], delta[5])).into_inner();
        r = dr * r;
        t = dr * t + rho;

        if delta.norm() < VVS_STEP_TOL {
            break;
        }
    }

    let pose = MarkerPose::from_rotation_matrix(&r, t);
    if !pose.is_finite() {
        return Err(PoseError::NonFinitePose);
    }
    Ok(pose)
}
