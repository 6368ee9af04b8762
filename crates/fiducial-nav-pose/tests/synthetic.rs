//! End-to-end pose recovery from synthetic projections.

use fiducial_nav_core::{CameraCalibration, CameraModel, DetectedCorners, MarkerPose};
use fiducial_nav_pose::{
    marker_object_points, PnpSolverKind, PoseEstimator, PoseEstimatorParams, PoseOutcome,
    RefinementStrategy,
};
use nalgebra::{Point2, Rotation3, Vector3};

fn calibrated() -> CameraModel {
    CameraModel::Calibrated(
        CameraCalibration::from_opencv(
            [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
            &[-0.08, 0.01, 0.0005, -0.0003, 0.0],
        )
        .expect("valid calibration"),
    )
}

fn project(camera: &CameraModel, pose: &MarkerPose, size: f64) -> [Point2<f64>; 4] {
    marker_object_points(size).map(|p| camera.project(&pose.transform_point(&p)).expect("visible"))
}

fn poses() -> Vec<MarkerPose> {
    [
        ((2.9, 0.1, 0.0), (0.0, 0.0, 1.0)),
        ((2.7, -0.35, 0.2), (0.2, -0.1, 1.8)),
        ((3.0, 0.4, -0.6), (-0.3, 0.15, 2.4)),
    ]
    .into_iter()
    .map(|((r, p, y), (tx, ty, tz))| {
        let rot = Rotation3::from_euler_angles(r, p, y);
        MarkerPose::from_rotation_matrix(rot.matrix(), Vector3::new(tx, ty, tz))
    })
    .collect()
}

#[test]
fn every_solver_and_refiner_recovers_exact_poses() {
    let camera = calibrated();
    let size = 0.18;
    for solver in [PnpSolverKind::IppeSquare, PnpSolverKind::Iterative] {
        for refinement in [
            RefinementStrategy::LevenbergMarquardt,
            RefinementStrategy::VirtualVisualServoing,
            RefinementStrategy::None,
        ] {
            let params = PoseEstimatorParams {
                solver,
                refinement,
                ..PoseEstimatorParams::default()
            };
            let estimator = PoseEstimator::new(camera, params);
            for gt in poses() {
                let det = DetectedCorners::new(0, project(&camera, &gt, size));
                let obs = estimator
                    .estimate(&det, size, None)
                    .expect("solvable")
                    .accepted()
                    .expect("accepted");
                let pose = obs.pose.expect("pose");
                assert!(
                    (pose.tvec - gt.tvec).norm() < 1e-4,
                    "{solver:?}/{refinement:?}: {:?} vs {:?}",
                    pose.tvec,
                    gt.tvec
                );
                assert!(pose.tvec.z > 0.0);
            }
        }
    }
}

#[test]
fn noisy_corners_keep_the_lower_error_candidate() {
    let camera = calibrated();
    let size = 0.15;
    let gt = poses()[1];
    let mut corners = project(&camera, &gt, size);
    let noise = [(0.4, -0.3), (-0.2, 0.5), (0.3, 0.1), (-0.5, -0.2)];
    for (c, (dx, dy)) in corners.iter_mut().zip(noise) {
        c.x += dx;
        c.y += dy;
    }

    let estimator = PoseEstimator::new(camera, PoseEstimatorParams::default());
    let obs = estimator
        .estimate(&DetectedCorners::new(0, corners), size, None)
        .expect("solvable")
        .accepted()
        .expect("accepted");
    let q = obs.quality.expect("quality");
    if let Some(alt) = q.alternative_rms_px {
        assert!(q.reprojection_rms_px <= alt + 1e-9);
    }
    assert!(q.reprojection_rms_px < 1.0);
    assert!((obs.pose.expect("pose").tvec - gt.tvec).norm() < 0.05);
}

#[test]
fn distance_is_translation_norm() {
    let camera = calibrated();
    let estimator = PoseEstimator::new(camera, PoseEstimatorParams::default());
    for gt in poses() {
        let det = DetectedCorners::new(0, project(&camera, &gt, 0.2));
        if let Ok(PoseOutcome::Accepted(obs)) = estimator.estimate(&det, 0.2, None) {
            let pose = obs.pose.expect("pose");
            assert_eq!(obs.distance, pose.tvec.norm());
        } else {
            panic!("exact projection must be accepted");
        }
    }
}
