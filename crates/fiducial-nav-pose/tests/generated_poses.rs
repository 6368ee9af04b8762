//! Randomised sweeps: whatever the input, an accepted observation is in
//! front of the camera and inside every configured gate.

use std::f64::consts::PI;

use fiducial_nav_core::{
    CameraCalibration, CameraModel, DetectedCorners, EulerAngles, MarkerMap, MarkerPose,
    MarkerWorldDefinition,
};
use fiducial_nav_pose::{
    marker_object_points, PoseEstimator, PoseEstimatorParams, PoseOutcome, Rejection,
};
use nalgebra::{Point2, Point3, Rotation3, Vector3};

const SIZE: f64 = 0.15;
const MAX_ANGLE_DEG: f64 = 75.0;
const MIN_PX: f64 = 4.0;

struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Marker roughly facing the camera, tilted up to 60 deg.
    fn pose(&mut self) -> MarkerPose {
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), PI)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.range(-1.05, 1.05))
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.range(-1.05, 1.05))
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.range(-PI, PI));
        let z = self.range(0.4, 6.0);
        let t = Vector3::new(self.range(-0.3, 0.3) * z, self.range(-0.3, 0.3) * z, z);
        MarkerPose::from_rotation_matrix(rot.matrix(), t)
    }

    fn max_distance(&mut self, i: usize) -> Option<f64> {
        (i % 3 != 0).then(|| self.range(0.5, 6.0))
    }

    /// Projected corners with up to half a pixel of noise. Every fifth quad
    /// is reported with reversed winding, as if seen from behind.
    fn detection(&mut self, id: u32, camera: &CameraModel, pose: &MarkerPose) -> Option<DetectedCorners> {
        let mut corners = [Point2::origin(); 4];
        for (c, p) in corners.iter_mut().zip(marker_object_points(SIZE)) {
            let px = camera.project(&pose.transform_point(&p))?;
            *c = px + nalgebra::Vector2::new(self.range(-0.5, 0.5), self.range(-0.5, 0.5));
        }
        if id % 5 == 4 {
            corners.swap(1, 3);
        }
        Some(DetectedCorners::new(id, corners))
    }
}

fn camera() -> CameraModel {
    CameraModel::Calibrated(
        CameraCalibration::from_opencv(
            [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
            &[-0.05, 0.01, 0.0, 0.0, 0.0],
        )
        .expect("valid calibration"),
    )
}

fn estimator() -> PoseEstimator {
    PoseEstimator::new(
        camera(),
        PoseEstimatorParams::default()
            .with_max_viewing_angle(MAX_ANGLE_DEG)
            .with_min_pixel_size(MIN_PX),
    )
}

#[test]
fn accepted_poses_respect_every_gate() {
    let cam = camera();
    let est = estimator();
    let mut rng = Lcg(2024);
    let mut accepted = 0;

    for i in 0..300 {
        let gt = rng.pose();
        let max_distance = rng.max_distance(i);
        let Some(det) = rng.detection(i as u32, &cam, &gt) else {
            continue;
        };
        match est.estimate(&det, SIZE, max_distance) {
            Ok(PoseOutcome::Accepted(obs)) => {
                accepted += 1;
                let pose = obs.pose.expect("pose");
                assert!(pose.tvec.z > 0.0, "case {i}: accepted pose behind camera");
                assert!(obs.distance.is_finite());
                assert!((obs.distance - pose.tvec.norm()).abs() < 1e-12);
                if let Some(max) = max_distance {
                    assert!(obs.distance <= max, "case {i}: {} > {max}", obs.distance);
                }
                let q = obs.quality.expect("quality");
                assert!(q.viewing_angle_deg <= MAX_ANGLE_DEG);
                assert!(q.reprojection_rms_px.is_finite());
                assert!(det.mean_edge_px() >= MIN_PX);
            }
            Ok(PoseOutcome::Rejected(Rejection::TooFar { distance, max_distance: max })) => {
                assert_eq!(Some(max), max_distance);
                assert!(distance > max);
            }
            Ok(PoseOutcome::Rejected(Rejection::ViewingAngle { angle_deg, max_deg })) => {
                assert!(angle_deg > max_deg);
            }
            Ok(PoseOutcome::Rejected(Rejection::TooSmall { size_px, min_px })) => {
                assert!(size_px < min_px);
            }
            Ok(PoseOutcome::Rejected(Rejection::BehindCamera)) | Err(_) => {}
        }
    }
    assert!(accepted >= 50, "only {accepted} poses accepted");
}

#[test]
fn batch_estimation_keeps_only_gated_observations() {
    let cam = camera();
    let est = estimator();
    let mut rng = Lcg(77);

    let mut definitions = Vec::new();
    let mut detections = Vec::new();
    for i in 0..200 {
        let gt = rng.pose();
        let mut def = MarkerWorldDefinition::new(i as u32, SIZE, Point3::origin(), EulerAngles::default());
        def.max_distance = rng.max_distance(i);
        definitions.push(def);
        if let Some(det) = rng.detection(i as u32, &cam, &gt) {
            detections.push(det);
        }
    }
    let markers = MarkerMap::new(definitions).expect("valid");

    let observations = est.estimate_markers(&detections, &markers, None);
    assert!(!observations.is_empty());
    for obs in &observations {
        let pose = obs.pose.expect("pose");
        assert!(pose.tvec.z > 0.0, "marker {} behind camera", obs.marker_id);
        if let Some(max) = markers.get(obs.marker_id).and_then(|m| m.max_distance) {
            assert!(obs.distance <= max, "marker {}: {} > {max}", obs.marker_id, obs.distance);
        }
    }
}
