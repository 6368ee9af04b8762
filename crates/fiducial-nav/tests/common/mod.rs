//! Synthetic room: six markers on the far wall, a calibrated camera looking
//! at them along world +Y.

#![allow(dead_code)]

use fiducial_nav::core::{CameraCalibration, MarkerPose};
use fiducial_nav::{
    CameraConfig, CameraModel, DetectedCorners, EulerAngles, LocatorConfig, MarkerWorldDefinition,
};
use fiducial_nav::pose::marker_object_points;
use nalgebra::{Matrix3, Point3, Vector3};

pub const MARKER_SIZE: f64 = 0.2;

pub fn camera_config() -> CameraConfig {
    CameraConfig {
        camera_matrix: [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
        dist_coeffs: vec![-0.05, 0.01, 0.0, 0.0, 0.0],
    }
}

pub fn camera() -> CameraModel {
    CameraModel::Calibrated(
        CameraCalibration::from_opencv(camera_config().camera_matrix, &camera_config().dist_coeffs)
            .expect("valid calibration"),
    )
}

/// Wall at y = 4, markers facing -Y, upright.
pub fn markers() -> Vec<MarkerWorldDefinition> {
    let mut out = Vec::new();
    let mut id = 10;
    for z in [1.0, 2.0] {
        for x in [-1.0, 0.0, 1.0] {
            out.push(
                MarkerWorldDefinition::new(
                    id,
                    MARKER_SIZE,
                    Point3::new(x, 4.0, z),
                    EulerAngles::new(90.0, 0.0, 0.0),
                )
                .with_max_distance(8.0),
            );
            id += 1;
        }
    }
    out
}

pub fn config() -> LocatorConfig {
    LocatorConfig {
        markers: markers(),
        camera: Some(camera_config()),
        source: Some("synthetic".into()),
        ..LocatorConfig::default()
    }
}

/// Camera looking along world +Y: image x = world +X, image y = world -Z.
pub fn world_from_camera_rotation() -> Matrix3<f64> {
    Matrix3::from_columns(&[
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(0.0, 1.0, 0.0),
    ])
}

/// Detector output for a camera at `center`.
pub fn detect_from(center: Point3<f64>) -> Vec<DetectedCorners> {
    let cam = camera();
    let r_cw = world_from_camera_rotation().transpose();
    markers()
        .iter()
        .map(|m| {
            let r = r_cw * m.rotation_matrix();
            let t = r_cw * (m.position - center);
            let pose = MarkerPose::from_rotation_matrix(&r, t);
            let corners = marker_object_points(m.size)
                .map(|p| cam.project(&pose.transform_point(&p)).expect("marker visible"));
            DetectedCorners::new(m.id, corners)
        })
        .collect()
}
