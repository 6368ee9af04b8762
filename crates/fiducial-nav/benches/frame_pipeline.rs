use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fiducial_nav::core::{CameraCalibration, MarkerPose};
use fiducial_nav::pose::marker_object_points;
use fiducial_nav::{
    CameraModel, DetectedCorners, EulerAngles, Locator, LocatorParams, MarkerMap,
    MarkerWorldDefinition,
};
use nalgebra::{Matrix3, Point3, Vector3};

fn scene() -> (MarkerMap, CameraModel, Vec<DetectedCorners>) {
    let camera = CameraModel::Calibrated(
        CameraCalibration::from_opencv(
            [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
            &[-0.05, 0.01, 0.0, 0.0, 0.0],
        )
        .expect("valid calibration"),
    );
    let defs: Vec<MarkerWorldDefinition> = (0..8)
        .map(|i| {
            let x = -1.4 + 0.4 * i as f64;
            let z = if i % 2 == 0 { 1.0 } else { 1.8 };
            MarkerWorldDefinition::new(
                i,
                0.2,
                Point3::new(x, 4.0, z),
                EulerAngles::new(90.0, 0.0, 0.0),
            )
        })
        .collect();

    let center = Point3::new(0.1, 0.4, 1.4);
    let r_cw = Matrix3::from_columns(&[
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(0.0, 1.0, 0.0),
    ])
    .transpose();
    let detections = defs
        .iter()
        .map(|m| {
            let pose = MarkerPose::from_rotation_matrix(
                &(r_cw * m.rotation_matrix()),
                r_cw * (m.position - center),
            );
            let corners = marker_object_points(m.size)
                .map(|p| camera.project(&pose.transform_point(&p)).expect("visible"));
            DetectedCorners::new(m.id, corners)
        })
        .collect();

    (MarkerMap::new(defs).expect("valid markers"), camera, detections)
}

fn bench_frame(c: &mut Criterion) {
    let (markers, camera, detections) = scene();
    let mut locator = Locator::new(markers, camera, LocatorParams::default());
    c.bench_function("process_frame_8_markers", |b| {
        b.iter(|| black_box(locator.process_frame_with_delta(black_box(&detections), 0.033)))
    });
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
