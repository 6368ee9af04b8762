mod common;

use std::time::{Duration, Instant};

use fiducial_nav::{ConstantVelocityKalman, FusionMode, KalmanParams, LocatorParams};
use fiducial_nav::{Locator, MarkerMap};
use nalgebra::Point3;

fn locator() -> Locator {
    common::config().build_locator().expect("valid config")
}

#[test]
fn recovers_camera_position_from_every_marker() {
    let center = Point3::new(0.2, 0.5, 1.4);
    let mut loc = locator();
    let report = loc.process_frame_with_delta(&common::detect_from(center), 1.0);

    assert_eq!(report.observations.len(), 6);
    assert_eq!(report.estimates.len(), 6);
    for est in &report.estimates {
        assert!((est.position - center).norm() < 1e-3, "marker {}", est.marker_id);
        assert_eq!(est.source.as_deref(), Some("synthetic"));
    }
    for obs in &report.observations {
        assert!(obs.pose.expect("pose").tvec.z > 0.0);
    }

    let fused = report.fused.expect("fused");
    assert_eq!(fused.inliers.len(), 6);
    assert!((fused.position - center).norm() < 1e-3);
    assert!(report.smoothed.is_some());
}

#[test]
fn every_fusion_mode_agrees_on_clean_data() {
    let center = Point3::new(-0.3, 1.0, 1.6);
    let detections = common::detect_from(center);
    for mode in [
        FusionMode::Closest,
        FusionMode::Average,
        FusionMode::WeightedAverage,
        FusionMode::Median,
        FusionMode::WeightedMedian,
    ] {
        let mut cfg = common::config();
        cfg.fusion.mode = mode;
        let mut loc = cfg.build_locator().expect("valid config");
        let fused = loc.process_frame_with_delta(&detections, 1.0).fused.expect("fused");
        assert!((fused.position - center).norm() < 1e-3, "{mode:?}");
    }
}

#[test]
fn mislabelled_marker_is_an_outlier() {
    let center = Point3::new(0.0, 0.8, 1.5);
    let mut detections = common::detect_from(center);
    // The detector swaps two ids: both resulting world estimates land 1 m off.
    detections[0].id = 11;
    detections[1].id = 10;

    let mut loc = locator();
    let report = loc.process_frame_with_delta(&detections, 1.0);
    let fused = report.fused.expect("fused");
    assert_eq!(fused.inliers.len(), 4);
    assert!(fused.inliers.iter().all(|e| e.marker_id >= 12));
    assert!((fused.position - center).norm() < 1e-3);
}

#[test]
fn range_gate_drops_far_markers() {
    let mut cfg = common::config();
    for m in &mut cfg.markers {
        m.max_distance = Some(1.0);
    }
    let mut loc = cfg.build_locator().expect("valid config");
    let report = loc.process_frame_with_delta(&common::detect_from(Point3::new(0.0, 0.5, 1.5)), 1.0);
    assert!(report.observations.is_empty());
    assert!(report.fused.is_none());
    assert!(report.smoothed.is_none());
}

#[test]
fn one_visible_marker_is_not_enough_to_fuse() {
    let center = Point3::new(0.1, 0.6, 1.3);
    let detections = common::detect_from(center);
    let mut loc = locator();
    assert!(loc.process_frame_with_delta(&detections, 0.1).smoothed.is_some());

    let report = loc.process_frame_with_delta(&detections[..1], 0.1);
    assert_eq!(report.estimates.len(), 1);
    assert!(report.fused.is_none());
    assert!(report.smoothed.is_none());

    // Closest mode has no consensus step and still follows a lone marker.
    let mut cfg = common::config();
    cfg.fusion.mode = FusionMode::Closest;
    let mut loc = cfg.build_locator().expect("valid config");
    let fused = loc
        .process_frame_with_delta(&detections[..1], 1.0)
        .fused
        .expect("fused");
    assert!((fused.position - center).norm() < 1e-3);
}

#[test]
fn unknown_markers_and_empty_frames_yield_nothing() {
    let mut loc = Locator::new(
        MarkerMap::default(),
        common::camera(),
        LocatorParams::default(),
    );
    let report = loc.process_frame_with_delta(&common::detect_from(Point3::new(0.0, 0.5, 1.5)), 1.0);
    assert!(report.observations.is_empty());
    assert!(report.fused.is_none());

    let mut loc = locator();
    let report = loc.process_frame_with_delta(&[], 1.0);
    assert!(report.fused.is_none());
    assert!(report.smoothed.is_none());
}

#[test]
fn tracking_gap_resets_smoother_clock() {
    let center = Point3::new(0.1, 0.6, 1.3);
    let detections = common::detect_from(center);
    let t0 = Instant::now();

    let mut loc = locator();
    let mut reference = ConstantVelocityKalman::new(KalmanParams::default());

    let first = loc.process_frame_at(&detections, t0);
    let fused = first.fused.as_ref().expect("fused").position;
    assert_eq!(first.smoothed, Some(reference.update_with_delta(fused.x, fused.y, fused.z, 1.0)));

    let second = loc.process_frame_at(&detections, t0 + Duration::from_millis(100));
    let fused = second.fused.as_ref().expect("fused").position;
    let expected = reference.update_with_delta(fused.x, fused.y, fused.z, 0.1);
    assert!((second.smoothed.expect("smoothed") - expected).norm() < 1e-12);

    let gap = loc.process_frame_at(&[], t0 + Duration::from_millis(200));
    assert!(gap.smoothed.is_none());

    // After the gap the smoother restarts with dt = 1, not 9.9 s.
    let resumed = loc.process_frame_at(&detections, t0 + Duration::from_secs(10));
    let fused = resumed.fused.as_ref().expect("fused").position;
    let expected = reference.update_with_delta(fused.x, fused.y, fused.z, 1.0);
    assert!((resumed.smoothed.expect("smoothed") - expected).norm() < 1e-12);
}

#[test]
fn smoothed_track_converges_on_static_camera() {
    let center = Point3::new(0.4, 1.2, 1.1);
    let detections = common::detect_from(center);
    let mut loc = locator();
    let mut last = None;
    for _ in 0..60 {
        last = loc.process_frame_with_delta(&detections, 0.1).smoothed;
    }
    assert!((last.expect("smoothed") - center).norm() < 1e-3);
}
