use std::time::Instant;

use fiducial_nav_core::{
    CameraModel, DetectedCorners, DetectedMarkerObservation, MarkerMap, WorldPositionEstimate,
};
use fiducial_nav_fusion::{fuse, transform_observations, FusionParams, FusionResult, WorldTransformParams};
use fiducial_nav_pose::{PoseEstimator, PoseEstimatorParams};
use fiducial_nav_track::{ConstantVelocityKalman, KalmanParams};
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunables for every stage of the per-frame pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorParams {
    pub pose: PoseEstimatorParams,
    pub world: WorldTransformParams,
    pub fusion: FusionParams,
    pub smoothing: KalmanParams,
}

/// Everything produced for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Accepted per-marker poses.
    pub observations: Vec<DetectedMarkerObservation>,
    /// World-frame camera positions, one per usable observation.
    pub estimates: Vec<WorldPositionEstimate>,
    pub fused: Option<FusionResult>,
    /// Smoothed position; `None` when fusion found no solution.
    pub smoothed: Option<Point3<f64>>,
}

impl FrameReport {
    pub fn inlier_count(&self) -> usize {
        self.fused.as_ref().map_or(0, |f| f.inliers.len())
    }
}

/// Detector output in, smoothed camera position out.
///
/// Owns the smoother, so one `Locator` follows one camera feed.
#[derive(Clone, Debug)]
pub struct Locator {
    markers: MarkerMap,
    estimator: PoseEstimator,
    world: WorldTransformParams,
    fusion: FusionParams,
    smoother: ConstantVelocityKalman,
    source: Option<String>,
}

enum Clock {
    Delta(f64),
    At(Instant),
}

impl Locator {
    pub fn new(markers: MarkerMap, camera: CameraModel, params: LocatorParams) -> Self {
        if markers.is_empty() {
            log::warn!("locator created with an empty marker map");
        }
        Self {
            markers,
            estimator: PoseEstimator::new(camera, params.pose),
            world: params.world,
            fusion: params.fusion,
            smoother: ConstantVelocityKalman::new(params.smoothing),
            source: None,
        }
    }

    /// Tag every observation and estimate with a camera identifier.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn markers(&self) -> &MarkerMap {
        &self.markers
    }

    pub fn estimator(&self) -> &PoseEstimator {
        &self.estimator
    }

    pub fn fusion_params(&self) -> &FusionParams {
        &self.fusion
    }

    pub fn smoother(&self) -> &ConstantVelocityKalman {
        &self.smoother
    }

    pub fn smoother_mut(&mut self) -> &mut ConstantVelocityKalman {
        &mut self.smoother
    }

    /// Process a frame, timing the smoother with the monotonic clock.
    pub fn process_frame(&mut self, detections: &[DetectedCorners]) -> FrameReport {
        self.process_frame_at(detections, Instant::now())
    }

    /// Process a frame captured at `now`.
    pub fn process_frame_at(&mut self, detections: &[DetectedCorners], now: Instant) -> FrameReport {
        self.run(detections, Clock::At(now))
    }

    /// Process a frame with an explicit smoother time step in seconds.
    pub fn process_frame_with_delta(
        &mut self,
        detections: &[DetectedCorners],
        dt: f64,
    ) -> FrameReport {
        self.run(detections, Clock::Delta(dt))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(detections = detections.len()))
    )]
    fn run(&mut self, detections: &[DetectedCorners], clock: Clock) -> FrameReport {
        let observations =
            self.estimator
                .estimate_markers(detections, &self.markers, self.source.as_deref());
        let estimates = transform_observations(&observations, &self.markers, &self.world);
        let fused = fuse(&estimates, &self.fusion);

        let smoothed = match &fused {
            Some(result) => {
                let p = result.position;
                Some(match clock {
                    Clock::Delta(dt) => self.smoother.update_with_delta(p.x, p.y, p.z, dt),
                    Clock::At(now) => self.smoother.update_at(p.x, p.y, p.z, now),
                })
            }
            None => {
                debug!(
                    "no fused position ({} markers, {} estimates); smoother paused",
                    detections.len(),
                    estimates.len()
                );
                self.smoother.reset_last_update_timestamp();
                None
            }
        };

        FrameReport {
            observations,
            estimates,
            fused,
            smoothed,
        }
    }
}
