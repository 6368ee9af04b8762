use fiducial_nav_core::{
    CameraModel, DetectedCorners, DetectedMarkerObservation, MarkerMap, MarkerPose, PoseQuality,
};
use log::debug;
use nalgebra::{Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::PoseError;
use crate::geometry::{marker_object_points, reprojection_rms_px, viewing_angle_deg};
use crate::ippe;
use crate::iterative::solve_iterative;
use crate::params::{PnpSolverKind, PoseEstimatorParams, RefinementStrategy};
use crate::refine::{refine_lm, refine_vvs};

/// A solver output scored against the detected corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseCandidate {
    pub pose: MarkerPose,
    pub reprojection_rms_px: f64,
}

/// Why a geometrically solved pose was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// No candidate has the marker in front of the camera.
    BehindCamera,
    ViewingAngle { angle_deg: f64, max_deg: f64 },
    TooSmall { size_px: f64, min_px: f64 },
    TooFar { distance: f64, max_distance: f64 },
}

/// Result of running the pose pipeline on one marker.
#[derive(Clone, Debug, PartialEq)]
pub enum PoseOutcome {
    Accepted(DetectedMarkerObservation),
    Rejected(Rejection),
}

impl PoseOutcome {
    pub fn accepted(self) -> Option<DetectedMarkerObservation> {
        match self {
            Self::Accepted(obs) => Some(obs),
            Self::Rejected(_) => None,
        }
    }
}

/// Per-marker pose estimation against a fixed camera model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseEstimator {
    camera: CameraModel,
    params: PoseEstimatorParams,
}

impl PoseEstimator {
    pub fn new(camera: CameraModel, params: PoseEstimatorParams) -> Self {
        Self { camera, params }
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn params(&self) -> &PoseEstimatorParams {
        &self.params
    }

    /// Camera pose relative to one marker of side `size` (meters).
    ///
    /// `max_distance` is the per-marker range limit, if the marker has one.
    /// Numeric failures are returned as `Err`; a pose that was solved but
    /// fails a validity gate is `Ok(PoseOutcome::Rejected(..))`.
    pub fn estimate(
        &self,
        detection: &DetectedCorners,
        size: f64,
        max_distance: Option<f64>,
    ) -> Result<PoseOutcome, PoseError> {
        let corners = &detection.corners;
        if !corners.iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
            return Err(PoseError::NonFiniteCorners);
        }

        if let Some(min_px) = self.params.min_pixel_size {
            let size_px = detection.mean_edge_px();
            if size_px < min_px {
                return Ok(PoseOutcome::Rejected(Rejection::TooSmall { size_px, min_px }));
            }
        }

        let object = marker_object_points(size);
        let normalized = corners.map(|c| self.camera.pixel_to_normalized(&c));

        let mut candidates = self.candidates(&object, &normalized, corners)?;
        candidates.sort_by(|a, b| a.reprojection_rms_px.total_cmp(&b.reprojection_rms_px));
        let mut ranked = candidates.into_iter();
        let Some(best) = ranked.next() else {
            return Ok(PoseOutcome::Rejected(Rejection::BehindCamera));
        };
        let alternative_rms_px = ranked.next().map(|c| c.reprojection_rms_px);

        let (chosen, refined) = self.refine(best, &object, &normalized, corners);
        let pose = chosen.pose;

        if pose.tvec.z <= 0.0 {
            return Ok(PoseOutcome::Rejected(Rejection::BehindCamera));
        }
        let angle_deg = viewing_angle_deg(&pose);
        if let Some(max_deg) = self.params.max_viewing_angle_deg {
            if angle_deg > max_deg {
                return Ok(PoseOutcome::Rejected(Rejection::ViewingAngle { angle_deg, max_deg }));
            }
        }
        let distance = pose.distance();
        if let Some(max_distance) = max_distance {
            if distance > max_distance {
                return Ok(PoseOutcome::Rejected(Rejection::TooFar {
                    distance,
                    max_distance,
                }));
            }
        }

        Ok(PoseOutcome::Accepted(DetectedMarkerObservation {
            marker_id: detection.id,
            image_corners: *corners,
            pose: Some(pose),
            distance,
            quality: Some(PoseQuality {
                reprojection_rms_px: chosen.reprojection_rms_px,
                alternative_rms_px,
                viewing_angle_deg: angle_deg,
                refined,
            }),
            source: None,
        }))
    }

    /// Estimate poses for every detection whose id is in `markers`.
    ///
    /// Unknown ids, numeric failures and gated poses are dropped with a
    /// debug log; one bad marker never aborts the frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(detections = detections.len()))
    )]
    pub fn estimate_markers(
        &self,
        detections: &[DetectedCorners],
        markers: &MarkerMap,
        source: Option<&str>,
    ) -> Vec<DetectedMarkerObservation> {
        let mut out = Vec::with_capacity(detections.len());
        for det in detections {
            let Some(def) = markers.get(det.id) else {
                debug!("marker {}: not in the marker map, skipped", det.id);
                continue;
            };
            match self.estimate(det, def.size, def.max_distance) {
                Ok(PoseOutcome::Accepted(obs)) => {
                    out.push(match source {
                        Some(s) => obs.with_source(s),
                        None => obs,
                    });
                }
                Ok(PoseOutcome::Rejected(reason)) => {
                    debug!("marker {}: rejected ({reason:?})", det.id);
                }
                Err(err) => {
                    debug!("marker {}: pose failed: {err}", det.id);
                }
            }
        }
        out
    }

    /// Solver candidates in front of the camera, scored in pixels.
    fn candidates(
        &self,
        object: &[Point3<f64>; 4],
        normalized: &[Vector2<f64>; 4],
        corners: &[Point2<f64>; 4],
    ) -> Result<Vec<PoseCandidate>, PoseError> {
        let poses: Vec<MarkerPose> = match self.params.solver {
            PnpSolverKind::IppeSquare => match ippe::solve_square(object, normalized) {
                Ok(sol) => sol.into_array().to_vec(),
                Err(err) => {
                    debug!("IPPE failed ({err}); falling back to iterative PnP");
                    vec![solve_iterative(object, normalized, self.params.max_iters)?]
                }
            },
            PnpSolverKind::Iterative => {
                vec![solve_iterative(object, normalized, self.params.max_iters)?]
            }
        };

        Ok(poses
            .into_iter()
            .filter(|p| p.is_finite() && p.tvec.z > 0.0)
            .filter_map(|pose| {
                let err = reprojection_rms_px(&self.camera, &pose, object, corners)?;
                err.is_finite().then_some(PoseCandidate {
                    pose,
                    reprojection_rms_px: err,
                })
            })
            .collect())
    }

    /// Apply the configured refinement chain. Returns the pose to keep and
    /// whether it came from a refiner.
    fn refine(
        &self,
        initial: PoseCandidate,
        object: &[Point3<f64>; 4],
        normalized: &[Vector2<f64>; 4],
        corners: &[Point2<f64>; 4],
    ) -> (PoseCandidate, bool) {
        let iters = self.params.max_iters;
        let attempts: &[RefinementStrategy] = match self.params.refinement {
            RefinementStrategy::LevenbergMarquardt => &[
                RefinementStrategy::LevenbergMarquardt,
                RefinementStrategy::VirtualVisualServoing,
            ],
            RefinementStrategy::VirtualVisualServoing => &[RefinementStrategy::VirtualVisualServoing],
            RefinementStrategy::None => &[],
        };

        for strategy in attempts {
            let result = match strategy {
                RefinementStrategy::LevenbergMarquardt => {
                    refine_lm(&initial.pose, object, normalized, iters)
                }
                RefinementStrategy::VirtualVisualServoing => {
                    refine_vvs(&initial.pose, object, normalized, iters)
                }
                RefinementStrategy::None => continue,
            };
            let pose = match result {
                Ok(pose) if pose.tvec.z > 0.0 => pose,
                Ok(_) => {
                    debug!("{strategy:?} refinement moved the marker behind the camera");
                    continue;
                }
                Err(err) => {
                    debug!("{strategy:?} refinement failed: {err}");
                    continue;
                }
            };
            let Some(err) = reprojection_rms_px(&self.camera, &pose, object, corners) else {
                continue;
            };
            if err.is_finite()
                && err <= initial.reprojection_rms_px + self.params.refine_tolerance_px
            {
                return (
                    PoseCandidate {
                        pose,
                        reprojection_rms_px: err,
                    },
                    true,
                );
            }
        }
        (initial, false)
    }
}
