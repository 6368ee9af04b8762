use nalgebra::{Isometry3, Matrix3, Point2, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::rotation::rotation_vector_to_matrix;

/// Raw output of the external fiducial detector for one marker.
///
/// Corner order: top-left, top-right, bottom-right, bottom-left of the
/// printed marker, in pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedCorners {
    pub id: u32,
    pub corners: [Point2<f64>; 4],
}

impl DetectedCorners {
    pub fn new(id: u32, corners: [Point2<f64>; 4]) -> Self {
        Self { id, corners }
    }

    /// Mean length of the four quad edges, in pixels.
    pub fn mean_edge_px(&self) -> f64 {
        (0..4)
            .map(|i| (self.corners[(i + 1) % 4] - self.corners[i]).norm())
            .sum::<f64>()
            / 4.0
    }
}

/// Marker pose relative to the camera: `X_cam = R(rvec) * X_marker + tvec`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    /// Axis-angle rotation vector, radians.
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl MarkerPose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation_matrix(r: &Matrix3<f64>, tvec: Vector3<f64>) -> Self {
        Self {
            rvec: crate::rotation::rotation_matrix_to_vector(r),
            tvec,
        }
    }

    /// `R_marker_cam`: rotates marker-frame vectors into the camera frame.
    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        rotation_vector_to_matrix(&self.rvec)
    }

    pub fn camera_from_marker(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.tvec),
            UnitQuaternion::from_scaled_axis(self.rvec),
        )
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation_matrix() * p.coords + self.tvec)
    }

    /// Camera-to-marker distance.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.tvec.norm()
    }

    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.tvec.iter()).all(|v| v.is_finite())
    }
}

/// Fit diagnostics attached to an accepted pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseQuality {
    /// RMS reprojection error of the chosen pose, in pixels.
    pub reprojection_rms_px: f64,
    /// Reprojection error of the rejected alternative (IPPE), if any.
    pub alternative_rms_px: Option<f64>,
    /// Angle between the marker normal and the line of sight, degrees.
    pub viewing_angle_deg: f64,
    /// Whether non-linear refinement improved the initial pose.
    pub refined: bool,
}

impl PoseQuality {
    /// `alternative / chosen` error ratio; large values mean an unambiguous pose.
    pub fn ambiguity_ratio(&self) -> Option<f64> {
        self.alternative_rms_px
            .map(|alt| alt / self.reprojection_rms_px.max(1e-12))
    }
}

/// One marker seen in one frame, with its camera-relative pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarkerObservation {
    pub marker_id: u32,
    pub image_corners: [Point2<f64>; 4],
    pub pose: Option<MarkerPose>,
    pub distance: f64,
    #[serde(default)]
    pub quality: Option<PoseQuality>,
    /// Which camera / image the observation came from.
    #[serde(default)]
    pub source: Option<String>,
}

impl DetectedMarkerObservation {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Camera position in the world frame derived from a single marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPositionEstimate {
    pub marker_id: u32,
    pub position: Point3<f64>,
    /// Camera-to-marker distance of the source observation.
    pub distance: f64,
    #[serde(default)]
    pub source: Option<String>,
}

impl WorldPositionEstimate {
    pub fn new(marker_id: u32, position: Point3<f64>, distance: f64) -> Self {
        Self {
            marker_id,
            position,
            distance,
            source: None,
        }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.position.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.position.y
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.position.z
    }
}

/// Best-estimate camera position for one fusion cycle.
pub type FusedPosition = Point3<f64>;
