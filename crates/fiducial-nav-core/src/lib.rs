//! Core types and utilities for fiducial-marker camera positioning.
//!
//! This crate is purely geometric. It does *not* detect markers or touch
//! images; it defines the data exchanged between the pose, fusion and
//! smoothing stages plus the camera and rotation math they share.

mod camera;
mod homography;
mod logger;
mod marker;
mod rotation;
mod types;

pub use camera::{CameraCalibration, CameraError, CameraIntrinsics, CameraModel, Distortion};
pub use homography::{homography_from_4pt, Homography};
pub use marker::{ConfigError, LengthUnit, MarkerMap, MarkerWorldDefinition};
pub use rotation::{
    euler_degrees_to_rotation_matrix, euler_to_rotation_matrix, project_to_so3,
    rotation_matrix_to_vector, rotation_vector_to_matrix, EulerAngles,
};
pub use types::{
    DetectedCorners, DetectedMarkerObservation, FusedPosition, MarkerPose, PoseQuality,
    WorldPositionEstimate,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, parse_level, LOG_ENV_VAR};
