//! High-level facade for the `fiducial-nav-*` workspace.
//!
//! This crate provides:
//! - re-exports of the stage crates (`core`, `pose`, `fusion`, `track`)
//! - [`Locator`], which runs one frame of detector output through pose
//!   estimation, world transform, fusion and smoothing
//! - [`LocatorConfig`], the JSON session format used by the `fiducial-nav` CLI
//!
//! ## Quickstart
//!
//! ```no_run
//! use fiducial_nav::{DetectedCorners, LocatorConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut locator = LocatorConfig::load_json("session.json")?.build_locator()?;
//! let detections: Vec<DetectedCorners> = Vec::new(); // from your marker detector
//! let report = locator.process_frame(&detections);
//! if let Some(p) = report.smoothed {
//!     println!("camera at {:.3} {:.3} {:.3}", p.x, p.y, p.z);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `fiducial_nav::core`: data model, rotations, camera model, marker maps, logger.
//! - `fiducial_nav::pose`: per-marker PnP, disambiguation, refinement and gating.
//! - `fiducial_nav::fusion`: marker-to-world transform, RANSAC fusion.
//! - `fiducial_nav::track`: constant-velocity Kalman smoother.
//! - `fiducial_nav::replay`: recorded-frame replay used by the CLI.

pub use fiducial_nav_core as core;
pub use fiducial_nav_fusion as fusion;
pub use fiducial_nav_pose as pose;
pub use fiducial_nav_track as track;

pub use fiducial_nav_core::{
    CameraModel, DetectedCorners, DetectedMarkerObservation, EulerAngles, LengthUnit, MarkerMap,
    MarkerWorldDefinition, WorldPositionEstimate,
};
pub use fiducial_nav_fusion::{FusionMode, FusionParams, FusionResult};
pub use fiducial_nav_pose::{PoseEstimator, PoseEstimatorParams};
pub use fiducial_nav_track::{ConstantVelocityKalman, KalmanParams};

mod config;
mod locator;
pub mod replay;

pub use config::{CameraConfig, LocatorConfig, LocatorConfigError};
pub use locator::{FrameReport, Locator, LocatorParams};
