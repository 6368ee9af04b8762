//! Camera-relative pose estimation for square fiducial markers.
//!
//! For every detected quad the estimator
//! 1. solves the planar PnP problem (IPPE, with an iterative fallback),
//! 2. keeps the candidate with the lowest pixel reprojection error among
//!    those in front of the camera,
//! 3. optionally refines it (Levenberg-Marquardt, then virtual visual
//!    servoing, then the unrefined pose),
//! 4. gates it on depth sign, viewing angle, apparent size and range.
//!
//! ```
//! use fiducial_nav_core::{CameraModel, DetectedCorners};
//! use fiducial_nav_pose::{PoseEstimator, PoseEstimatorParams};
//! use nalgebra::Point2;
//!
//! let camera = CameraModel::focal_length_only(640, 480);
//! let det = DetectedCorners::new(
//!     3,
//!     [
//!         Point2::new(288.0, 208.0),
//!         Point2::new(352.0, 208.0),
//!         Point2::new(352.0, 272.0),
//!         Point2::new(288.0, 272.0),
//!     ],
//! );
//! let estimator = PoseEstimator::new(camera, PoseEstimatorParams::default());
//! let obs = estimator.estimate(&det, 0.1, None).unwrap().accepted().unwrap();
//! assert!((obs.distance - 1.0).abs() < 1e-6);
//! ```

mod error;
mod estimator;
mod geometry;
mod ippe;
mod iterative;
mod params;
mod refine;

pub use error::PoseError;
pub use estimator::{PoseCandidate, PoseEstimator, PoseOutcome, Rejection};
pub use geometry::{marker_object_points, reprojection_rms_px, viewing_angle_deg};
pub use ippe::{solve_square, IppeSolution};
pub use iterative::solve_iterative;
pub use params::{PnpSolverKind, PoseEstimatorParams, RefinementStrategy};
