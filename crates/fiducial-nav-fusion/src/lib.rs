//! World-frame camera positions from marker observations, and robust
//! fusion of the positions seen in one frame.
//!
//! ```
//! use fiducial_nav_core::WorldPositionEstimate;
//! use fiducial_nav_fusion::{fuse, FusionParams};
//! use nalgebra::Point3;
//!
//! let estimates = [
//!     WorldPositionEstimate::new(1, Point3::new(0.0, 0.0, 0.0), 1.0),
//!     WorldPositionEstimate::new(2, Point3::new(0.01, 0.0, 0.0), 1.0),
//!     WorldPositionEstimate::new(3, Point3::new(5.0, 5.0, 5.0), 1.0),
//! ];
//! let fused = fuse(&estimates, &FusionParams::default()).unwrap();
//! assert_eq!(fused.inliers.len(), 2);
//! assert!((fused.position.x - 0.005).abs() < 1e-12);
//! ```

mod aggregate;
mod fusion;
mod ransac;
mod world;

pub use aggregate::{weighted_mean, weighted_median, weighted_median_1d};
pub use fusion::{aggregate, fuse, inverse_square_weight, FusionMode, FusionParams, FusionResult};
pub use ransac::{best_inlier_set, escalation_schedule, min_inliers, ransac_inliers};
pub use world::{
    camera_position_in_marker, transform_observations, transform_to_world, WorldTransformParams,
};
