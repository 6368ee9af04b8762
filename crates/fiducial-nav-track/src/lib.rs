//! Temporal smoothing of fused camera positions.
//!
//! A 6-state constant-velocity Kalman filter: position is observed, velocity
//! is inferred, and the transition is rebuilt for every update from the real
//! elapsed time.

mod kalman;

pub use kalman::{
    transition, ConstantVelocityKalman, KalmanParams, KalmanState, FIRST_UPDATE_DT,
};
