use std::time::Instant;

use nalgebra::{Matrix3, Matrix6, Point3, SMatrix, Vector3, Vector6};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Time step used when no previous timestamp is known.
pub const FIRST_UPDATE_DT: f64 = 1.0;

/// Isotropic noise levels of the filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanParams {
    /// Process noise `q`: `Q = q * I6`.
    pub process_noise: f64,
    /// Measurement noise `r`: `R = r * I3`.
    pub measurement_noise: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 1e-3,
            measurement_noise: 1e-2,
        }
    }
}

/// `[x, y, z, vx, vy, vz]` and its covariance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    pub x: Vector6<f64>,
    pub p: Matrix6<f64>,
}

impl KalmanState {
    pub fn at_rest(position: Point3<f64>) -> Self {
        let mut x = Vector6::zeros();
        x.fixed_rows_mut::<3>(0).copy_from(&position.coords);
        Self {
            x,
            p: Matrix6::identity(),
        }
    }

    #[inline]
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.x[0], self.x[1], self.x[2])
    }

    #[inline]
    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.x[3], self.x[4], self.x[5])
    }
}

impl Default for KalmanState {
    fn default() -> Self {
        Self::at_rest(Point3::origin())
    }
}

/// Constant-velocity Kalman filter over 3D position.
///
/// Single-owner: the filter keeps the time of the last timestamped update,
/// so one instance follows exactly one camera feed.
#[derive(Clone, Debug)]
pub struct ConstantVelocityKalman {
    state: KalmanState,
    params: KalmanParams,
    last_update: Option<Instant>,
}

impl Default for ConstantVelocityKalman {
    fn default() -> Self {
        Self::new(KalmanParams::default())
    }
}

impl ConstantVelocityKalman {
    pub fn new(params: KalmanParams) -> Self {
        Self {
            state: KalmanState::default(),
            params: sanitize_params(params, KalmanParams::default()),
            last_update: None,
        }
    }

    pub fn with_state(mut self, state: KalmanState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &KalmanState {
        &self.state
    }

    pub fn params(&self) -> KalmanParams {
        self.params
    }

    pub fn position(&self) -> Point3<f64> {
        self.state.position()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.state.velocity()
    }

    /// Change noise levels; invalid (negative or non-finite) values are ignored.
    pub fn set_noise(&mut self, process_noise: f64, measurement_noise: f64) {
        self.params = sanitize_params(
            KalmanParams {
                process_noise,
                measurement_noise,
            },
            self.params,
        );
    }

    /// Restart at `position` with zero velocity and unit covariance.
    pub fn reinitialize(&mut self, position: Point3<f64>) {
        self.state = KalmanState::at_rest(position);
        self.last_update = None;
    }

    /// Forget the last update time; the next timestamped update uses
    /// [`FIRST_UPDATE_DT`]. Call after a tracking gap.
    pub fn reset_last_update_timestamp(&mut self) {
        self.last_update = None;
    }

    /// Predict + correct with a caller-supplied time step in seconds.
    ///
    /// Negative or non-finite `dt` is treated as 0.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn update_with_delta(&mut self, x: f64, y: f64, z: f64, dt: f64) -> Point3<f64> {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.predict(dt);
        self.correct(&Vector3::new(x, y, z));
        self.state.position()
    }

    /// Predict + correct using the wall-clock time since the previous call.
    pub fn update_with_timestamp_control(&mut self, x: f64, y: f64, z: f64) -> Point3<f64> {
        self.update_at(x, y, z, Instant::now())
    }

    /// As [`Self::update_with_timestamp_control`], with an explicit clock
    /// reading. Earlier-than-last readings give `dt = 0`.
    pub fn update_at(&mut self, x: f64, y: f64, z: f64, now: Instant) -> Point3<f64> {
        let dt = self
            .last_update
            .map_or(FIRST_UPDATE_DT, |last| {
                now.saturating_duration_since(last).as_secs_f64()
            });
        self.last_update = Some(now);
        self.update_with_delta(x, y, z, dt)
    }

    /// Time update with `F(dt)`.
    pub fn predict(&mut self, dt: f64) {
        let f = transition(dt);
        let q = Matrix6::identity() * self.params.process_noise;
        self.state.x = f * self.state.x;
        self.state.p = f * self.state.p * f.transpose() + q;
    }

    /// Measurement update with a position observation.
    ///
    /// A singular innovation covariance leaves the predicted state in place.
    pub fn correct(&mut self, measurement: &Vector3<f64>) {
        let p = &self.state.p;
        let innovation = measurement - self.state.x.fixed_rows::<3>(0);
        let s: Matrix3<f64> =
            p.fixed_view::<3, 3>(0, 0) + Matrix3::identity() * self.params.measurement_noise;
        let Some(s_inv) = s.try_inverse() else {
            log::debug!("kalman: singular innovation covariance, correction skipped");
            return;
        };
        // K = P H^T S^-1, with H = [I3 | 0]
        let k: SMatrix<f64, 6, 3> = p.fixed_view::<6, 3>(0, 0) * s_inv;

        let mut kh = Matrix6::zeros();
        kh.fixed_view_mut::<6, 3>(0, 0).copy_from(&k);

        let x = self.state.x + k * innovation;
        let p = (Matrix6::identity() - kh) * self.state.p;
        if x.iter().all(|v| v.is_finite()) && p.iter().all(|v| v.is_finite()) {
            self.state.x = x;
            self.state.p = 0.5 * (p + p.transpose());
        } else {
            log::debug!("kalman: non-finite correction discarded");
        }
    }
}

/// `F(dt)`: identity with `dt` coupling velocity into position.
pub fn transition(dt: f64) -> Matrix6<f64> {
    let mut f = Matrix6::identity();
    for i in 0..3 {
        f[(i, i + 3)] = dt;
    }
    f
}

fn sanitize_params(p: KalmanParams, fallback: KalmanParams) -> KalmanParams {
    let ok = |v: f64| v.is_finite() && v >= 0.0;
    KalmanParams {
        process_noise: if ok(p.process_noise) {
            p.process_noise
        } else {
            log::warn!("invalid process noise {}; keeping {}", p.process_noise, fallback.process_noise);
            fallback.process_noise
        },
        measurement_noise: if ok(p.measurement_noise) {
            p.measurement_noise
        } else {
            log::warn!(
                "invalid measurement noise {}; keeping {}",
                p.measurement_noise,
                fallback.measurement_noise
            );
            fallback.measurement_noise
        },
    }
}
