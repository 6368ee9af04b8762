//! Pinhole camera model with Brown–Conrady distortion.
//!
//! Pixel pipeline: `pixel = K * distort(normalized)` where `normalized` is the
//! camera-frame point divided by its depth.

use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Errors produced while building a camera model from raw calibration data.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("camera matrix contains non-finite values")]
    NonFinite,
    #[error("focal lengths must be non-zero (fx={fx}, fy={fy})")]
    ZeroFocalLength { fx: f64, fy: f64 },
    #[error("camera matrix bottom row must be [0, 0, 1]")]
    NotACameraMatrix,
}

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Identity intrinsics: pixels are treated as normalized coordinates.
    pub fn identity() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0)
    }

    /// Parse a 3x3 camera matrix `K`.
    pub fn from_k_matrix(k: &Matrix3<f64>) -> Result<Self, CameraError> {
        if k.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFinite);
        }
        if k[(1, 0)] != 0.0 || k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 || k[(2, 2)] == 0.0 {
            return Err(CameraError::NotACameraMatrix);
        }
        let k = *k / k[(2, 2)];
        let out = Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        };
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        let vals = [self.fx, self.fy, self.cx, self.cy, self.skew];
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFinite);
        }
        if self.fx == 0.0 || self.fy == 0.0 {
            return Err(CameraError::ZeroFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        Ok(())
    }

    /// The 3x3 camera matrix `K`.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: &Vector2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: &Point2<f64>) -> Vector2<f64> {
        let y = (p.y - self.cy) / self.fy;
        let x = (p.x - self.cx - self.skew * y) / self.fx;
        Vector2::new(x, y)
    }
}

fn default_undistort_iters() -> u32 {
    10
}

/// Brown–Conrady radial-tangential distortion (OpenCV coefficient order
/// `k1, k2, p1, p2, k3`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
    /// Fixed-point iterations used by [`Distortion::undistort`].
    #[serde(default = "default_undistort_iters")]
    pub iters: u32,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
            iters: default_undistort_iters(),
        }
    }
}

impl Distortion {
    /// Build from an OpenCV-style coefficient vector.
    ///
    /// Accepts 0, 4, 5 or more coefficients; thin-prism and tilt terms beyond
    /// the fifth are ignored. Other lengths fall back to no distortion.
    pub fn from_coeffs(coeffs: &[f64]) -> Self {
        let mut d = Self::default();
        match coeffs.len() {
            4 => {
                d.k1 = coeffs[0];
                d.k2 = coeffs[1];
                d.p1 = coeffs[2];
                d.p2 = coeffs[3];
            }
            n if n >= 5 => {
                d.k1 = coeffs[0];
                d.k2 = coeffs[1];
                d.p1 = coeffs[2];
                d.p2 = coeffs[3];
                d.k3 = coeffs[4];
            }
            0 => {}
            n => log::warn!("ignoring distortion vector of unsupported length {n}"),
        }
        d
    }

    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }

    pub fn is_finite(&self) -> bool {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;
        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *n_dist;
        }
        let iters = if self.iters == 0 {
            default_undistort_iters()
        } else {
            self.iters
        };
        let mut n = *n_dist;
        for _ in 0..iters {
            let err = self.distort(&n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Calibrated camera: intrinsics plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Distortion,
}

impl CameraCalibration {
    /// Build from the row-major camera matrix and distortion vector produced
    /// by an OpenCV-style calibration.
    pub fn from_opencv(k: [[f64; 3]; 3], dist: &[f64]) -> Result<Self, CameraError> {
        let k = Matrix3::from_row_slice(&[
            k[0][0], k[0][1], k[0][2], k[1][0], k[1][1], k[1][2], k[2][0], k[2][1], k[2][2],
        ]);
        let intrinsics = CameraIntrinsics::from_k_matrix(&k)?;
        let distortion = Distortion::from_coeffs(dist);
        if !distortion.is_finite() {
            return Err(CameraError::NonFinite);
        }
        Ok(Self {
            intrinsics,
            distortion,
        })
    }
}

/// Camera capability the pose estimator works with.
///
/// Calibrated cameras give metric poses; the other two variants keep the
/// pipeline running with degraded accuracy when calibration is missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraModel {
    Calibrated(CameraCalibration),
    /// Focal length guessed from the image width, principal point at the centre.
    FocalLengthOnly { focal_px: f64, cx: f64, cy: f64 },
    /// No calibration at all: identity camera matrix.
    #[default]
    Uncalibrated,
}

impl CameraModel {
    /// Focal-length-only approximation for an image of the given size.
    pub fn focal_length_only(width: u32, height: u32) -> Self {
        Self::FocalLengthOnly {
            focal_px: width as f64,
            cx: width as f64 * 0.5,
            cy: height as f64 * 0.5,
        }
    }

    /// Pick the best available model.
    pub fn resolve(calibration: Option<CameraCalibration>, image_size: Option<[u32; 2]>) -> Self {
        match (calibration, image_size) {
            (Some(calib), _) => Self::Calibrated(calib),
            (None, Some([w, h])) if w > 0 && h > 0 => {
                log::warn!("no camera calibration; using focal-length-only model for {w}x{h}");
                Self::focal_length_only(w, h)
            }
            _ => {
                log::warn!("no camera calibration and no image size; using identity intrinsics");
                Self::Uncalibrated
            }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, Self::Calibrated(_))
    }

    /// Variant name, matching the serde `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Calibrated(_) => "calibrated",
            Self::FocalLengthOnly { .. } => "focal_length_only",
            Self::Uncalibrated => "uncalibrated",
        }
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        match self {
            Self::Calibrated(c) => c.intrinsics,
            Self::FocalLengthOnly { focal_px, cx, cy } => {
                CameraIntrinsics::new(*focal_px, *focal_px, *cx, *cy)
            }
            Self::Uncalibrated => CameraIntrinsics::identity(),
        }
    }

    pub fn distortion(&self) -> Distortion {
        match self {
            Self::Calibrated(c) => c.distortion,
            _ => Distortion::default(),
        }
    }

    /// Undistorted normalized coordinates of a detected pixel.
    pub fn pixel_to_normalized(&self, p: &Point2<f64>) -> Vector2<f64> {
        let n = self.intrinsics().pixel_to_normalized(p);
        self.distortion().undistort(&n)
    }

    /// Project a camera-frame point to pixels. `None` for points at or behind
    /// the image plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        let n = Vector2::new(p.x / p.z, p.y / p.z);
        let d = self.distortion().distort(&n);
        Some(self.intrinsics().normalized_to_pixel(&d))
    }
}
