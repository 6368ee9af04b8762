//! JSON session configuration for a [`Locator`].

use std::{fs, path::Path};

use fiducial_nav_core::{CameraCalibration, CameraError, CameraModel, ConfigError, MarkerMap, MarkerWorldDefinition};
use fiducial_nav_fusion::{FusionParams, WorldTransformParams};
use fiducial_nav_pose::PoseEstimatorParams;
use fiducial_nav_track::KalmanParams;
use serde::{Deserialize, Serialize};

use crate::locator::{Locator, LocatorParams};

#[derive(thiserror::Error, Debug)]
pub enum LocatorConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Markers(#[from] ConfigError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("{name} must be finite and non-negative (got {value})")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Camera calibration as produced by an OpenCV-style calibration tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub camera_matrix: [[f64; 3]; 3],
    /// `k1, k2, p1, p2[, k3, ...]`; may be empty.
    #[serde(default)]
    pub dist_coeffs: Vec<f64>,
}

impl CameraConfig {
    pub fn to_calibration(&self) -> Result<CameraCalibration, CameraError> {
        CameraCalibration::from_opencv(self.camera_matrix, &self.dist_coeffs)
    }
}

/// One positioning session: the marker layout, the camera, and the
/// parameters of every pipeline stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorConfig {
    pub markers: Vec<MarkerWorldDefinition>,
    /// Missing calibration degrades to a focal-length-only camera when
    /// `image_size` is known, and to identity intrinsics otherwise.
    #[serde(default)]
    pub camera: Option<CameraConfig>,
    /// `[width, height]` in pixels.
    #[serde(default)]
    pub image_size: Option<[u32; 2]>,
    #[serde(default)]
    pub pose: PoseEstimatorParams,
    #[serde(default)]
    pub world: WorldTransformParams,
    #[serde(default)]
    pub fusion: FusionParams,
    #[serde(default)]
    pub smoothing: KalmanParams,
    /// Camera identifier attached to every observation.
    #[serde(default)]
    pub source: Option<String>,
}

impl LocatorConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, LocatorConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), LocatorConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn marker_map(&self) -> Result<MarkerMap, LocatorConfigError> {
        Ok(MarkerMap::new(self.markers.clone())?)
    }

    pub fn camera_model(&self) -> Result<CameraModel, LocatorConfigError> {
        let calibration = self.camera.as_ref().map(CameraConfig::to_calibration).transpose()?;
        Ok(CameraModel::resolve(calibration, self.image_size))
    }

    /// Check everything [`Self::build_locator`] would reject.
    pub fn validate(&self) -> Result<(), LocatorConfigError> {
        self.marker_map()?;
        self.camera_model()?;
        let fusion = &self.fusion;
        non_negative("fusion.ransac_threshold", fusion.ransac_threshold)?;
        if let Some(max) = fusion.max_threshold {
            non_negative("fusion.max_threshold", max)?;
        }
        for (name, value) in [
            ("pose.max_viewing_angle_deg", self.pose.max_viewing_angle_deg),
            ("pose.min_pixel_size", self.pose.min_pixel_size),
        ] {
            if let Some(v) = value {
                non_negative(name, v)?;
            }
        }
        non_negative("smoothing.process_noise", self.smoothing.process_noise)?;
        non_negative("smoothing.measurement_noise", self.smoothing.measurement_noise)?;
        Ok(())
    }

    /// Validate and assemble a ready-to-run locator.
    pub fn build_locator(&self) -> Result<Locator, LocatorConfigError> {
        self.validate()?;
        let params = LocatorParams {
            pose: self.pose.clone(),
            world: self.world.clone(),
            fusion: self.fusion.clone(),
            smoothing: self.smoothing,
        };
        let locator = Locator::new(self.marker_map()?, self.camera_model()?, params);
        Ok(match &self.source {
            Some(s) => locator.with_source(s.clone()),
            None => locator,
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), LocatorConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LocatorConfigError::InvalidParameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducial_nav_core::EulerAngles;
    use nalgebra::Point3;

    fn config() -> LocatorConfig {
        LocatorConfig {
            markers: vec![MarkerWorldDefinition::new(
                1,
                0.2,
                Point3::new(0.0, 4.0, 1.5),
                EulerAngles::new(90.0, 0.0, 0.0),
            )],
            ..LocatorConfig::default()
        }
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let json = r#"{"markers": [{"id": 1, "size": 0.2, "position": [0, 4, 1.5]}]}"#;
        let cfg: LocatorConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(cfg.fusion, FusionParams::default());
        assert_eq!(cfg.smoothing, KalmanParams::default());
        assert!(cfg.camera.is_none());
        assert_eq!(cfg.camera_model().expect("camera"), CameraModel::Uncalibrated);
    }

    #[test]
    fn image_size_selects_focal_length_only() {
        let cfg = LocatorConfig {
            image_size: Some([1280, 720]),
            ..config()
        };
        assert_eq!(
            cfg.camera_model().expect("camera"),
            CameraModel::focal_length_only(1280, 720)
        );
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut cfg = config();
        cfg.fusion.ransac_threshold = -0.1;
        assert!(matches!(
            cfg.validate(),
            Err(LocatorConfigError::InvalidParameter {
                name: "fusion.ransac_threshold",
                ..
            })
        ));
    }

    #[test]
    fn bad_camera_matrix_is_rejected() {
        let cfg = LocatorConfig {
            camera: Some(CameraConfig {
                camera_matrix: [[0.0, 0.0, 320.0], [0.0, 0.0, 240.0], [0.0, 0.0, 1.0]],
                dist_coeffs: vec![],
            }),
            ..config()
        };
        assert!(matches!(cfg.build_locator(), Err(LocatorConfigError::Camera(_))));
    }
}
