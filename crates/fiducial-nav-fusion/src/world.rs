//! Camera position in the world frame from one marker observation.
//!
//! World frame: right-handed, +Z up. A camera below the ground plane
//! (negative world Z) is treated as a bad observation and skipped.

use fiducial_nav_core::{
    DetectedMarkerObservation, MarkerMap, MarkerPose, MarkerWorldDefinition,
    WorldPositionEstimate,
};
use log::debug;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldTransformParams {
    /// Drop estimates whose world Z is negative.
    pub reject_below_ground: bool,
}

impl Default for WorldTransformParams {
    fn default() -> Self {
        Self {
            reject_below_ground: true,
        }
    }
}

/// Camera centre expressed in the marker frame: `-R^T t`.
#[inline]
pub fn camera_position_in_marker(pose: &MarkerPose) -> Vector3<f64> {
    -(pose.rotation_matrix().transpose() * pose.tvec)
}

/// Map one observation to a world-frame camera position.
///
/// Returns `None` (and logs at debug) when the observation has no pose, the
/// result is not finite, or it lies below ground and that is rejected.
pub fn transform_to_world(
    observation: &DetectedMarkerObservation,
    marker: &MarkerWorldDefinition,
    params: &WorldTransformParams,
) -> Option<WorldPositionEstimate> {
    let pose = observation.pose.as_ref()?;
    let in_marker = camera_position_in_marker(pose);
    let world = Point3::from(marker.rotation_matrix() * in_marker + marker.position.coords);

    if !world.coords.iter().all(|v| v.is_finite()) {
        debug!("marker {}: non-finite world position", observation.marker_id);
        return None;
    }
    if params.reject_below_ground && world.z < 0.0 {
        debug!(
            "marker {}: camera below ground (z = {:.3}), skipped",
            observation.marker_id, world.z
        );
        return None;
    }

    Some(WorldPositionEstimate {
        marker_id: observation.marker_id,
        position: world,
        distance: observation.distance,
        source: observation.source.clone(),
    })
}

/// Transform every observation whose marker is known.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(observations = observations.len()))
)]
pub fn transform_observations(
    observations: &[DetectedMarkerObservation],
    markers: &MarkerMap,
    params: &WorldTransformParams,
) -> Vec<WorldPositionEstimate> {
    observations
        .iter()
        .filter_map(|obs| {
            let Some(marker) = markers.get(obs.marker_id) else {
                debug!("marker {}: no world definition", obs.marker_id);
                return None;
            };
            transform_to_world(obs, marker, params)
        })
        .collect()
}
