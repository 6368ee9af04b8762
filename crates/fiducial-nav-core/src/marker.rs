//! Known marker placements in the world frame.
//!
//! World convention: right-handed, +Z up. Marker frame: origin at the marker
//! centre, +X to the right and +Y up when looking at the printed face, +Z out
//! of the face towards the viewer.

use std::collections::BTreeMap;

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::rotation::EulerAngles;

/// Unit of the lengths stored in a [`MarkerWorldDefinition`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Meters,
    Millimeters,
}

impl LengthUnit {
    /// Scale factor that converts a length in this unit to meters.
    #[inline]
    pub fn to_meters_factor(self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Millimeters => 1e-3,
        }
    }

    #[inline]
    pub fn to_meters(self, v: f64) -> f64 {
        v * self.to_meters_factor()
    }
}

/// Configuration errors detected when a marker set is loaded.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("duplicate marker id {0}")]
    DuplicateId(u32),
    #[error("marker {id}: size must be finite and positive (got {size})")]
    InvalidSize { id: u32, size: f64 },
    #[error("marker {id}: position or rotation is not finite")]
    NonFinitePlacement { id: u32 },
    #[error("marker {id}: max_distance must be finite and positive (got {value})")]
    InvalidMaxDistance { id: u32, value: f64 },
}

/// One marker with a known world placement.
///
/// `size`, `position` and `max_distance` are all expressed in `unit`;
/// `rotation` is in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerWorldDefinition {
    pub id: u32,
    /// Physical side length of the black square.
    pub size: f64,
    pub position: Point3<f64>,
    #[serde(default)]
    pub rotation: EulerAngles,
    /// Observations farther away than this are discarded.
    #[serde(default)]
    pub max_distance: Option<f64>,
    #[serde(default)]
    pub unit: LengthUnit,
}

impl MarkerWorldDefinition {
    pub fn new(id: u32, size: f64, position: Point3<f64>, rotation: EulerAngles) -> Self {
        Self {
            id,
            size,
            position,
            rotation,
            max_distance: None,
            unit: LengthUnit::Meters,
        }
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_unit(mut self, unit: LengthUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(ConfigError::InvalidSize {
                id: self.id,
                size: self.size,
            });
        }
        if !self.position.coords.iter().all(|v| v.is_finite()) || !self.rotation.is_finite() {
            return Err(ConfigError::NonFinitePlacement { id: self.id });
        }
        if let Some(value) = self.max_distance {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidMaxDistance { id: self.id, value });
            }
        }
        Ok(())
    }

    /// Copy of this definition with all lengths converted to meters.
    pub fn in_meters(&self) -> Self {
        let f = self.unit.to_meters_factor();
        Self {
            id: self.id,
            size: self.size * f,
            position: self.position * f,
            rotation: self.rotation,
            max_distance: self.max_distance.map(|d| d * f),
            unit: LengthUnit::Meters,
        }
    }

    /// `R_marker_world`: rotates marker-frame vectors into the world frame.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_matrix()
    }

    /// Marker-to-world rigid transform.
    pub fn world_from_marker(&self) -> Isometry3<f64> {
        let rot = Rotation3::from_matrix_unchecked(self.rotation_matrix());
        Isometry3::from_parts(
            Translation3::from(self.position.coords),
            UnitQuaternion::from_rotation_matrix(&rot),
        )
    }
}

/// Validated, id-keyed marker set with all lengths in meters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerMap {
    markers: BTreeMap<u32, MarkerWorldDefinition>,
}

impl MarkerMap {
    pub fn new(definitions: Vec<MarkerWorldDefinition>) -> Result<Self, ConfigError> {
        let mut markers = BTreeMap::new();
        for def in definitions {
            def.validate()?;
            let id = def.id;
            if markers.insert(id, def.in_meters()).is_some() {
                return Err(ConfigError::DuplicateId(id));
            }
        }
        Ok(Self { markers })
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&MarkerWorldDefinition> {
        self.markers.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.markers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.markers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerWorldDefinition> {
        self.markers.values()
    }
}
