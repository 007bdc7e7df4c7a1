use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INTERSECTION_COLOR, DEFAULT_INTERSECTION_DISTANCE, MAX_LIGHT_VOLUMES, MAX_VOLUMES,
};
use crate::error::ConfigError;

/// Runtime settings shared by the registry, the GPU volume buffer and the
/// intersection renderer. Loaded from RON; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSettings {
    /// Maximum live SDF volumes. The registry and the GPU buffer are both
    /// sized from this value so they always agree.
    pub max_volumes: u32,
    /// Optional cap on live volumes of any single kind.
    pub max_per_kind: Option<u32>,
    /// Maximum registered light volumes the GPU renderer reserves uniforms for.
    pub max_light_volumes: u32,
    /// Overlay rim color used when a light volume has no configured one.
    pub intersection_color: [f32; 4],
    /// Overlay rim distance used when a light volume has no configured one.
    pub intersection_distance: f32,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            max_volumes: MAX_VOLUMES,
            max_per_kind: None,
            max_light_volumes: MAX_LIGHT_VOLUMES,
            intersection_color: DEFAULT_INTERSECTION_COLOR,
            intersection_distance: DEFAULT_INTERSECTION_DISTANCE,
        }
    }
}

impl VolumeSettings {
    /// Reject settings no component could honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_volumes == 0 {
            return Err(ConfigError::Invalid("max_volumes must be at least 1".into()));
        }
        if let Some(per_kind) = self.max_per_kind {
            if per_kind == 0 {
                return Err(ConfigError::Invalid(
                    "max_per_kind must be at least 1 when set".into(),
                ));
            }
            if per_kind > self.max_volumes {
                log::warn!(
                    "max_per_kind ({}) exceeds max_volumes ({}); the total cap wins",
                    per_kind,
                    self.max_volumes
                );
            }
        }
        if self.max_light_volumes == 0 {
            return Err(ConfigError::Invalid(
                "max_light_volumes must be at least 1".into(),
            ));
        }
        if self.intersection_distance.is_nan() || self.intersection_distance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "intersection_distance must be positive, got {}",
                self.intersection_distance
            )));
        }
        Ok(())
    }
}

/// Parse and validate settings from a RON string.
pub fn load_settings_from_str(ron_str: &str) -> Result<VolumeSettings, ConfigError> {
    let options = ron::Options::default();
    let settings: VolumeSettings = options
        .from_str(ron_str)
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}
