//! Tunables for display derivation and spill simulation.
//!
//! Every field has a default, so a config file only needs to name the values
//! it overrides. YAML is the primary format; `.json` files are read as JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Presentation parameters used when deriving display snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Shader fill value for an empty container.
    pub min_fill: f32,
    /// Shader fill value for a full container.
    pub max_fill: f32,
    /// How fast an observer's displayed fill approaches the replicated value, per second.
    pub fill_lerp_rate: f32,
    /// Saturation multiplier for the liquid surface colour.
    pub top_saturation: f32,
    /// Saturation multiplier for the foam colour.
    pub foam_saturation: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            min_fill: 0.01,
            max_fill: 0.99,
            fill_lerp_rate: 1.5,
            top_saturation: 0.35,
            foam_saturation: 0.55,
        }
    }
}

/// Spill detection and particle parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Tilt (degrees from upright) at which an almost-empty container starts spilling.
    pub max_tilt_degrees: f32,
    /// Converts degrees past the spill threshold into a spill rate.
    pub rate_scale: f32,
    /// Delay between the start of a spill and the first transfer particle, in seconds.
    pub first_emit_delay: f32,
    /// Higher spill rates shorten the emission interval by `rate * interval_scale` seconds.
    pub interval_scale: f32,
    /// Lower bound on the emission interval, in seconds.
    pub min_emit_interval: f32,
    /// Moles carried by one transfer particle.
    pub particle_moles: f32,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            max_tilt_degrees: 80.0,
            rate_scale: 0.01,
            first_emit_delay: 0.001,
            interval_scale: 5.0,
            min_emit_interval: 0.02,
            particle_moles: 0.1,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub display: DisplayConfig,
    pub spill: SpillConfig,
}

impl SimConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Reject values that would make derivation or spill timing meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.display;
        if !(0.0..=1.0).contains(&d.min_fill)
            || !(0.0..=1.0).contains(&d.max_fill)
            || d.min_fill >= d.max_fill
        {
            return Err(ConfigError::Invalid(format!(
                "fill range must satisfy 0 <= min_fill < max_fill <= 1 (got {}..{})",
                d.min_fill, d.max_fill
            )));
        }
        if !(d.fill_lerp_rate > 0.0) {
            return Err(ConfigError::Invalid("fill_lerp_rate must be positive".into()));
        }
        for (name, v) in [
            ("top_saturation", d.top_saturation),
            ("foam_saturation", d.foam_saturation),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {v}")));
            }
        }

        let s = &self.spill;
        if !(s.max_tilt_degrees > 0.0 && s.max_tilt_degrees <= 180.0) {
            return Err(ConfigError::Invalid(format!(
                "max_tilt_degrees must be in (0, 180], got {}",
                s.max_tilt_degrees
            )));
        }
        for (name, v) in [
            ("rate_scale", s.rate_scale),
            ("min_emit_interval", s.min_emit_interval),
            ("particle_moles", s.particle_moles),
        ] {
            if !(v > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {v}")));
            }
        }
        if s.first_emit_delay < 0.0 || s.interval_scale < 0.0 {
            return Err(ConfigError::Invalid(
                "first_emit_delay and interval_scale must not be negative".into(),
            ));
        }
        Ok(())
    }
}
