// src/config.rs - Machine configuration and TOML loading
//! # Machine Control Configuration
//!
//! Read-only configuration shared by the planner, the hardware mapping and
//! the machine control front end. Per-axis values live in [`AxesRegister`]s
//! indexed by logical axis; mapping strings are optional and fall back to the
//! documented defaults.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! speed_factor = 1.0
//! threshold_angle = 10.0
//! axis_mapping = "XYZE"
//! min_endswitch = "XY"
//! max_endswitch = "__Z"
//!
//! [axis.x]
//! steps_per_mm = 160.0
//! max_feedrate = 200.0
//! acceleration = 4000.0
//! move_range_mm = 300.0
//!
//! [axis.z]
//! steps_per_mm = 1600.0
//! max_feedrate = 20.0
//! acceleration = 200.0
//! ```
//!
//! An axis with `steps_per_mm = 0` (the default) is not configured and never
//! moves. `move_range_mm = -1` (the default) means the axis is unbounded.

use crate::axes::{Axis, AxesRegister};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Connector order used when `axis_mapping` is not given.
pub const DEFAULT_AXIS_MAPPING: &str = "XYZEABC";
/// Homing order used when `home_order` is not given.
pub const DEFAULT_HOME_ORDER: &str = "ZXY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unknown axis '{0}' in configuration")]
    UnknownAxis(String),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validated, immutable configuration of the machine.
///
/// Owned by the caller and borrowed by everything that reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineControlConfig {
    /// Steps per mm for each logical axis. 0: axis not configured.
    pub steps_per_mm: AxesRegister,
    /// Travel range in mm (0..range). Negative: unbounded.
    pub move_range_mm: AxesRegister,
    /// Max feedrate per axis (mm/s).
    pub max_feedrate: AxesRegister,
    /// Max acceleration per axis (mm/s^2).
    pub acceleration: AxesRegister,

    /// Multiplier applied to every cruise speed.
    pub speed_factor: f64,
    /// Corners at or above this angle (degrees) come to a full stop.
    pub threshold_angle: f64,

    /// Logical axis letter per motor connector position. `None`: [`DEFAULT_AXIS_MAPPING`].
    pub axis_mapping: Option<String>,
    /// Axis letter per switch connector for the minimum end. Uppercase: homing switch.
    pub min_endswitch: Option<String>,
    /// Axis letter per switch connector for the maximum end. Uppercase: homing switch.
    pub max_endswitch: Option<String>,
    /// Trigger level per switch connector.
    pub endswitch_polarity: Option<String>,
    /// Order in which axes are homed. `None`: [`DEFAULT_HOME_ORDER`].
    pub home_order: Option<String>,

    pub acknowledge_lines: bool,
    pub require_homing: bool,
    pub range_check: bool,
    pub debug_print: bool,
    pub synchronous: bool,
}

impl Default for MachineControlConfig {
    fn default() -> Self {
        Self {
            steps_per_mm: AxesRegister::splat(0.0),
            move_range_mm: AxesRegister::splat(-1.0),
            max_feedrate: AxesRegister::splat(0.0),
            acceleration: AxesRegister::splat(0.0),
            speed_factor: default_speed_factor(),
            threshold_angle: default_threshold_angle(),
            axis_mapping: None,
            min_endswitch: None,
            max_endswitch: None,
            endswitch_polarity: None,
            home_order: None,
            acknowledge_lines: default_true(),
            require_homing: false,
            range_check: default_true(),
            debug_print: false,
            synchronous: false,
        }
    }
}

impl MachineControlConfig {
    pub fn axis_mapping(&self) -> &str {
        self.axis_mapping.as_deref().unwrap_or(DEFAULT_AXIS_MAPPING)
    }

    pub fn home_order(&self) -> &str {
        self.home_order.as_deref().unwrap_or(DEFAULT_HOME_ORDER)
    }

    /// An axis takes part in motion only if it has a step resolution.
    pub fn is_axis_configured(&self, axis: Axis) -> bool {
        self.steps_per_mm[axis] > 0.0
    }

    /// Checks the values the motion planner depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed_factor.is_finite() && self.speed_factor > 0.0) {
            return Err(ConfigError::invalid("speed_factor", "must be > 0"));
        }
        if !(self.threshold_angle.is_finite() && self.threshold_angle >= 0.0) {
            return Err(ConfigError::invalid("threshold_angle", "must be >= 0 degrees"));
        }
        for axis in Axis::ALL {
            let steps = self.steps_per_mm[axis];
            if !steps.is_finite() || steps < 0.0 {
                return Err(ConfigError::invalid(
                    format!("axis.{}.steps_per_mm", axis),
                    "must be >= 0",
                ));
            }
            if steps == 0.0 {
                continue;
            }
            if !(self.max_feedrate[axis].is_finite() && self.max_feedrate[axis] > 0.0) {
                return Err(ConfigError::invalid(
                    format!("axis.{}.max_feedrate", axis),
                    "must be > 0 for a configured axis",
                ));
            }
            if !(self.acceleration[axis].is_finite() && self.acceleration[axis] > 0.0) {
                return Err(ConfigError::invalid(
                    format!("axis.{}.acceleration", axis),
                    "must be > 0 for a configured axis",
                ));
            }
            if self.move_range_mm[axis].is_nan() {
                return Err(ConfigError::invalid(
                    format!("axis.{}.move_range_mm", axis),
                    "is not a number",
                ));
            }
        }
        Ok(())
    }
}

/// On-disk layout of the configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
    #[serde(default = "default_threshold_angle")]
    pub threshold_angle: f64,
    #[serde(default)]
    pub axis_mapping: Option<String>,
    #[serde(default)]
    pub min_endswitch: Option<String>,
    #[serde(default)]
    pub max_endswitch: Option<String>,
    #[serde(default)]
    pub endswitch_polarity: Option<String>,
    #[serde(default)]
    pub home_order: Option<String>,
    #[serde(default = "default_true")]
    pub acknowledge_lines: bool,
    #[serde(default)]
    pub require_homing: bool,
    #[serde(default = "default_true")]
    pub range_check: bool,
    #[serde(default)]
    pub debug_print: bool,
    #[serde(default)]
    pub synchronous: bool,
    #[serde(default)]
    pub axis: BTreeMap<String, AxisConfig>,
}

/// Per-axis table, e.g. `[axis.x]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxisConfig {
    #[serde(default)]
    pub steps_per_mm: f64,
    #[serde(default = "default_move_range")]
    pub move_range_mm: f64,
    #[serde(default)]
    pub max_feedrate: f64,
    #[serde(default)]
    pub acceleration: f64,
}

impl TryFrom<ConfigFile> for MachineControlConfig {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut config = MachineControlConfig {
            speed_factor: file.speed_factor,
            threshold_angle: file.threshold_angle,
            axis_mapping: file.axis_mapping,
            min_endswitch: file.min_endswitch,
            max_endswitch: file.max_endswitch,
            endswitch_polarity: file.endswitch_polarity,
            home_order: file.home_order,
            acknowledge_lines: file.acknowledge_lines,
            require_homing: file.require_homing,
            range_check: file.range_check,
            debug_print: file.debug_print,
            synchronous: file.synchronous,
            ..MachineControlConfig::default()
        };
        for (name, axis_config) in file.axis {
            let mut letters = name.chars();
            let axis = match (letters.next(), letters.next()) {
                (Some(letter), None) => Axis::from_letter(letter),
                _ => None,
            }
            .ok_or_else(|| ConfigError::UnknownAxis(name.clone()))?;
            config.steps_per_mm[axis] = axis_config.steps_per_mm;
            config.move_range_mm[axis] = axis_config.move_range_mm;
            config.max_feedrate[axis] = axis_config.max_feedrate;
            config.acceleration[axis] = axis_config.acceleration;
        }
        config.validate()?;
        Ok(config)
    }
}

// Default value functions
fn default_speed_factor() -> f64 { 1.0 }
fn default_threshold_angle() -> f64 { 10.0 }
fn default_move_range() -> f64 { -1.0 }
fn default_true() -> bool { true }

/// Parses and validates a configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<MachineControlConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(contents)?;
    MachineControlConfig::try_from(file)
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<MachineControlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    parse_config(&contents).map_err(|e| {
        tracing::error!("Failed to load config '{}': {}", path, e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = MachineControlConfig::default();
        assert_eq!(config.speed_factor, 1.0);
        assert!(config.range_check);
        assert!(config.acknowledge_lines);
        assert!(!config.require_homing);
        assert!(!config.synchronous);
        assert_eq!(config.axis_mapping(), "XYZEABC");
        assert_eq!(config.home_order(), "ZXY");
        assert_eq!(config.move_range_mm[Axis::X], -1.0);
        assert!(!config.is_axis_configured(Axis::X));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("machine.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "threshold_angle = 5.0\naxis_mapping = \"XYZ\"\nsynchronous = true\n\
             [axis.x]\nsteps_per_mm = 80.0\nmax_feedrate = 200.0\nacceleration = 3000.0\nmove_range_mm = 220.0\n\
             [axis.Z]\nsteps_per_mm = 400.0\nmax_feedrate = 10.0\nacceleration = 100.0"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.threshold_angle, 5.0);
        assert_eq!(config.axis_mapping(), "XYZ");
        assert!(config.synchronous);
        assert_eq!(config.steps_per_mm[Axis::X], 80.0);
        assert_eq!(config.move_range_mm[Axis::X], 220.0);
        assert_eq!(config.acceleration[Axis::Z], 100.0);
        // Defaults for missing fields
        assert_eq!(config.move_range_mm[Axis::Z], -1.0);
        assert_eq!(config.speed_factor, 1.0);
        assert!(config.range_check);
        assert!(!config.is_axis_configured(Axis::Y));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let result = parse_config("not a valid toml");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unknown_axis_rejected() {
        let result = parse_config("[axis.q]\nsteps_per_mm = 10.0");
        assert!(matches!(result, Err(ConfigError::UnknownAxis(name)) if name == "q"));
        let result = parse_config("[axis.xy]\nsteps_per_mm = 10.0");
        assert!(matches!(result, Err(ConfigError::UnknownAxis(_))));
    }

    #[test]
    fn test_configured_axis_needs_limits() {
        let result = parse_config("[axis.y]\nsteps_per_mm = 10.0\nmax_feedrate = 100.0");
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "axis.Y.acceleration"));

        let result = parse_config("speed_factor = 0.0");
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "speed_factor"));

        let result = parse_config("threshold_angle = -1.0");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
