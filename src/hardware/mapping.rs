// src/hardware/mapping.rs - Logical axis to physical connector lookup
use crate::axes::{Axis, AxesRegister, NUM_AXES};
use crate::config::MachineControlConfig;
use thiserror::Error;

/// Motor connectors on the board, numbered 1..=NUM_MOTORS.
pub const NUM_MOTORS: usize = 8;
/// End-switch connectors on the board, numbered 1..=NUM_SWITCHES.
pub const NUM_SWITCHES: usize = 6;

#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("{field}: invalid axis letter '{letter}' at position {position}")]
    InvalidAxisLetter {
        field: &'static str,
        position: usize,
        letter: char,
    },
    #[error("{field}: {len} entries but only {max} connectors available")]
    TooManyConnectors {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("Motor connector {connector} out of range 1..={max}")]
    ConnectorOutOfRange { connector: usize, max: usize },
    #[error("Motor connector {connector} already drives axis {existing}")]
    DuplicateConnector { connector: usize, existing: Axis },
    #[error("Switch connector {connector} assigned to both min and max end")]
    DuplicateSwitch { connector: usize },
    #[error("Axis {axis} has homing switches on both ends")]
    ConflictingHomeSwitch { axis: Axis },
    #[error("endswitch_polarity: invalid trigger level '{letter}' at position {position}")]
    InvalidPolarity { position: usize, letter: char },
    #[error("endswitch_polarity: switch connector {connector} has no switch assigned")]
    UnusedSwitchPolarity { connector: usize },
    #[error("home_order: invalid axis letter '{letter}'")]
    InvalidHomeAxis { letter: char },
    #[error("home_order: axis {axis} listed twice")]
    DuplicateHomeAxis { axis: Axis },
}

/// One motor driven by a logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorMapping {
    /// 1-based connector position on the board.
    pub connector: usize,
    /// Motor turns the opposite way.
    pub mirror: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchSide {
    Min,
    Max,
}

/// Logic level at which a switch reports triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndSwitch {
    pub connector: usize,
    pub axis: Axis,
    pub side: SwitchSide,
    /// Used as the reference for homing, not only as a limit.
    pub homing: bool,
    pub trigger: TriggerLevel,
}

/// Read-only lookup from logical axes to motor and switch connectors.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareMapping {
    axis_motors: [Vec<MotorMapping>; NUM_AXES],
    connector_axis: [Option<Axis>; NUM_MOTORS],
    switches: [Option<EndSwitch>; NUM_SWITCHES],
    home_order: Vec<Axis>,
}

impl Default for HardwareMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareMapping {
    /// A mapping without any motors or switches.
    pub fn new() -> Self {
        Self {
            axis_motors: std::array::from_fn(|_| Vec::new()),
            connector_axis: [None; NUM_MOTORS],
            switches: [None; NUM_SWITCHES],
            home_order: Vec::new(),
        }
    }

    /// Builds the mapping from the configuration's mapping strings.
    ///
    /// Fails on the first malformed entry; nothing partially built escapes.
    pub fn from_config(config: &MachineControlConfig) -> Result<Self, MappingError> {
        let mut mapping = Self::new();

        let axis_mapping = config.axis_mapping();
        check_length("axis_mapping", axis_mapping, NUM_MOTORS)?;
        for (position, letter) in axis_mapping.chars().enumerate() {
            if letter == '_' {
                continue;
            }
            let axis = Axis::from_letter(letter).ok_or(MappingError::InvalidAxisLetter {
                field: "axis_mapping",
                position,
                letter,
            })?;
            mapping.add_motor_mapping(axis, position + 1, letter.is_ascii_lowercase())?;
        }

        if let Some(min) = config.min_endswitch.as_deref() {
            mapping.add_switches("min_endswitch", min, SwitchSide::Min)?;
        }
        if let Some(max) = config.max_endswitch.as_deref() {
            mapping.add_switches("max_endswitch", max, SwitchSide::Max)?;
        }
        if let Some(polarity) = config.endswitch_polarity.as_deref() {
            mapping.apply_polarity(polarity)?;
        }
        mapping.set_home_order(config.home_order())?;

        for axis in Axis::ALL {
            if mapping.is_axis_mapped(axis) && !config.is_axis_configured(axis) {
                tracing::warn!("Axis {} is mapped to a motor but has no steps_per_mm", axis);
            }
        }
        tracing::info!(
            "Hardware mapping: {} motor(s), {} switch(es)",
            mapping.connector_axis.iter().flatten().count(),
            mapping.switches().count()
        );
        Ok(mapping)
    }

    /// Assigns `axis` to drive the motor on `connector` (1-based).
    pub fn add_motor_mapping(
        &mut self,
        axis: Axis,
        connector: usize,
        mirror: bool,
    ) -> Result<(), MappingError> {
        if connector == 0 || connector > NUM_MOTORS {
            return Err(MappingError::ConnectorOutOfRange {
                connector,
                max: NUM_MOTORS,
            });
        }
        if let Some(existing) = self.connector_axis[connector - 1] {
            return Err(MappingError::DuplicateConnector {
                connector,
                existing,
            });
        }
        self.connector_axis[connector - 1] = Some(axis);
        self.axis_motors[axis.index()].push(MotorMapping { connector, mirror });
        tracing::debug!("Axis {} -> motor {}{}", axis, connector, if mirror { " (mirrored)" } else { "" });
        Ok(())
    }

    fn add_switches(
        &mut self,
        field: &'static str,
        letters: &str,
        side: SwitchSide,
    ) -> Result<(), MappingError> {
        check_length(field, letters, NUM_SWITCHES)?;
        for (position, letter) in letters.chars().enumerate() {
            if letter == '_' {
                continue;
            }
            let axis = Axis::from_letter(letter).ok_or(MappingError::InvalidAxisLetter {
                field,
                position,
                letter,
            })?;
            if self.switches[position].is_some() {
                return Err(MappingError::DuplicateSwitch {
                    connector: position + 1,
                });
            }
            let homing = letter.is_ascii_uppercase();
            if homing && self.home_switch(axis).is_some() {
                return Err(MappingError::ConflictingHomeSwitch { axis });
            }
            self.switches[position] = Some(EndSwitch {
                connector: position + 1,
                axis,
                side,
                homing,
                trigger: TriggerLevel::High,
            });
        }
        Ok(())
    }

    fn apply_polarity(&mut self, levels: &str) -> Result<(), MappingError> {
        check_length("endswitch_polarity", levels, NUM_SWITCHES)?;
        for (position, letter) in levels.chars().enumerate() {
            let trigger = match letter {
                '_' => continue,
                '1' | 'H' | 'h' | '+' => TriggerLevel::High,
                '0' | 'L' | 'l' | '-' => TriggerLevel::Low,
                _ => return Err(MappingError::InvalidPolarity { position, letter }),
            };
            match self.switches[position].as_mut() {
                Some(switch) => switch.trigger = trigger,
                None => {
                    return Err(MappingError::UnusedSwitchPolarity {
                        connector: position + 1,
                    });
                }
            }
        }
        Ok(())
    }

    fn set_home_order(&mut self, order: &str) -> Result<(), MappingError> {
        let mut axes = Vec::new();
        for letter in order.chars() {
            let axis = Axis::from_letter(letter).ok_or(MappingError::InvalidHomeAxis { letter })?;
            if axes.contains(&axis) {
                return Err(MappingError::DuplicateHomeAxis { axis });
            }
            axes.push(axis);
        }
        self.home_order = axes;
        Ok(())
    }

    pub fn motors_for_axis(&self, axis: Axis) -> &[MotorMapping] {
        &self.axis_motors[axis.index()]
    }

    pub fn is_axis_mapped(&self, axis: Axis) -> bool {
        !self.axis_motors[axis.index()].is_empty()
    }

    pub fn axis_for_connector(&self, connector: usize) -> Option<Axis> {
        connector
            .checked_sub(1)
            .and_then(|index| self.connector_axis.get(index).copied().flatten())
    }

    pub fn switches(&self) -> impl Iterator<Item = &EndSwitch> {
        self.switches.iter().flatten()
    }

    /// The switch used as homing reference for `axis`, if any.
    pub fn home_switch(&self, axis: Axis) -> Option<&EndSwitch> {
        self.switches().find(|switch| switch.axis == axis && switch.homing)
    }

    pub fn home_order(&self) -> &[Axis] {
        &self.home_order
    }

    /// Distributes per-axis steps onto motor connectors, index 0 being connector 1.
    pub fn motor_steps(&self, axis_steps: &AxesRegister<i64>) -> [i64; NUM_MOTORS] {
        let mut motors = [0i64; NUM_MOTORS];
        for (axis, steps) in axis_steps.iter() {
            for motor in self.motors_for_axis(axis) {
                motors[motor.connector - 1] = if motor.mirror { -steps } else { steps };
            }
        }
        motors
    }
}

fn check_length(field: &'static str, letters: &str, max: usize) -> Result<(), MappingError> {
    let len = letters.chars().count();
    if len > max {
        return Err(MappingError::TooManyConnectors { field, len, max });
    }
    Ok(())
}
