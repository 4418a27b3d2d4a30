// src/machine.rs - Machine control: policy between motion requests and the planner
use std::io::Write;

use crate::axes::{Axis, AxesRegister};
use crate::config::MachineControlConfig;
use crate::hardware::{HardwareMapping, MappingError, MotorError, MotorOperations, SwitchSide};
use crate::motion::{Planner, PlannerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("Target {position} mm on axis {axis} outside of range 0..{range} mm")]
    OutOfRange { axis: Axis, position: f64, range: f64 },
    #[error("Machine must be homed before moving")]
    NotHomed,
    #[error("No feedrate given yet")]
    NoFeedrate,
    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),
    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),
    #[error("Hardware mapping error: {0}")]
    Mapping(#[from] MappingError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Applies range, homing and acknowledgement policy to motion requests and
/// forwards the accepted ones to the [`Planner`].
pub struct MachineControl<'a, M: MotorOperations> {
    config: &'a MachineControlConfig,
    hardware: &'a HardwareMapping,
    planner: Planner<'a, M>,
    msg_out: Option<Box<dyn Write + 'a>>,
    current_feedrate: Option<f64>,
    homed: bool,
    motors_enabled: bool,
}

impl<'a, M: MotorOperations> MachineControl<'a, M> {
    pub fn new(
        config: &'a MachineControlConfig,
        hardware: &'a HardwareMapping,
        motor_ops: M,
    ) -> Result<Self, MachineError> {
        let planner = Planner::new(config, hardware, motor_ops)?;
        Ok(Self {
            config,
            hardware,
            planner,
            msg_out: None,
            current_feedrate: None,
            homed: false,
            motors_enabled: false,
        })
    }

    /// Acknowledgements and other messages go to `sink`.
    pub fn with_message_sink(mut self, sink: impl Write + 'a) -> Self {
        self.msg_out = Some(Box::new(sink));
        self
    }

    /// Straight move to `target` (mm). `feedrate` (mm/s) sticks for later moves.
    pub fn coordinated_move(
        &mut self,
        feedrate: Option<f64>,
        target: &AxesRegister,
    ) -> Result<(), MachineError> {
        if let Some(feedrate) = feedrate {
            self.current_feedrate = Some(feedrate);
        }
        let feedrate = self.current_feedrate.ok_or(MachineError::NoFeedrate)?;
        self.move_to(feedrate, target)
    }

    /// Move at the fastest feedrate any configured axis allows.
    pub fn rapid_move(&mut self, target: &AxesRegister) -> Result<(), MachineError> {
        let feedrate = Axis::ALL
            .iter()
            .filter(|&&axis| self.config.is_axis_configured(axis))
            .map(|&axis| self.config.max_feedrate[axis])
            .fold(0.0, f64::max);
        if feedrate <= 0.0 {
            return Err(MachineError::NoFeedrate);
        }
        self.move_to(feedrate, target)
    }

    fn move_to(&mut self, feedrate: f64, target: &AxesRegister) -> Result<(), MachineError> {
        if self.config.require_homing && !self.homed {
            return Err(MachineError::NotHomed);
        }
        if self.config.range_check {
            self.check_range(target)?;
        }
        if !self.motors_enabled {
            self.set_motors(true);
        }
        self.planner.enqueue(target, feedrate)?;
        self.after_command()
    }

    fn check_range(&self, target: &AxesRegister) -> Result<(), MachineError> {
        for axis in Axis::ALL {
            let range = self.config.move_range_mm[axis];
            if !self.config.is_axis_configured(axis) || range < 0.0 {
                continue;
            }
            let position = target[axis];
            if !(0.0..=range).contains(&position) {
                tracing::warn!("Rejecting move: {} = {} mm outside 0..{}", axis, position, range);
                return Err(MachineError::OutOfRange { axis, position, range });
            }
        }
        Ok(())
    }

    fn after_command(&mut self) -> Result<(), MachineError> {
        if self.config.synchronous {
            self.finish()?;
        }
        if self.config.acknowledge_lines {
            if let Some(out) = self.msg_out.as_mut() {
                out.write_all(b"ok\n")?;
                out.flush()?;
            }
        }
        Ok(())
    }

    /// Position an axis lands on after homing: the end of its range when it
    /// homes to the max switch, 0 otherwise.
    pub fn home_position(&self) -> AxesRegister {
        let mut position = AxesRegister::new();
        for axis in Axis::ALL {
            let range = self.config.move_range_mm[axis];
            if let Some(switch) = self.hardware.home_switch(axis) {
                if switch.side == SwitchSide::Max && range >= 0.0 {
                    position[axis] = range;
                }
            }
        }
        position
    }

    /// Called once the external homing routine has reached the switches.
    pub fn mark_homed(&mut self) -> Result<(), MachineError> {
        self.finish()?;
        let home = self.home_position();
        self.planner.set_position(&home)?;
        self.homed = true;
        tracing::info!("Machine homed at {:?}", home.as_array());
        Ok(())
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    pub fn set_position(&mut self, position: &AxesRegister) -> Result<(), MachineError> {
        self.planner.set_position(position)?;
        Ok(())
    }

    pub fn current_position(&self) -> &AxesRegister {
        self.planner.current_position()
    }

    pub fn current_feedrate(&self) -> Option<f64> {
        self.current_feedrate
    }

    /// Switching motors off first lets every queued move finish.
    pub fn motors_enable(&mut self, on: bool) -> Result<(), MachineError> {
        if !on {
            self.finish()?;
        }
        self.set_motors(on);
        Ok(())
    }

    fn set_motors(&mut self, on: bool) {
        self.planner.motor_ops_mut().motor_enable(on);
        self.motors_enabled = on;
    }

    /// Brings the path to a halt and waits until the backend ran every segment.
    pub fn finish(&mut self) -> Result<(), MachineError> {
        self.planner.bring_path_to_halt()?;
        self.planner.motor_ops_mut().wait_queue_empty()?;
        Ok(())
    }

    pub fn planner(&self) -> &Planner<'a, M> {
        &self.planner
    }

    pub fn motor_ops(&self) -> &M {
        self.planner.motor_ops()
    }

    pub fn into_motor_ops(self) -> M {
        self.planner.into_motor_ops()
    }
}
