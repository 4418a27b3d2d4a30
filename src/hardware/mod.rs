// src/hardware/mod.rs - Hardware-facing side of the planner
pub mod mapping;
pub mod motor;

pub use mapping::{
    EndSwitch, HardwareMapping, MappingError, MotorMapping, SwitchSide, TriggerLevel,
    NUM_MOTORS, NUM_SWITCHES,
};
pub use motor::{
    LinearSegmentSteps, LoggingMotorOperations, MotorError, MotorOperations,
    RecordingMotorOperations, SimulatedMotorOperations,
};
