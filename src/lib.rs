// stride-rs: lookahead motion planner for step/direction driven machines

pub mod axes;
pub mod config;
pub mod hardware;
pub mod machine;
pub mod motion;
pub mod move_list;

// --- Re-exports ---
pub use axes::{AxesRegister, Axis, NUM_AXES};
pub use config::{load_config, parse_config, ConfigError, MachineControlConfig};
pub use hardware::{
    HardwareMapping, LinearSegmentSteps, LoggingMotorOperations, MappingError, MotorError,
    MotorOperations, RecordingMotorOperations, SimulatedMotorOperations,
};
pub use machine::{MachineControl, MachineError};
pub use motion::{Planner, PlannerError, PlannerState, DEFAULT_LOOKAHEAD};
pub use move_list::{parse_move_list, MoveKind, MoveListError, MoveRequest};
