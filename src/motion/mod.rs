// src/motion/mod.rs - Motion planning: junctions, velocity profiles and the lookahead planner
mod junction;
pub mod planner;
mod profile;

pub use planner::{Planner, PlannerState, DEFAULT_LOOKAHEAD};

use crate::config::ConfigError;
use crate::hardware::MotorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Invalid machine configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Lookahead must hold at least one move")]
    EmptyLookahead,
    #[error("Position outside the representable step range")]
    PositionOutOfRange,
    #[error("Motor backend error: {0}")]
    Motor(#[from] MotorError),
}
