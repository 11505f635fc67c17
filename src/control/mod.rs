//! Closed-loop position control.

mod controller;
mod homing;
mod pid;

pub use controller::{ControlOutput, ControllerState, MotorStatus, PositionController};
pub use homing::{HomingMethod, HomingSequence, HomingStep};
pub use pid::{Feedforward, Pid};
