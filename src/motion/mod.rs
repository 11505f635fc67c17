//! Motion profile generation and evaluation.

mod profile;
mod sync;

pub use profile::{MotionLimits, MotionPhase, ProfileKind, Trajectory, TrajectorySample};
pub use sync::synchronize;
