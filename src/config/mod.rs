//! Configuration module for stepper-control.
//!
//! Provides types for loading and validating motor, scheduler, and
//! coordination configurations from TOML files (with `std` feature) or
//! pre-parsed data.

#[cfg(feature = "std")]
mod loader;
mod motor;
mod safety;
mod system;
pub mod units;
mod validation;

pub use motor::{ControlGains, ControlLimits, HomingConfig, MotorConfig};
pub use safety::SafetyConfig;
pub use system::{CoordinationConfig, SchedulerConfig, SystemConfig};
pub use validation::validate_config;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Degrees, DegreesPerSec, DegreesPerSecSquared, MotorId, MAX_MOTORS};
